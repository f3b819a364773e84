//! Schedule intent and its translation into backend-native syntax
//!
//! A schedule is either a fixed interval (whole minutes) or a cron
//! expression written in the Vixie convention: five fields, or six with a
//! trailing year, day-of-week 0-7 where both 0 and 7 mean Sunday.
//!
//! Kubernetes CronJobs take the five-field form verbatim. EventBridge wants
//! `rate(...)` or a six-field `cron(...)` with 1-based weekdays and exactly
//! one of day-of-month/day-of-week set to `?`.

use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroU32;

use crate::backend::BackendKind;
use crate::{Error, Result};

const MINUTES_PER_HOUR: u32 = 60;
const MINUTES_PER_DAY: u32 = 24 * MINUTES_PER_HOUR;

// =============================================================================
// ScheduleSpec
// =============================================================================

/// When a workload should run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScheduleSpec {
    /// Fire on a fixed whole-minute interval
    Interval(Interval),
    /// Fire on a validated cron expression
    Cron(CronExpr),
}

impl ScheduleSpec {
    /// Parse a schedule from its declarative text form.
    ///
    /// Accepts `cron: <expr>`, a bare 5/6-field cron expression, or an
    /// interval such as `15m`, `every 15 minutes`, `rate=2h`.
    pub fn parse(raw: &str) -> Result<Self> {
        let text = raw.trim();
        if let Some(expr) = text.strip_prefix("cron:") {
            return CronExpr::parse(expr.trim()).map(Self::Cron);
        }
        if text.split_whitespace().count() >= 5 {
            return CronExpr::parse(text).map(Self::Cron);
        }
        let minutes = parse_interval(text)?;
        Self::every_minutes(minutes)
            .map_err(|_| Error::invalid_schedule(raw, "interval must be at least 1 minute"))
    }

    /// Build an interval schedule; zero minutes is rejected
    pub fn every_minutes(minutes: u32) -> Result<Self> {
        NonZeroU32::new(minutes)
            .map(|m| Self::Interval(Interval(m)))
            .ok_or_else(|| {
                Error::invalid_schedule(format!("{minutes}m"), "interval must be at least 1 minute")
            })
    }

    /// Translate into the backend's native schedule string
    pub fn translate(&self, backend: BackendKind) -> Result<String> {
        translate(self, backend)
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval(interval) => write!(f, "{}m", interval.minutes()),
            Self::Cron(expr) => write!(f, "cron: {}", expr.source),
        }
    }
}

/// A whole-minute interval, never zero
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interval(NonZeroU32);

impl Interval {
    /// Interval length in minutes
    pub fn minutes(self) -> u32 {
        self.0.get()
    }
}

/// Translate a schedule into the native syntax of `backend`.
///
/// Fails with `InvalidSchedule` when the cadence cannot be expressed on the
/// backend without drifting (e.g. a 7 minute interval as a cron string).
pub fn translate(spec: &ScheduleSpec, backend: BackendKind) -> Result<String> {
    match backend {
        BackendKind::Kubernetes => to_vixie(spec),
        BackendKind::Aws => to_eventbridge(spec),
    }
}

fn to_vixie(spec: &ScheduleSpec) -> Result<String> {
    match spec {
        ScheduleSpec::Interval(interval) => {
            let minutes = interval.minutes();
            interval_to_vixie(minutes).ok_or_else(|| {
                Error::invalid_schedule(
                    spec.to_string(),
                    format!(
                        "an interval of {minutes} minutes has no drift-free cron equivalent on kubernetes"
                    ),
                )
            })
        }
        ScheduleSpec::Cron(expr) => expr.to_vixie(),
    }
}

fn to_eventbridge(spec: &ScheduleSpec) -> Result<String> {
    match spec {
        ScheduleSpec::Interval(interval) => Ok(interval_to_rate(interval.minutes())),
        ScheduleSpec::Cron(expr) => expr.to_eventbridge(),
    }
}

fn interval_to_vixie(minutes: u32) -> Option<String> {
    if minutes < MINUTES_PER_HOUR {
        return (MINUTES_PER_HOUR % minutes == 0).then(|| match minutes {
            1 => "* * * * *".to_string(),
            m => format!("*/{m} * * * *"),
        });
    }
    if minutes % MINUTES_PER_DAY == 0 {
        // `*/d` in the day-of-month field resets at month boundaries
        return (minutes == MINUTES_PER_DAY).then(|| "0 0 * * *".to_string());
    }
    if minutes % MINUTES_PER_HOUR == 0 {
        let hours = minutes / MINUTES_PER_HOUR;
        return (24 % hours == 0).then(|| match hours {
            1 => "0 * * * *".to_string(),
            h => format!("0 */{h} * * *"),
        });
    }
    None
}

fn interval_to_rate(minutes: u32) -> String {
    let (count, unit) = if minutes % MINUTES_PER_DAY == 0 {
        (minutes / MINUTES_PER_DAY, "day")
    } else if minutes % MINUTES_PER_HOUR == 0 {
        (minutes / MINUTES_PER_HOUR, "hour")
    } else {
        (minutes, "minute")
    };
    let plural = if count == 1 { "" } else { "s" };
    format!("rate({count} {unit}{plural})")
}

fn parse_interval(raw: &str) -> Result<u32> {
    let lowered = raw.trim().to_ascii_lowercase();
    let mut text = lowered.as_str();
    for prefix in ["rate=", "every "] {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim();
        }
    }

    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (count, unit) = text.split_at(split);
    let count: u32 = count.parse().map_err(|_| {
        Error::invalid_schedule(raw, "expected an interval like '15m' or a cron expression")
    })?;

    let factor = match unit.trim() {
        "m" | "min" | "mins" | "minute" | "minutes" => 1,
        "h" | "hr" | "hrs" | "hour" | "hours" => MINUTES_PER_HOUR,
        "d" | "day" | "days" => MINUTES_PER_DAY,
        "s" | "sec" | "secs" | "second" | "seconds" => {
            return Err(Error::invalid_schedule(
                raw,
                "second-based intervals are not supported; the minimum interval is 1 minute",
            ))
        }
        "" => return Err(Error::invalid_schedule(raw, "interval is missing a unit")),
        other => {
            return Err(Error::invalid_schedule(
                raw,
                format!("unsupported interval unit '{other}'"),
            ))
        }
    };

    let minutes = count
        .checked_mul(factor)
        .ok_or_else(|| Error::invalid_schedule(raw, "interval is too large"))?;
    Ok(minutes)
}

// =============================================================================
// Cron expressions
// =============================================================================

/// A validated cron expression
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
    year: Option<CronField>,
}

/// One parsed cron field: the text as written plus the values it selects
#[derive(Clone, Debug, PartialEq, Eq)]
struct CronField {
    text: String,
    min: u16,
    values: FieldValues,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum FieldValues {
    Any,
    /// `?`, day-of-month / day-of-week only
    NoSpecific,
    /// Day-of-week normalized so Sunday is 0
    Set(BTreeSet<u16>),
}

struct FieldRule {
    label: &'static str,
    min: u16,
    max: u16,
    names: &'static [&'static str],
    name_base: u16,
    allows_no_specific: bool,
}

const WEEKDAY_NAMES: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];
const MONTH_NAMES: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const MINUTE: FieldRule = FieldRule::numeric("minute", 0, 59);
const HOUR: FieldRule = FieldRule::numeric("hour", 0, 23);
const DAY_OF_MONTH: FieldRule = FieldRule {
    allows_no_specific: true,
    ..FieldRule::numeric("day-of-month", 1, 31)
};
const MONTH: FieldRule = FieldRule {
    names: MONTH_NAMES,
    name_base: 1,
    ..FieldRule::numeric("month", 1, 12)
};
const DAY_OF_WEEK: FieldRule = FieldRule {
    names: WEEKDAY_NAMES,
    name_base: 0,
    allows_no_specific: true,
    ..FieldRule::numeric("day-of-week", 0, 7)
};
const YEAR: FieldRule = FieldRule::numeric("year", 1970, 2199);

impl FieldRule {
    const fn numeric(label: &'static str, min: u16, max: u16) -> Self {
        Self {
            label,
            min,
            max,
            names: &[],
            name_base: 0,
            allows_no_specific: false,
        }
    }

    fn value(&self, token: &str) -> std::result::Result<u16, String> {
        if let Ok(v) = token.parse::<u16>() {
            if v < self.min || v > self.max {
                return Err(format!(
                    "{} value {} out of range {}-{}",
                    self.label, v, self.min, self.max
                ));
            }
            return Ok(v);
        }
        self.names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(token))
            .map(|idx| self.name_base + idx as u16)
            .ok_or_else(|| format!("unknown {} value '{}'", self.label, token))
    }

    fn parse(&self, text: &str) -> std::result::Result<CronField, String> {
        let values = match text {
            "*" => FieldValues::Any,
            "?" if self.allows_no_specific => FieldValues::NoSpecific,
            "?" => return Err(format!("'?' is not allowed in the {} field", self.label)),
            _ => FieldValues::Set(self.parse_list(text)?),
        };
        Ok(CronField {
            text: text.to_string(),
            min: self.min,
            values,
        })
    }

    fn parse_list(&self, text: &str) -> std::result::Result<BTreeSet<u16>, String> {
        let mut values = BTreeSet::new();
        for part in text.split(',') {
            if part.is_empty() {
                return Err(format!("empty list element in {} field", self.label));
            }
            let (base, step) = match part.split_once('/') {
                Some((base, step)) => {
                    let step: u16 = step
                        .parse()
                        .map_err(|_| format!("invalid {} step '{}'", self.label, step))?;
                    if step == 0 {
                        return Err(format!("{} step must be at least 1", self.label));
                    }
                    (base, Some(step))
                }
                None => (part, None),
            };

            let (lo, hi) = if base == "*" {
                (self.min, self.max)
            } else if let Some((a, b)) = base.split_once('-') {
                (self.value(a)?, self.value(b)?)
            } else {
                let v = self.value(base)?;
                (v, if step.is_some() { self.max } else { v })
            };
            if lo > hi {
                return Err(format!("{} range {}-{} is reversed", self.label, lo, hi));
            }
            values.extend((lo..=hi).step_by(usize::from(step.unwrap_or(1))));
        }

        if self.label == DAY_OF_WEEK.label && values.remove(&7) {
            values.insert(0);
        }
        Ok(values)
    }
}

impl CronField {
    fn is_restricted(&self) -> bool {
        matches!(self.values, FieldValues::Set(_))
    }

    fn joined(values: impl Iterator<Item = u16>) -> String {
        values.map(|v| v.to_string()).collect::<Vec<_>>().join(",")
    }

    /// `?` is a Quartz extension; plain cron spells it `*`
    fn vixie_text(&self) -> String {
        match self.values {
            FieldValues::NoSpecific => "*".to_string(),
            _ => self.text.clone(),
        }
    }

    /// EventBridge wants steps anchored to a start value (`0/15`, not `*/15`)
    fn eventbridge_text(&self) -> String {
        self.text
            .split(',')
            .map(|part| match part.strip_prefix("*/") {
                Some(step) => format!("{}/{}", self.min, step),
                None => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl CronExpr {
    /// Parse and validate a 5- or 6-field cron expression
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 && fields.len() != 6 {
            return Err(Error::invalid_schedule(
                expr,
                format!("expected 5 or 6 fields, found {}", fields.len()),
            ));
        }

        let field = |rule: &FieldRule, idx: usize| {
            rule.parse(fields[idx])
                .map_err(|message| Error::invalid_schedule(expr, message))
        };

        Ok(Self {
            source: fields.join(" "),
            minute: field(&MINUTE, 0)?,
            hour: field(&HOUR, 1)?,
            day_of_month: field(&DAY_OF_MONTH, 2)?,
            month: field(&MONTH, 3)?,
            day_of_week: field(&DAY_OF_WEEK, 4)?,
            year: if fields.len() == 6 {
                Some(field(&YEAR, 5)?)
            } else {
                None
            },
        })
    }

    fn to_vixie(&self) -> Result<String> {
        if let Some(year) = &self.year {
            if year.values != FieldValues::Any {
                return Err(Error::invalid_schedule(
                    &self.source,
                    "year restrictions cannot be expressed in a kubernetes CronJob",
                ));
            }
        }

        // Kubernetes only accepts 0-6 for weekdays
        let dow = match &self.day_of_week.values {
            FieldValues::Set(days) if self.day_of_week.text.contains('7') => {
                CronField::joined(days.iter().copied())
            }
            _ => self.day_of_week.vixie_text(),
        };

        Ok(format!(
            "{} {} {} {} {}",
            self.minute.text,
            self.hour.text,
            self.day_of_month.vixie_text(),
            self.month.text,
            dow
        ))
    }

    fn to_eventbridge(&self) -> Result<String> {
        let (dom, dow) = match (
            self.day_of_month.is_restricted(),
            self.day_of_week.is_restricted(),
        ) {
            (true, true) => {
                return Err(Error::invalid_schedule(
                    &self.source,
                    "EventBridge cannot restrict both day-of-month and day-of-week",
                ))
            }
            (false, true) => ("?".to_string(), self.eventbridge_weekdays()),
            (true, false) => (self.day_of_month.eventbridge_text(), "?".to_string()),
            (false, false) => ("*".to_string(), "?".to_string()),
        };

        let year = self
            .year
            .as_ref()
            .map(CronField::eventbridge_text)
            .unwrap_or_else(|| "*".to_string());

        Ok(format!(
            "cron({} {} {} {} {} {})",
            self.minute.eventbridge_text(),
            self.hour.eventbridge_text(),
            dom,
            self.month.eventbridge_text(),
            dow,
            year
        ))
    }

    /// Weekdays shifted into EventBridge's 1-7 (Sunday = 1) numbering
    fn eventbridge_weekdays(&self) -> String {
        let text = &self.day_of_week.text;
        if !text.chars().any(|c| c.is_ascii_digit()) {
            return text.clone();
        }
        match &self.day_of_week.values {
            FieldValues::Set(days) => CronField::joined(days.iter().map(|d| d + 1)),
            _ => "?".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(raw: &str) -> u32 {
        match ScheduleSpec::parse(raw).expect("interval should parse") {
            ScheduleSpec::Interval(interval) => interval.minutes(),
            other => panic!("expected interval, got {other:?}"),
        }
    }

    fn both(raw: &str) -> (Result<String>, Result<String>) {
        let spec = ScheduleSpec::parse(raw).expect("schedule should parse");
        (
            spec.translate(BackendKind::Kubernetes),
            spec.translate(BackendKind::Aws),
        )
    }

    #[test]
    fn interval_forms() {
        assert_eq!(interval("15m"), 15);
        assert_eq!(interval("every 15 minutes"), 15);
        assert_eq!(interval("rate=15m"), 15);
        assert_eq!(interval("1h"), 60);
        assert_eq!(interval("2 hours"), 120);
        assert_eq!(interval("1d"), 1440);
        assert_eq!(interval("Every 5 Minutes"), 5);
    }

    #[test]
    fn interval_rejections() {
        for raw in ["30s", "0m", "15x", "m", "15", "soon"] {
            let err = ScheduleSpec::parse(raw).expect_err(raw);
            assert!(
                matches!(err, Error::InvalidSchedule { .. }),
                "{raw} gave {err:?}"
            );
        }
    }

    #[test]
    fn zero_minute_interval_never_reaches_a_backend() {
        let err = ScheduleSpec::every_minutes(0).unwrap_err();
        assert!(matches!(err, Error::InvalidSchedule { .. }));

        let err = ScheduleSpec::parse("every 0 minutes").unwrap_err();
        assert!(matches!(err, Error::InvalidSchedule { .. }));

        let spec = ScheduleSpec::every_minutes(1).unwrap();
        assert_eq!(spec.translate(BackendKind::Kubernetes).unwrap(), "* * * * *");
        assert_eq!(spec.translate(BackendKind::Aws).unwrap(), "rate(1 minute)");
    }

    #[test]
    fn fifteen_minutes_matches_on_both_backends() {
        let (kube, aws) = both("15m");
        assert_eq!(kube.unwrap(), "*/15 * * * *");
        assert_eq!(aws.unwrap(), "rate(15 minutes)");
    }

    #[test]
    fn interval_units_normalize() {
        let (kube, aws) = both("1m");
        assert_eq!(kube.unwrap(), "* * * * *");
        assert_eq!(aws.unwrap(), "rate(1 minute)");

        let (kube, aws) = both("60m");
        assert_eq!(kube.unwrap(), "0 * * * *");
        assert_eq!(aws.unwrap(), "rate(1 hour)");

        let (kube, aws) = both("2h");
        assert_eq!(kube.unwrap(), "0 */2 * * *");
        assert_eq!(aws.unwrap(), "rate(2 hours)");

        let (kube, aws) = both("1d");
        assert_eq!(kube.unwrap(), "0 0 * * *");
        assert_eq!(aws.unwrap(), "rate(1 day)");
    }

    #[test]
    fn drifting_intervals_rejected_on_kubernetes_only() {
        for raw in ["7m", "90m", "5h", "2d"] {
            let (kube, aws) = both(raw);
            assert!(
                matches!(kube, Err(Error::InvalidSchedule { .. })),
                "{raw} should not translate to kubernetes"
            );
            assert!(aws.is_ok(), "{raw} should translate to aws");
        }
        assert_eq!(both("7m").1.unwrap(), "rate(7 minutes)");
    }

    #[test]
    fn thirteenth_month_rejected() {
        let err = ScheduleSpec::parse("0 0 1 13 *").unwrap_err();
        match err {
            Error::InvalidSchedule {
                expression,
                message,
            } => {
                assert_eq!(expression, "0 0 1 13 *");
                assert!(message.contains("month value 13"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn malformed_cron_rejected() {
        let cases = [
            "* * * *",
            "* * * * * * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * * 8",
            "*/0 * * * *",
            "30-10 * * * *",
            "? * * * *",
            "0 0 1 1 * 1969",
            "0 0 * FOO *",
            "1,,2 * * * *",
        ];
        for raw in cases {
            let err = ScheduleSpec::parse(&format!("cron: {raw}")).expect_err(raw);
            assert!(matches!(err, Error::InvalidSchedule { .. }), "{raw}");
        }
    }

    #[test]
    fn cron_passthrough_and_anchored_steps() {
        let (kube, aws) = both("*/15 * * * *");
        assert_eq!(kube.unwrap(), "*/15 * * * *");
        assert_eq!(aws.unwrap(), "cron(0/15 * * * ? *)");
    }

    #[test]
    fn weekday_numbering_shifts_for_eventbridge() {
        let (kube, aws) = both("0 9 * * 1-5");
        assert_eq!(kube.unwrap(), "0 9 * * 1-5");
        assert_eq!(aws.unwrap(), "cron(0 9 ? * 2,3,4,5,6 *)");
    }

    #[test]
    fn weekday_names_pass_through() {
        let (kube, aws) = both("cron: 0 9 * * MON-FRI");
        assert_eq!(kube.unwrap(), "0 9 * * MON-FRI");
        assert_eq!(aws.unwrap(), "cron(0 9 ? * MON-FRI *)");
    }

    #[test]
    fn sunday_as_seven_normalizes() {
        let (kube, aws) = both("0 12 * * 7");
        assert_eq!(kube.unwrap(), "0 12 * * 0");
        assert_eq!(aws.unwrap(), "cron(0 12 ? * 1 *)");

        let (kube, aws) = both("0 12 * * 5-7");
        assert_eq!(kube.unwrap(), "0 12 * * 0,5,6");
        assert_eq!(aws.unwrap(), "cron(0 12 ? * 1,6,7 *)");
    }

    #[test]
    fn day_of_month_and_weekday_together() {
        let (kube, aws) = both("0 0 1 * 1");
        assert_eq!(kube.unwrap(), "0 0 1 * 1");
        assert!(matches!(aws, Err(Error::InvalidSchedule { .. })));
    }

    #[test]
    fn year_field() {
        let (kube, aws) = both("0 0 1 1 ? 2030");
        assert!(matches!(kube, Err(Error::InvalidSchedule { .. })));
        assert_eq!(aws.unwrap(), "cron(0 0 1 1 ? 2030)");

        let (kube, aws) = both("0 6 ? * * *");
        assert_eq!(kube.unwrap(), "0 6 * * *");
        assert_eq!(aws.unwrap(), "cron(0 6 * * ? *)");
    }

    #[test]
    fn display_round_trips_through_parse() {
        for raw in ["15m", "cron: 0 9 * * MON-FRI"] {
            let spec = ScheduleSpec::parse(raw).unwrap();
            assert_eq!(ScheduleSpec::parse(&spec.to_string()).unwrap(), spec);
        }
    }
}
