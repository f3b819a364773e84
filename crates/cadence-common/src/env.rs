//! Environment resolution
//!
//! Merges fixed defaults with user variables and carries secret references
//! through as opaque locators. Output ordering is stable (plain variables
//! sorted by name, secrets in declaration order) so emitted artifacts are
//! diff-stable across runs.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::intent::SecretRef;
use crate::secret::SecretLocator;
use crate::{Error, Result};

/// Default log level injected into every workload
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Base environment applied beneath user variables.
///
/// Passed explicitly into [`resolve`] so tests and callers can inject any
/// defaults without process-wide state.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(transparent)]
pub struct EnvDefaults {
    vars: BTreeMap<String, String>,
}

impl Default for EnvDefaults {
    fn default() -> Self {
        Self {
            vars: BTreeMap::from([("LOG_LEVEL".to_string(), DEFAULT_LOG_LEVEL.to_string())]),
        }
    }
}

impl EnvDefaults {
    /// Defaults with exactly the given variables
    pub fn new(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    /// No defaults at all
    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    /// The default variables
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }
}

/// A secret to inject under `name`, resolved by the backend at run time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretBinding {
    /// Environment variable name
    pub name: String,
    /// Where the backend reads the value from
    pub locator: SecretLocator,
}

/// Merged environment for a workload.
///
/// Plain values and secret bindings live in separate, differently typed
/// collections; a locator cannot end up in the plain map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedEnvironment {
    plain: BTreeMap<String, String>,
    secret_bindings: Vec<SecretBinding>,
}

impl ResolvedEnvironment {
    /// Plain variables, sorted by name
    pub fn plain(&self) -> &BTreeMap<String, String> {
        &self.plain
    }

    /// Secret bindings in declaration order
    pub fn secret_bindings(&self) -> &[SecretBinding] {
        &self.secret_bindings
    }
}

/// Merge `defaults` with `user_env` and attach `secret_refs`.
///
/// User values replace defaults key by key. A secret sharing its name with
/// any plain variable, default or user supplied, is a
/// `SecretReferenceConflict`; nothing is shadowed silently.
pub fn resolve(
    defaults: &EnvDefaults,
    user_env: &BTreeMap<String, String>,
    secret_refs: &[SecretRef],
) -> Result<ResolvedEnvironment> {
    let mut plain = defaults.vars.clone();
    for (key, value) in user_env {
        plain.insert(key.clone(), value.clone());
    }

    let mut secret_bindings = Vec::with_capacity(secret_refs.len());
    for secret in secret_refs {
        if plain.contains_key(&secret.name) {
            return Err(Error::secret_conflict(&secret.name));
        }
        secret_bindings.push(SecretBinding {
            name: secret.name.clone(),
            locator: secret.locator.clone(),
        });
    }

    Ok(ResolvedEnvironment {
        plain,
        secret_bindings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::SecretStore;

    fn token_ref() -> SecretRef {
        SecretRef {
            name: "GOOGLE_TOKEN_B64".to_string(),
            locator: SecretLocator::parse("f", "ssm:/prod/gmail/token").unwrap(),
        }
    }

    #[test]
    fn user_values_override_defaults() {
        let user = BTreeMap::from([("LOG_LEVEL".to_string(), "DEBUG".to_string())]);
        let env = resolve(&EnvDefaults::default(), &user, &[]).unwrap();
        assert_eq!(env.plain().get("LOG_LEVEL"), Some(&"DEBUG".to_string()));
        assert_eq!(env.plain().len(), 1);
    }

    #[test]
    fn defaults_fill_missing_keys() {
        let user = BTreeMap::from([("FETCH_BATCH_SIZE".to_string(), "50".to_string())]);
        let env = resolve(&EnvDefaults::default(), &user, &[]).unwrap();
        let keys: Vec<_> = env.plain().keys().cloned().collect();
        assert_eq!(keys, vec!["FETCH_BATCH_SIZE", "LOG_LEVEL"]);
    }

    #[test]
    fn injected_defaults_replace_builtin() {
        let defaults = EnvDefaults::new(BTreeMap::from([(
            "GMAIL_USER_ID".to_string(),
            "me".to_string(),
        )]));
        let env = resolve(&defaults, &BTreeMap::new(), &[]).unwrap();
        assert!(env.plain().get("LOG_LEVEL").is_none());
        assert_eq!(env.plain().get("GMAIL_USER_ID"), Some(&"me".to_string()));
    }

    #[test]
    fn secrets_pass_through_as_locators() {
        let env = resolve(&EnvDefaults::default(), &BTreeMap::new(), &[token_ref()]).unwrap();
        assert_eq!(env.secret_bindings().len(), 1);
        assert_eq!(env.secret_bindings()[0].name, "GOOGLE_TOKEN_B64");
        assert!(!env.plain().contains_key("GOOGLE_TOKEN_B64"));
        assert_eq!(
            env.secret_bindings()[0].locator.store(),
            SecretStore::SsmParameterStore
        );
    }

    #[test]
    fn secret_shadowing_a_default_is_a_conflict() {
        let mut secret = token_ref();
        secret.name = "LOG_LEVEL".to_string();
        let err = resolve(&EnvDefaults::default(), &BTreeMap::new(), &[secret]).unwrap_err();
        assert_eq!(err, Error::secret_conflict("LOG_LEVEL"));
    }

    #[test]
    fn resolution_is_deterministic() {
        let user: BTreeMap<_, _> = [("ZETA", "1"), ("ALPHA", "2"), ("MID", "3")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let first = resolve(&EnvDefaults::default(), &user, &[token_ref()]).unwrap();
        for _ in 0..10 {
            let again = resolve(&EnvDefaults::default(), &user, &[token_ref()]).unwrap();
            assert_eq!(again, first);
            assert_eq!(
                format!("{:?}", again.plain()),
                format!("{:?}", first.plain())
            );
        }
        let keys: Vec<_> = first.plain().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["ALPHA", "LOG_LEVEL", "MID", "ZETA"]);
    }

    #[test]
    fn defaults_deserialize_as_plain_map() {
        let defaults: EnvDefaults = serde_json::from_str(r#"{"LOG_LEVEL":"WARN"}"#).unwrap();
        assert_eq!(defaults.vars().get("LOG_LEVEL"), Some(&"WARN".to_string()));
    }
}
