//! Platform limits enforced before emission

use cadence_common::{Error, Result};

/// Most tasks one EventBridge ECS target may launch per invocation
pub const MAX_TASK_COUNT: u32 = 10;

/// Retention periods CloudWatch Logs accepts, in days
pub const LOG_RETENTION_DAYS: [u32; 22] = [
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

/// Memory sizes (MiB) Fargate accepts for a CPU size: `(min, max, step)`
fn fargate_memory_range(cpu: u32) -> Option<(u32, u32, u32)> {
    match cpu {
        256 => Some((512, 2048, 512)),
        512 => Some((1024, 4096, 1024)),
        1024 => Some((2048, 8192, 1024)),
        2048 => Some((4096, 16384, 1024)),
        4096 => Some((8192, 30720, 1024)),
        8192 => Some((16384, 61440, 4096)),
        16384 => Some((32768, 122880, 8192)),
        _ => None,
    }
}

/// Check a CPU/memory pair against Fargate's supported task sizes.
pub fn validate_fargate_size(cpu: u32, memory: u32) -> Result<()> {
    let (min, max, step) = fargate_memory_range(cpu).ok_or_else(|| {
        Error::validation(
            "workload.cpu",
            format!("{cpu} is not a Fargate CPU size (256, 512, 1024, 2048, 4096, 8192, 16384)"),
        )
    })?;
    let in_range = memory >= min && memory <= max && (memory - min) % step == 0;
    // 0.25 vCPU only takes 512, 1024 or 2048
    let valid = in_range && !(cpu == 256 && memory == 1536);
    if !valid {
        return Err(Error::validation(
            "workload.memory",
            format!("{memory} MiB is not a valid Fargate memory size for {cpu} CPU units"),
        ));
    }
    Ok(())
}

/// Check the task count against the EventBridge ECS target limit
pub fn validate_task_count(task_count: u32) -> Result<()> {
    if task_count > MAX_TASK_COUNT {
        return Err(Error::validation(
            "workload.taskCount",
            format!("{task_count} exceeds the limit of {MAX_TASK_COUNT} tasks per invocation"),
        ));
    }
    Ok(())
}

/// Check a retention period against the values CloudWatch Logs accepts
pub fn validate_log_retention(days: u32) -> Result<()> {
    if !LOG_RETENTION_DAYS.contains(&days) {
        return Err(Error::validation(
            "workload.logRetentionDays",
            format!("{days} is not a CloudWatch Logs retention period"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_fargate_sizes_are_accepted() {
        for (cpu, memory) in [(256, 512), (256, 1024), (256, 2048), (512, 4096), (1024, 3072)] {
            assert!(validate_fargate_size(cpu, memory).is_ok(), "{cpu}/{memory}");
        }
    }

    #[test]
    fn invalid_fargate_sizes_name_the_field() {
        assert_eq!(
            validate_fargate_size(300, 512).unwrap_err().subject(),
            "workload.cpu"
        );
        assert_eq!(
            validate_fargate_size(256, 4096).unwrap_err().subject(),
            "workload.memory"
        );
        assert_eq!(
            validate_fargate_size(1024, 2500).unwrap_err().subject(),
            "workload.memory"
        );
        assert!(validate_fargate_size(256, 1536).is_err());
    }

    #[test]
    fn task_count_is_capped() {
        assert!(validate_task_count(10).is_ok());
        assert!(validate_task_count(11).is_err());
    }

    #[test]
    fn retention_must_be_a_cloudwatch_value() {
        assert!(validate_log_retention(14).is_ok());
        assert!(validate_log_retention(15).is_err());
    }
}
