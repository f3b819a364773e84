//! Content hashing for emitted configuration

use std::collections::BTreeMap;

use aws_lc_rs::digest::{digest, SHA256};

/// Compute a short hash of plain environment variables.
///
/// Stamped onto emitted workloads so a config change is visible as a diff
/// even when the image is unchanged. Uses SHA-256 for FIPS compliance.
pub fn compute_config_hash(vars: &BTreeMap<String, String>) -> String {
    let mut data = String::new();
    for (k, v) in vars {
        data.push_str(k);
        data.push('=');
        data.push_str(v);
        data.push('\n');
    }

    let hash = digest(&SHA256, data.as_bytes());
    hash.as_ref()
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_short_hex_and_stable() {
        let vars = BTreeMap::from([("LOG_LEVEL".to_string(), "INFO".to_string())]);
        let a = compute_config_hash(&vars);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, compute_config_hash(&vars.clone()));
    }

    #[test]
    fn hash_changes_with_values() {
        let a = BTreeMap::from([("A".to_string(), "1".to_string())]);
        let b = BTreeMap::from([("A".to_string(), "2".to_string())]);
        assert_ne!(compute_config_hash(&a), compute_config_hash(&b));
    }
}
