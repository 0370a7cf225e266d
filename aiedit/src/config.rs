//! Engine configuration.
//!
//! A handful of tuning knobs loaded from a TOML file. Config problems are
//! soft failures: a missing file yields the defaults silently, a malformed
//! file yields the defaults with a warning. The engine never refuses to
//! start over configuration.

use std::path::Path;

use serde::Deserialize;

/// Tuning knobs for the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Capacity of each per-resource batch queue. Enqueueing into a full
    /// queue awaits until a slot frees — backpressure toward the producer
    /// instead of unbounded buffering.
    pub queue_capacity: usize,
    /// Retained pre-mutation snapshots per buffer. Undo targets older than
    /// the retained window fail with `VersionNotReachable`.
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { queue_capacity: 64, history_limit: 256 }
    }
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    ///
    /// Returns `EngineConfig::default()` when the file does not exist or
    /// does not parse; a parse failure is logged but never propagated.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(_) => return Self::default(),
        };
        match toml::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config parse error, using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = EngineConfig::load(Path::new("/nonexistent/aiedit.toml"));
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.history_limit, 256);
    }

    #[test]
    fn parses_partial_overrides() {
        let config: EngineConfig = toml::from_str("queue_capacity = 8").unwrap();
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.history_limit, 256);
    }

    #[test]
    fn malformed_toml_falls_back() {
        let dir = std::env::temp_dir().join("aiedit-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "queue_capacity = \"not a number\"").unwrap();
        let config = EngineConfig::load(&path);
        assert_eq!(config.queue_capacity, 64);
    }
}
