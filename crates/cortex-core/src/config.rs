//! Flat key-value configuration (spec §6.3), layered from a config file,
//! environment variables, and defaults the way the teacher's composition
//! root layers its configuration sources.

use std::collections::HashMap;

use crate::error::CortexError;

/// Recognised configuration keys and their defaults. Unrecognised keys are
/// kept in the map but never consulted.
const DEFAULTS: &[(&str, &str)] = &[
    ("mode", "both"),
    ("rest.port", "8080"),
    ("docstore.database", "cortex"),
    ("embedding.mode", "local"),
    ("code_index.auto_scan", "false"),
];

/// A flat map of key to value, as described by spec §6.3. Wraps a
/// `HashMap<String, String>` with typed accessors so engines don't each
/// reimplement parsing/fallback.
#[derive(Debug, Clone, Default)]
pub struct GlobalConfig {
    values: HashMap<String, String>,
}

impl GlobalConfig {
    pub fn new() -> Self {
        let mut values = HashMap::new();
        for (k, v) in DEFAULTS {
            values.insert((*k).to_string(), (*v).to_string());
        }
        Self { values }
    }

    /// Builds configuration layering, in increasing priority: built-in
    /// defaults, a config file (if present), then environment variables
    /// prefixed `CORTEX_` (double underscore for nesting, e.g.
    /// `CORTEX_DOCSTORE__URI`), matching the teacher's file-then-env
    /// layering in `cortex/src/config`.
    pub fn load(file_path: Option<&str>) -> Result<Self, CortexError> {
        let mut builder = config::Config::builder();
        for (k, v) in DEFAULTS {
            builder = builder
                .set_default(*k, *v)
                .map_err(|e| CortexError::internal(format!("config default: {e}")))?;
        }
        if let Some(path) = file_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("CORTEX")
                .separator("__")
                .try_parsing(true),
        );
        let built = builder
            .build()
            .map_err(|e| CortexError::invalid_argument(format!("invalid configuration: {e}")))?;

        let mut values = HashMap::new();
        if let Ok(table) = built.clone().try_deserialize::<HashMap<String, String>>() {
            values = table;
        } else if let Ok(table) = built.try_deserialize::<HashMap<String, config::Value>>() {
            for (k, v) in table {
                values.insert(k, v.to_string());
            }
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn get_required(&self, key: &str) -> Result<&str, CortexError> {
        self.get(key)
            .ok_or_else(|| CortexError::invalid_argument(format!("missing required config key '{key}'")))
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn get_u16(&self, key: &str, default: u16) -> u16 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn get_csv(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_populated() {
        let cfg = GlobalConfig::new();
        assert_eq!(cfg.get("mode"), Some("both"));
        assert_eq!(cfg.get_u16("rest.port", 0), 8080);
    }

    #[test]
    fn csv_parsing_trims_and_drops_empty() {
        let mut cfg = GlobalConfig::new();
        cfg.set("code_index.folders", " /a , /b ,,/c");
        assert_eq!(
            cfg.get_csv("code_index.folders"),
            vec!["/a".to_string(), "/b".to_string(), "/c".to_string()]
        );
    }

    #[test]
    fn missing_required_key_is_invalid_argument() {
        let cfg = GlobalConfig::new();
        let err = cfg.get_required("docstore.uri").unwrap_err();
        assert_eq!(err.kind(), "InvalidArgument");
    }
}
