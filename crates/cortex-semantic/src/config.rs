//! Typed configuration for the Embedder/VectorStore collaborators, built
//! from the flat `GlobalConfig` (spec §6.3 keys `embedding.*`,
//! `vectorstore.*`).

use cortex_core::GlobalConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMode {
    Local,
    Remote,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub mode: EmbeddingMode,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub dimension: usize,
    pub batch_size: usize,
}

impl EmbeddingSettings {
    pub fn from_config(config: &GlobalConfig) -> Self {
        let mode = match config.get("embedding.mode") {
            Some("remote") => EmbeddingMode::Remote,
            _ => EmbeddingMode::Local,
        };
        Self {
            mode,
            url: config.get("embedding.url").map(str::to_string),
            api_key: config.get("embedding.apiKey").map(str::to_string),
            dimension: config
                .get("embedding.dimension")
                .and_then(|v| v.parse().ok())
                .unwrap_or(256),
            batch_size: config
                .get("embedding.batchSize")
                .and_then(|v| v.parse().ok())
                .unwrap_or(32),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorStoreSettings {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

impl VectorStoreSettings {
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            url: config.get("vectorstore.url").map(str::to_string),
            api_key: config.get("vectorstore.apiKey").map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_local_embedding_mode() {
        let config = GlobalConfig::new();
        let settings = EmbeddingSettings::from_config(&config);
        assert_eq!(settings.mode, EmbeddingMode::Local);
        assert_eq!(settings.batch_size, 32);
    }

    #[test]
    fn remote_mode_is_recognised() {
        let mut config = GlobalConfig::new();
        config.set("embedding.mode", "remote");
        config.set("embedding.url", "http://localhost:9000/embed");
        let settings = EmbeddingSettings::from_config(&config);
        assert_eq!(settings.mode, EmbeddingMode::Remote);
        assert_eq!(settings.url.as_deref(), Some("http://localhost:9000/embed"));
    }
}
