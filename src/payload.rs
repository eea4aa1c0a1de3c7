//! Input payload produced by the attention extractor
//!
//! The extractor (model loading + tokenization) lives outside this crate.
//! It writes one JSON document:
//!
//! ```json
//! {
//!   "tokens": ["The", "Ġquick", ...],
//!   "attention": [[[[...]]]],
//!   "entropy": [[...]],
//!   "num_layers": 24,
//!   "num_heads": 14,
//!   "model_name": "Qwen/Qwen2.5-0.5B"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::Result;

/// Raw JSON structure for loading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionPayload {
    /// Raw token strings, length N
    pub tokens: Vec<String>,
    /// `[layer][head][row][col]`, L × H × N × N
    pub attention: Vec<Vec<Vec<Vec<f32>>>>,
    /// Precomputed `[layer][head]` entropy; recomputed on load when absent
    #[serde(default)]
    pub entropy: Option<Vec<Vec<f64>>>,
    pub num_layers: usize,
    pub num_heads: usize,
    pub model_name: String,
}

impl AttentionPayload {
    /// Load payload from JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let payload = Self::from_json(&content)?;
        info!(
            "Loaded payload from {}: {} tokens, {} layers, {} heads",
            path.display(),
            payload.tokens.len(),
            payload.num_layers,
            payload.num_heads
        );
        Ok(payload)
    }

    /// Parse payload from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Write the payload in the same format `load` reads
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        info!("Saved payload to {}", path.display());
        Ok(())
    }
}
