//! Attention store
//!
//! Immutable ground truth for a viewing session: display tokens, the
//! `[L, H, N, N]` attention tensor and its entropy table. Built once,
//! validated up front, never mutated afterwards.

use candle_core::{Device, IndexOp, Tensor};
use std::fmt;
use tracing::{info, warn};

use crate::entropy::{self, EntropyTable};
use crate::error::{Axis, Result, ViewerError};
use crate::masks::{is_masked, valid_len};
use crate::payload::AttentionPayload;

/// Byte-level BPE marker for a leading space
pub const SPACE_MARKER: char = 'Ġ';
/// Byte-level BPE marker for a newline
pub const NEWLINE_MARKER: char = 'Ċ';
/// Shown in place of a label that is empty after trimming
pub const PLACEHOLDER_GLYPH: &str = "␣";

/// Resolve tokenizer markers into a display string
pub fn display_token(raw: &str) -> String {
    raw.replace(SPACE_MARKER, " ").replace(NEWLINE_MARKER, "\\n")
}

/// Compact label for a display string
pub fn label_for(display: &str) -> String {
    let trimmed = display.trim();
    if trimmed.is_empty() {
        PLACEHOLDER_GLYPH.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Session-constant model metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMeta {
    pub model_name: String,
    pub n_layers: usize,
    pub n_heads: usize,
}

/// Load-time validation knobs
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Allowed |Σ row - 1| before a row is reported
    pub tolerance: f64,
    /// Abort construction on the first anomaly instead of warning
    pub strict: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            strict: false,
        }
    }
}

/// What is wrong with a masked row, first fault wins
#[derive(Debug, Clone, PartialEq)]
pub enum AnomalyKind {
    NonFinite { col: usize },
    /// A permitted weight outside `[0, 1]`
    OutOfRange { col: usize, value: f32 },
    BadSum { sum: f64 },
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite { col } => write!(f, "non-finite attention value at column {col}"),
            Self::OutOfRange { col, value } => {
                write!(f, "weight {value:.6} at column {col} outside [0, 1]")
            }
            Self::BadSum { sum } => write!(f, "row sums to {sum:.6}"),
        }
    }
}

/// A masked row that is not a probability distribution
#[derive(Debug, Clone, PartialEq)]
pub struct RowAnomaly {
    pub layer: usize,
    pub head: usize,
    pub row: usize,
    pub kind: AnomalyKind,
}

impl RowAnomaly {
    pub fn into_error(self) -> ViewerError {
        ViewerError::NumericAnomaly {
            layer: self.layer,
            head: self.head,
            row: self.row,
            detail: self.kind.to_string(),
        }
    }
}

/// Classify one masked row against `tolerance`
fn classify_row(masked: &[f32], tolerance: f64) -> Option<AnomalyKind> {
    if let Some(col) = masked.iter().position(|v| !v.is_finite()) {
        return Some(AnomalyKind::NonFinite { col });
    }
    let outside = |v: f64| v < -tolerance || v > 1.0 + tolerance;
    if let Some(col) = masked.iter().position(|&v| outside(f64::from(v))) {
        return Some(AnomalyKind::OutOfRange {
            col,
            value: masked[col],
        });
    }
    let sum: f64 = masked.iter().map(|&v| f64::from(v)).sum();
    ((sum - 1.0).abs() > tolerance).then_some(AnomalyKind::BadSum { sum })
}

#[derive(Debug)]
pub struct AttentionStore {
    meta: ModelMeta,
    /// Display strings (markers resolved)
    tokens: Vec<String>,
    /// Trimmed labels with placeholder fallback
    labels: Vec<String>,
    /// Attention weights: [layers, heads, query, key]
    attention: Tensor,
    entropy: EntropyTable,
}

impl AttentionStore {
    /// Build from raw tokens and a nested `[layer][head][row][col]` tensor
    ///
    /// Every axis is checked against `meta` and the token count; any
    /// disagreement aborts with `ShapeMismatch` and no store is produced.
    pub fn new(
        raw_tokens: Vec<String>,
        attention: &[Vec<Vec<Vec<f32>>>],
        meta: ModelMeta,
    ) -> Result<Self> {
        let n = raw_tokens.len();
        if n == 0 {
            return Err(ViewerError::shape("token sequence (non-empty)", 1, 0));
        }
        if meta.n_layers == 0 {
            return Err(ViewerError::shape("layer count (non-zero)", 1, 0));
        }
        if meta.n_heads == 0 {
            return Err(ViewerError::shape("head count (non-zero)", 1, 0));
        }

        let flat = flatten(attention, &meta, n)?;
        let attention = Tensor::from_vec(flat, (meta.n_layers, meta.n_heads, n, n), &Device::Cpu)?;
        let entropy = entropy::compute(&attention)?;

        let tokens: Vec<String> = raw_tokens.iter().map(|t| display_token(t)).collect();
        let labels = tokens.iter().map(|t| label_for(t)).collect();

        Ok(Self {
            meta,
            tokens,
            labels,
            attention,
            entropy,
        })
    }

    /// Build from an extractor payload, applying numeric validation
    pub fn from_payload(payload: AttentionPayload, options: &LoadOptions) -> Result<Self> {
        let meta = ModelMeta {
            model_name: payload.model_name,
            n_layers: payload.num_layers,
            n_heads: payload.num_heads,
        };
        let store = Self::new(payload.tokens, &payload.attention, meta)?;

        if let Some(supplied) = payload.entropy {
            store.check_supplied_entropy(supplied, options.tolerance)?;
        }

        let anomalies = store.scan_anomalies(options.tolerance)?;
        if let Some(first) = anomalies.first() {
            if options.strict {
                return Err(first.clone().into_error());
            }
            warn!(
                "{} attention rows are not distributions (first: layer {}, head {}, row {}: {})",
                anomalies.len(),
                first.layer,
                first.head,
                first.row,
                first.kind
            );
        }

        info!(
            "Attention store ready: model {}, {} layers x {} heads, {} tokens",
            store.meta.model_name,
            store.meta.n_layers,
            store.meta.n_heads,
            store.n_tokens()
        );
        Ok(store)
    }

    fn check_supplied_entropy(&self, supplied: Vec<Vec<f64>>, tolerance: f64) -> Result<()> {
        if supplied.len() != self.meta.n_layers {
            return Err(ViewerError::shape(
                "entropy layer axis",
                self.meta.n_layers,
                supplied.len(),
            ));
        }
        for (layer, heads) in supplied.iter().enumerate() {
            if heads.len() != self.meta.n_heads {
                return Err(ViewerError::shape(
                    format!("entropy head axis (layer {layer})"),
                    self.meta.n_heads,
                    heads.len(),
                ));
            }
        }

        let diff = self.entropy.max_abs_diff(&EntropyTable::from_rows(supplied));
        if diff > tolerance {
            warn!("Supplied entropy differs from recomputed table by up to {diff:.6}; using recomputed values");
        }
        Ok(())
    }

    /// Every masked row that is non-finite, leaves `[0, 1]` or does not sum to 1
    pub fn scan_anomalies(&self, tolerance: f64) -> Result<Vec<RowAnomaly>> {
        let mut anomalies = Vec::new();
        for layer in 0..self.meta.n_layers {
            for head in 0..self.meta.n_heads {
                let slice = self.slice(layer, head)?;
                for (row, values) in slice.iter().enumerate() {
                    if let Some(kind) = classify_row(&values[..valid_len(row)], tolerance) {
                        anomalies.push(RowAnomaly {
                            layer,
                            head,
                            row,
                            kind,
                        });
                    }
                }
            }
        }
        Ok(anomalies)
    }

    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    pub fn n_layers(&self) -> usize {
        self.meta.n_layers
    }

    pub fn n_heads(&self) -> usize {
        self.meta.n_heads
    }

    pub fn n_tokens(&self) -> usize {
        self.tokens.len()
    }

    fn check_layer_head(&self, layer: usize, head: usize) -> Result<()> {
        ViewerError::check(Axis::Layer, layer, self.meta.n_layers)?;
        ViewerError::check(Axis::Head, head, self.meta.n_heads)
    }

    /// Full `N × N` slice; entries above the diagonal are not weights
    pub fn slice(&self, layer: usize, head: usize) -> Result<Vec<Vec<f32>>> {
        self.check_layer_head(layer, head)?;
        Ok(self.attention.i((layer, head))?.to_vec2::<f32>()?)
    }

    /// Permitted weights of one query row (`row + 1` values)
    pub fn row(&self, layer: usize, head: usize, row: usize) -> Result<Vec<f32>> {
        self.check_layer_head(layer, head)?;
        ViewerError::check(Axis::Row, row, self.n_tokens())?;
        Ok(self
            .attention
            .i((layer, head, row, ..valid_len(row)))?
            .to_vec1::<f32>()?)
    }

    /// Weight at `(row, col)`, `None` when the cell is causally masked
    pub fn weight(&self, layer: usize, head: usize, row: usize, col: usize) -> Result<Option<f32>> {
        self.check_layer_head(layer, head)?;
        ViewerError::check(Axis::Row, row, self.n_tokens())?;
        ViewerError::check(Axis::Col, col, self.n_tokens())?;
        if is_masked(row, col) {
            return Ok(None);
        }
        Ok(Some(
            self.attention.i((layer, head, row, col))?.to_scalar::<f32>()?,
        ))
    }

    /// Top-k key positions a query row attends to
    ///
    /// Sorted by descending weight; ties keep ascending column order.
    pub fn top_attended(
        &self,
        layer: usize,
        head: usize,
        row: usize,
        k: usize,
    ) -> Result<Vec<(usize, f32)>> {
        let values = self.row(layer, head, row)?;
        Ok(rank_desc(&values, k))
    }

    pub fn token_label(&self, index: usize) -> Result<&str> {
        ViewerError::check(Axis::Token, index, self.n_tokens())?;
        Ok(&self.labels[index])
    }

    pub fn token_display(&self, index: usize) -> Result<&str> {
        ViewerError::check(Axis::Token, index, self.n_tokens())?;
        Ok(&self.tokens[index])
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn entropy(&self, layer: usize, head: usize) -> Result<f64> {
        self.entropy.get(layer, head)
    }

    pub fn entropy_table(&self) -> &EntropyTable {
        &self.entropy
    }
}

/// Stable descending ranking of `(index, value)` pairs
pub fn rank_desc(values: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed.truncate(k);
    indexed
}

fn flatten(attention: &[Vec<Vec<Vec<f32>>>], meta: &ModelMeta, n: usize) -> Result<Vec<f32>> {
    if attention.len() != meta.n_layers {
        return Err(ViewerError::shape(
            "attention layer axis",
            meta.n_layers,
            attention.len(),
        ));
    }

    let mut flat = Vec::with_capacity(meta.n_layers * meta.n_heads * n * n);
    for (layer, heads) in attention.iter().enumerate() {
        if heads.len() != meta.n_heads {
            return Err(ViewerError::shape(
                format!("attention head axis (layer {layer})"),
                meta.n_heads,
                heads.len(),
            ));
        }
        for (head, rows) in heads.iter().enumerate() {
            if rows.len() != n {
                return Err(ViewerError::shape(
                    format!("attention query axis (layer {layer}, head {head})"),
                    n,
                    rows.len(),
                ));
            }
            for (row, values) in rows.iter().enumerate() {
                if values.len() != n {
                    return Err(ViewerError::shape(
                        format!("attention key axis (layer {layer}, head {head}, row {row})"),
                        n,
                        values.len(),
                    ));
                }
                flat.extend_from_slice(values);
            }
        }
    }
    Ok(flat)
}
