//! Error taxonomy for the attention viewer

use std::fmt;

use thiserror::Error;

/// Tensor / state axis an index refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Layer,
    Head,
    Row,
    Col,
    Token,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Layer => "layer",
            Self::Head => "head",
            Self::Row => "row",
            Self::Col => "col",
            Self::Token => "token",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("shape mismatch in {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("{axis} index {index} out of range (bound {bound})")]
    OutOfRange {
        axis: Axis,
        index: usize,
        bound: usize,
    },

    #[error("numeric anomaly at layer {layer}, head {head}, row {row}: {detail}")]
    NumericAnomaly {
        layer: usize,
        head: usize,
        row: usize,
        detail: String,
    },

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ViewerError {
    pub(crate) fn shape(what: impl Into<String>, expected: usize, got: usize) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected,
            got,
        }
    }

    /// Fails with `OutOfRange` unless `index < bound`
    pub(crate) fn check(axis: Axis, index: usize, bound: usize) -> Result<()> {
        if index < bound {
            Ok(())
        } else {
            Err(Self::OutOfRange { axis, index, bound })
        }
    }
}

pub type Result<T> = std::result::Result<T, ViewerError>;
