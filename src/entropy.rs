//! Per-(layer, head) attention entropy
//!
//! For every query row the masked distribution's Shannon entropy is
//!
//! ```text
//! H(row) = -Σ_{c ≤ row} p_c · ln(p_c + ε),   ε = 1e-10
//! ```
//!
//! and a table entry is the arithmetic mean of `H(row)` over all rows of
//! the `(layer, head)` slice.

use candle_core::{DType, Tensor, D};

use crate::error::{Axis, Result, ViewerError};
use crate::masks::create_causal_keep_mask;

/// Smoothing constant inside the logarithm
pub const ENTROPY_EPS: f64 = 1e-10;

/// Negative means closer to zero than this are rounding, not data
const ROUNDING_FLOOR: f64 = 1e-9;

/// Mean row entropy for every `(layer, head)`
#[derive(Debug, Clone, PartialEq)]
pub struct EntropyTable {
    values: Vec<Vec<f64>>,
}

impl EntropyTable {
    /// Wrap a precomputed `[layer][head]` table
    pub fn from_rows(values: Vec<Vec<f64>>) -> Self {
        Self { values }
    }

    pub fn n_layers(&self) -> usize {
        self.values.len()
    }

    pub fn n_heads(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }

    pub fn get(&self, layer: usize, head: usize) -> Result<f64> {
        let heads = self.values.get(layer).ok_or(ViewerError::OutOfRange {
            axis: Axis::Layer,
            index: layer,
            bound: self.values.len(),
        })?;
        heads.get(head).copied().ok_or(ViewerError::OutOfRange {
            axis: Axis::Head,
            index: head,
            bound: heads.len(),
        })
    }

    /// All heads of one layer
    pub fn layer(&self, layer: usize) -> Result<&[f64]> {
        self.values
            .get(layer)
            .map(Vec::as_slice)
            .ok_or(ViewerError::OutOfRange {
                axis: Axis::Layer,
                index: layer,
                bound: self.values.len(),
            })
    }

    /// Largest absolute difference against another table of the same shape
    pub fn max_abs_diff(&self, other: &Self) -> f64 {
        self.values
            .iter()
            .zip(&other.values)
            .flat_map(|(a, b)| a.iter().zip(b).map(|(x, y)| (x - y).abs()))
            .fold(0.0, f64::max)
    }
}

/// ε pushes a one-hot row a hair below zero; anything else passes through,
/// so a NaN mean stays visible
fn floor_rounding(h: f64) -> f64 {
    if h < 0.0 && h > -ROUNDING_FLOOR {
        0.0
    } else {
        h
    }
}

/// Compute the entropy table of a `[L, H, N, N]` attention tensor
///
/// Columns above the diagonal are replaced by zero before the reduction
/// (selected away, not multiplied), so whatever the upstream tensor stores
/// there, `inf` and `NaN` included, never contributes.
pub fn compute(attention: &Tensor) -> Result<EntropyTable> {
    let (_, _, n_rows, n_cols) = attention.dims4()?;
    if n_rows != n_cols {
        return Err(ViewerError::shape("attention key axis", n_rows, n_cols));
    }

    let p = attention.to_dtype(DType::F64)?;
    let keep = create_causal_keep_mask(n_rows, p.device(), DType::U8)?
        .broadcast_as(p.shape())?
        .contiguous()?;
    let p = keep.where_cond(&p, &p.zeros_like()?)?;

    let log_p = p.affine(1.0, ENTROPY_EPS)?.log()?;
    let row_entropy = p.mul(&log_p)?.sum(D::Minus1)?.neg()?; // [L, H, N]
    let mean = row_entropy.mean(D::Minus1)?; // [L, H]

    let values = mean
        .to_vec2::<f64>()?
        .into_iter()
        .map(|heads| heads.into_iter().map(floor_rounding).collect())
        .collect();

    Ok(EntropyTable { values })
}
