//! Causal mask utilities
//!
//! A query token at position `row` may only attend to key positions
//! `col <= row`. Everything above the diagonal is not an attention
//! weight and must never be read as one.
//!
//! ## Caching Strategy
//!
//! Keep-masks are cached by `(seq_len, dtype)`. The viewer only ever
//! works on CPU tensors, and cached clones are shallow (Arc bump).

use candle_core::{DType, Device, Tensor};
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};

use crate::error::Result;

type KeepMaskCache = LazyLock<Mutex<HashMap<(usize, DType), Tensor>>>;

static KEEP_MASK_CACHE: KeepMaskCache = LazyLock::new(|| Mutex::new(HashMap::new()));

/// True when `(row, col)` lies above the diagonal
#[inline]
pub fn is_masked(row: usize, col: usize) -> bool {
    col > row
}

/// Number of permitted key positions for a query row
#[inline]
pub fn valid_len(row: usize) -> usize {
    row + 1
}

/// Create or retrieve a cached lower-triangular keep-mask
///
/// # Returns
///
/// A tensor of shape `[seq_len, seq_len]` where:
/// - `1.0` for positions that can attend (j <= i)
/// - `0.0` for masked positions (j > i)
///
/// ```text
/// [[1, 0, 0, 0],
///  [1, 1, 0, 0],
///  [1, 1, 1, 0],
///  [1, 1, 1, 1]]
/// ```
pub fn create_causal_keep_mask(seq_len: usize, device: &Device, dtype: DType) -> Result<Tensor> {
    let cache_key = (seq_len, dtype);

    if device.is_cpu() {
        let cache = KEEP_MASK_CACHE.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(&cache_key) {
            return Ok(cached.clone());
        }
    }

    let mask = Tensor::tril2(seq_len, dtype, device)?;

    if device.is_cpu() {
        let mut cache = KEEP_MASK_CACHE.lock().unwrap_or_else(PoisonError::into_inner);
        cache.insert(cache_key, mask.clone());
    }

    Ok(mask)
}

/// Drop all cached masks
pub fn clear_mask_cache() {
    KEEP_MASK_CACHE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}
