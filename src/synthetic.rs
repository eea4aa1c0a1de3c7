//! Synthetic attention payloads
//!
//! Produces well-formed causal payloads without running a model, for the
//! `--demo` mode and for tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::attention::SPACE_MARKER;
use crate::entropy;
use crate::error::Result;
use crate::payload::AttentionPayload;

pub const DEMO_TEXT: &str = "The quick brown fox jumps over the lazy dog.";
pub const DEMO_MODEL: &str = "synthetic";

/// Whitespace tokenization with a space marker on non-initial words
pub fn demo_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            if i == 0 {
                word.to_string()
            } else {
                format!("{SPACE_MARKER}{word}")
            }
        })
        .collect()
}

/// Softmax over random logits for each permitted key; zeros above the diagonal
fn causal_rows(rng: &mut StdRng, n: usize, sharpness: f32) -> Vec<Vec<f32>> {
    (0..n)
        .map(|row| {
            let logits: Vec<f32> = (0..=row).map(|_| rng.gen::<f32>() * sharpness).collect();
            let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
            let total: f32 = exps.iter().sum();

            let mut values = vec![0.0; n];
            for (col, e) in exps.into_iter().enumerate() {
                values[col] = e / total;
            }
            values
        })
        .collect()
}

/// Seeded payload with the recomputed entropy table filled in
///
/// Later layers get sharper logits, so entropy tends to fall with depth.
pub fn synthetic_payload(
    tokens: Vec<String>,
    n_layers: usize,
    n_heads: usize,
    seed: u64,
) -> Result<AttentionPayload> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = tokens.len();

    let attention: Vec<Vec<Vec<Vec<f32>>>> = (0..n_layers)
        .map(|layer| {
            let sharpness = 1.0 + 2.0 * layer as f32;
            (0..n_heads)
                .map(|_| causal_rows(&mut rng, n, sharpness))
                .collect()
        })
        .collect();

    let mut payload = AttentionPayload {
        tokens,
        attention,
        entropy: None,
        num_layers: n_layers,
        num_heads: n_heads,
        model_name: DEMO_MODEL.to_string(),
    };

    if n > 0 && n_layers > 0 && n_heads > 0 {
        let flat: Vec<f32> = payload.attention.iter().flatten().flatten().flatten().copied().collect();
        let tensor = candle_core::Tensor::from_vec(
            flat,
            (n_layers, n_heads, n, n),
            &candle_core::Device::Cpu,
        )?;
        let table = entropy::compute(&tensor)?;
        payload.entropy = Some(
            (0..n_layers)
                .map(|l| table.layer(l).map(<[f64]>::to_vec))
                .collect::<Result<Vec<_>>>()?,
        );
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attention::{AttentionStore, LoadOptions};

    #[test]
    fn test_demo_tokens() {
        let tokens = demo_tokens("The quick fox");
        assert_eq!(tokens, vec!["The", "Ġquick", "Ġfox"]);
    }

    #[test]
    fn test_payload_is_valid() {
        let payload = synthetic_payload(demo_tokens(DEMO_TEXT), 3, 4, 42).unwrap();
        assert_eq!(payload.attention.len(), 3);
        assert_eq!(payload.attention[0].len(), 4);
        assert_eq!(payload.attention[0][0].len(), 9);

        let strict = LoadOptions {
            strict: true,
            ..LoadOptions::default()
        };
        let store = AttentionStore::from_payload(payload, &strict).unwrap();
        assert_eq!(store.n_tokens(), 9);
        assert!(store.scan_anomalies(1e-3).unwrap().is_empty());
        assert_eq!(store.weight(0, 0, 0, 5).unwrap(), None);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = synthetic_payload(demo_tokens(DEMO_TEXT), 2, 2, 7).unwrap();
        let b = synthetic_payload(demo_tokens(DEMO_TEXT), 2, 2, 7).unwrap();
        assert_eq!(a.attention, b.attention);

        let c = synthetic_payload(demo_tokens(DEMO_TEXT), 2, 2, 8).unwrap();
        assert_ne!(a.attention, c.attention);
    }
}
