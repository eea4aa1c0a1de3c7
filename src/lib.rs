// Pedantic clippy configuration for a numeric/visualization codebase
#![allow(clippy::cast_precision_loss)] // usize→f32/f64 intentional for scales
#![allow(clippy::cast_possible_truncation)] // f32→u8 color channels
#![allow(clippy::cast_possible_wrap)] // usize→i64 when clamping slider input
#![allow(clippy::cast_sign_loss)] // clamped i64→usize
#![allow(clippy::many_single_char_names)] // r, g, b, c, x in color math
#![allow(clippy::similar_names)] // `head`/`heads`, `row`/`rows`
#![allow(clippy::module_name_repetitions)] // AttentionStore in attention.rs is fine
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! attnview-rs: interactive explorer for causal attention tensors
//!
//! Loads an `[layer][head][query][key]` attention tensor with its tokens,
//! and lets a user scrub layers, pick and compare heads, inspect where a
//! token attends, and replay the layers as an animation.
//!
//! ## Architecture
//!
//! - `payload`: JSON input produced by the (external) attention extractor
//! - `attention`: AttentionStore, the immutable validated ground truth
//! - `entropy`: per-(layer, head) mean row entropy
//! - `masks`: causal mask utilities
//! - `state`: ViewState and playback speeds
//! - `input`: user actions and the InputController transitions
//! - `playback`: epoch-guarded layer playback scheduling
//! - `render`: pure projection from store + state to a Frame
//! - `palette`: value→color scales
//! - `surface`: text, JSON and in-memory presentation surfaces
//! - `session`: session root wiring store, state, controllers and surface
//! - `runtime`: single-writer event loop over input lines and ticks
//! - `synthetic`: seeded synthetic payloads for demos and tests

pub mod attention;
pub mod entropy;
pub mod error;
pub mod input;
pub mod masks;
pub mod palette;
pub mod payload;
pub mod playback;
pub mod render;
pub mod runtime;
pub mod session;
pub mod state;
pub mod surface;
pub mod synthetic;

pub use attention::{
    display_token, label_for, AnomalyKind, AttentionStore, LoadOptions, ModelMeta, RowAnomaly,
    PLACEHOLDER_GLYPH,
};
pub use entropy::{EntropyTable, ENTROPY_EPS};
pub use error::{Axis, Result, ViewerError};
pub use input::{Action, Command, InputController};
pub use masks::{clear_mask_cache, create_causal_keep_mask, is_masked};
pub use payload::AttentionPayload;
pub use playback::{PlaybackController, Tick};
pub use render::{
    Bar, DistributionView, EntropyBar, EntropyPanel, Frame, Header, MatrixCell, MatrixView,
    RankedBar, Renderer, TooltipView,
};
pub use session::{Outcome, Session, SessionConfig};
pub use state::{HoveredCell, Speed, ViewState};
pub use surface::{JsonSurface, RecordingSurface, Surface, TextSurface};
pub use synthetic::{demo_tokens, synthetic_payload, DEMO_TEXT};
