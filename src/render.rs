//! Renderer: `(AttentionStore, ViewState) -> Frame`
//!
//! A pure projection. It reads the store and the state, allocates a fresh
//! [`Frame`], and never writes to either input. Surfaces decide how a
//! frame is shown.
//!
//! ## Masking
//!
//! A cell with `col > row` is emitted as [`MatrixCell::Masked`], which
//! carries no value and no color. This is the only representation a
//! masked cell ever gets.

use serde::Serialize;
use tracing::trace;

use crate::attention::AttentionStore;
use crate::error::Result;
use crate::masks::is_masked;
use crate::palette::{head_color, rank_color, weight_color, Rgb};
use crate::state::{HoveredCell, ViewState};

/// Everything shown after one transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub header: Header,
    /// One grid per active head, primary first
    pub matrices: Vec<MatrixView>,
    pub distribution: DistributionView,
    pub tooltip: Option<TooltipView>,
    pub entropy: EntropyPanel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub model_name: String,
    pub layer: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub n_tokens: usize,
    pub head: usize,
    pub compare_head: Option<usize>,
    pub selected_token: usize,
    pub playing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixView {
    pub layer: usize,
    pub head: usize,
    pub labels: Vec<String>,
    pub rows: Vec<Vec<MatrixCell>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatrixCell {
    Masked,
    Weight {
        row: usize,
        col: usize,
        value: f32,
        color: Rgb,
    },
}

impl MatrixCell {
    pub fn value(&self) -> Option<f32> {
        match self {
            Self::Masked => None,
            Self::Weight { value, .. } => Some(*value),
        }
    }
}

/// Where the selected token attends, one bar per permitted key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionView {
    pub layer: usize,
    pub head: usize,
    pub row: usize,
    pub row_label: String,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub index: usize,
    pub label: String,
    pub value: f32,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TooltipView {
    pub layer: usize,
    pub head: usize,
    pub row: usize,
    pub col: usize,
    /// `"query" → "key"`
    pub pair: String,
    pub value: f32,
    pub percent: String,
    pub ranking: Vec<RankedBar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedBar {
    /// 1-based
    pub rank: usize,
    pub col: usize,
    pub label: String,
    pub value: f32,
    pub percent: String,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntropyPanel {
    pub layer: usize,
    pub bars: Vec<EntropyBar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntropyBar {
    pub head: usize,
    pub value: f64,
    pub color: Rgb,
}

pub fn percent(value: f32) -> String {
    format!("{:.1}%", value * 100.0)
}

#[derive(Debug, Clone)]
pub struct Renderer {
    top_k: usize,
}

impl Default for Renderer {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

impl Renderer {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    pub fn render(&self, store: &AttentionStore, state: &ViewState) -> Result<Frame> {
        let matrices = state
            .active_heads()
            .into_iter()
            .map(|head| self.matrix(store, state.layer, head))
            .collect::<Result<Vec<_>>>()?;

        let tooltip = match state.hovered {
            Some(cell) => self.tooltip(store, state.layer, cell)?,
            None => None,
        };

        let frame = Frame {
            header: Self::header(store, state),
            matrices,
            distribution: self.distribution(store, state)?,
            tooltip,
            entropy: self.entropy_panel(store, state.layer)?,
        };
        trace!(
            "Rendered layer {} ({} panes, tooltip: {})",
            state.layer,
            frame.matrices.len(),
            frame.tooltip.is_some()
        );
        Ok(frame)
    }

    fn header(store: &AttentionStore, state: &ViewState) -> Header {
        Header {
            model_name: store.meta().model_name.clone(),
            layer: state.layer,
            n_layers: store.n_layers(),
            n_heads: store.n_heads(),
            n_tokens: store.n_tokens(),
            head: state.head,
            compare_head: state.compare_enabled.then_some(state.compare_head),
            selected_token: state.selected_token,
            playing: state.playing,
        }
    }

    /// Grid for one `(layer, head)` slice
    pub fn matrix(&self, store: &AttentionStore, layer: usize, head: usize) -> Result<MatrixView> {
        let slice = store.slice(layer, head)?;
        let rows = slice
            .iter()
            .enumerate()
            .map(|(row, values)| {
                values
                    .iter()
                    .enumerate()
                    .map(|(col, &value)| {
                        if is_masked(row, col) {
                            MatrixCell::Masked
                        } else {
                            MatrixCell::Weight {
                                row,
                                col,
                                value,
                                color: weight_color(value),
                            }
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(MatrixView {
            layer,
            head,
            labels: store.labels().to_vec(),
            rows,
        })
    }

    /// Masked row of the primary head at the selected token
    pub fn distribution(&self, store: &AttentionStore, state: &ViewState) -> Result<DistributionView> {
        let row = state.selected_token;
        let values = store.row(state.layer, state.head, row)?;
        let bars = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                Ok(Bar {
                    index,
                    label: store.token_label(index)?.to_string(),
                    value,
                    color: weight_color(value),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DistributionView {
            layer: state.layer,
            head: state.head,
            row,
            row_label: store.token_label(row)?.to_string(),
            bars,
        })
    }

    /// Top-k ranking for the hovered cell's row, `None` for masked cells
    ///
    /// Re-derived from the row on every call.
    pub fn tooltip(
        &self,
        store: &AttentionStore,
        layer: usize,
        cell: HoveredCell,
    ) -> Result<Option<TooltipView>> {
        let Some(value) = store.weight(layer, cell.head, cell.row, cell.col)? else {
            return Ok(None);
        };

        let ranking = store
            .top_attended(layer, cell.head, cell.row, self.top_k)?
            .into_iter()
            .enumerate()
            .map(|(i, (col, value))| {
                Ok(RankedBar {
                    rank: i + 1,
                    col,
                    label: store.token_label(col)?.to_string(),
                    value,
                    percent: percent(value),
                    color: rank_color(i),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(TooltipView {
            layer,
            head: cell.head,
            row: cell.row,
            col: cell.col,
            pair: format!(
                "\"{}\" → \"{}\"",
                store.token_label(cell.row)?,
                store.token_label(cell.col)?
            ),
            value,
            percent: percent(value),
            ranking,
        }))
    }

    /// One bar per head for `layer`
    pub fn entropy_panel(&self, store: &AttentionStore, layer: usize) -> Result<EntropyPanel> {
        let n_heads = store.n_heads();
        let bars = store
            .entropy_table()
            .layer(layer)?
            .iter()
            .enumerate()
            .map(|(head, &value)| EntropyBar {
                head,
                value,
                color: head_color(head, n_heads),
            })
            .collect();
        Ok(EntropyPanel { layer, bars })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attention::ModelMeta;

    /// 2 layers, 2 heads, 3 tokens; garbage above the diagonal
    fn store() -> AttentionStore {
        let layer0 = vec![
            vec![
                vec![1.0, 0.8, 0.8],
                vec![0.6, 0.4, 0.8],
                vec![0.5, 0.3, 0.2],
            ],
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.5, 0.5, 0.0],
                vec![0.4, 0.4, 0.2],
            ],
        ];
        let layer1 = vec![
            vec![
                vec![1.0, 0.0, 0.0],
                vec![1.0, 0.0, 0.0],
                vec![1.0, 0.0, 0.0],
            ],
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
        ];
        let meta = ModelMeta {
            model_name: "tiny".into(),
            n_layers: 2,
            n_heads: 2,
        };
        let tokens = vec!["The".into(), "Ġfox".into(), "Ġ".into()];
        AttentionStore::new(tokens, &[layer0, layer1], meta).unwrap()
    }

    #[test]
    fn test_masked_cells_expose_nothing() {
        let store = store();
        let view = Renderer::default().matrix(&store, 0, 0).unwrap();
        for (r, row) in view.rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if c > r {
                    assert_eq!(*cell, MatrixCell::Masked);
                    assert!(cell.value().is_none());
                } else {
                    assert!(matches!(cell, MatrixCell::Weight { row, col, .. } if *row == r && *col == c));
                }
            }
        }
        assert_eq!(view.rows[1][0].value(), Some(0.6));
    }

    #[test]
    fn test_masked_cells_absent_from_json() {
        let store = store();
        let view = Renderer::default().matrix(&store, 0, 0).unwrap();
        let json = serde_json::to_value(&view.rows[0][1]).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "masked" }));
    }

    #[test]
    fn test_compare_renders_two_panes() {
        let store = store();
        let mut state = ViewState::new(2);
        let frame = Renderer::default().render(&store, &state).unwrap();
        assert_eq!(frame.matrices.len(), 1);
        assert_eq!(frame.header.compare_head, None);

        state.compare_enabled = true;
        let frame = Renderer::default().render(&store, &state).unwrap();
        assert_eq!(frame.matrices.len(), 2);
        assert_eq!(frame.matrices[0].head, 0);
        assert_eq!(frame.matrices[1].head, 1);
        assert_eq!(frame.header.compare_head, Some(1));
    }

    #[test]
    fn test_distribution_is_masked_row() {
        let store = store();
        let mut state = ViewState::new(2);
        state.selected_token = 1;
        let dist = Renderer::default().distribution(&store, &state).unwrap();
        assert_eq!(dist.bars.len(), 2);
        assert_eq!(dist.row_label, "fox");
        let sum: f32 = dist.bars.iter().map(|b| b.value).sum();
        assert!((sum - 1.0).abs() < 1e-3);
        assert_eq!(dist.bars[1].label, "fox");
    }

    #[test]
    fn test_tooltip_ranking() {
        let store = store();
        let renderer = Renderer::default();

        let tip = renderer
            .tooltip(&store, 0, HoveredCell { row: 2, col: 1, head: 0 })
            .unwrap()
            .unwrap();
        let ranked: Vec<(usize, f32)> = tip.ranking.iter().map(|r| (r.col, r.value)).collect();
        assert_eq!(ranked, vec![(0, 0.5), (1, 0.3), (2, 0.2)]);
        assert_eq!(tip.value, 0.3);
        assert_eq!(tip.percent, "30.0%");
        assert_eq!(tip.pair, "\"␣\" → \"fox\"");
        assert_eq!(tip.ranking[0].rank, 1);

        // ties keep column order
        let tip = renderer
            .tooltip(&store, 0, HoveredCell { row: 2, col: 0, head: 1 })
            .unwrap()
            .unwrap();
        assert_eq!(tip.ranking[0].col, 0);
        assert_eq!(tip.ranking[1].col, 1);

        // short rows rank what they have
        let tip = renderer
            .tooltip(&store, 0, HoveredCell { row: 0, col: 0, head: 0 })
            .unwrap()
            .unwrap();
        assert_eq!(tip.ranking.len(), 1);

        // masked cell has no tooltip
        assert!(renderer
            .tooltip(&store, 0, HoveredCell { row: 0, col: 2, head: 0 })
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_entropy_panel_follows_layer_only() {
        let store = store();
        let renderer = Renderer::default();
        let mut state = ViewState::new(2);
        state.layer = 1;

        let panel = renderer.render(&store, &state).unwrap().entropy;
        assert_eq!(panel.layer, 1);
        assert_eq!(panel.bars.len(), 2);
        for bar in &panel.bars {
            assert!(bar.value.abs() < 1e-8, "one-hot layer has zero entropy");
        }

        state.selected_token = 2;
        state.head = 1;
        assert_eq!(renderer.render(&store, &state).unwrap().entropy, panel);
    }

    #[test]
    fn test_render_is_idempotent() {
        let store = store();
        let mut state = ViewState::new(2);
        state.compare_enabled = true;
        state.selected_token = 2;
        state.hovered = Some(HoveredCell { row: 1, col: 0, head: 1 });

        let renderer = Renderer::default();
        let before = state.clone();
        let a = renderer.render(&store, &state).unwrap();
        let b = renderer.render(&store, &state).unwrap();
        assert_eq!(a, b);
        assert_eq!(state, before);
        assert!(a.tooltip.is_some());
    }
}
