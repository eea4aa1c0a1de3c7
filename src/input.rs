//! User actions and the transitions they drive
//!
//! Clamping of user-supplied positions happens here, at the boundary.
//! The store never clamps; it rejects.

use std::str::FromStr;
use std::time::Instant;
use tracing::debug;

use crate::attention::AttentionStore;
use crate::error::{Axis, Result, ViewerError};
use crate::masks::is_masked;
use crate::playback::PlaybackController;
use crate::state::{HoveredCell, Speed, ViewState};

/// A single user-driven transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Slider position; clamped to `[0, L)`
    SetLayer(i64),
    SelectHead(usize),
    /// Token pill; clamped to `[0, N)`
    SelectToken(i64),
    SetCompare(bool),
    TogglePlay,
    Reset,
    SetSpeed(Speed),
    /// Pointer over a matrix cell; `head` defaults to the primary pane
    Hover {
        row: usize,
        col: usize,
        head: Option<usize>,
    },
    Leave,
}

/// One line of user input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Apply(Action),
    Quit,
}

fn arg<T: FromStr>(parts: &[&str], index: usize, line: &str) -> Result<T> {
    parts
        .get(index)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ViewerError::InvalidCommand(line.to_string()))
}

impl FromStr for Command {
    type Err = ViewerError;

    fn from_str(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&verb) = parts.first() else {
            return Err(ViewerError::InvalidCommand(line.to_string()));
        };

        let action = match verb {
            "quit" | "q" | "exit" => return Ok(Self::Quit),
            "layer" | "l" => Action::SetLayer(arg(&parts, 1, line)?),
            "head" | "h" => Action::SelectHead(arg(&parts, 1, line)?),
            "token" | "t" => Action::SelectToken(arg(&parts, 1, line)?),
            "compare" | "c" => match parts.get(1).copied() {
                Some("on") | None => Action::SetCompare(true),
                Some("off") => Action::SetCompare(false),
                Some(_) => return Err(ViewerError::InvalidCommand(line.to_string())),
            },
            "single" => Action::SetCompare(false),
            "play" | "pause" | "p" => Action::TogglePlay,
            "reset" | "r" => Action::Reset,
            "speed" => Action::SetSpeed(
                parts
                    .get(1)
                    .ok_or_else(|| ViewerError::InvalidCommand(line.to_string()))?
                    .parse()?,
            ),
            "hover" => Action::Hover {
                row: arg(&parts, 1, line)?,
                col: arg(&parts, 2, line)?,
                head: if parts.len() > 3 {
                    Some(arg(&parts, 3, line)?)
                } else {
                    None
                },
            },
            "leave" => Action::Leave,
            _ => return Err(ViewerError::InvalidCommand(line.to_string())),
        };
        Ok(Self::Apply(action))
    }
}

fn clamp_index(value: i64, len: usize) -> usize {
    let max = len.saturating_sub(1) as i64;
    value.clamp(0, max) as usize
}

/// A hover only survives while its pane is on screen
fn drop_hidden_hover(state: &mut ViewState) {
    if let Some(cell) = state.hovered {
        if !state.active_heads().contains(&cell.head) {
            state.hovered = None;
        }
    }
}

/// Translates actions into `ViewState` mutations
///
/// Validation happens before any field is written, so a rejected action
/// leaves the state exactly as it was.
#[derive(Debug, Default)]
pub struct InputController;

impl InputController {
    pub fn apply(
        &self,
        store: &AttentionStore,
        state: &mut ViewState,
        playback: &mut PlaybackController,
        action: Action,
        now: Instant,
    ) -> Result<()> {
        match action {
            Action::SetLayer(n) => {
                state.layer = clamp_index(n, store.n_layers());
            }
            Action::SelectHead(h) => {
                ViewerError::check(Axis::Head, h, store.n_heads())?;
                if state.compare_enabled && h != state.head {
                    state.compare_head = h;
                } else {
                    state.head = h;
                }
                drop_hidden_hover(state);
            }
            Action::SelectToken(t) => {
                state.selected_token = clamp_index(t, store.n_tokens());
            }
            Action::SetCompare(on) => {
                state.compare_enabled = on;
                drop_hidden_hover(state);
            }
            Action::TogglePlay => {
                if state.playing {
                    playback.stop();
                    state.playing = false;
                } else {
                    playback.start(now);
                    state.playing = true;
                }
            }
            Action::Reset => {
                playback.stop();
                state.playing = false;
                state.layer = 0;
            }
            Action::SetSpeed(speed) => {
                playback.set_speed(speed, now);
            }
            Action::Hover { row, col, head } => {
                let head = head.unwrap_or(state.head);
                ViewerError::check(Axis::Row, row, store.n_tokens())?;
                ViewerError::check(Axis::Col, col, store.n_tokens())?;
                ViewerError::check(Axis::Head, head, store.n_heads())?;
                if !state.active_heads().contains(&head) {
                    return Err(ViewerError::InvalidCommand(format!(
                        "head {head} has no visible pane"
                    )));
                }
                state.hovered = if is_masked(row, col) {
                    None
                } else {
                    Some(HoveredCell { row, col, head })
                };
            }
            Action::Leave => {
                state.hovered = None;
            }
        }
        debug!("Applied {:?}", action);
        Ok(())
    }
}
