//! View state: what the user is currently looking at

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ViewerError;

/// Cell under the pointer, in the pane showing `head`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HoveredCell {
    pub row: usize,
    pub col: usize,
    pub head: usize,
}

/// The only mutable record of a session
///
/// Written by the input and playback controllers, read by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub layer: usize,
    pub head: usize,
    pub compare_head: usize,
    pub selected_token: usize,
    pub compare_enabled: bool,
    pub playing: bool,
    pub hovered: Option<HoveredCell>,
}

impl ViewState {
    /// Defaults for a model with `n_heads` heads
    ///
    /// The compare pane starts on head 1, or head 0 for single-head models.
    pub fn new(n_heads: usize) -> Self {
        Self {
            layer: 0,
            head: 0,
            compare_head: 1.min(n_heads.saturating_sub(1)),
            selected_token: 0,
            compare_enabled: false,
            playing: false,
            hovered: None,
        }
    }

    /// Heads with a visible matrix pane, primary first
    pub fn active_heads(&self) -> Vec<usize> {
        if self.compare_enabled {
            vec![self.head, self.compare_head]
        } else {
            vec![self.head]
        }
    }
}

/// Playback interval presets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Speed {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl Speed {
    pub fn interval(self) -> Duration {
        match self {
            Self::Slow => Duration::from_millis(1500),
            Self::Normal => Duration::from_millis(800),
            Self::Fast => Duration::from_millis(400),
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Slow => "slow",
            Self::Normal => "normal",
            Self::Fast => "fast",
        };
        f.write_str(name)
    }
}

impl FromStr for Speed {
    type Err = ViewerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slow" => Ok(Self::Slow),
            "normal" => Ok(Self::Normal),
            "fast" => Ok(Self::Fast),
            other => Err(ViewerError::InvalidCommand(format!("unknown speed '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = ViewState::new(14);
        assert_eq!(state.layer, 0);
        assert_eq!(state.head, 0);
        assert_eq!(state.compare_head, 1);
        assert_eq!(state.selected_token, 0);
        assert!(!state.compare_enabled);
        assert!(!state.playing);
        assert!(state.hovered.is_none());
        assert_eq!(state.active_heads(), vec![0]);
    }

    #[test]
    fn test_single_head_compare_default() {
        assert_eq!(ViewState::new(1).compare_head, 0);
    }

    #[test]
    fn test_speed_parse_and_interval() {
        assert_eq!("FAST".parse::<Speed>().unwrap(), Speed::Fast);
        assert_eq!(Speed::default(), Speed::Normal);
        assert_eq!(Speed::Slow.interval(), Duration::from_millis(1500));
        assert!("warp".parse::<Speed>().is_err());
    }
}
