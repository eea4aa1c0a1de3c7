//! Session root
//!
//! Owns the store, the view state, both controllers and the surface.
//! Every accepted transition is followed by exactly one render pass, and
//! because all entry points take `&mut self` no transition can start
//! while another one's render is still running.

use std::time::Instant;
use tracing::{debug, info, warn};

use crate::attention::{AttentionStore, LoadOptions};
use crate::error::Result;
use crate::input::{Action, InputController};
use crate::payload::AttentionPayload;
use crate::playback::{next_layer, PlaybackController, Tick};
use crate::render::Renderer;
use crate::state::{Speed, ViewState};
use crate::surface::Surface;

/// Configuration for a viewing session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Initial playback speed
    pub speed: Speed,
    /// Tooltip ranking length
    pub top_k: usize,
    /// Numeric validation applied when loading a payload
    pub load: LoadOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            speed: Speed::Normal,
            top_k: 3,
            load: LoadOptions::default(),
        }
    }
}

/// Result of feeding one action to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// State changed and a frame was presented
    Rendered,
    /// Action was invalid; state untouched, nothing presented
    Rejected,
}

pub struct Session<S: Surface> {
    store: AttentionStore,
    state: ViewState,
    input: InputController,
    playback: PlaybackController,
    renderer: Renderer,
    surface: S,
    renders: u64,
}

impl<S: Surface> Session<S> {
    /// Build a session and present the initial frame
    pub fn new(store: AttentionStore, config: &SessionConfig, surface: S) -> Result<Self> {
        let mut session = Self {
            state: ViewState::new(store.n_heads()),
            store,
            input: InputController,
            playback: PlaybackController::new(config.speed),
            renderer: Renderer::new(config.top_k),
            surface,
            renders: 0,
        };
        info!(
            "Session started: {} ({} layers, {} heads, {} tokens)",
            session.store.meta().model_name,
            session.store.n_layers(),
            session.store.n_heads(),
            session.store.n_tokens()
        );
        session.render()?;
        Ok(session)
    }

    /// Validate a payload and start a session on it
    ///
    /// Load errors surface before any state or frame exists.
    pub fn from_payload(payload: AttentionPayload, config: &SessionConfig, surface: S) -> Result<Self> {
        let store = AttentionStore::from_payload(payload, &config.load)?;
        Self::new(store, config, surface)
    }

    pub fn store(&self) -> &AttentionStore {
        &self.store
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    /// Number of frames presented so far
    pub fn renders(&self) -> u64 {
        self.renders
    }

    fn render(&mut self) -> Result<()> {
        let frame = self.renderer.render(&self.store, &self.state)?;
        self.surface.present(&frame)?;
        self.renders += 1;
        Ok(())
    }

    /// Apply a user action
    ///
    /// Invalid actions are logged and leave the state unchanged. Errors
    /// from the render pass or the surface are returned.
    pub fn dispatch(&mut self, action: Action, now: Instant) -> Result<Outcome> {
        if let Err(e) = self.input.apply(
            &self.store,
            &mut self.state,
            &mut self.playback,
            action,
            now,
        ) {
            warn!("Ignoring {:?}: {}", action, e);
            return Ok(Outcome::Rejected);
        }
        self.render()?;
        Ok(Outcome::Rendered)
    }

    /// When the event loop should wake up for playback
    pub fn next_deadline(&self) -> Option<Instant> {
        self.playback.next_deadline()
    }

    /// Take a due tick without applying it
    pub fn poll_tick(&mut self, now: Instant) -> Option<Tick> {
        self.playback.poll(now)
    }

    /// Advance one layer if `tick` is still current; returns whether it was
    pub fn apply_tick(&mut self, tick: Tick) -> Result<bool> {
        if !self.state.playing || !self.playback.accepts(tick) {
            debug!("Discarding stale playback tick");
            return Ok(false);
        }
        self.state.layer = next_layer(self.state.layer, self.store.n_layers());
        debug!("Playback tick -> layer {}", self.state.layer);
        self.render()?;
        Ok(true)
    }

    /// Poll and apply in one step
    pub fn tick(&mut self, now: Instant) -> Result<bool> {
        match self.poll_tick(now) {
            Some(tick) => self.apply_tick(tick),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attention::ModelMeta;
    use crate::surface::RecordingSurface;
    use std::time::Duration;

    fn session(n_layers: usize) -> Session<RecordingSurface> {
        let slice = vec![vec![1.0, 0.0], vec![0.5, 0.5]];
        let attention = vec![vec![slice; 2]; n_layers];
        let meta = ModelMeta {
            model_name: "tiny".into(),
            n_layers,
            n_heads: 2,
        };
        let store = AttentionStore::new(vec!["a".into(), "b".into()], &attention, meta).unwrap();
        Session::new(store, &SessionConfig::default(), RecordingSurface::default()).unwrap()
    }

    #[test]
    fn test_initial_render() {
        let s = session(3);
        assert_eq!(s.renders(), 1);
        assert_eq!(s.surface().frames.len(), 1);
    }

    #[test]
    fn test_one_render_per_transition() {
        let mut s = session(3);
        let now = Instant::now();
        s.dispatch(Action::SetLayer(2), now).unwrap();
        s.dispatch(Action::SelectToken(1), now).unwrap();
        s.dispatch(Action::SetCompare(true), now).unwrap();
        assert_eq!(s.renders(), 4);

        let last = s.surface().last().unwrap();
        assert_eq!(last.header.layer, 2);
        assert_eq!(last.matrices.len(), 2);
        assert_eq!(last.distribution.row, 1);
    }

    #[test]
    fn test_rejected_action_does_not_render() {
        let mut s = session(3);
        let before = s.state().clone();
        let outcome = s.dispatch(Action::SelectHead(9), Instant::now()).unwrap();
        assert_eq!(outcome, Outcome::Rejected);
        assert_eq!(s.renders(), 1);
        assert_eq!(s.state(), &before);
    }

    #[test]
    fn test_play_then_stop_before_first_tick() {
        let mut s = session(3);
        let t0 = Instant::now();
        s.dispatch(Action::TogglePlay, t0).unwrap();
        s.dispatch(Action::TogglePlay, t0 + Duration::from_millis(10)).unwrap();

        assert!(!s.tick(t0 + Duration::from_secs(10)).unwrap());
        assert_eq!(s.state().layer, 0);
        assert!(s.next_deadline().is_none());
    }

    #[test]
    fn test_queued_tick_after_stop_is_discarded() {
        let mut s = session(3);
        let t0 = Instant::now();
        s.dispatch(Action::TogglePlay, t0).unwrap();

        let due = t0 + Duration::from_millis(800);
        let tick = s.poll_tick(due).unwrap();
        s.dispatch(Action::TogglePlay, due).unwrap();

        assert!(!s.apply_tick(tick).unwrap());
        assert_eq!(s.state().layer, 0);
        assert_eq!(s.renders(), 3);
    }

    #[test]
    fn test_playback_wraps_layers() {
        let mut s = session(3);
        let t0 = Instant::now();
        s.dispatch(Action::TogglePlay, t0).unwrap();

        let step = Speed::Normal.interval();
        let mut layers = Vec::new();
        for i in 1..=4 {
            assert!(s.tick(t0 + step * i).unwrap());
            layers.push(s.state().layer);
        }
        assert_eq!(layers, vec![1, 2, 0, 1]);
        assert!(s.surface().last().unwrap().header.playing);
    }

    #[test]
    fn test_reset_stops_playback() {
        let mut s = session(3);
        let t0 = Instant::now();
        s.dispatch(Action::TogglePlay, t0).unwrap();
        assert!(s.tick(t0 + Speed::Normal.interval()).unwrap());

        s.dispatch(Action::Reset, t0 + Duration::from_secs(1)).unwrap();
        assert_eq!(s.state().layer, 0);
        assert!(!s.state().playing);
        assert!(!s.tick(t0 + Duration::from_secs(60)).unwrap());
    }

    #[test]
    fn test_speed_change_while_playing() {
        let mut s = session(3);
        let t0 = Instant::now();
        s.dispatch(Action::TogglePlay, t0).unwrap();

        let t1 = t0 + Duration::from_millis(500);
        s.dispatch(Action::SetSpeed(Speed::Fast), t1).unwrap();
        assert_eq!(s.next_deadline(), Some(t1 + Duration::from_millis(400)));
        assert!(!s.tick(t0 + Duration::from_millis(800)).unwrap());
        assert!(s.tick(t1 + Duration::from_millis(400)).unwrap());
    }
}
