//! Layer playback scheduling
//!
//! The controller owns no thread and no timer handle. It keeps a deadline
//! that the event loop waits on, and hands out epoch-stamped [`Tick`]s.
//! Every start/stop/restart bumps the epoch, so a tick issued before a
//! stop is rejected when it is finally applied.

use std::time::Instant;
use tracing::debug;

use crate::state::Speed;

/// Permission to advance one layer, valid for a single epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    epoch: u64,
}

#[derive(Debug)]
pub struct PlaybackController {
    speed: Speed,
    epoch: u64,
    next_due: Option<Instant>,
}

impl PlaybackController {
    pub fn new(speed: Speed) -> Self {
        Self {
            speed,
            epoch: 0,
            next_due: None,
        }
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_due
    }

    /// Schedule a repeating tick, first one an interval from `now`
    pub fn start(&mut self, now: Instant) {
        self.epoch += 1;
        self.next_due = Some(now + self.speed.interval());
        debug!(
            "Playback started (epoch {}, every {:?})",
            self.epoch,
            self.speed.interval()
        );
    }

    /// Cancel the timer; outstanding ticks become stale
    pub fn stop(&mut self) {
        if self.next_due.take().is_some() {
            debug!("Playback stopped (epoch {})", self.epoch);
        }
        self.epoch += 1;
    }

    /// Change the interval; a running timer restarts from `now`
    pub fn set_speed(&mut self, speed: Speed, now: Instant) {
        self.speed = speed;
        if self.is_running() {
            self.start(now);
        }
    }

    /// Issue a tick if the deadline has passed and schedule the next one
    ///
    /// Missed deadlines are not replayed: at most one tick per poll.
    pub fn poll(&mut self, now: Instant) -> Option<Tick> {
        let due = self.next_due?;
        if now < due {
            return None;
        }
        let interval = self.speed.interval();
        let next = due + interval;
        self.next_due = Some(if next > now { next } else { now + interval });
        Some(Tick { epoch: self.epoch })
    }

    /// Whether `tick` belongs to the currently running schedule
    pub fn accepts(&self, tick: Tick) -> bool {
        self.is_running() && tick.epoch == self.epoch
    }
}

/// Next layer in the playback cycle
pub fn next_layer(layer: usize, n_layers: usize) -> usize {
    (layer + 1) % n_layers.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_poll_before_deadline() {
        let t0 = Instant::now();
        let mut playback = PlaybackController::new(Speed::Normal);
        assert!(playback.poll(t0 + Duration::from_secs(10)).is_none());

        playback.start(t0);
        assert!(playback.poll(t0 + Duration::from_millis(799)).is_none());
        let tick = playback.poll(t0 + Duration::from_millis(800)).unwrap();
        assert!(playback.accepts(tick));
        assert_eq!(
            playback.next_deadline(),
            Some(t0 + Duration::from_millis(1600))
        );
    }

    #[test]
    fn test_stop_invalidates_queued_tick() {
        let t0 = Instant::now();
        let mut playback = PlaybackController::new(Speed::Fast);
        playback.start(t0);
        let tick = playback.poll(t0 + Duration::from_millis(400)).unwrap();

        playback.stop();
        assert!(!playback.accepts(tick));
        assert!(playback.next_deadline().is_none());

        // restarting does not revive the old tick
        playback.start(t0 + Duration::from_millis(401));
        assert!(!playback.accepts(tick));
    }

    #[test]
    fn test_speed_change_restarts_timer() {
        let t0 = Instant::now();
        let mut playback = PlaybackController::new(Speed::Slow);
        playback.start(t0);

        let t1 = t0 + Duration::from_millis(1000);
        playback.set_speed(Speed::Fast, t1);
        assert_eq!(
            playback.next_deadline(),
            Some(t1 + Duration::from_millis(400))
        );

        // not running: speed is stored, nothing is scheduled
        playback.stop();
        playback.set_speed(Speed::Normal, t1);
        assert_eq!(playback.speed(), Speed::Normal);
        assert!(!playback.is_running());
    }

    #[test]
    fn test_missed_deadlines_collapse() {
        let t0 = Instant::now();
        let mut playback = PlaybackController::new(Speed::Fast);
        playback.start(t0);

        let late = t0 + Duration::from_millis(2000);
        assert!(playback.poll(late).is_some());
        assert!(playback.poll(late).is_none());
        assert_eq!(
            playback.next_deadline(),
            Some(late + Duration::from_millis(400))
        );
    }

    #[test]
    fn test_next_layer_wraps() {
        assert_eq!(next_layer(0, 3), 1);
        assert_eq!(next_layer(2, 3), 0);
        assert_eq!(next_layer(0, 1), 0);
    }
}
