//! Single-writer event loop
//!
//! The loop is the only owner of the session. Input lines arrive over a
//! channel; between lines the loop sleeps until the next playback deadline.
//! Ticks and input are handled strictly one at a time.

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;
use crate::input::Command;
use crate::session::Session;
use crate::surface::Surface;

/// Forward lines from a reader to a channel on a background thread
pub fn spawn_line_reader<R: BufRead + Send + 'static>(reader: R) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Drive `session` until `quit` or the input channel closes
///
/// While playback is running the loop keeps ticking after input closes,
/// so a piped `play` keeps animating; `quit` always ends it.
pub fn run<S: Surface>(session: &mut Session<S>, input: Receiver<String>) -> Result<()> {
    let mut input_open = true;
    loop {
        let event = match (session.next_deadline(), input_open) {
            (Some(deadline), true) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match input.recv_timeout(wait) {
                    Ok(line) => Some(line),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => {
                        input_open = false;
                        None
                    }
                }
            }
            (Some(deadline), false) => {
                thread::sleep(deadline.saturating_duration_since(Instant::now()));
                None
            }
            (None, true) => match input.recv() {
                Ok(line) => Some(line),
                Err(_) => {
                    input_open = false;
                    None
                }
            },
            (None, false) => break,
        };

        match event {
            Some(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(Command::Apply(action)) => {
                        session.dispatch(action, Instant::now())?;
                    }
                    Err(e) => warn!("{e}"),
                }
            }
            None => {
                session.tick(Instant::now())?;
            }
        }
    }
    debug!("Event loop finished after {} renders", session.renders());
    Ok(())
}
