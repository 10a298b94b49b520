//! Cine playback timer.
//!
//! The controller owns at most one timer task. Each task stamps its ticks with
//! the generation it was started under; ticks from a cancelled timer that are
//! still queued are recognised by their stale generation and ignored.

use futures::{
    StreamExt,
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use std::time::Duration;
use thiserror::Error;
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Playback requires a running tokio runtime")]
    NoRuntime,

    #[error("Frame interval must be at least 1 ms")]
    InvalidInterval,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackTick {
    generation: u64,
}

pub struct PlaybackController {
    interval_ms: u64,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    tx: UnboundedSender<PlaybackTick>,
    rx: UnboundedReceiver<PlaybackTick>,
}

impl PlaybackController {
    pub fn new(interval_ms: u64) -> Self {
        let (tx, rx) = mpsc::unbounded();
        Self {
            interval_ms: interval_ms.max(1),
            generation: 0,
            timer: None,
            tx,
            rx,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.timer.is_some()
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Arm a recurring timer. Any running timer is cancelled first.
    pub fn start(&mut self, interval_ms: u64) -> Result<(), PlaybackError> {
        if interval_ms == 0 {
            return Err(PlaybackError::InvalidInterval);
        }
        let runtime = Handle::try_current().map_err(|_| PlaybackError::NoRuntime)?;
        self.cancel_timer();

        self.interval_ms = interval_ms;
        self.generation += 1;
        let tick = PlaybackTick {
            generation: self.generation,
        };
        let period = Duration::from_millis(interval_ms);
        let tx = self.tx.clone();

        self.timer = Some(runtime.spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.unbounded_send(tick).is_err() {
                    break;
                }
            }
        }));
        info!(interval_ms, "Playback started");
        Ok(())
    }

    /// Cancel the timer. Safe to call when nothing is running; returns whether
    /// playback was active.
    pub fn stop(&mut self) -> bool {
        let was_playing = self.cancel_timer();
        if was_playing {
            info!("Playback stopped");
        }
        was_playing
    }

    fn cancel_timer(&mut self) -> bool {
        match self.timer.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    /// Start or stop. Returns the new playing state.
    pub fn toggle(&mut self) -> Result<bool, PlaybackError> {
        if self.stop() {
            Ok(false)
        } else {
            self.start(self.interval_ms)?;
            Ok(true)
        }
    }

    /// Change the frame period. While playing the timer is restarted with the
    /// new period; the current frame is kept, so no frame is skipped.
    pub fn set_interval(&mut self, interval_ms: u64) -> Result<(), PlaybackError> {
        if interval_ms == 0 {
            return Err(PlaybackError::InvalidInterval);
        }
        if self.is_playing() {
            self.start(interval_ms)
        } else {
            self.interval_ms = interval_ms;
            Ok(())
        }
    }

    /// Whether `tick` belongs to the timer that is currently running.
    pub fn accept(&self, tick: PlaybackTick) -> bool {
        self.is_playing() && tick.generation == self.generation
    }

    /// Wait for the next tick of the running timer. Returns `None` right away
    /// when playback is stopped.
    pub async fn next_tick(&mut self) -> Option<PlaybackTick> {
        while self.is_playing() {
            let tick = self.rx.next().await?;
            if self.accept(tick) {
                return Some(tick);
            }
            debug!(?tick, "Discarding tick from a cancelled timer");
        }
        None
    }

    /// Collect the ticks that arrived since the last call without waiting.
    pub fn drain_ticks(&mut self) -> Vec<PlaybackTick> {
        let mut accepted = Vec::new();
        while let Ok(tick) = self.rx.try_recv() {
            if self.accept(tick) {
                accepted.push(tick);
            }
        }
        accepted
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("interval_ms", &self.interval_ms)
            .field("generation", &self.generation)
            .field("playing", &self.is_playing())
            .finish()
    }
}
