//! Playback transport
//!
//! The control side owns a [`TransportManager`]; the real-time executor holds a
//! clone of its [`Playhead`]. Both sides only touch atomics, so neither ever
//! waits on the other. A seek from the control side wins over a concurrent
//! advance from the audio side.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Transport states representing the current playback mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    /// Playhead at zero, not playing (default state)
    #[default]
    Stopped,
    /// Not playing, playhead somewhere past zero
    Paused,
    /// Audio is actively playing
    Playing,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "Stopped"),
            TransportState::Paused => write!(f, "Paused"),
            TransportState::Playing => write!(f, "Playing"),
        }
    }
}

/// Control-plane view of playback, handed to clients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    /// Playhead position in seconds
    pub current_time: f64,
    /// Length of the loaded audio in seconds
    pub duration: f64,
}

/// Lock-free playhead shared between the control thread and the audio thread
#[derive(Debug, Default)]
pub struct Playhead {
    playing: AtomicBool,
    position: AtomicU64,
    length: AtomicU64,
}

impl Playhead {
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Current position in frames
    #[inline]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    /// Length of the playable material in frames
    #[inline]
    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Acquire)
    }

    /// Move the playhead forward after the audio thread rendered `frames` from
    /// position `from`.
    ///
    /// If the control side seeked in the meantime the advance is dropped.
    /// Reaching the end of the material stops playback.
    pub fn advance(&self, from: u64, frames: u64) {
        let length = self.length();
        let next = (from + frames).min(length);
        if self
            .position
            .compare_exchange(from, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            && next >= length
        {
            self.playing.store(false, Ordering::Release);
        }
    }

    /// Stop playback from the audio thread when there is nothing left to read
    #[inline]
    pub fn finish(&self) {
        self.playing.store(false, Ordering::Release);
    }
}

/// Manages play/pause/seek/stop over a [`Playhead`]
#[derive(Debug, Clone)]
pub struct TransportManager {
    playhead: Arc<Playhead>,
    sample_rate: u32,
}

impl Default for TransportManager {
    fn default() -> Self {
        Self::new(48000)
    }
}

impl TransportManager {
    /// Create a transport with nothing loaded
    pub fn new(sample_rate: u32) -> Self {
        Self {
            playhead: Arc::new(Playhead::default()),
            sample_rate: sample_rate.max(1),
        }
    }

    /// Handle for the audio thread
    pub fn playhead(&self) -> Arc<Playhead> {
        Arc::clone(&self.playhead)
    }

    /// Point the transport at new material, stopping playback at zero
    pub fn load(&mut self, length_frames: u64, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        self.playhead.playing.store(false, Ordering::Release);
        self.playhead.length.store(length_frames, Ordering::Release);
        self.playhead.position.store(0, Ordering::Release);
    }

    /// Flip between playing and paused; returns the new playing flag
    ///
    /// Toggling on at the end of the material restarts from zero. Does nothing
    /// when nothing is loaded.
    pub fn toggle_play(&mut self) -> bool {
        let playhead = &self.playhead;
        if playhead.length() == 0 {
            return false;
        }
        let now_playing = !playhead.is_playing();
        if now_playing && playhead.position() >= playhead.length() {
            playhead.position.store(0, Ordering::Release);
        }
        playhead.playing.store(now_playing, Ordering::Release);
        debug!(playing = now_playing, position = self.position_secs(), "transport toggled");
        now_playing
    }

    /// Move the playhead, clamped to [0, duration]
    pub fn seek(&mut self, seconds: f64) {
        let target = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        let frames = ((target * self.sample_rate as f64).round() as u64).min(self.playhead.length());
        self.playhead.position.store(frames, Ordering::Release);
        debug!(position = frames as f64 / self.sample_rate as f64, "transport seek");
    }

    /// Stop playback and return the playhead to zero
    pub fn stop(&mut self) {
        self.playhead.playing.store(false, Ordering::Release);
        self.playhead.position.store(0, Ordering::Release);
        debug!("transport stopped");
    }

    pub fn state(&self) -> TransportState {
        if self.playhead.is_playing() {
            TransportState::Playing
        } else if self.playhead.position() == 0 {
            TransportState::Stopped
        } else {
            TransportState::Paused
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playhead.is_playing()
    }

    /// Playhead position in seconds
    pub fn position_secs(&self) -> f64 {
        self.playhead.position() as f64 / self.sample_rate as f64
    }

    pub fn duration_secs(&self) -> f64 {
        self.playhead.length() as f64 / self.sample_rate as f64
    }

    pub fn playback_state(&self) -> PlaybackState {
        PlaybackState {
            is_playing: self.is_playing(),
            current_time: self.position_secs(),
            duration: self.duration_secs(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
