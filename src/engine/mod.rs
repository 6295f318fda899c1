//! Audio Engine Module
//!
//! Core audio plumbing shared by the rack:
//! - Audio buffer management
//! - Playback transport
//! - WAV file I/O

pub mod buffer;
pub mod io;
pub mod transport;

pub use buffer::{AudioBuffer, ChannelLayout};
pub use io::{export_audio, import_audio, ExportFormat};
pub use transport::{PlaybackState, Playhead, TransportManager, TransportState};
