//! Sonic Rack - Mastering Effects-Rack Engine
//!
//! An ordered rack of effect modules drawn from a fixed catalogue, run either
//! in real time (block by block, driven by lock-free commands from a control
//! thread) or offline (deterministic render to a buffer or file).
//!
//! # Architecture
//!
//! - [`rack`]: the authoritative, serializable list of modules and their
//!   clamped parameters. Every mutation publishes an immutable snapshot.
//! - [`chain`]: processor graphs built from snapshots, the real-time
//!   executor, offline rendering and the background export worker.
//! - [`dsp`]: the module catalogue and its processors.
//! - [`metering`]: per-module readouts, loudness and platform compliance.
//! - [`provider`]: asynchronous whole-buffer operations (normalize, declip,
//!   mono bass) behind a pluggable backend.
//! - [`session`]: one owned object tying the above together.

pub mod chain;
pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod metering;
pub mod provider;
pub mod rack;
pub mod session;

pub use config::EngineConfig;
pub use dsp::registry::{ModuleDescriptor, ModuleType};
pub use engine::{AudioBuffer, ChannelLayout};
pub use error::{RackError, Result};
pub use metering::{LoudnessAnalysis, MeteringSnapshot, Platform};
pub use rack::{Rack, RackEvent, RackModule, RackSnapshot};
pub use session::Session;
