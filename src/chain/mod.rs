//! Chain execution
//!
//! The same [`ProcessorGraph`] runs in two executors:
//! - [`realtime`]: block-at-a-time on an audio thread, fed by control commands
//! - [`offline`]: whole-buffer, deterministic renders for export and analysis
//!
//! [`export`] runs offline renders on a background thread.

pub mod export;
pub mod graph;
pub mod offline;
pub mod realtime;

pub use export::{ExportHandle, ExportResult, ExportWorker};
pub use graph::{ChainNode, ProcessorGraph};
pub use offline::{output_digest, render, render_with_cancel, RenderOutput, RenderSummary};
pub use realtime::{
    realtime_chain, ChainCommand, ChainController, ChainEvent, RealtimeExecutor,
    RealtimeSettings, Retired,
};
