//! Offline rendering
//!
//! Runs a whole buffer through a rack snapshot with freshly built processors
//! and settled parameters. The same buffer, snapshot and block size always
//! produce bit-identical output, which the SHA-256 digest makes checkable.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::graph::ProcessorGraph;
use crate::engine::buffer::{AudioBuffer, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use crate::error::{RackError, Result};
use crate::metering::readout::{MasterReadout, ModuleReadout};
use crate::metering::{MeteringSnapshot, METER_FLOOR_DB};
use crate::rack::RackSnapshot;

/// Result of an offline render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub buffer: AudioBuffer,
    pub metering: MeteringSnapshot,
    /// Hex SHA-256 over the output samples
    pub digest: String,
    /// Latency of the active modules, reported and not compensated
    pub latency_samples: usize,
}

/// Summary of a render, without the audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSummary {
    pub digest: String,
    pub latency_samples: usize,
    pub frames: usize,
    pub metering: MeteringSnapshot,
}

impl From<&RenderOutput> for RenderSummary {
    fn from(output: &RenderOutput) -> Self {
        Self {
            digest: output.digest.clone(),
            latency_samples: output.latency_samples,
            frames: output.buffer.len(),
            metering: output.metering.clone(),
        }
    }
}

/// Render `buffer` through `snapshot`
///
/// # Errors
/// * `EmptyAudio` / `InvalidAudio` - the buffer cannot be processed
pub fn render(buffer: &AudioBuffer, snapshot: &RackSnapshot, block_size: usize) -> Result<RenderOutput> {
    render_with_cancel(buffer, snapshot, block_size, &AtomicBool::new(false))
}

/// [`render`], checking `cancel` between blocks
///
/// # Errors
/// * `ExportCancelled` - `cancel` was set before the last block finished
pub fn render_with_cancel(
    buffer: &AudioBuffer,
    snapshot: &RackSnapshot,
    block_size: usize,
    cancel: &AtomicBool,
) -> Result<RenderOutput> {
    buffer.validate()?;
    if buffer.sample_rate == 0 {
        return Err(RackError::InvalidAudio {
            reason: "sample rate is zero".to_string(),
        });
    }

    let block_size = block_size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);
    let sample_rate = buffer.sample_rate as f32;

    let mut readouts: BTreeMap<String, Arc<ModuleReadout>> = BTreeMap::new();
    let mut graph = ProcessorGraph::build(snapshot, sample_rate, block_size, 0.0, |id| {
        Arc::clone(readouts.entry(id.to_string()).or_default())
    });
    graph.snap();

    info!(
        frames = buffer.len(),
        channels = buffer.channels(),
        modules = snapshot.len(),
        revision = snapshot.revision,
        block_size,
        "offline render started"
    );

    let mut output = buffer.clone();
    let mut block =
        AudioBuffer::from_channels(vec![vec![0.0; block_size]; buffer.channels()], buffer.sample_rate)?;

    let mut offset = 0;
    while offset < buffer.len() {
        if cancel.load(Ordering::Relaxed) {
            info!(offset, "offline render cancelled");
            return Err(RackError::ExportCancelled);
        }
        let frames = (buffer.len() - offset).min(block_size);
        block.set_len(frames);
        block.copy_from(buffer, offset);
        graph.process(&mut block);
        for (ch, samples) in output.samples.iter_mut().enumerate() {
            samples[offset..offset + frames].copy_from_slice(block.channel(ch));
        }
        offset += frames;
    }

    let master = MasterReadout::default();
    master.set_peaks(buffer.peak(), output.peak());
    let order = snapshot.modules.iter().map(|m| m.id());
    let metering = MeteringSnapshot::capture(
        &master,
        order.filter_map(|id| readouts.get(id).map(|r| (id, r.as_ref()))),
        METER_FLOOR_DB,
    );

    let digest = output_digest(&output);
    let latency_samples = graph.latency_samples();
    debug!(digest = %digest, latency_samples, "offline render finished");

    Ok(RenderOutput {
        buffer: output,
        metering,
        digest,
        latency_samples,
    })
}

/// Hex SHA-256 over every sample, channel by channel, as little-endian f32
pub fn output_digest(buffer: &AudioBuffer) -> String {
    let mut hasher = Sha256::new();
    for channel in &buffer.samples {
        for sample in channel {
            hasher.update(sample.to_le_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}
