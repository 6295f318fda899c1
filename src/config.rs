//! Engine configuration
//!
//! Loaded from JSON; every field has a default, so a config file only names
//! what it changes.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chain::RealtimeSettings;
use crate::dsp::smoothing::DEFAULT_SMOOTHING_MS;
use crate::engine::buffer::{DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use crate::engine::io::ExportFormat;
use crate::error::{RackError, Result};
use crate::metering::METER_FLOOR_DB;

/// Longest accepted smoothing time constant
const MAX_SMOOTHING_MS: f32 = 1000.0;

/// Settings shared by the session, executors and CLI
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Real-time processing rate in Hz
    pub sample_rate: u32,
    /// Frames per block, 64..=4096
    pub block_size: usize,
    /// Parameter smoothing time constant
    pub smoothing_ms: f32,
    /// Level reported for unmeasured meters
    pub meter_floor_db: f32,
    /// Slots in the control-to-audio command queue
    pub control_queue_capacity: usize,
    /// 16, 24 or 32
    pub export_bit_depth: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            smoothing_ms: DEFAULT_SMOOTHING_MS,
            meter_floor_db: METER_FLOOR_DB,
            control_queue_capacity: 256,
            export_bit_depth: 24,
        }
    }
}

impl EngineConfig {
    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.display(), ?config, "loaded engine config");
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| -> Result<()> { Err(RackError::InvalidConfig { reason }) };

        if !(8000..=384_000).contains(&self.sample_rate) {
            return invalid(format!("sample rate {} Hz", self.sample_rate));
        }
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return invalid(format!(
                "block size {} (must be {}..={})",
                self.block_size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE
            ));
        }
        if !(0.0..=MAX_SMOOTHING_MS).contains(&self.smoothing_ms) {
            return invalid(format!("smoothing time {} ms", self.smoothing_ms));
        }
        if !self.meter_floor_db.is_finite() || self.meter_floor_db >= 0.0 {
            return invalid(format!("meter floor {} dB", self.meter_floor_db));
        }
        if self.control_queue_capacity == 0 {
            return invalid("control queue capacity is zero".to_string());
        }
        ExportFormat::new(self.export_bit_depth)?;
        Ok(())
    }

    /// Pull every field into its accepted range
    pub fn clamped(mut self) -> Self {
        let defaults = Self::default();
        self.sample_rate = self.sample_rate.clamp(8000, 384_000);
        self.block_size = self.block_size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);
        self.smoothing_ms = if self.smoothing_ms.is_nan() {
            defaults.smoothing_ms
        } else {
            self.smoothing_ms.clamp(0.0, MAX_SMOOTHING_MS)
        };
        if !self.meter_floor_db.is_finite() || self.meter_floor_db >= 0.0 {
            self.meter_floor_db = defaults.meter_floor_db;
        }
        self.control_queue_capacity = self.control_queue_capacity.max(1);
        if ExportFormat::new(self.export_bit_depth).is_err() {
            self.export_bit_depth = defaults.export_bit_depth;
        }
        self
    }

    pub fn export_format(&self) -> Result<ExportFormat> {
        ExportFormat::new(self.export_bit_depth)
    }

    pub fn realtime_settings(&self) -> RealtimeSettings {
        RealtimeSettings {
            sample_rate: self.sample_rate as f32,
            max_block: self.block_size,
            smoothing_ms: self.smoothing_ms,
            queue_capacity: self.control_queue_capacity,
            meter_floor_db: self.meter_floor_db,
        }
    }
}
