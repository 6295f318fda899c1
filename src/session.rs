//! Session
//!
//! One explicitly owned object holding everything a client drives: the rack,
//! the control side of the real-time chain, the transport, the loaded audio,
//! the export worker and the provider client. Rack mutations are mirrored to
//! the real-time executor as they happen.
//!
//! The [`RealtimeExecutor`] is created with the session and handed to whoever
//! owns the audio callback via [`Session::take_executor`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::chain::{
    realtime_chain, render, ChainController, ChainEvent, ExportHandle, ExportResult, ExportWorker,
    RealtimeExecutor, RenderOutput,
};
use crate::config::EngineConfig;
use crate::dsp::registry::{descriptors, ModuleDescriptor, ModuleType};
use crate::engine::buffer::AudioBuffer;
use crate::engine::io::import_audio;
use crate::engine::transport::{PlaybackState, TransportManager, TransportState};
use crate::error::{RackError, Result};
use crate::metering::{LoudnessAnalysis, MeteringSnapshot};
use crate::provider::{BuiltinProvider, DspProvider, PendingResult, ProviderClient, ProviderRequest};
use crate::rack::{Rack, RackModule, RackSnapshot};

pub struct Session {
    config: EngineConfig,
    rack: Rack,
    controller: ChainController,
    executor: Option<RealtimeExecutor>,
    transport: TransportManager,
    source: Option<Arc<AudioBuffer>>,
    exports: ExportWorker,
    provider: ProviderClient,
}

impl Session {
    /// Session with the builtin provider
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_provider(config, BuiltinProvider::new())
    }

    pub fn with_provider<P: DspProvider + 'static>(config: EngineConfig, provider: P) -> Result<Self> {
        config.validate()?;
        let transport = TransportManager::new(config.sample_rate);
        let (controller, executor) = realtime_chain(config.realtime_settings(), transport.playhead());

        info!(
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            provider = provider.name(),
            "session started"
        );
        Ok(Self {
            config,
            rack: Rack::new(),
            controller,
            executor: Some(executor),
            transport,
            source: None,
            exports: ExportWorker::spawn()?,
            provider: ProviderClient::spawn(provider)?,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The audio-thread half; `None` once taken
    pub fn take_executor(&mut self) -> Option<RealtimeExecutor> {
        self.executor.take()
    }

    /// Descriptor table for every module type
    pub fn descriptors(&self) -> Vec<ModuleDescriptor> {
        descriptors()
    }

    // ------------------------------------------------------------------------
    // Rack
    // ------------------------------------------------------------------------

    pub fn rack(&self) -> &Rack {
        &self.rack
    }

    pub fn snapshot(&self) -> Arc<RackSnapshot> {
        self.rack.snapshot()
    }

    pub fn module(&self, id: &str) -> Option<&RackModule> {
        self.rack.get(id)
    }

    pub fn add_module(&mut self, module_type: &str) -> Result<String> {
        let id = self.rack.add_module(module_type)?;
        self.sync_topology()?;
        Ok(id)
    }

    pub fn add(&mut self, module_type: ModuleType) -> Result<String> {
        let id = self.rack.add(module_type);
        self.sync_topology()?;
        Ok(id)
    }

    pub fn remove_module(&mut self, id: &str) -> Result<bool> {
        if !self.rack.remove_module(id) {
            return Ok(false);
        }
        self.sync_topology()?;
        Ok(true)
    }

    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        let revision = self.rack.revision();
        self.rack.reorder(from, to)?;
        if self.rack.revision() != revision {
            self.sync_topology()?;
        }
        Ok(())
    }

    pub fn toggle_bypass(&mut self, id: &str) -> Result<Option<bool>> {
        let Some(bypassed) = self.rack.toggle_bypass(id) else {
            return Ok(None);
        };
        self.controller.set_bypass(id, bypassed)?;
        Ok(Some(bypassed))
    }

    pub fn set_bypass(&mut self, id: &str, bypassed: bool) -> Result<()> {
        self.rack.set_bypass(id, bypassed);
        if self.rack.get(id).is_some() {
            self.controller.set_bypass(id, bypassed)?;
        }
        Ok(())
    }

    /// Clamp and apply a parameter; the executor glides to the new value
    pub fn update_param(&mut self, id: &str, name: &str, value: f32) -> Result<Option<f32>> {
        let Some(applied) = self.rack.update_param(id, name, value)? else {
            return Ok(None);
        };
        if let Some(index) = self.rack.get(id).and_then(|m| m.module_type().param_index(name)) {
            self.controller.set_param(id, index, applied)?;
        }
        Ok(Some(applied))
    }

    /// Replace the whole rack from JSON
    pub fn load_rack_json(&mut self, json: &str) -> Result<()> {
        self.rack.load_json(json)?;
        self.sync_topology()
    }

    pub fn rack_json(&self) -> Result<String> {
        self.rack.to_json()
    }

    fn sync_topology(&mut self) -> Result<()> {
        let snapshot = self.rack.snapshot();
        self.controller.set_topology(&snapshot)
    }

    // ------------------------------------------------------------------------
    // Audio and transport
    // ------------------------------------------------------------------------

    /// Import a WAV file as the session's source
    pub fn load_audio(&mut self, path: &Path) -> Result<()> {
        let buffer = import_audio(path)?;
        info!(path = %path.display(), frames = buffer.len(), "audio loaded");
        self.load_buffer(buffer)
    }

    /// Install a buffer as the source; playback stops at zero
    pub fn load_buffer(&mut self, buffer: AudioBuffer) -> Result<()> {
        buffer.validate()?;
        if buffer.sample_rate != self.config.sample_rate {
            warn!(
                file_rate = buffer.sample_rate,
                engine_rate = self.config.sample_rate,
                "sample rate differs from the engine; playback is not resampled"
            );
        }
        let source = Arc::new(buffer);
        self.transport.load(source.len() as u64, source.sample_rate);
        self.controller.load_source(Arc::clone(&source))?;
        self.controller.reset()?;
        self.source = Some(source);
        Ok(())
    }

    pub fn source(&self) -> Option<&Arc<AudioBuffer>> {
        self.source.as_ref()
    }

    pub fn toggle_play(&mut self) -> bool {
        self.transport.toggle_play()
    }

    pub fn seek(&mut self, seconds: f64) {
        self.transport.seek(seconds);
    }

    /// Stop, rewind and clear every processor tail
    pub fn stop(&mut self) -> Result<()> {
        self.transport.stop();
        self.controller.reset()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.transport.playback_state()
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    // ------------------------------------------------------------------------
    // Metering and housekeeping
    // ------------------------------------------------------------------------

    /// Meters for the current topology
    pub fn metering_snapshot(&mut self) -> MeteringSnapshot {
        self.maintain();
        self.controller.metering_snapshot()
    }

    /// Flush held commands, free retired graphs and drain executor events
    pub fn maintain(&mut self) -> Vec<ChainEvent> {
        if let Err(err) = self.controller.flush() {
            warn!(error = %err, "chain executor is gone");
        }
        self.controller.collect_garbage();
        self.controller.poll_events()
    }

    /// Loudness and platform compliance of the loaded audio
    pub fn analyze(&self) -> Result<LoudnessAnalysis> {
        let source = self.source.as_ref().ok_or(RackError::NoAudioLoaded)?;
        Ok(LoudnessAnalysis::analyze(source))
    }

    // ------------------------------------------------------------------------
    // Offline
    // ------------------------------------------------------------------------

    /// Render the loaded audio through the current rack, in this thread
    pub fn render(&self) -> Result<RenderOutput> {
        let source = self.source.as_ref().ok_or(RackError::NoAudioLoaded)?;
        render(source, &self.rack.snapshot(), self.config.block_size)
    }

    /// Queue a render of the loaded audio through a snapshot taken now
    pub fn export_audio(&self, destination: impl Into<PathBuf>) -> Result<ExportHandle> {
        let source = self.source.as_ref().ok_or(RackError::NoAudioLoaded)?;
        self.exports.submit(
            Arc::clone(source),
            self.rack.snapshot(),
            destination.into(),
            self.config.export_format()?,
            self.config.block_size,
        )
    }

    pub fn try_export_result(&self) -> Option<ExportResult> {
        self.exports.try_result()
    }

    pub fn wait_export_result(&self, timeout: Duration) -> Result<Option<ExportResult>> {
        self.exports.wait_result(timeout)
    }

    // ------------------------------------------------------------------------
    // Provider
    // ------------------------------------------------------------------------

    /// Send a copy of the loaded audio to the provider
    pub fn request_provider(&self, request: ProviderRequest) -> Result<PendingResult> {
        let source = self.source.as_ref().ok_or(RackError::NoAudioLoaded)?;
        self.provider.request(request, source.as_ref().clone())
    }

    /// Run a provider transform and make its output the new source
    ///
    /// On error the loaded audio is left as it was.
    pub fn apply_provider(&mut self, request: ProviderRequest) -> Result<()> {
        let processed = self.request_provider(request)?.wait()?;
        info!(request = %request, "provider result installed");
        self.load_buffer(processed)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("modules", &self.rack.len())
            .field("revision", &self.rack.revision())
            .field("transport", &self.transport.state())
            .field("source_frames", &self.source.as_ref().map(|s| s.len()))
            .finish_non_exhaustive()
    }
}
