//! Real-time chain execution
//!
//! [`ChainController`] lives on the control thread and [`RealtimeExecutor`] on
//! the audio thread. Commands flow one way over a bounded channel; retired
//! graphs and sources come back on a second channel so they are freed off the
//! audio thread; overruns and swaps are reported on a third. The executor
//! never blocks: every channel operation on its side is `try_*`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::graph::ProcessorGraph;
use crate::engine::buffer::AudioBuffer;
use crate::engine::transport::Playhead;
use crate::error::{RackError, Result};
use crate::metering::readout::{MasterReadout, ModuleReadout};
use crate::metering::MeteringSnapshot;
use crate::rack::RackSnapshot;

/// Room on the retire and event channels
const RETURN_CAPACITY: usize = 64;

/// Control-to-audio message
///
/// Node-addressed commands carry the topology generation they were computed
/// against; the executor drops them if a different topology is installed.
#[derive(Debug)]
pub enum ChainCommand {
    SetTopology(Box<ProcessorGraph>),
    SetParam {
        generation: u64,
        node: usize,
        param: usize,
        value: f32,
    },
    SetBypass {
        generation: u64,
        node: usize,
        bypassed: bool,
    },
    /// Clear every processor's tails
    Reset,
    LoadSource(Arc<AudioBuffer>),
}

/// Audio-to-control notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChainEvent {
    /// A block took longer than its own duration
    Overrun {
        elapsed_us: u64,
        deadline_us: u64,
        frames: usize,
    },
    TopologySwapped {
        generation: u64,
    },
}

/// Something the audio thread is done with
#[derive(Debug)]
pub enum Retired {
    Graph(Box<ProcessorGraph>),
    Source(Arc<AudioBuffer>),
}

/// Executor settings fixed at creation
#[derive(Debug, Clone, Copy)]
pub struct RealtimeSettings {
    pub sample_rate: f32,
    pub max_block: usize,
    pub smoothing_ms: f32,
    pub queue_capacity: usize,
    pub meter_floor_db: f32,
}

/// Create a connected controller/executor pair
pub fn realtime_chain(
    settings: RealtimeSettings,
    playhead: Arc<Playhead>,
) -> (ChainController, RealtimeExecutor) {
    let (command_tx, command_rx) = bounded(settings.queue_capacity.max(1));
    let (retired_tx, retired_rx) = bounded(RETURN_CAPACITY);
    let (event_tx, event_rx) = bounded(RETURN_CAPACITY);
    let master = Arc::new(MasterReadout::default());

    let controller = ChainController {
        commands: command_tx,
        backlog: VecDeque::new(),
        retired: retired_rx,
        events: event_rx,
        readouts: HashMap::new(),
        master: Arc::clone(&master),
        node_ids: Vec::new(),
        generation: 0,
        settings,
    };
    let executor = RealtimeExecutor {
        graph: Box::new(ProcessorGraph::empty(settings.sample_rate, settings.max_block)),
        commands: command_rx,
        retired: retired_tx,
        events: event_tx,
        master,
        playhead,
        source: None,
    };
    (controller, executor)
}

// ============================================================================
// Control side
// ============================================================================

/// Control-thread handle to a running executor
#[derive(Debug)]
pub struct ChainController {
    commands: Sender<ChainCommand>,
    /// Commands that found the queue full, sent ahead of anything newer
    backlog: VecDeque<ChainCommand>,
    retired: Receiver<Retired>,
    events: Receiver<ChainEvent>,
    readouts: HashMap<String, Arc<ModuleReadout>>,
    master: Arc<MasterReadout>,
    /// Module ids of the installed topology, in node order
    node_ids: Vec<String>,
    generation: u64,
    settings: RealtimeSettings,
}

impl ChainController {
    /// Build a graph for `snapshot` and send it for a whole-chain swap
    pub fn set_topology(&mut self, snapshot: &RackSnapshot) -> Result<()> {
        self.generation += 1;
        self.readouts.retain(|id, _| snapshot.get(id).is_some());

        let readouts = &mut self.readouts;
        let graph = ProcessorGraph::build(
            snapshot,
            self.settings.sample_rate,
            self.settings.max_block,
            self.settings.smoothing_ms,
            |id| Arc::clone(readouts.entry(id.to_string()).or_default()),
        )
        .with_generation(self.generation);

        self.node_ids = snapshot.modules.iter().map(|m| m.id().to_string()).collect();
        info!(
            generation = self.generation,
            revision = snapshot.revision,
            modules = self.node_ids.len(),
            "sending chain topology"
        );
        self.send(ChainCommand::SetTopology(Box::new(graph)))
    }

    /// Retarget a parameter; ignored for modules not in the installed topology
    pub fn set_param(&mut self, id: &str, param: usize, value: f32) -> Result<()> {
        let Some(node) = self.node_index(id) else {
            return Ok(());
        };
        self.send(ChainCommand::SetParam {
            generation: self.generation,
            node,
            param,
            value,
        })
    }

    pub fn set_bypass(&mut self, id: &str, bypassed: bool) -> Result<()> {
        let Some(node) = self.node_index(id) else {
            return Ok(());
        };
        self.send(ChainCommand::SetBypass {
            generation: self.generation,
            node,
            bypassed,
        })
    }

    pub fn reset(&mut self) -> Result<()> {
        self.send(ChainCommand::Reset)
    }

    pub fn load_source(&mut self, source: Arc<AudioBuffer>) -> Result<()> {
        self.send(ChainCommand::LoadSource(source))
    }

    /// Queue a command without ever waiting on the audio thread
    pub fn send(&mut self, command: ChainCommand) -> Result<()> {
        self.flush()?;
        if !self.backlog.is_empty() {
            self.backlog.push_back(command);
            return Ok(());
        }
        match self.commands.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                debug!(backlog = self.backlog.len() + 1, "chain queue full, holding command");
                self.backlog.push_back(command);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(RackError::ChannelClosed {
                what: "chain commands",
            }),
        }
    }

    /// Push held commands into the queue; returns how many are still held
    pub fn flush(&mut self) -> Result<usize> {
        while let Some(command) = self.backlog.pop_front() {
            match self.commands.try_send(command) {
                Ok(()) => {}
                Err(TrySendError::Full(command)) => {
                    self.backlog.push_front(command);
                    break;
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(RackError::ChannelClosed {
                        what: "chain commands",
                    })
                }
            }
        }
        Ok(self.backlog.len())
    }

    /// Free whatever the audio thread has retired; returns the count
    pub fn collect_garbage(&mut self) -> usize {
        self.retired.try_iter().count()
    }

    /// Drain and log pending executor events
    pub fn poll_events(&mut self) -> Vec<ChainEvent> {
        let events: Vec<ChainEvent> = self.events.try_iter().collect();
        for event in &events {
            match event {
                ChainEvent::Overrun {
                    elapsed_us,
                    deadline_us,
                    frames,
                } => warn!(elapsed_us, deadline_us, frames, "audio block overran its deadline"),
                ChainEvent::TopologySwapped { generation } => {
                    debug!(generation, "chain topology swapped")
                }
            }
        }
        events
    }

    /// Readouts for the installed topology, in rack order
    pub fn metering_snapshot(&self) -> MeteringSnapshot {
        let readouts = &self.readouts;
        MeteringSnapshot::capture(
            &self.master,
            self.node_ids
                .iter()
                .filter_map(|id| readouts.get(id).map(|r| (id.as_str(), r.as_ref()))),
            self.settings.meter_floor_db,
        )
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn settings(&self) -> RealtimeSettings {
        self.settings
    }

    pub fn pending(&self) -> usize {
        self.backlog.len()
    }

    fn node_index(&self, id: &str) -> Option<usize> {
        self.node_ids.iter().position(|n| n == id)
    }
}

// ============================================================================
// Audio side
// ============================================================================

/// Runs the installed chain one block at a time
#[derive(Debug)]
pub struct RealtimeExecutor {
    graph: Box<ProcessorGraph>,
    commands: Receiver<ChainCommand>,
    retired: Sender<Retired>,
    events: Sender<ChainEvent>,
    master: Arc<MasterReadout>,
    playhead: Arc<Playhead>,
    source: Option<Arc<AudioBuffer>>,
}

impl RealtimeExecutor {
    /// Render the next block of the loaded source at the playhead
    ///
    /// Produces silence when nothing is playing.
    pub fn fill_block(&mut self, block: &mut AudioBuffer) {
        self.drain_commands();

        let position = self.playhead.position();
        let source = match &self.source {
            Some(source) if self.playhead.is_playing() => source,
            _ => {
                block.silence();
                self.master.set_peaks(0.0, 0.0);
                return;
            }
        };
        // the transport may already describe a source still queued behind this one
        if position >= source.len() as u64 {
            block.silence();
            self.master.set_peaks(0.0, 0.0);
            self.playhead.finish();
            return;
        }

        block.copy_from(source, position as usize);
        self.run(block);
        self.playhead.advance(position, block.len() as u64);
    }

    /// Process a caller-supplied block in place
    pub fn process_block(&mut self, block: &mut AudioBuffer) {
        self.drain_commands();
        self.run(block);
    }

    pub fn generation(&self) -> u64 {
        self.graph.generation()
    }

    fn run(&mut self, block: &mut AudioBuffer) {
        let started = Instant::now();
        let input_peak = block.peak();
        self.graph.process(block);
        self.master.set_peaks(input_peak, block.peak());

        let frames = block.len();
        let elapsed_us = started.elapsed().as_micros() as u64;
        let deadline_us = (frames as f64 * 1e6 / self.graph.sample_rate() as f64) as u64;
        if elapsed_us > deadline_us {
            // dropped when the control side is not keeping up
            let _ = self.events.try_send(ChainEvent::Overrun {
                elapsed_us,
                deadline_us,
                frames,
            });
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                ChainCommand::SetTopology(mut graph) => {
                    graph.adopt_state(&mut self.graph);
                    let generation = graph.generation();
                    let old = std::mem::replace(&mut self.graph, graph);
                    self.retire(Retired::Graph(old));
                    let _ = self.events.try_send(ChainEvent::TopologySwapped { generation });
                }
                ChainCommand::SetParam {
                    generation,
                    node,
                    param,
                    value,
                } if generation == self.graph.generation() => {
                    self.graph.set_param(node, param, value);
                }
                ChainCommand::SetBypass {
                    generation,
                    node,
                    bypassed,
                } if generation == self.graph.generation() => {
                    self.graph.set_bypass(node, bypassed);
                }
                ChainCommand::SetParam { .. } | ChainCommand::SetBypass { .. } => {}
                ChainCommand::Reset => {
                    self.graph.reset();
                    self.master.clear();
                }
                ChainCommand::LoadSource(source) => {
                    if let Some(old) = self.source.replace(source) {
                        self.retire(Retired::Source(old));
                    }
                }
            }
        }
    }

    /// Hand an object back for freeing; freed here only if the return path is full
    fn retire(&self, item: Retired) {
        if let Err(err) = self.retired.try_send(item) {
            drop(err.into_inner());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::registry::ModuleType;
    use crate::engine::buffer::ChannelLayout;
    use crate::engine::transport::TransportManager;
    use crate::metering::METER_FLOOR_DB;
    use crate::rack::Rack;

    fn settings(queue_capacity: usize) -> RealtimeSettings {
        RealtimeSettings {
            sample_rate: 48000.0,
            max_block: 512,
            smoothing_ms: 10.0,
            queue_capacity,
            meter_floor_db: METER_FLOOR_DB,
        }
    }

    fn constant(value: f32, frames: usize) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(frames, ChannelLayout::Stereo);
        for ch in 0..2 {
            buffer.channel_mut(ch).fill(value);
        }
        buffer
    }

    #[test]
    fn test_empty_chain_passes_audio() {
        let transport = TransportManager::new(48000);
        let (_controller, mut executor) = realtime_chain(settings(8), transport.playhead());
        let original = constant(0.25, 512);
        let mut block = original.clone();
        executor.process_block(&mut block);
        assert_eq!(block, original);
    }

    #[test]
    fn test_topology_swaps_at_block_start() {
        let transport = TransportManager::new(48000);
        let (mut controller, mut executor) = realtime_chain(settings(8), transport.playhead());
        let mut rack = Rack::new();
        let id = rack.add(ModuleType::Bitcrusher);
        rack.update_param(&id, "bits", 1.0).unwrap();

        controller.set_topology(&rack.snapshot()).unwrap();
        let mut block = constant(0.3, 512);
        executor.process_block(&mut block);

        assert_eq!(executor.generation(), controller.generation());
        // floor(0.3 * 2) / 2
        assert_eq!(block.get_sample(0, 100), Some(0.0));
        assert_eq!(controller.collect_garbage(), 1);
        assert!(controller
            .poll_events()
            .contains(&ChainEvent::TopologySwapped { generation: 1 }));
    }

    #[test]
    fn test_stale_generation_commands_are_dropped() {
        let transport = TransportManager::new(48000);
        let (mut controller, mut executor) = realtime_chain(settings(8), transport.playhead());
        let mut rack = Rack::new();
        let id = rack.add(ModuleType::Distortion);
        controller.set_topology(&rack.snapshot()).unwrap();
        executor.process_block(&mut constant(0.1, 64));

        controller
            .send(ChainCommand::SetBypass {
                generation: 0,
                node: 0,
                bypassed: true,
            })
            .unwrap();
        executor.process_block(&mut constant(0.1, 64));
        assert!(!executor.graph.nodes()[0].is_bypassed());

        controller.set_bypass(&id, true).unwrap();
        executor.process_block(&mut constant(0.1, 64));
        assert!(executor.graph.nodes()[0].is_bypassed());
    }

    #[test]
    fn test_full_queue_holds_commands_in_order() {
        let transport = TransportManager::new(48000);
        let (mut controller, mut executor) = realtime_chain(settings(1), transport.playhead());
        let mut rack = Rack::new();
        let id = rack.add(ModuleType::Distortion);
        controller.set_topology(&rack.snapshot()).unwrap();

        controller.set_bypass(&id, true).unwrap();
        controller.set_bypass(&id, false).unwrap();
        controller.set_bypass(&id, true).unwrap();
        assert_eq!(controller.pending(), 3);

        for _ in 0..4 {
            executor.process_block(&mut constant(0.1, 64));
            controller.flush().unwrap();
        }
        assert_eq!(controller.pending(), 0);
        assert!(executor.graph.nodes()[0].is_bypassed());
    }

    #[test]
    fn test_fill_block_follows_transport() {
        let mut transport = TransportManager::new(48000);
        let (mut controller, mut executor) = realtime_chain(settings(8), transport.playhead());
        controller
            .load_source(Arc::new(constant(0.5, 1000)))
            .unwrap();
        transport.load(1000, 48000);

        let mut block = AudioBuffer::new(512, ChannelLayout::Stereo);
        executor.fill_block(&mut block);
        assert_eq!(block.peak(), 0.0, "silent while stopped");

        transport.toggle_play();
        executor.fill_block(&mut block);
        assert_eq!(block.get_sample(1, 0), Some(0.5));
        assert_eq!(transport.playhead().position(), 512);

        executor.fill_block(&mut block);
        // past the end of the material the block is zero-filled
        assert_eq!(block.get_sample(0, 487), Some(0.5));
        assert_eq!(block.get_sample(0, 488), Some(0.0));
        assert!(!transport.is_playing());
    }

    #[test]
    fn test_metering_snapshot_reports_master_and_modules() {
        let transport = TransportManager::new(48000);
        let (mut controller, mut executor) = realtime_chain(settings(8), transport.playhead());
        let mut rack = Rack::new();
        let id = rack.add(ModuleType::Limiter);
        rack.update_param(&id, "threshold", -12.0).unwrap();
        controller.set_topology(&rack.snapshot()).unwrap();

        for _ in 0..20 {
            executor.process_block(&mut constant(0.9, 512));
        }
        let snapshot = controller.metering_snapshot();
        assert!(snapshot.input_peak_db > -1.0);
        assert!(snapshot.module(&id).unwrap().gain_reduction_db > 5.0);
    }

    #[test]
    fn test_missed_deadline_is_reported_and_block_still_runs() {
        // at this rate a 4096-frame block is due in well under a microsecond
        let settings = RealtimeSettings {
            sample_rate: 1.0e10,
            max_block: 4096,
            ..settings(8)
        };
        let transport = TransportManager::new(48000);
        let (mut controller, mut executor) = realtime_chain(settings, transport.playhead());
        let mut rack = Rack::new();
        rack.add(ModuleType::Compressor);
        let id = rack.add(ModuleType::Saturation);
        rack.update_param(&id, "drive", 10.0).unwrap();
        controller.set_topology(&rack.snapshot()).unwrap();

        let mut block = constant(0.25, 4096);
        executor.process_block(&mut block);
        for _ in 0..3 {
            executor.process_block(&mut constant(0.25, 4096));
        }

        assert_eq!(block.len(), 4096);
        for ch in 0..2 {
            assert!(block.channel(ch).iter().all(|s| *s != 0.25));
        }
        let overruns: Vec<ChainEvent> = controller
            .poll_events()
            .into_iter()
            .filter(|e| matches!(e, ChainEvent::Overrun { .. }))
            .collect();
        assert!(!overruns.is_empty());
        assert!(overruns.iter().all(|e| matches!(
            e,
            ChainEvent::Overrun {
                deadline_us: 0,
                frames: 4096,
                ..
            }
        )));
    }

    #[test]
    fn test_closed_executor_is_an_error() {
        let transport = TransportManager::new(48000);
        let (mut controller, executor) = realtime_chain(settings(8), transport.playhead());
        drop(executor);
        let err = controller.reset().unwrap_err();
        assert_eq!(err.error_code(), "CHANNEL_CLOSED");
    }
}
