//! Processor graph
//!
//! A built, prepared chain: one node per rack module in rack order, each with
//! its processor, parameter smoother and readout cell. Graphs are built on the
//! control side (where allocation is fine) and handed whole to an executor.

use std::sync::Arc;

use crate::dsp::processor::{ProcessContext, Processor};
use crate::dsp::registry::ModuleType;
use crate::dsp::smoothing::ParamSmoother;
use crate::engine::buffer::AudioBuffer;
use crate::metering::readout::ModuleReadout;
use crate::rack::RackSnapshot;

/// One module in a built chain
pub struct ChainNode {
    id: String,
    module_type: ModuleType,
    bypassed: bool,
    processor: Box<dyn Processor>,
    smoother: ParamSmoother,
    readout: Arc<ModuleReadout>,
}

impl ChainNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn module_type(&self) -> ModuleType {
        self.module_type
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    pub fn readout(&self) -> &Arc<ModuleReadout> {
        &self.readout
    }

    /// Current (smoothed) parameter values
    pub fn values(&self) -> &[f32] {
        self.smoother.values()
    }
}

impl std::fmt::Debug for ChainNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainNode")
            .field("id", &self.id)
            .field("module_type", &self.module_type)
            .field("bypassed", &self.bypassed)
            .finish_non_exhaustive()
    }
}

/// Prepared processors for one rack topology
#[derive(Debug)]
pub struct ProcessorGraph {
    nodes: Vec<ChainNode>,
    sample_rate: f32,
    max_block: usize,
    generation: u64,
}

impl ProcessorGraph {
    /// An empty chain: audio passes straight through
    pub fn empty(sample_rate: f32, max_block: usize) -> Self {
        Self {
            nodes: Vec::new(),
            sample_rate,
            max_block,
            generation: 0,
        }
    }

    /// Build and prepare a processor for every module in `snapshot`
    ///
    /// `readout_for` supplies the readout cell for a module id, so cells can
    /// outlive a single topology.
    pub fn build(
        snapshot: &RackSnapshot,
        sample_rate: f32,
        max_block: usize,
        tau_ms: f32,
        mut readout_for: impl FnMut(&str) -> Arc<ModuleReadout>,
    ) -> Self {
        let nodes = snapshot
            .modules
            .iter()
            .map(|module| {
                let module_type = module.module_type();
                let mut processor = module_type.create_processor();
                processor.prepare(sample_rate, max_block);
                ChainNode {
                    id: module.id().to_string(),
                    module_type,
                    bypassed: module.is_bypassed(),
                    processor,
                    smoother: ParamSmoother::new(
                        module_type.descriptor().params,
                        module.values(),
                        tau_ms,
                    ),
                    readout: readout_for(module.id()),
                }
            })
            .collect();

        Self {
            nodes,
            sample_rate,
            max_block,
            generation: 0,
        }
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    pub fn nodes(&self) -> &[ChainNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Take over processor state and glide positions from the graph being replaced
    ///
    /// Nodes match by id and type. Matched processors are swapped, so the old
    /// graph ends up holding the fresh ones and can be dropped off the audio
    /// thread. Nothing is adopted across a sample-rate change.
    pub fn adopt_state(&mut self, previous: &mut ProcessorGraph) {
        if previous.sample_rate != self.sample_rate {
            return;
        }
        for node in &mut self.nodes {
            let Some(old) = previous
                .nodes
                .iter_mut()
                .find(|old| old.id == node.id && old.module_type == node.module_type)
            else {
                continue;
            };
            std::mem::swap(&mut node.processor, &mut old.processor);
            node.smoother.continue_from(&old.smoother);
        }
    }

    /// Retarget one parameter of the node at `index`
    pub fn set_param(&mut self, index: usize, param: usize, value: f32) {
        if let Some(node) = self.nodes.get_mut(index) {
            node.smoother.set_target(param, value);
        }
    }

    /// Bypass or re-enable the node at `index`
    ///
    /// A re-enabled node starts from cleared state rather than a stale tail.
    pub fn set_bypass(&mut self, index: usize, bypassed: bool) {
        let Some(node) = self.nodes.get_mut(index) else {
            return;
        };
        if node.bypassed && !bypassed {
            node.processor.reset();
        }
        node.bypassed = bypassed;
    }

    /// Put every smoother on its target
    pub fn snap(&mut self) {
        for node in &mut self.nodes {
            node.smoother.snap();
        }
    }

    /// Clear every processor's tails and detectors
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.processor.reset();
            node.readout.clear();
        }
    }

    /// Run one block through every active node in order
    pub fn process(&mut self, block: &mut AudioBuffer) {
        let frames = block.len();
        for node in self.nodes.iter_mut().filter(|n| !n.bypassed) {
            node.smoother.configure(self.sample_rate, frames);
            node.smoother.advance();
            let ctx = ProcessContext {
                sample_rate: self.sample_rate,
                readout: &node.readout,
            };
            node.processor.process(block, node.smoother.values(), &ctx);
        }
    }

    /// Summed latency of the active nodes at their current values
    pub fn latency_samples(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| !n.bypassed)
            .map(|n| n.module_type.latency_samples(n.smoother.values(), self.sample_rate))
            .sum()
    }
}
