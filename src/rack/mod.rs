//! Rack model
//!
//! An ordered list of module instances with strict left-to-right signal flow.
//! Every mutation is synchronous, runs no DSP, and bumps the revision when it
//! changes something. Subscribers receive a [`RackEvent`] per change.
//!
//! Module-id misses are no-ops; out-of-range parameter values are clamped.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::dsp::registry::ModuleType;
use crate::error::{RackError, Result};

// ============================================================================
// Rack Module
// ============================================================================

/// One module instance in the rack
///
/// Parameter values are kept in descriptor order and always lie inside their
/// descriptor's range. Processor state never lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ModuleRecord", try_from = "ModuleRecord")]
pub struct RackModule {
    id: String,
    module_type: ModuleType,
    bypassed: bool,
    values: Vec<f32>,
}

impl RackModule {
    /// New instance with a fresh id and default parameters
    pub fn new(module_type: ModuleType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            module_type,
            bypassed: false,
            values: module_type.descriptor().defaults(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn module_type(&self) -> ModuleType {
        self.module_type
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    /// Parameter values in descriptor order
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn param(&self, name: &str) -> Option<f32> {
        self.module_type
            .param_index(name)
            .and_then(|i| self.values.get(i).copied())
    }

    /// Parameter map keyed by name
    pub fn params(&self) -> BTreeMap<&'static str, f32> {
        self.module_type
            .descriptor()
            .params
            .iter()
            .zip(&self.values)
            .map(|(p, v)| (p.name, *v))
            .collect()
    }

    /// Clamp and store a value; returns (index, applied value)
    fn set_param(&mut self, name: &str, value: f32) -> Result<(usize, f32)> {
        let descriptor = self.module_type.descriptor();
        let index = descriptor
            .param_index(name)
            .ok_or_else(|| RackError::UnknownParameter {
                module_type: self.module_type.to_string(),
                param: name.to_string(),
            })?;
        let applied = descriptor.params[index].clamp(value);
        self.values[index] = applied;
        Ok((index, applied))
    }
}

/// Wire form of a module: parameters as a name map
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModuleRecord {
    id: String,
    #[serde(rename = "type")]
    module_type: ModuleType,
    #[serde(default)]
    bypass: bool,
    #[serde(default)]
    params: BTreeMap<String, f32>,
}

impl From<RackModule> for ModuleRecord {
    fn from(module: RackModule) -> Self {
        let params = module
            .params()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        Self {
            id: module.id,
            module_type: module.module_type,
            bypass: module.bypassed,
            params,
        }
    }
}

impl TryFrom<ModuleRecord> for RackModule {
    type Error = RackError;

    /// Missing parameters take their defaults; values are clamped
    fn try_from(record: ModuleRecord) -> Result<Self> {
        let mut module = RackModule {
            id: record.id,
            module_type: record.module_type,
            bypassed: record.bypass,
            values: record.module_type.descriptor().defaults(),
        };
        for (name, value) in &record.params {
            module.set_param(name, *value)?;
        }
        Ok(module)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Change notification sent to rack subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RackEvent {
    ModuleAdded {
        id: String,
        module_type: ModuleType,
        index: usize,
    },
    ModuleRemoved {
        id: String,
        index: usize,
    },
    ModuleMoved {
        id: String,
        from: usize,
        to: usize,
    },
    BypassChanged {
        id: String,
        bypassed: bool,
    },
    ParamChanged {
        id: String,
        param: String,
        index: usize,
        value: f32,
    },
    /// The whole rack was replaced by an import
    Loaded {
        len: usize,
    },
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable copy of a rack at one revision
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RackSnapshot {
    pub revision: u64,
    pub modules: Vec<RackModule>,
}

impl RackSnapshot {
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RackModule> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Modules that will actually process audio
    pub fn active(&self) -> impl Iterator<Item = &RackModule> {
        self.modules.iter().filter(|m| !m.bypassed)
    }

    /// Total latency of the active modules at `sample_rate`
    pub fn latency_samples(&self, sample_rate: f32) -> usize {
        self.active()
            .map(|m| m.module_type.latency_samples(&m.values, sample_rate))
            .sum()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.id()).collect()
    }
}

// ============================================================================
// Rack
// ============================================================================

/// Ordered module collection with change notification
#[derive(Debug, Default)]
pub struct Rack {
    modules: Vec<RackModule>,
    revision: u64,
    subscribers: Vec<Sender<RackEvent>>,
}

impl Rack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module of the named type; returns its id
    pub fn add_module(&mut self, module_type: &str) -> Result<String> {
        let module_type: ModuleType = module_type.parse()?;
        Ok(self.add(module_type))
    }

    /// Append a module; returns its id
    pub fn add(&mut self, module_type: ModuleType) -> String {
        let module = RackModule::new(module_type);
        let id = module.id.clone();
        let index = self.modules.len();
        self.modules.push(module);
        info!(id = %id, module_type = %module_type, index, "module added");
        self.changed(RackEvent::ModuleAdded {
            id: id.clone(),
            module_type,
            index,
        });
        id
    }

    /// Remove a module; returns whether it was present
    pub fn remove_module(&mut self, id: &str) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let module = self.modules.remove(index);
        info!(id = %module.id, index, "module removed");
        self.changed(RackEvent::ModuleRemoved {
            id: module.id,
            index,
        });
        true
    }

    /// Move the module at `from` so it ends up at `to`
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.modules.len();
        for index in [from, to] {
            if index >= len {
                return Err(RackError::IndexOutOfRange { index, len });
            }
        }
        if from == to {
            return Ok(());
        }

        let module = self.modules.remove(from);
        let id = module.id.clone();
        self.modules.insert(to, module);
        debug!(id = %id, from, to, "module moved");
        self.changed(RackEvent::ModuleMoved { id, from, to });
        Ok(())
    }

    /// Flip a module's bypass flag; returns the new state
    pub fn toggle_bypass(&mut self, id: &str) -> Option<bool> {
        let bypassed = !self.get(id)?.bypassed;
        self.set_bypass(id, bypassed);
        Some(bypassed)
    }

    pub fn set_bypass(&mut self, id: &str, bypassed: bool) {
        let Some(module) = self.modules.iter_mut().find(|m| m.id == id) else {
            return;
        };
        if module.bypassed == bypassed {
            return;
        }
        module.bypassed = bypassed;
        debug!(id, bypassed, "bypass changed");
        self.changed(RackEvent::BypassChanged {
            id: id.to_string(),
            bypassed,
        });
    }

    /// Set a parameter, clamped into range
    ///
    /// Returns the applied value, or `None` when no module has this id.
    pub fn update_param(&mut self, id: &str, name: &str, value: f32) -> Result<Option<f32>> {
        let Some(module) = self.modules.iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };
        let (index, applied) = module.set_param(name, value)?;
        self.changed(RackEvent::ParamChanged {
            id: id.to_string(),
            param: name.to_string(),
            index,
            value: applied,
        });
        Ok(Some(applied))
    }

    pub fn get(&self, id: &str) -> Option<&RackModule> {
        self.modules.iter().find(|m| m.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RackModule> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.id.clone()).collect()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> Arc<RackSnapshot> {
        Arc::new(RackSnapshot {
            revision: self.revision,
            modules: self.modules.clone(),
        })
    }

    /// Receive every subsequent change
    pub fn subscribe(&mut self) -> Receiver<RackEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Serialize the module list
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.modules)?)
    }

    /// Replace the module list from JSON
    ///
    /// The rack is left untouched if any entry is invalid or ids repeat.
    pub fn load_json(&mut self, json: &str) -> Result<()> {
        let modules: Vec<RackModule> = serde_json::from_str(json)?;
        let mut seen = HashSet::new();
        for module in &modules {
            if !seen.insert(module.id.as_str()) {
                return Err(RackError::InvalidConfig {
                    reason: format!("duplicate module id {}", module.id),
                });
            }
        }
        self.modules = modules;
        info!(len = self.modules.len(), "rack loaded");
        self.changed(RackEvent::Loaded {
            len: self.modules.len(),
        });
        Ok(())
    }

    fn changed(&mut self, event: RackEvent) {
        self.revision += 1;
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rack_of(types: &[ModuleType]) -> (Rack, Vec<String>) {
        let mut rack = Rack::new();
        let ids = types.iter().map(|t| rack.add(*t)).collect();
        (rack, ids)
    }

    #[test]
    fn test_add_module_defaults() {
        let mut rack = Rack::new();
        let id = rack.add_module("compressor").unwrap();
        let module = rack.get(&id).unwrap();

        assert_eq!(module.module_type(), ModuleType::Compressor);
        assert!(!module.is_bypassed());
        assert_eq!(module.param("threshold"), Some(-24.0));
        assert_eq!(module.values(), ModuleType::Compressor.descriptor().defaults());
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_add_unknown_type() {
        let mut rack = Rack::new();
        let err = rack.add_module("flanger").unwrap_err();
        assert!(matches!(err, RackError::UnknownType { .. }));
        assert!(rack.is_empty());
        assert_eq!(rack.revision(), 0);
    }

    #[test]
    fn test_ids_are_unique() {
        let (rack, ids) = rack_of(&[ModuleType::Limiter; 8]);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 8);
        assert_eq!(rack.len(), 8);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let (mut rack, _) = rack_of(&[ModuleType::Chorus]);
        let revision = rack.revision();
        assert!(!rack.remove_module("nope"));
        assert_eq!(rack.len(), 1);
        assert_eq!(rack.revision(), revision);
    }

    #[test]
    fn test_add_then_remove_restores_order() {
        let (mut rack, ids) = rack_of(&[ModuleType::Compressor, ModuleType::Limiter]);
        let added = rack.add(ModuleType::Phaser);
        assert!(rack.remove_module(&added));
        assert_eq!(rack.ids(), ids);
    }

    #[test]
    fn test_reorder_moves_single_element() {
        let (mut rack, ids) = rack_of(&[
            ModuleType::Compressor,
            ModuleType::ParametricEq,
            ModuleType::Limiter,
        ]);
        rack.reorder(0, 2).unwrap();
        assert_eq!(rack.ids(), vec![ids[1].clone(), ids[2].clone(), ids[0].clone()]);

        rack.reorder(2, 0).unwrap();
        assert_eq!(rack.ids(), ids);
    }

    #[test]
    fn test_reorder_out_of_range() {
        let (mut rack, ids) = rack_of(&[ModuleType::Compressor, ModuleType::Limiter]);
        let err = rack.reorder(0, 2).unwrap_err();
        assert!(matches!(err, RackError::IndexOutOfRange { index: 2, len: 2 }));
        assert!(rack.reorder(5, 0).is_err());
        assert_eq!(rack.ids(), ids);
    }

    #[test]
    fn test_update_param_clamps() {
        let (mut rack, ids) = rack_of(&[ModuleType::Compressor]);
        let id = &ids[0];

        assert_eq!(rack.update_param(id, "threshold", -100.0).unwrap(), Some(-60.0));
        assert_eq!(rack.update_param(id, "ratio", 50.0).unwrap(), Some(20.0));
        assert_eq!(rack.update_param(id, "knee", f32::NAN).unwrap(), Some(5.0));
        assert_eq!(rack.get(id).unwrap().param("threshold"), Some(-60.0));
    }

    #[test]
    fn test_update_param_unknown_name() {
        let (mut rack, ids) = rack_of(&[ModuleType::Limiter]);
        let err = rack.update_param(&ids[0], "drive", 1.0).unwrap_err();
        assert!(matches!(err, RackError::UnknownParameter { .. }));
        assert_eq!(err.error_code(), "UNKNOWN_PARAMETER");
    }

    #[test]
    fn test_update_param_missing_id_is_noop() {
        let (mut rack, _) = rack_of(&[ModuleType::Limiter]);
        let revision = rack.revision();
        assert_eq!(rack.update_param("ghost", "drive", 1.0).unwrap(), None);
        assert_eq!(rack.revision(), revision);
    }

    #[test]
    fn test_bypass() {
        let (mut rack, ids) = rack_of(&[ModuleType::Tremolo]);
        assert_eq!(rack.toggle_bypass(&ids[0]), Some(true));
        assert!(rack.get(&ids[0]).unwrap().is_bypassed());
        rack.set_bypass(&ids[0], false);
        assert!(!rack.get(&ids[0]).unwrap().is_bypassed());
        assert_eq!(rack.toggle_bypass("ghost"), None);
    }

    #[test]
    fn test_revision_counts_mutations() {
        let mut rack = Rack::new();
        let id = rack.add(ModuleType::Saturation);
        rack.update_param(&id, "drive", 2.0).unwrap();
        rack.toggle_bypass(&id);
        // unchanged bypass is not a mutation
        rack.set_bypass(&id, true);
        assert_eq!(rack.revision(), 3);
    }

    #[test]
    fn test_subscribers_receive_events() {
        let mut rack = Rack::new();
        let events = rack.subscribe();
        let id = rack.add(ModuleType::Bitcrusher);
        rack.update_param(&id, "bits", 4.0).unwrap();
        rack.remove_module(&id);

        let received: Vec<RackEvent> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                RackEvent::ModuleAdded {
                    id: id.clone(),
                    module_type: ModuleType::Bitcrusher,
                    index: 0,
                },
                RackEvent::ParamChanged {
                    id: id.clone(),
                    param: "bits".to_string(),
                    index: 0,
                    value: 4.0,
                },
                RackEvent::ModuleRemoved { id, index: 0 },
            ]
        );
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut rack = Rack::new();
        drop(rack.subscribe());
        rack.add(ModuleType::Chorus);
        assert!(rack.subscribers.is_empty());
    }

    #[test]
    fn test_snapshot_is_frozen() {
        let (mut rack, ids) = rack_of(&[ModuleType::Limiter, ModuleType::Dithering]);
        let snapshot = rack.snapshot();
        rack.update_param(&ids[0], "ceiling", -3.0).unwrap();
        rack.set_bypass(&ids[1], true);

        assert_eq!(snapshot.get(&ids[0]).unwrap().param("ceiling"), Some(-0.1));
        assert_eq!(snapshot.active().count(), 2);
        assert_eq!(rack.snapshot().active().count(), 1);
        assert_eq!(snapshot.latency_samples(48000.0), 240);
    }

    #[test]
    fn test_json_round_trip() {
        let (mut rack, ids) = rack_of(&[ModuleType::Compressor, ModuleType::StereoImager]);
        rack.update_param(&ids[0], "ratio", 8.0).unwrap();
        rack.set_bypass(&ids[1], true);
        let json = rack.to_json().unwrap();

        let mut restored = Rack::new();
        restored.load_json(&json).unwrap();
        assert_eq!(restored.snapshot().modules, rack.snapshot().modules);
    }

    #[test]
    fn test_load_json_fills_defaults_and_clamps() {
        let json = r#"[{"id": "a", "type": "limiter", "params": {"ceiling": -99}}]"#;
        let mut rack = Rack::new();
        rack.load_json(json).unwrap();
        let module = rack.get("a").unwrap();
        assert_eq!(module.param("ceiling"), Some(-20.0));
        assert_eq!(module.param("threshold"), Some(-0.5));
        assert!(!module.is_bypassed());
    }

    #[test]
    fn test_load_json_rejects_bad_input() {
        let mut rack = Rack::new();
        rack.add(ModuleType::Chorus);
        let before = rack.ids();

        let unknown = r#"[{"id": "a", "type": "limiter", "params": {"drive": 1}}]"#;
        assert!(rack.load_json(unknown).is_err());
        let duplicate = r#"[{"id": "a", "type": "limiter"}, {"id": "a", "type": "chorus"}]"#;
        assert!(rack.load_json(duplicate).is_err());
        assert_eq!(rack.ids(), before);
    }
}
