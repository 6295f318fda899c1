//! Metering subsystem
//!
//! Processors publish into lock-free [`readout`] cells while audio runs; the
//! control side folds those cells into an immutable [`MeteringSnapshot`]. The
//! [`loudness`] module covers whole-buffer analysis and platform compliance.

pub mod loudness;
pub mod readout;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use loudness::{ComplianceReport, LoudnessAnalysis, Platform};
pub use readout::{MasterReadout, ModuleReadout};

/// Value reported for any level that has not been measured yet, in dB / LUFS
pub const METER_FLOOR_DB: f32 = -100.0;

/// One module's meter values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleMeter {
    /// Positive dB of reduction; 0 when the module is idle or not a dynamics type
    pub gain_reduction_db: f32,
    pub momentary_lufs: f32,
    pub short_term_lufs: f32,
}

impl ModuleMeter {
    fn read(readout: &ModuleReadout, floor: f32) -> Self {
        Self {
            gain_reduction_db: readout.gain_reduction(),
            momentary_lufs: readout.momentary().max(floor),
            short_term_lufs: readout.short_term().max(floor),
        }
    }
}

/// Immutable meter state for one processing pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeteringSnapshot {
    pub input_peak_db: f32,
    pub output_peak_db: f32,
    /// Keyed by module id
    pub modules: BTreeMap<String, ModuleMeter>,
}

impl Default for MeteringSnapshot {
    fn default() -> Self {
        Self {
            input_peak_db: METER_FLOOR_DB,
            output_peak_db: METER_FLOOR_DB,
            modules: BTreeMap::new(),
        }
    }
}

impl MeteringSnapshot {
    /// Fold master and per-module readouts into a snapshot
    ///
    /// `floor` raises every level below it (use [`METER_FLOOR_DB`] unless the
    /// configuration says otherwise).
    pub fn capture<'a>(
        master: &MasterReadout,
        modules: impl IntoIterator<Item = (&'a str, &'a ModuleReadout)>,
        floor: f32,
    ) -> Self {
        Self {
            input_peak_db: master.input_peak().max(floor),
            output_peak_db: master.output_peak().max(floor),
            modules: modules
                .into_iter()
                .map(|(id, readout)| (id.to_string(), ModuleMeter::read(readout, floor)))
                .collect(),
        }
    }

    pub fn module(&self, id: &str) -> Option<&ModuleMeter> {
        self.modules.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unreported_values_sit_at_floor() {
        let master = MasterReadout::default();
        let readout = ModuleReadout::default();
        let snapshot = MeteringSnapshot::capture(&master, [("a", &readout)], METER_FLOOR_DB);

        assert_eq!(snapshot.input_peak_db, METER_FLOOR_DB);
        assert_eq!(snapshot.output_peak_db, METER_FLOOR_DB);
        assert_eq!(
            snapshot.module("a"),
            Some(&ModuleMeter {
                gain_reduction_db: 0.0,
                momentary_lufs: METER_FLOOR_DB,
                short_term_lufs: METER_FLOOR_DB,
            })
        );
        assert!(snapshot.module("b").is_none());
    }

    #[test]
    fn test_capture_reads_published_values() {
        let master = MasterReadout::default();
        master.set_peaks(1.0, 0.5);
        let readout = ModuleReadout::default();
        readout.set_gain_reduction(4.5);
        readout.set_loudness(-14.0, -15.0);

        let snapshot = MeteringSnapshot::capture(&master, [("m", &readout)], METER_FLOOR_DB);
        assert_eq!(snapshot.input_peak_db, 0.0);
        assert!((snapshot.output_peak_db + 6.0206).abs() < 1e-3);
        let meter = snapshot.module("m").unwrap();
        assert_eq!(meter.gain_reduction_db, 4.5);
        assert_eq!(meter.momentary_lufs, -14.0);
        assert_eq!(meter.short_term_lufs, -15.0);
    }

    #[test]
    fn test_custom_floor() {
        let master = MasterReadout::default();
        let snapshot = MeteringSnapshot::capture(&master, std::iter::empty(), -60.0);
        assert_eq!(snapshot.input_peak_db, -60.0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = MeteringSnapshot::default();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: MeteringSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
