//! Lock-free readout cells
//!
//! Processors on the audio thread publish into these; the control thread reads
//! them when building a [`MeteringSnapshot`](super::MeteringSnapshot). Values are
//! f32 bit patterns in `AtomicU32` with relaxed ordering: a reader may see a
//! value one block stale, which is fine for meters.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::METER_FLOOR_DB;

/// An `f32` that can be shared between threads without locking
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Per-module meter values
#[derive(Debug)]
pub struct ModuleReadout {
    gain_reduction: AtomicF32,
    momentary: AtomicF32,
    short_term: AtomicF32,
    reported: AtomicBool,
}

impl Default for ModuleReadout {
    fn default() -> Self {
        Self {
            gain_reduction: AtomicF32::new(0.0),
            momentary: AtomicF32::new(METER_FLOOR_DB),
            short_term: AtomicF32::new(METER_FLOOR_DB),
            reported: AtomicBool::new(false),
        }
    }
}

impl ModuleReadout {
    /// Gain reduction as a positive dB amount (0 = untouched)
    #[inline]
    pub fn set_gain_reduction(&self, db: f32) {
        self.gain_reduction.store(db.max(0.0));
        self.reported.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_loudness(&self, momentary_lufs: f32, short_term_lufs: f32) {
        self.momentary.store(momentary_lufs.max(METER_FLOOR_DB));
        self.short_term.store(short_term_lufs.max(METER_FLOOR_DB));
        self.reported.store(true, Ordering::Relaxed);
    }

    pub fn gain_reduction(&self) -> f32 {
        self.gain_reduction.load()
    }

    pub fn momentary(&self) -> f32 {
        self.momentary.load()
    }

    pub fn short_term(&self) -> f32 {
        self.short_term.load()
    }

    pub fn has_reported(&self) -> bool {
        self.reported.load(Ordering::Relaxed)
    }

    /// Return every value to its floor
    pub fn clear(&self) {
        self.gain_reduction.store(0.0);
        self.momentary.store(METER_FLOOR_DB);
        self.short_term.store(METER_FLOOR_DB);
        self.reported.store(false, Ordering::Relaxed);
    }
}

/// Master input/output peak levels in dBFS
#[derive(Debug)]
pub struct MasterReadout {
    input_peak: AtomicF32,
    output_peak: AtomicF32,
}

impl Default for MasterReadout {
    fn default() -> Self {
        Self {
            input_peak: AtomicF32::new(METER_FLOOR_DB),
            output_peak: AtomicF32::new(METER_FLOOR_DB),
        }
    }
}

impl MasterReadout {
    /// Publish linear peaks for the last pass
    #[inline]
    pub fn set_peaks(&self, input_linear: f32, output_linear: f32) {
        self.input_peak.store(peak_to_db(input_linear));
        self.output_peak.store(peak_to_db(output_linear));
    }

    pub fn input_peak(&self) -> f32 {
        self.input_peak.load()
    }

    pub fn output_peak(&self) -> f32 {
        self.output_peak.load()
    }

    pub fn clear(&self) {
        self.input_peak.store(METER_FLOOR_DB);
        self.output_peak.store(METER_FLOOR_DB);
    }
}

#[inline]
fn peak_to_db(linear: f32) -> f32 {
    if linear > 0.0 {
        (20.0 * linear.log10()).max(METER_FLOOR_DB)
    } else {
        METER_FLOOR_DB
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_f32() {
        let cell = AtomicF32::new(1.5);
        assert_eq!(cell.load(), 1.5);
        cell.store(-3.25);
        assert_eq!(cell.load(), -3.25);
    }

    #[test]
    fn test_module_readout_floors() {
        let readout = ModuleReadout::default();
        assert!(!readout.has_reported());
        assert_eq!(readout.momentary(), METER_FLOOR_DB);

        readout.set_loudness(-500.0, -14.0);
        assert_eq!(readout.momentary(), METER_FLOOR_DB);
        assert_eq!(readout.short_term(), -14.0);
        assert!(readout.has_reported());

        readout.set_gain_reduction(-2.0);
        assert_eq!(readout.gain_reduction(), 0.0);

        readout.clear();
        assert!(!readout.has_reported());
    }

    #[test]
    fn test_master_peaks() {
        let master = MasterReadout::default();
        master.set_peaks(1.0, 0.0);
        assert!(master.input_peak().abs() < 1e-6);
        assert_eq!(master.output_peak(), METER_FLOOR_DB);
    }
}
