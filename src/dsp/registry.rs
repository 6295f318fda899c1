//! Module descriptor table
//!
//! Every rack module type, its parameters (name, default, range, kind), and the
//! constructor for its processor live in one static table indexed by
//! [`ModuleType`]. The table is the contract handed to clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::processor::Processor;
use super::{
    Autowah, Bitcrusher, CabinetSim, Chorus, Compressor, DeEsser, Distortion, Dithering,
    DynamicEq, FeedbackDelay, Limiter, LoudnessMeter, MidSideEq, MultibandCompressor,
    ParametricEq, Phaser, Saturation, StereoImager, TransientShaper, Tremolo,
};
use crate::error::{RackError, Result};

/// Whether a parameter glides or jumps when changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Continuous,
    /// Selectors, stage counts, bit depths: applied at the next block boundary
    Discrete,
}

/// One named parameter of a module type
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterDescriptor {
    pub name: &'static str,
    pub default: f32,
    pub min: f32,
    pub max: f32,
    pub kind: ParamKind,
}

impl ParameterDescriptor {
    const fn continuous(name: &'static str, default: f32, min: f32, max: f32) -> Self {
        Self {
            name,
            default,
            min,
            max,
            kind: ParamKind::Continuous,
        }
    }

    const fn discrete(name: &'static str, default: f32, min: f32, max: f32) -> Self {
        Self {
            name,
            default,
            min,
            max,
            kind: ParamKind::Discrete,
        }
    }

    /// Clamp a value into this parameter's range; NaN becomes the default
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

/// Descriptor for one module type
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModuleDescriptor {
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub params: &'static [ParameterDescriptor],
}

impl ModuleDescriptor {
    pub fn param(&self, name: &str) -> Option<&'static ParameterDescriptor> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Default values in descriptor order
    pub fn defaults(&self) -> Vec<f32> {
        self.params.iter().map(|p| p.default).collect()
    }
}

// ============================================================================
// Module Types
// ============================================================================

/// Closed set of rack module types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleType {
    Compressor,
    MultibandCompressor,
    DeEsser,
    Limiter,
    TransientShaper,
    ParametricEq,
    DynamicEq,
    MidsideEq,
    Saturation,
    Distortion,
    Bitcrusher,
    Chorus,
    Phaser,
    Tremolo,
    Autowah,
    StereoImager,
    FeedbackDelay,
    CabinetSim,
    LoudnessMeter,
    Dithering,
}

impl ModuleType {
    /// Every module type, in table order
    pub const ALL: [ModuleType; 20] = [
        ModuleType::Compressor,
        ModuleType::MultibandCompressor,
        ModuleType::DeEsser,
        ModuleType::Limiter,
        ModuleType::TransientShaper,
        ModuleType::ParametricEq,
        ModuleType::DynamicEq,
        ModuleType::MidsideEq,
        ModuleType::Saturation,
        ModuleType::Distortion,
        ModuleType::Bitcrusher,
        ModuleType::Chorus,
        ModuleType::Phaser,
        ModuleType::Tremolo,
        ModuleType::Autowah,
        ModuleType::StereoImager,
        ModuleType::FeedbackDelay,
        ModuleType::CabinetSim,
        ModuleType::LoudnessMeter,
        ModuleType::Dithering,
    ];

    #[inline]
    fn entry(self) -> &'static ModuleEntry {
        &MODULE_TABLE[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.entry().name
    }

    pub fn descriptor(self) -> ModuleDescriptor {
        ModuleDescriptor {
            module_type: self,
            params: self.entry().params,
        }
    }

    pub fn param_index(self, name: &str) -> Option<usize> {
        self.descriptor().param_index(name)
    }

    /// Build a fresh processor for this type
    pub fn create_processor(self) -> Box<dyn Processor> {
        (self.entry().build)()
    }

    /// Latency this module adds at the given parameter values
    ///
    /// Only the limiter's lookahead delays the signal. The executors report the
    /// sum but do not compensate for it.
    pub fn latency_samples(self, params: &[f32], sample_rate: f32) -> usize {
        match self {
            ModuleType::Limiter => params
                .get(super::limiter::LOOKAHEAD)
                .map(|ms| (ms.max(0.0) * 0.001 * sample_rate).round() as usize)
                .unwrap_or(0),
            _ => 0,
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleType {
    type Err = RackError;

    /// Accepts the kebab-case names plus upper snake case (`DE_ESSER`)
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let normalized = match normalized.as_str() {
            "mid/side-eq" | "mid-side-eq" => "midside-eq",
            "cab-sim" => "cabinet-sim",
            other => other,
        };
        ModuleType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| RackError::UnknownType {
                module_type: s.to_string(),
            })
    }
}

/// The full descriptor table, in table order
pub fn descriptors() -> Vec<ModuleDescriptor> {
    ModuleType::ALL.iter().map(|t| t.descriptor()).collect()
}

// ============================================================================
// Static Table
// ============================================================================

struct ModuleEntry {
    name: &'static str,
    params: &'static [ParameterDescriptor],
    build: fn() -> Box<dyn Processor>,
}

fn build<P: Processor + Default + 'static>() -> Box<dyn Processor> {
    Box::new(P::default())
}

use ParameterDescriptor as P;

const COMPRESSOR_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("threshold", -24.0, -60.0, 0.0),
    P::continuous("ratio", 4.0, 1.0, 20.0),
    P::continuous("attack", 0.01, 0.0001, 1.0),
    P::continuous("release", 0.1, 0.001, 2.0),
    P::continuous("knee", 5.0, 0.0, 20.0),
    P::continuous("makeupGain", 0.0, 0.0, 24.0),
    P::discrete("mode", 0.0, 0.0, 3.0),
    P::continuous("mix", 1.0, 0.0, 1.0),
];

const MULTIBAND_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("lowFreq", 150.0, 20.0, 1000.0),
    P::continuous("highFreq", 2500.0, 1000.0, 20000.0),
    P::continuous("threshLow", -24.0, -60.0, 0.0),
    P::continuous("ratioLow", 4.0, 1.0, 20.0),
    P::continuous("gainLow", 0.0, -24.0, 24.0),
    P::continuous("threshMid", -24.0, -60.0, 0.0),
    P::continuous("ratioMid", 4.0, 1.0, 20.0),
    P::continuous("gainMid", 0.0, -24.0, 24.0),
    P::continuous("threshHigh", -24.0, -60.0, 0.0),
    P::continuous("ratioHigh", 4.0, 1.0, 20.0),
    P::continuous("gainHigh", 0.0, -24.0, 24.0),
    P::continuous("attack", 0.01, 0.0001, 1.0),
    P::continuous("release", 0.1, 0.001, 2.0),
];

const DE_ESSER_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("frequency", 6000.0, 2000.0, 10000.0),
    P::continuous("threshold", -20.0, -60.0, 0.0),
    P::continuous("ratio", 4.0, 1.0, 20.0),
    P::continuous("attack", 0.005, 0.001, 0.1),
    P::continuous("release", 0.05, 0.01, 0.5),
    P::discrete("monitor", 0.0, 0.0, 1.0),
];

const LIMITER_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("threshold", -0.5, -60.0, 0.0),
    P::continuous("ceiling", -0.1, -20.0, 0.0),
    P::continuous("release", 0.1, 0.001, 1.0),
    P::discrete("lookahead", 5.0, 0.0, 20.0),
];

const TRANSIENT_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("attackGain", 0.0, -24.0, 24.0),
    P::continuous("sustainGain", 0.0, -24.0, 24.0),
    P::continuous("mix", 1.0, 0.0, 1.0),
];

const PARAMETRIC_EQ_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("lowFreq", 100.0, 20.0, 1000.0),
    P::continuous("lowGain", 0.0, -24.0, 24.0),
    P::continuous("midFreq", 1000.0, 200.0, 5000.0),
    P::continuous("midGain", 0.0, -24.0, 24.0),
    P::continuous("midQ", 0.707, 0.1, 10.0),
    P::continuous("highFreq", 5000.0, 2000.0, 20000.0),
    P::continuous("highGain", 0.0, -24.0, 24.0),
];

const DYNAMIC_EQ_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("frequency", 1000.0, 20.0, 20000.0),
    P::continuous("Q", 1.0, 0.1, 10.0),
    P::continuous("gain", 0.0, -24.0, 24.0),
    P::continuous("threshold", -20.0, -60.0, 0.0),
    P::continuous("ratio", 2.0, 1.0, 20.0),
    P::continuous("attack", 0.01, 0.001, 1.0),
    P::continuous("release", 0.1, 0.01, 2.0),
];

const MIDSIDE_EQ_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("midGain", 0.0, -24.0, 24.0),
    P::continuous("midFreq", 1000.0, 20.0, 20000.0),
    P::continuous("sideGain", 0.0, -24.0, 24.0),
    P::continuous("sideFreq", 1000.0, 20.0, 20000.0),
];

const SATURATION_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("drive", 0.0, 0.0, 10.0),
    P::discrete("type", 1.0, 0.0, 2.0),
    P::continuous("outputGain", 0.0, -12.0, 12.0),
    P::continuous("mix", 1.0, 0.0, 1.0),
];

const DISTORTION_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("drive", 1.0, 1.0, 100.0),
    P::continuous("wet", 1.0, 0.0, 1.0),
    P::discrete("type", 0.0, 0.0, 2.0),
    P::continuous("outputGain", 0.0, -24.0, 24.0),
];

const BITCRUSHER_PARAMS: &[ParameterDescriptor] = &[
    P::discrete("bits", 8.0, 1.0, 16.0),
    P::continuous("normFreq", 1.0, 0.001, 1.0),
    P::continuous("mix", 1.0, 0.0, 1.0),
];

const CHORUS_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("frequency", 1.5, 0.1, 10.0),
    P::continuous("delayTime", 0.03, 0.0, 0.1),
    P::continuous("depth", 0.002, 0.0, 0.01),
    P::continuous("feedback", 0.0, 0.0, 0.95),
    P::continuous("wet", 0.5, 0.0, 1.0),
];

const PHASER_PARAMS: &[ParameterDescriptor] = &[
    P::discrete("stages", 4.0, 2.0, 12.0),
    P::continuous("frequency", 0.5, 0.1, 20.0),
    P::continuous("baseFrequency", 1000.0, 20.0, 5000.0),
    P::continuous("octaves", 2.0, 0.0, 8.0),
    P::continuous("wet", 0.5, 0.0, 1.0),
];

const TREMOLO_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("frequency", 4.0, 0.1, 20.0),
    P::continuous("depth", 0.5, 0.0, 1.0),
    P::continuous("spread", 0.0, -1.0, 1.0),
    P::discrete("waveform", 0.0, 0.0, 3.0),
    P::continuous("mix", 1.0, 0.0, 1.0),
];

const AUTOWAH_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("baseFrequency", 100.0, 20.0, 5000.0),
    P::continuous("sensitivity", 0.5, 0.0, 1.0),
    P::continuous("octaves", 4.0, 0.0, 8.0),
    P::continuous("Q", 2.0, 0.1, 20.0),
    P::continuous("attack", 0.01, 0.001, 1.0),
    P::continuous("release", 0.1, 0.01, 2.0),
    P::continuous("wet", 1.0, 0.0, 1.0),
];

const STEREO_IMAGER_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("lowFreq", 150.0, 20.0, 1000.0),
    P::continuous("highFreq", 2500.0, 1000.0, 20000.0),
    P::continuous("widthLow", 0.0, 0.0, 2.0),
    P::continuous("widthMid", 1.0, 0.0, 2.0),
    P::continuous("widthHigh", 1.2, 0.0, 2.0),
];

const FEEDBACK_DELAY_PARAMS: &[ParameterDescriptor] = &[
    P::continuous("delayTime", 0.5, 0.0, 2.0),
    P::continuous("feedback", 0.3, 0.0, 0.95),
    P::continuous("wet", 0.5, 0.0, 1.0),
];

const CABINET_PARAMS: &[ParameterDescriptor] = &[P::continuous("mix", 1.0, 0.0, 1.0)];

const DITHERING_PARAMS: &[ParameterDescriptor] = &[P::discrete("bitDepth", 24.0, 8.0, 32.0)];

/// Indexed by `ModuleType as usize`; order must match the enum
static MODULE_TABLE: [ModuleEntry; 20] = [
    ModuleEntry {
        name: "compressor",
        params: COMPRESSOR_PARAMS,
        build: build::<Compressor>,
    },
    ModuleEntry {
        name: "multiband-compressor",
        params: MULTIBAND_PARAMS,
        build: build::<MultibandCompressor>,
    },
    ModuleEntry {
        name: "de-esser",
        params: DE_ESSER_PARAMS,
        build: build::<DeEsser>,
    },
    ModuleEntry {
        name: "limiter",
        params: LIMITER_PARAMS,
        build: build::<Limiter>,
    },
    ModuleEntry {
        name: "transient-shaper",
        params: TRANSIENT_PARAMS,
        build: build::<TransientShaper>,
    },
    ModuleEntry {
        name: "parametric-eq",
        params: PARAMETRIC_EQ_PARAMS,
        build: build::<ParametricEq>,
    },
    ModuleEntry {
        name: "dynamic-eq",
        params: DYNAMIC_EQ_PARAMS,
        build: build::<DynamicEq>,
    },
    ModuleEntry {
        name: "midside-eq",
        params: MIDSIDE_EQ_PARAMS,
        build: build::<MidSideEq>,
    },
    ModuleEntry {
        name: "saturation",
        params: SATURATION_PARAMS,
        build: build::<Saturation>,
    },
    ModuleEntry {
        name: "distortion",
        params: DISTORTION_PARAMS,
        build: build::<Distortion>,
    },
    ModuleEntry {
        name: "bitcrusher",
        params: BITCRUSHER_PARAMS,
        build: build::<Bitcrusher>,
    },
    ModuleEntry {
        name: "chorus",
        params: CHORUS_PARAMS,
        build: build::<Chorus>,
    },
    ModuleEntry {
        name: "phaser",
        params: PHASER_PARAMS,
        build: build::<Phaser>,
    },
    ModuleEntry {
        name: "tremolo",
        params: TREMOLO_PARAMS,
        build: build::<Tremolo>,
    },
    ModuleEntry {
        name: "autowah",
        params: AUTOWAH_PARAMS,
        build: build::<Autowah>,
    },
    ModuleEntry {
        name: "stereo-imager",
        params: STEREO_IMAGER_PARAMS,
        build: build::<StereoImager>,
    },
    ModuleEntry {
        name: "feedback-delay",
        params: FEEDBACK_DELAY_PARAMS,
        build: build::<FeedbackDelay>,
    },
    ModuleEntry {
        name: "cabinet-sim",
        params: CABINET_PARAMS,
        build: build::<CabinetSim>,
    },
    ModuleEntry {
        name: "loudness-meter",
        params: &[],
        build: build::<LoudnessMeter>,
    },
    ModuleEntry {
        name: "dithering",
        params: DITHERING_PARAMS,
        build: build::<Dithering>,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn test_table_order_matches_enum() {
        for (i, module_type) in ModuleType::ALL.iter().enumerate() {
            assert_eq!(*module_type as usize, i);
            // serde name and table name agree
            let json = serde_json::to_string(module_type).unwrap();
            assert_eq!(json, format!("\"{}\"", module_type.as_str()));
        }
    }

    #[test]
    fn test_defaults_within_range() {
        for descriptor in descriptors() {
            for p in descriptor.params {
                assert!(
                    p.min <= p.default && p.default <= p.max,
                    "{}.{} default {} outside [{}, {}]",
                    descriptor.module_type,
                    p.name,
                    p.default,
                    p.min,
                    p.max
                );
            }
        }
    }

    #[test_case("compressor", ModuleType::Compressor)]
    #[test_case("DE_ESSER", ModuleType::DeEsser)]
    #[test_case("mid/side-eq", ModuleType::MidsideEq)]
    #[test_case("CAB_SIM", ModuleType::CabinetSim)]
    #[test_case(" loudness-meter ", ModuleType::LoudnessMeter)]
    fn test_parse_module_type(name: &str, expected: ModuleType) {
        assert_eq!(name.parse::<ModuleType>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_type() {
        let err = "reverb".parse::<ModuleType>().unwrap_err();
        assert!(matches!(err, RackError::UnknownType { .. }));
    }

    #[test]
    fn test_clamp() {
        let threshold = ModuleType::Compressor.descriptor().param("threshold").unwrap();
        assert_eq!(threshold.clamp(-100.0), -60.0);
        assert_eq!(threshold.clamp(6.0), 0.0);
        assert_eq!(threshold.clamp(-12.0), -12.0);
        assert_eq!(threshold.clamp(f32::NAN), -24.0);
        assert_eq!(threshold.clamp(f32::INFINITY), 0.0);
    }

    #[test]
    fn test_limiter_latency() {
        let params = ModuleType::Limiter.descriptor().defaults();
        assert_eq!(ModuleType::Limiter.latency_samples(&params, 48000.0), 240);
        assert_eq!(ModuleType::Compressor.latency_samples(&[], 48000.0), 0);
    }

    #[test]
    fn test_every_type_builds() {
        for module_type in ModuleType::ALL {
            let _processor = module_type.create_processor();
        }
    }
}
