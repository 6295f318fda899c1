//! DSP processors for every rack module type
//!
//! Each module type has one [`Processor`] implementation. The [`registry`]
//! maps module types to their parameter descriptors and constructors;
//! [`filters`] holds the shared building blocks.

pub mod filters;
pub mod processor;
pub mod registry;
pub mod smoothing;

pub mod autowah;
pub mod bitcrusher;
pub mod cabinet;
pub mod chorus;
pub mod compressor;
pub mod deesser;
pub mod delay;
pub mod dither;
pub mod dynamic_eq;
pub mod eq;
pub mod imager;
pub mod limiter;
pub mod meter;
pub mod multiband;
pub mod phaser;
pub mod saturation;
pub mod transient;
pub mod tremolo;

pub use autowah::Autowah;
pub use bitcrusher::Bitcrusher;
pub use cabinet::CabinetSim;
pub use chorus::Chorus;
pub use compressor::{Compressor, CompressorMode};
pub use deesser::DeEsser;
pub use delay::FeedbackDelay;
pub use dither::Dithering;
pub use dynamic_eq::DynamicEq;
pub use eq::{MidSideEq, ParametricEq};
pub use imager::StereoImager;
pub use limiter::Limiter;
pub use meter::LoudnessMeter;
pub use multiband::MultibandCompressor;
pub use phaser::Phaser;
pub use saturation::{Distortion, DistortionType, Saturation, SaturationType};
pub use transient::TransientShaper;
pub use tremolo::Tremolo;

pub use processor::{ProcessContext, Processor};
pub use registry::{
    descriptors, ModuleDescriptor, ModuleType, ParamKind, ParameterDescriptor,
};
pub use smoothing::ParamSmoother;
