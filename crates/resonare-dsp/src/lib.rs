//! Resonare DSP library: mallet percussion by modal and waveguide physical modeling.
//!
//! Pure DSP math with no audio framework dependencies.

// Exciters
pub mod envelope;
pub mod mallet;
pub mod noise;
pub mod sampler;

// Resonating bodies
pub mod filters;
pub mod lookup;
pub mod models;
pub mod partial;
pub mod resonator;
pub mod waveguide;

// Voice and engine
pub mod engine;
pub mod params;
pub mod voice;

// Output bus
pub mod comb;
pub mod limiter;

pub mod denormal;
pub mod error;
pub mod tables;

pub use engine::{Engine, EqualTemperament, MidiEvent, MidiEventKind, Tuning};
pub use error::{Error, SampleError};
pub use params::EngineParams;
