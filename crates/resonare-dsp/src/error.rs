/// Configuration and asset errors.
///
/// None of these are produced on the audio path: they come out of index
/// conversions and table construction done while preparing, and out of
/// sample loading.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    UnknownFilterMode(usize),
    UnknownModel(usize),
    UnknownMallet(usize),
    /// Lookup table with an empty or inverted domain, or fewer than two points.
    InvalidTableRange { min: f64, max: f64, size: usize },
    Sample(SampleError),
}

#[derive(Debug)]
pub enum SampleError {
    Decode { path: PathBuf, source: hound::Error },
    Empty,
    Silent,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownFilterMode(i) => write!(f, "unknown noise filter mode {i}"),
            Error::UnknownModel(i) => write!(f, "unknown resonator model {i}"),
            Error::UnknownMallet(i) => write!(f, "unknown mallet type {i}"),
            Error::InvalidTableRange { min, max, size } => {
                write!(f, "invalid lookup table domain [{min}, {max}] with {size} points")
            }
            Error::Sample(e) => write!(f, "sample: {e}"),
        }
    }
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::Decode { path, source } => {
                write!(f, "failed to decode {}: {source}", path.display())
            }
            SampleError::Empty => write!(f, "file contains no audio frames"),
            SampleError::Silent => write!(f, "file contains only silence"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Sample(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for SampleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SampleError::Decode { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<SampleError> for Error {
    fn from(e: SampleError) -> Self {
        Error::Sample(e)
    }
}
