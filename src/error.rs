// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use std::io;

use thiserror::Error;

/// Errors produced while configuring, training or running the labeller.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or inconsistent configuration. Fatal, raised before any work starts.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Two grids (image, labelling, feature field) that must agree in size do not.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    /// A persisted model could not be decoded.
    #[error("malformed model: {0}")]
    Model(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn config<S: Into<String>>(message: S) -> Self {
        Error::Config(message.into())
    }

    pub(crate) fn dimensions(expected: (u32, u32), actual: (u32, u32)) -> Self {
        Error::DimensionMismatch {
            expected: format!("{}x{}", expected.0, expected.1),
            actual: format!("{}x{}", actual.0, actual.1),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable conditions reported alongside a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// The pairwise weight search had no usable validation data and fell back to zero.
    DegenerateSearch,
}
