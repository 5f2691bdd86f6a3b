//! Deep-learning side-channel analysis: key rank evaluation of profiled
//! and multi-label classifiers, and non-profiled hypothesis testing.
//!
//! Networks are provided by an external framework through the
//! [`Predictor`](predictor::Predictor) trait.

pub mod error;
pub mod labels;
pub mod leakage;
pub mod metadata;
pub mod non_profile;
pub mod predictor;
pub mod profile;
pub mod rank;
pub mod tools;

pub use error::{Error, Result};
