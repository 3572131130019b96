//! Fluorescence baseline removal for dual-camera Raman/ROA spectra.
//!
//! The core is [`baseline`]: an asymmetric least-squares solver and a
//! [`baseline::BaselineManager`] that computes, caches and applies
//! per-spectrum baselines keyed by each entry's identity. [`data`] holds the
//! entry model and the thin loading, selection and export glue around it.

pub mod baseline;
pub mod config;
pub mod data;
pub mod error;
pub mod state;

pub use baseline::{BaselineManager, BaselineParams, SubtractMode, SubtractOutcome};
pub use data::model::{Modality, ModalityFlags, SpectrumEntry};
pub use error::{BaselineError, Result};
