/// Fluorescence baseline layer: AsLS solver and the baseline lifecycle.
///
/// Architecture:
/// ```text
///   entries + modality flags + BaselineParams
///        │
///        ▼
///   ┌──────────────────┐
///   │ BaselineManager   │  UID → cache, create / subtract / clear
///   └──────────────────┘
///        │ one Raman column at a time, cut at start_wavenumber
///        ▼
///   ┌──────────┐
///   │  asls     │  banded reweighted least squares → baseline
///   └──────────┘
/// ```

pub mod asls;
pub mod manager;
pub mod params;

pub use manager::{BaselineManager, SubtractMode, SubtractOutcome};
pub use params::BaselineParams;
