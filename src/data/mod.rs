/// Data layer: core types, loading, selection and export.
///
/// Architecture:
/// ```text
///   entries.json
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Vec<SpectrumEntry>
///   └──────────┘
///        │
///        ▼
///   ┌────────────┐
///   │ selection   │  first / last / averaged / summed / normalised views
///   └────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  export   │  tab-separated tables per entry and modality
///   └──────────┘
/// ```

pub mod export;
pub mod loader;
pub mod model;
pub mod selection;
