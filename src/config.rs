use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::baseline::{BaselineParams, SubtractMode};
use crate::data::model::ModalityFlags;
use crate::data::selection::CycleSelection;

/// Settings for a baseline run. Every field is optional in the JSON file.
///
/// ```json
/// {
///   "params": { "lam": 100000.0, "p": 0.01, "niter": 10, "start_wavenumber": 250.0 },
///   "modalities": { "SCP": true, "DCPI": true, "DCPII": false, "SCPc": false },
///   "mode": "to_reference",
///   "experiment": "lysozyme",
///   "selection": { "average": [2, 8] },
///   "normalize": false
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub params: BaselineParams,
    pub modalities: ModalityFlags,
    pub mode: SubtractMode,
    /// Experiment to work on; the first one found when absent.
    pub experiment: Option<String>,
    pub selection: CycleSelection,
    pub normalize: bool,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            params: BaselineParams::default(),
            modalities: ModalityFlags::all(),
            mode: SubtractMode::FromZero,
            experiment: None,
            selection: CycleSelection {
                first: false,
                last: true,
                average: None,
            },
            normalize: false,
        }
    }
}

impl BaselineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("parsing config JSON")?;
        config.params.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Modality;

    #[test]
    fn empty_object_gives_defaults() {
        let config = BaselineConfig::from_json("{}").unwrap();
        assert_eq!(config, BaselineConfig::default());
        assert!(config.selection.last);
    }

    #[test]
    fn reads_nested_settings() {
        let config = BaselineConfig::from_json(
            r#"{
                "params": { "lam": 1000.0, "start_wavenumber": 250.0 },
                "modalities": { "SCP": true, "DCPII": true },
                "mode": "to_reference",
                "selection": { "average": [2, 8] }
            }"#,
        )
        .unwrap();

        assert_eq!(config.params.lam, 1000.0);
        assert_eq!(config.params.niter, 10);
        assert_eq!(config.mode, SubtractMode::ToReference);
        assert_eq!(config.selection.average, Some((2, 8)));
        assert!(config.modalities.is_enabled(Modality::Dcpii));
        assert!(!config.modalities.is_enabled(Modality::Dcpi));
    }

    #[test]
    fn invalid_params_fail_to_load() {
        assert!(BaselineConfig::from_json(r#"{ "params": { "p": 1.5 } }"#).is_err());
    }
}
