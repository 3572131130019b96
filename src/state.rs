use std::path::Path;

use anyhow::Result;

use crate::baseline::{BaselineManager, BaselineParams, SubtractMode};
use crate::config::BaselineConfig;
use crate::data::export;
use crate::data::model::{ModalityFlags, SpectrumEntry};
use crate::data::selection::{self, CycleSelection};

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Session state behind the baseline actions, independent of any front end.
///
/// Loaded entries are never modified by subtraction; the corrected view is
/// kept in `corrected` until the selection changes.
#[derive(Debug, Default)]
pub struct AppState {
    /// Loaded raw entries.
    pub entries: Vec<SpectrumEntry>,

    /// Experiment the selection applies to.
    pub experiment: Option<String>,

    pub selection: CycleSelection,

    pub modalities: ModalityFlags,

    pub params: BaselineParams,

    /// Whether views are min-max normalised before fitting.
    pub normalize: bool,

    pub mode: SubtractMode,

    pub baselines: BaselineManager,

    /// Result of the last subtraction, ready for export.
    pub corrected: Option<Vec<SpectrumEntry>>,

    /// Status / warning message for the user.
    pub status_message: Option<String>,
}

impl AppState {
    pub fn from_config(config: BaselineConfig) -> Self {
        Self {
            experiment: config.experiment,
            selection: config.selection,
            modalities: config.modalities,
            params: config.params,
            normalize: config.normalize,
            mode: config.mode,
            ..Self::default()
        }
    }

    /// Ingest newly loaded entries; keeps the configured experiment if it
    /// exists, otherwise picks the first one.
    pub fn set_entries(&mut self, entries: Vec<SpectrumEntry>) {
        let names = selection::experiments(&entries);
        let keep = self.experiment.as_ref().is_some_and(|e| names.contains(e));
        if !keep {
            self.experiment = names.into_iter().next();
        }
        self.entries = entries;
        self.corrected = None;
        self.status_message = None;
    }

    /// Change the cycle selection; drops the corrected view.
    pub fn set_selection(&mut self, selection: CycleSelection) {
        self.selection = selection;
        self.corrected = None;
    }

    /// Entries of the current selection, normalised if requested, with any
    /// cached baselines attached for overlay.
    pub fn selected_entries(&self) -> Result<Vec<SpectrumEntry>> {
        let Some(experiment) = &self.experiment else {
            return Ok(Vec::new());
        };
        let mut selected = selection::select_entries(&self.entries, experiment, &self.selection)?;
        if self.normalize {
            selected = selected.iter().map(selection::normalize).collect();
        }
        self.baselines.attach_cached(&mut selected);
        Ok(selected)
    }

    /// "Create Baseline": fit the current selection and return it with the
    /// fresh baselines attached.
    pub fn create_baselines(&mut self) -> Result<Vec<SpectrumEntry>> {
        let mut selected = self.selected_entries()?;
        self.baselines
            .create(&mut selected, &self.modalities, &self.params)?;
        self.status_message = Some(format!("Baselines created for {} spectra", selected.len()));
        Ok(selected)
    }

    /// "Subtract Baseline": correct the current selection with cached
    /// baselines and keep the result as the corrected view.
    pub fn subtract_baselines(&mut self) -> Result<Vec<SpectrumEntry>> {
        let selected = self.selected_entries()?;
        let outcome = self.baselines.subtract(&selected, self.mode)?;

        self.status_message = if outcome.uncached.is_empty() {
            Some(format!("Baseline subtracted from {} spectra", outcome.entries.len()))
        } else {
            Some(format!(
                "No baseline for {} of {} spectra; create one first",
                outcome.uncached.len(),
                outcome.entries.len()
            ))
        };
        self.corrected = Some(outcome.entries.clone());
        Ok(outcome.entries)
    }

    /// "Delete Baseline": forget every cached baseline.
    pub fn delete_baselines(&mut self) {
        self.baselines.clear(None);
        self.corrected = None;
        self.status_message = Some("Baselines deleted".into());
    }

    /// "Export Combined": merge the camera A/B pair of the corrected view,
    /// or of the current selection when nothing has been subtracted yet.
    pub fn export_combined(&mut self, path: &Path) -> Result<SpectrumEntry> {
        let entries = match &self.corrected {
            Some(corrected) => corrected.clone(),
            None => self.selected_entries()?,
        };
        let merged = export::export_combined(path, &entries)?;
        self.status_message = Some(format!("Combined spectrum written to {}", path.display()));
        Ok(merged)
    }

    /// Whether "Subtract Baseline" has anything to work with.
    pub fn can_subtract(&self) -> bool {
        self.selected_entries()
            .map(|selected| self.baselines.has_any(&selected))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;
    use crate::data::model::{Camera, EntryIdentity, Modality};

    fn cycle(camera: Camera, cycle: u32) -> SpectrumEntry {
        let x: Vec<f64> = (0..40).map(|i| 200.0 + 5.0 * i as f64).collect();
        // Sloped background plus one narrow band.
        let raman: Vec<f64> = (0..40)
            .map(|i| 50.0 + 0.5 * i as f64 + if i == 20 { 30.0 } else { 0.0 })
            .collect();
        SpectrumEntry::new(
            EntryIdentity::Raw {
                experiment: "lyso".into(),
                path: PathBuf::from(format!("lyso_{camera}-{cycle}_out.txt")),
                camera,
                cycle,
                normalized: false,
            },
            x,
            BTreeMap::from([
                ("SCP Raman".to_string(), raman),
                ("SCP ROA".to_string(), vec![0.0; 40]),
            ]),
        )
    }

    fn state() -> AppState {
        let mut state = AppState::from_config(BaselineConfig {
            modalities: ModalityFlags::only(&[Modality::Scp]),
            ..BaselineConfig::default()
        });
        state.set_entries(vec![cycle(Camera::A, 1), cycle(Camera::B, 1), cycle(Camera::A, 2), cycle(Camera::B, 2)]);
        state
    }

    #[test]
    fn picks_first_experiment_and_last_cycle() {
        let state = state();
        assert_eq!(state.experiment.as_deref(), Some("lyso"));
        let selected = state.selected_entries().unwrap();
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|e| e.identity.cycle_range() == (2, 2)));
    }

    #[test]
    fn create_then_subtract_keeps_loaded_entries_intact() {
        let mut state = state();
        assert!(!state.can_subtract());

        let created = state.create_baselines().unwrap();
        assert!(created.iter().all(SpectrumEntry::has_attached_baseline));
        assert!(state.can_subtract());

        let before = state.entries.clone();
        let corrected = state.subtract_baselines().unwrap();
        assert_eq!(state.entries, before);
        assert_eq!(state.corrected.as_ref().map(Vec::len), Some(2));

        // The band survives, the sloped background is gone.
        let scp = &corrected[0].channels["SCP Raman"];
        assert!(scp[20] > 20.0, "band height {}", scp[20]);
        assert!(scp[5].abs() < 5.0, "background residue {}", scp[5]);
    }

    #[test]
    fn normalised_view_needs_its_own_baseline() {
        let mut state = state();
        state.create_baselines().unwrap();
        state.normalize = true;
        assert!(!state.can_subtract());

        state.subtract_baselines().unwrap();
        assert!(state.status_message.as_deref().unwrap_or("").starts_with("No baseline"));
    }

    #[test]
    fn export_combined_merges_the_selected_pair() {
        let mut state = state();
        let path = std::env::temp_dir().join(format!("rusty-roa-state-combined-{}.txt", std::process::id()));

        let merged = state.export_combined(&path).unwrap();
        assert_eq!(merged.identity.index_label(), "AB_2-2");
        // Both cameras share a grid and content, so the merge equals either one.
        assert_eq!(merged.channels, state.selected_entries().unwrap()[0].channels);
        assert!(path.exists());
        std::fs::remove_file(&path).ok();

        state.set_selection(CycleSelection { first: true, last: true, average: None });
        assert!(state.export_combined(&path).is_err(), "four spectra cannot be combined");
    }

    #[test]
    fn delete_forgets_everything() {
        let mut state = state();
        state.create_baselines().unwrap();
        state.delete_baselines();
        assert!(!state.can_subtract());
        assert!(state.baselines.is_empty());
        assert!(state.corrected.is_none());
    }
}
