use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::asls;
use super::params::BaselineParams;
use crate::data::model::{BaselineMap, ModalityFlags, SpectrumEntry};
use crate::error::{BaselineError, Result};

/// Derives the cache key of an entry.
pub type UidFn = Box<dyn Fn(&SpectrumEntry) -> String + Send + Sync>;

/// Fits a baseline to one channel (already cut at the start wavenumber).
pub type SolverFn = Box<dyn Fn(&[f64], &BaselineParams) -> Result<Vec<f64>> + Send + Sync>;

/// How a baseline is removed from a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtractMode {
    /// `y - z`
    #[default]
    FromZero,
    /// `y - z + min(z)`, keeping the baseline's own minimum as the floor.
    ToReference,
}

/// Result of [`BaselineManager::subtract`].
#[derive(Debug, Clone)]
pub struct SubtractOutcome {
    /// Corrected copies, in input order. Entries without a baseline are
    /// returned unchanged.
    pub entries: Vec<SpectrumEntry>,
    /// UIDs that had neither an attached nor a cached baseline.
    pub uncached: Vec<String>,
}

// ---------------------------------------------------------------------------
// BaselineManager
// ---------------------------------------------------------------------------

/// Owns the baseline cache and applies the create / subtract / clear
/// lifecycle to spectrum entries.
///
/// Per UID the cache is either absent or holds exactly the baselines of the
/// last `create` covering it. `subtract` only reads it.
pub struct BaselineManager {
    uid_fn: UidFn,
    solver: SolverFn,
    cache: HashMap<String, Arc<BaselineMap>>,
}

impl Default for BaselineManager {
    fn default() -> Self {
        Self::new(Box::new(SpectrumEntry::uid), Box::new(asls::asls))
    }
}

impl fmt::Debug for BaselineManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut uids: Vec<&String> = self.cache.keys().collect();
        uids.sort();
        f.debug_struct("BaselineManager").field("cached", &uids).finish()
    }
}

impl BaselineManager {
    pub fn new(uid_fn: UidFn, solver: SolverFn) -> Self {
        Self {
            uid_fn,
            solver,
            cache: HashMap::new(),
        }
    }

    /// Fit baselines for every enabled modality of every entry, attach them
    /// and replace the cache record of each entry's UID.
    ///
    /// All fits run before anything is attached or cached, so an error
    /// leaves both the entries and the cache as they were.
    pub fn create(
        &mut self,
        entries: &mut [SpectrumEntry],
        modalities: &ModalityFlags,
        params: &BaselineParams,
    ) -> Result<()> {
        params.validate()?;

        let mut fitted = Vec::with_capacity(entries.len());
        for entry in entries.iter() {
            let uid = (self.uid_fn)(entry);
            let baselines = self.fit_entry(entry, modalities, params)?;
            fitted.push((uid, Arc::new(baselines)));
        }

        for (entry, (uid, baselines)) in entries.iter_mut().zip(fitted) {
            log::debug!("baselines for {uid}: {:?}", baselines.keys().collect::<Vec<_>>());
            entry.baselines = Some(Arc::clone(&baselines));
            if self.cache.insert(uid.clone(), baselines).is_some() {
                log::debug!("replaced cached baselines for {uid}");
            }
        }
        Ok(())
    }

    fn fit_entry(
        &self,
        entry: &SpectrumEntry,
        modalities: &ModalityFlags,
        params: &BaselineParams,
    ) -> Result<BaselineMap> {
        let start = params
            .start_wavenumber
            .map_or(0, |wn| entry.cutoff_index(wn));

        let mut baselines = BaselineMap::new();
        for modality in modalities.enabled() {
            let column = modality.raman_column();
            let Some(y) = entry.channel(column) else {
                log::debug!("{}: no '{column}' channel, skipped", (self.uid_fn)(entry));
                continue;
            };
            if y.len() != entry.len() {
                return Err(BaselineError::LengthMismatch {
                    channel: column.to_string(),
                    expected: entry.len(),
                    got: y.len(),
                });
            }

            let tail = (self.solver)(&y[start..], params)?;
            if tail.len() != y.len() - start {
                return Err(BaselineError::LengthMismatch {
                    channel: column.to_string(),
                    expected: y.len() - start,
                    got: tail.len(),
                });
            }

            let mut z = vec![0.0; y.len()];
            z[start..].copy_from_slice(&tail);
            baselines.insert(column.to_string(), z);
        }
        Ok(baselines)
    }

    /// Return baseline-corrected copies of `entries`.
    ///
    /// Entries without an attached baseline pick up the cached one for their
    /// UID first. Entries with neither are passed through and reported in
    /// [`SubtractOutcome::uncached`]. The cache is left intact so the same
    /// baseline can be subtracted from another view with the same UID.
    pub fn subtract(&self, entries: &[SpectrumEntry], mode: SubtractMode) -> Result<SubtractOutcome> {
        let mut corrected = Vec::with_capacity(entries.len());
        let mut uncached = Vec::new();

        for entry in entries {
            let mut out = entry.clone();
            self.attach_if_missing(&mut out);

            let baselines = match &out.baselines {
                Some(b) if !b.is_empty() => Arc::clone(b),
                _ => {
                    let uid = (self.uid_fn)(entry);
                    log::warn!("no baseline for {uid}, left unchanged");
                    uncached.push(uid);
                    corrected.push(out);
                    continue;
                }
            };

            for (column, z) in baselines.iter() {
                let Some(y) = out.channels.get_mut(column) else {
                    continue;
                };
                if y.len() != z.len() {
                    return Err(BaselineError::LengthMismatch {
                        channel: column.clone(),
                        expected: y.len(),
                        got: z.len(),
                    });
                }
                remove_baseline(y, z, mode);
            }
            corrected.push(out);
        }

        Ok(SubtractOutcome {
            entries: corrected,
            uncached,
        })
    }

    /// Attach cached baselines to entries that have none attached.
    pub fn attach_cached(&self, entries: &mut [SpectrumEntry]) {
        for entry in entries {
            self.attach_if_missing(entry);
        }
    }

    fn attach_if_missing(&self, entry: &mut SpectrumEntry) {
        if entry.baselines.is_some() {
            return;
        }
        if let Some(cached) = self.cache.get(&(self.uid_fn)(entry)) {
            if !cached.is_empty() {
                entry.baselines = Some(Arc::clone(cached));
            }
        }
    }

    /// With `None`, drop the whole cache. Otherwise detach the baselines of
    /// the given entries and drop their cache records only.
    pub fn clear(&mut self, entries: Option<&mut [SpectrumEntry]>) {
        match entries {
            None => {
                log::info!("cleared {} cached baselines", self.cache.len());
                self.cache.clear();
            }
            Some(entries) => {
                for entry in entries {
                    entry.baselines = None;
                    let uid = (self.uid_fn)(entry);
                    if self.cache.remove(&uid).is_some() {
                        log::info!("cleared cached baselines for {uid}");
                    }
                }
            }
        }
    }

    /// Whether any entry has a non-empty attached baseline or a cache hit,
    /// even one holding no channels.
    pub fn has_any(&self, entries: &[SpectrumEntry]) -> bool {
        entries
            .iter()
            .any(|entry| entry.has_attached_baseline() || self.cache.contains_key(&(self.uid_fn)(entry)))
    }

    pub fn cached(&self, uid: &str) -> Option<Arc<BaselineMap>> {
        self.cache.get(uid).cloned()
    }

    /// Number of cached UIDs.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

fn remove_baseline(y: &mut [f64], z: &[f64], mode: SubtractMode) {
    let offset = match mode {
        SubtractMode::FromZero => 0.0,
        SubtractMode::ToReference => z.iter().copied().fold(f64::INFINITY, f64::min),
    };
    for (yi, zi) in y.iter_mut().zip(z) {
        *yi = *yi - zi + offset;
    }
}
