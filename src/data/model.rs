use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Name of the shared x-axis column in exported tables.
pub const WAVENUMBER_COLUMN: &str = "Wavenumber";

/// Per-channel baseline arrays, keyed by channel name (e.g. `"SCP Raman"`).
pub type BaselineMap = BTreeMap<String, Vec<f64>>;

// ---------------------------------------------------------------------------
// Modality – one of the four acquisition configurations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Modality {
    #[serde(rename = "SCP")]
    Scp,
    #[serde(rename = "DCPI")]
    Dcpi,
    #[serde(rename = "DCPII")]
    Dcpii,
    #[serde(rename = "SCPc")]
    Scpc,
}

impl Modality {
    pub const ALL: [Modality; 4] = [Modality::Scp, Modality::Dcpi, Modality::Dcpii, Modality::Scpc];

    /// Short label used in channel names and file names.
    pub fn label(self) -> &'static str {
        match self {
            Modality::Scp => "SCP",
            Modality::Dcpi => "DCPI",
            Modality::Dcpii => "DCPII",
            Modality::Scpc => "SCPc",
        }
    }

    /// Raman column; the only column baselines are fitted on.
    pub fn raman_column(self) -> &'static str {
        match self {
            Modality::Scp => "SCP Raman",
            Modality::Dcpi => "DCPI Raman",
            Modality::Dcpii => "DCPII Raman",
            Modality::Scpc => "SCPc Raman",
        }
    }

    pub fn roa_column(self) -> &'static str {
        match self {
            Modality::Scp => "SCP ROA",
            Modality::Dcpi => "DCPI ROA",
            Modality::Dcpii => "DCPII ROA",
            Modality::Scpc => "SCPc ROA",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Channel columns in the order the instrument writes them.
pub fn channel_columns() -> impl Iterator<Item = &'static str> {
    Modality::ALL
        .into_iter()
        .flat_map(|m| [m.raman_column(), m.roa_column()])
}

// ---------------------------------------------------------------------------
// ModalityFlags – which modalities the user has switched on
// ---------------------------------------------------------------------------

/// Modality toggles, serialised as `{"SCP": true, "DCPI": false, ...}`.
/// A modality missing from the map counts as disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModalityFlags(BTreeMap<Modality, bool>);

impl Default for ModalityFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl ModalityFlags {
    pub fn all() -> Self {
        Self(Modality::ALL.into_iter().map(|m| (m, true)).collect())
    }

    pub fn none() -> Self {
        Self(Modality::ALL.into_iter().map(|m| (m, false)).collect())
    }

    /// Only the listed modalities enabled.
    pub fn only(modalities: &[Modality]) -> Self {
        let mut flags = Self::none();
        for &m in modalities {
            flags.set(m, true);
        }
        flags
    }

    pub fn set(&mut self, modality: Modality, enabled: bool) {
        self.0.insert(modality, enabled);
    }

    pub fn is_enabled(&self, modality: Modality) -> bool {
        self.0.get(&modality).copied().unwrap_or(false)
    }

    /// Enabled modalities in their canonical order.
    pub fn enabled(&self) -> impl Iterator<Item = Modality> + '_ {
        self.0.iter().filter(|(_, on)| **on).map(|(m, _)| *m)
    }
}

// ---------------------------------------------------------------------------
// Entry identity – what the cache UID is derived from
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Camera {
    A,
    B,
}

impl Camera {
    pub const BOTH: [Camera; 2] = [Camera::A, Camera::B];
}

impl fmt::Display for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Camera::A => f.write_str("A"),
            Camera::B => f.write_str("B"),
        }
    }
}

/// How a derived entry was built from raw cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedKind {
    Average,
    Sum,
    /// Camera A and camera B averaged on their union grid.
    Merged,
}

impl fmt::Display for DerivedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivedKind::Average => f.write_str("avg"),
            DerivedKind::Sum => f.write_str("sum"),
            DerivedKind::Merged => f.write_str("ab"),
        }
    }
}

/// Identity metadata of an entry. The cache UID is derived from this and
/// never from the numeric content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryIdentity {
    /// One cycle file from one camera.
    Raw {
        experiment: String,
        path: PathBuf,
        camera: Camera,
        cycle: u32,
        #[serde(default)]
        normalized: bool,
    },
    /// An average, sum or A+B merge over a cycle range; has no backing file.
    /// Merged entries keep camera A.
    Derived {
        derived: DerivedKind,
        experiment: String,
        camera: Camera,
        first_cycle: u32,
        last_cycle: u32,
        #[serde(default)]
        normalized: bool,
    },
}

impl EntryIdentity {
    pub fn experiment(&self) -> &str {
        match self {
            EntryIdentity::Raw { experiment, .. } | EntryIdentity::Derived { experiment, .. } => experiment,
        }
    }

    pub fn camera(&self) -> Camera {
        match self {
            EntryIdentity::Raw { camera, .. } | EntryIdentity::Derived { camera, .. } => *camera,
        }
    }

    pub fn normalized(&self) -> bool {
        match self {
            EntryIdentity::Raw { normalized, .. } | EntryIdentity::Derived { normalized, .. } => *normalized,
        }
    }

    pub fn set_normalized(&mut self, value: bool) {
        match self {
            EntryIdentity::Raw { normalized, .. } | EntryIdentity::Derived { normalized, .. } => *normalized = value,
        }
    }

    /// Inclusive cycle range covered by the entry.
    pub fn cycle_range(&self) -> (u32, u32) {
        match self {
            EntryIdentity::Raw { cycle, .. } => (*cycle, *cycle),
            EntryIdentity::Derived { first_cycle, last_cycle, .. } => (*first_cycle, *last_cycle),
        }
    }

    /// Cycle label used in exported file names: `7`, `2-5` or `sum_2-5`.
    pub fn index_label(&self) -> String {
        match self {
            EntryIdentity::Raw { cycle, .. } => cycle.to_string(),
            EntryIdentity::Derived { derived: DerivedKind::Average, first_cycle, last_cycle, .. } => {
                format!("{first_cycle}-{last_cycle}")
            }
            EntryIdentity::Derived { derived: DerivedKind::Sum, first_cycle, last_cycle, .. } => {
                format!("sum_{first_cycle}-{last_cycle}")
            }
            EntryIdentity::Derived { derived: DerivedKind::Merged, first_cycle, last_cycle, .. } => {
                format!("AB_{first_cycle}-{last_cycle}")
            }
        }
    }

    /// Stable cache key.
    pub fn uid(&self) -> String {
        let norm = u8::from(self.normalized());
        match self {
            EntryIdentity::Raw { path, camera, cycle, .. } => {
                format!("{}|{camera}|{cycle}|norm={norm}", path.display())
            }
            EntryIdentity::Derived { derived, experiment, camera, first_cycle, last_cycle, .. } => {
                format!("<{derived}:{experiment}>|{camera}|{first_cycle}-{last_cycle}|norm={norm}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AcquisitionInfo – header values of a cycle file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionInfo {
    pub gain: Option<f64>,
    pub power: Option<i64>,
    pub cycles: Option<u32>,
    pub total_time: Vec<f64>,
}

// ---------------------------------------------------------------------------
// SpectrumEntry – one measurement record
// ---------------------------------------------------------------------------

/// One spectrum: a wavenumber axis shared by several named intensity channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumEntry {
    pub identity: EntryIdentity,
    #[serde(default)]
    pub info: AcquisitionInfo,
    /// Strictly increasing x-axis.
    pub wavenumbers: Vec<f64>,
    /// Channel name → intensities, each the same length as `wavenumbers`.
    pub channels: BTreeMap<String, Vec<f64>>,
    /// Baselines shared with the manager's cache. `None` until a create or
    /// a cache attach.
    #[serde(skip)]
    pub baselines: Option<Arc<BaselineMap>>,
}

impl SpectrumEntry {
    pub fn new(identity: EntryIdentity, wavenumbers: Vec<f64>, channels: BTreeMap<String, Vec<f64>>) -> Self {
        Self {
            identity,
            info: AcquisitionInfo::default(),
            wavenumbers,
            channels,
            baselines: None,
        }
    }

    /// Number of points on the wavenumber axis.
    pub fn len(&self) -> usize {
        self.wavenumbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavenumbers.is_empty()
    }

    pub fn uid(&self) -> String {
        self.identity.uid()
    }

    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.channels.get(name).map(Vec::as_slice)
    }

    /// Whether a non-empty baseline map is attached.
    pub fn has_attached_baseline(&self) -> bool {
        self.baselines.as_ref().is_some_and(|b| !b.is_empty())
    }

    /// First index whose wavenumber is at or after `start`.
    pub fn cutoff_index(&self, start: f64) -> usize {
        self.wavenumbers.partition_point(|&x| x < start)
    }

    /// Check the axis is strictly increasing and every channel lines up with it.
    pub fn validate(&self) -> Result<()> {
        if let Some(i) = self.wavenumbers.windows(2).position(|w| !(w[0] < w[1])) {
            bail!(
                "{}: wavenumbers not strictly increasing at index {}",
                self.uid(),
                i + 1
            );
        }
        for (name, values) in &self.channels {
            if values.len() != self.wavenumbers.len() {
                bail!(
                    "{}: channel '{name}' has {} values but the axis has {}",
                    self.uid(),
                    values.len(),
                    self.wavenumbers.len()
                );
            }
        }
        Ok(())
    }
}
