use std::path::Path;

use anyhow::{bail, Context, Result};

use super::model::SpectrumEntry;

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load spectrum entries from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.json` – `[{ "identity": {...}, "wavenumbers": [...], "channels": {...} }, ...]`
pub fn load_entries(path: &Path) -> Result<Vec<SpectrumEntry>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "json" => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            parse_entries(&text)
        }
        other => bail!("Unsupported file extension: .{other}"),
    }
}

/// Write entries as a pretty-printed JSON array (attached baselines are not
/// written).
pub fn save_entries(path: &Path, entries: &[SpectrumEntry]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(entries).context("serialising entries")?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

// ---------------------------------------------------------------------------
// JSON parsing
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   {
///     "identity": { "kind": "raw", "experiment": "lysozyme",
///                   "path": "lysozyme_A-1_out.txt", "camera": "A", "cycle": 1 },
///     "info": { "gain": 2.0, "power": 300, "cycles": 1, "total_time": [12.5] },
///     "wavenumbers": [200.0, 201.0, ...],
///     "channels": { "SCP Raman": [...], "SCP ROA": [...] }
///   },
///   ...
/// ]
/// ```
pub fn parse_entries(text: &str) -> Result<Vec<SpectrumEntry>> {
    let entries: Vec<SpectrumEntry> = serde_json::from_str(text).context("parsing JSON")?;
    for (i, entry) in entries.iter().enumerate() {
        entry.validate().with_context(|| format!("Row {i}"))?;
    }
    log::info!("loaded {} spectrum entries", entries.len());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Camera, EntryIdentity};

    const TWO_ENTRIES: &str = r#"[
        {
            "identity": { "kind": "raw", "experiment": "lyso", "path": "lyso_A-1_out.txt",
                          "camera": "A", "cycle": 1 },
            "info": { "gain": 2.0, "power": 300, "total_time": [1.5, 2.5] },
            "wavenumbers": [200.0, 201.0, 202.0],
            "channels": { "SCP Raman": [1.0, 2.0, 3.0], "SCP ROA": [0.0, 0.1, 0.0] }
        },
        {
            "identity": { "kind": "derived", "derived": "average", "experiment": "lyso",
                          "camera": "B", "first_cycle": 1, "last_cycle": 3, "normalized": true },
            "wavenumbers": [200.0, 201.0, 202.0],
            "channels": { "SCP Raman": [1.0, 1.0, 1.0] }
        }
    ]"#;

    #[test]
    fn parses_raw_and_derived_entries() {
        let entries = parse_entries(TWO_ENTRIES).unwrap();
        assert_eq!(entries.len(), 2);

        assert!(matches!(entries[0].identity, EntryIdentity::Raw { cycle: 1, camera: Camera::A, .. }));
        assert_eq!(entries[0].info.power, Some(300));
        assert_eq!(entries[0].channel("SCP ROA"), Some(&[0.0, 0.1, 0.0][..]));
        assert!(entries[0].baselines.is_none());

        assert_eq!(entries[1].uid(), "<avg:lyso>|B|1-3|norm=1");
        assert_eq!(entries[1].info.gain, None);
    }

    #[test]
    fn rejects_misaligned_channels() {
        let text = r#"[{
            "identity": { "kind": "raw", "experiment": "x", "path": "x_A-1_out.txt",
                          "camera": "A", "cycle": 1 },
            "wavenumbers": [1.0, 2.0, 3.0],
            "channels": { "SCP Raman": [1.0, 2.0] }
        }]"#;
        let err = parse_entries(text).unwrap_err();
        assert!(format!("{err:#}").contains("SCP Raman"), "{err:#}");
    }

    #[test]
    fn rejects_unknown_extension() {
        assert!(load_entries(Path::new("spectra.parquet")).is_err());
    }

    #[test]
    fn save_then_load_keeps_entries() {
        let entries = parse_entries(TWO_ENTRIES).unwrap();
        let dir = std::env::temp_dir().join(format!("rusty-roa-loader-{}", std::process::id()));
        let path = dir.join("entries.json");

        save_entries(&path, &entries).unwrap();
        let back = load_entries(&path).unwrap();
        assert_eq!(back, entries);

        std::fs::remove_dir_all(&dir).ok();
    }
}
