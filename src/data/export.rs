use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use super::model::{channel_columns, Camera, Modality, SpectrumEntry, WAVENUMBER_COLUMN};
use super::selection::merge_cameras;

// ---------------------------------------------------------------------------
// Tab-separated tables
// ---------------------------------------------------------------------------

/// Write one table: `Wavenumber` followed by every channel, instrument
/// columns first and any other channels after them.
pub fn write_combined<W: Write>(writer: W, entry: &SpectrumEntry) -> Result<()> {
    let mut columns: Vec<&str> = channel_columns()
        .filter(|c| entry.channels.contains_key(*c))
        .collect();
    let extra: Vec<&str> = entry
        .channels
        .keys()
        .map(String::as_str)
        .filter(|c| !columns.contains(c))
        .collect();
    columns.extend(extra);

    write_table(writer, entry, &columns)
}

/// Write `Wavenumber` plus a single channel.
pub fn write_channel<W: Write>(writer: W, entry: &SpectrumEntry, column: &str) -> Result<()> {
    write_table(writer, entry, &[column])
}

fn write_table<W: Write>(writer: W, entry: &SpectrumEntry, columns: &[&str]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer);

    let mut header = vec![WAVENUMBER_COLUMN];
    header.extend_from_slice(columns);
    wtr.write_record(&header).context("writing header")?;

    let series: Vec<&[f64]> = columns
        .iter()
        .map(|c| {
            entry
                .channel(c)
                .with_context(|| format!("{}: no channel '{c}'", entry.uid()))
        })
        .collect::<Result<_>>()?;

    for (row, x) in entry.wavenumbers.iter().enumerate() {
        let mut record = Vec::with_capacity(columns.len() + 1);
        record.push(x.to_string());
        record.extend(series.iter().map(|s| s[row].to_string()));
        wtr.write_record(&record)
            .with_context(|| format!("writing row {row}"))?;
    }
    wtr.flush().context("flushing table")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Files on disk
// ---------------------------------------------------------------------------

/// Merge a camera-A / camera-B pair and write its combined table to `path`.
/// Any other selection is rejected. Returns the merged entry.
pub fn export_combined(path: &Path, entries: &[SpectrumEntry]) -> Result<SpectrumEntry> {
    let [first, second] = entries else {
        bail!("need exactly two spectra (A & B) to combine, got {}", entries.len());
    };
    let (a, b) = match (first.identity.camera(), second.identity.camera()) {
        (Camera::A, Camera::B) => (first, second),
        (Camera::B, Camera::A) => (second, first),
        (x, y) => bail!("need one camera A and one camera B spectrum, got {x} and {y}"),
    };

    let merged = merge_cameras(a, b)?;
    write_combined(create_file(path)?, &merged)?;
    log::info!("wrote combined {} to {}", merged.uid(), path.display());
    Ok(merged)
}

/// For every entry and modality, write one Raman and one ROA file named
/// `{base}_{camera}_{index}_{modality}_{Raman|ROA}.txt`. Channels the entry
/// lacks are skipped. Returns the written paths.
pub fn export_separately(base: &Path, entries: &[SpectrumEntry], modalities: &[Modality]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for entry in entries {
        let camera = entry.identity.camera();
        let index = entry.identity.index_label();
        for &modality in modalities {
            for (column, kind) in [(modality.raman_column(), "Raman"), (modality.roa_column(), "ROA")] {
                if entry.channel(column).is_none() {
                    continue;
                }
                let path = PathBuf::from(format!(
                    "{}_{camera}_{index}_{modality}_{kind}.txt",
                    base.display()
                ));
                write_channel(create_file(&path)?, entry, column)?;
                log::debug!("wrote {}", path.display());
                written.push(path);
            }
        }
    }
    Ok(written)
}

fn create_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))
}
