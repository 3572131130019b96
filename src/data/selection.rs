use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::model::{AcquisitionInfo, Camera, DerivedKind, EntryIdentity, SpectrumEntry};

// ---------------------------------------------------------------------------
// Cycle selection: which views of an experiment to operate on
// ---------------------------------------------------------------------------

/// Cycle choice for one experiment. When `average` is set it wins over
/// `first` / `last`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSelection {
    pub first: bool,
    pub last: bool,
    /// Inclusive cycle range averaged per camera.
    pub average: Option<(u32, u32)>,
}

/// Sorted distinct experiment names.
pub fn experiments(entries: &[SpectrumEntry]) -> BTreeSet<String> {
    entries
        .iter()
        .map(|e| e.identity.experiment().to_string())
        .collect()
}

/// Raw entries of `experiment`, grouped by cycle number.
pub fn cycles_by_number<'a>(
    entries: &'a [SpectrumEntry],
    experiment: &str,
) -> BTreeMap<u32, Vec<&'a SpectrumEntry>> {
    let mut by_cycle: BTreeMap<u32, Vec<&SpectrumEntry>> = BTreeMap::new();
    for entry in entries {
        if let EntryIdentity::Raw { experiment: exp, cycle, .. } = &entry.identity {
            if exp == experiment {
                by_cycle.entry(*cycle).or_default().push(entry);
            }
        }
    }
    by_cycle
}

/// Build the entries a selection refers to: both cameras of the first and/or
/// last cycle, or one averaged entry per camera over a cycle range.
///
/// Nothing selected → empty.
pub fn select_entries(
    entries: &[SpectrumEntry],
    experiment: &str,
    selection: &CycleSelection,
) -> Result<Vec<SpectrumEntry>> {
    let by_cycle = cycles_by_number(entries, experiment);

    if let Some((lo, hi)) = selection.average {
        if lo > hi {
            bail!("empty cycle range {lo}-{hi}");
        }
        let mut averaged = Vec::new();
        for camera in Camera::BOTH {
            let subset: Vec<&SpectrumEntry> = by_cycle
                .range(lo..=hi)
                .flat_map(|(_, group)| group.iter().copied())
                .filter(|e| e.identity.camera() == camera)
                .collect();
            if let Some(avg) = average_entries(&subset)? {
                averaged.push(avg);
            }
        }
        return Ok(averaged);
    }

    let mut cycles = BTreeSet::new();
    if selection.first {
        cycles.extend(by_cycle.keys().next().copied());
    }
    if selection.last {
        cycles.extend(by_cycle.keys().next_back().copied());
    }

    let mut selected: Vec<SpectrumEntry> = cycles
        .iter()
        .flat_map(|c| by_cycle[c].iter().map(|e| (*e).clone()))
        .collect();
    selected.sort_by_key(|e| (e.identity.cycle_range(), e.identity.camera()));
    Ok(selected)
}

// ---------------------------------------------------------------------------
// Derived entries
// ---------------------------------------------------------------------------

/// Point-wise mean of entries sharing one wavenumber grid and channel set.
/// Metadata is taken from the first entry; the cycle range spans all inputs.
pub fn average_entries(entries: &[&SpectrumEntry]) -> Result<Option<SpectrumEntry>> {
    let Some(first) = entries.first() else {
        return Ok(None);
    };
    let n = entries.len() as f64;

    let mut channels = BTreeMap::new();
    for (name, values) in &first.channels {
        let mut acc = vec![0.0; values.len()];
        for entry in entries {
            ensure_same_grid(first, entry)?;
            let Some(v) = entry.channel(name) else {
                bail!("{}: missing channel '{name}'", entry.uid());
            };
            for (a, x) in acc.iter_mut().zip(v) {
                *a += x;
            }
        }
        for a in &mut acc {
            *a /= n;
        }
        channels.insert(name.clone(), acc);
    }

    let first_cycle = entries.iter().map(|e| e.identity.cycle_range().0).min().unwrap_or(0);
    let last_cycle = entries.iter().map(|e| e.identity.cycle_range().1).max().unwrap_or(0);

    Ok(Some(SpectrumEntry {
        identity: EntryIdentity::Derived {
            derived: DerivedKind::Average,
            experiment: first.identity.experiment().to_string(),
            camera: first.identity.camera(),
            first_cycle,
            last_cycle,
            normalized: first.identity.normalized(),
        },
        info: first.info.clone(),
        wavenumbers: first.wavenumbers.clone(),
        channels,
        baselines: None,
    }))
}

/// `current - previous` channel by channel; without a previous cycle the
/// current one is returned as is (difference against zero).
pub fn cycle_delta(current: &SpectrumEntry, previous: Option<&SpectrumEntry>) -> Result<SpectrumEntry> {
    let mut delta = current.clone();
    delta.baselines = None;
    if let Some(prev) = previous {
        ensure_same_grid(current, prev)?;
        for (name, values) in delta.channels.iter_mut() {
            let Some(p) = prev.channel(name) else {
                bail!("{}: missing channel '{name}'", prev.uid());
            };
            for (v, q) in values.iter_mut().zip(p) {
                *v -= q;
            }
        }
    }
    Ok(delta)
}

/// Sum the cycle-to-previous-cycle deltas of the chosen cycles, one derived
/// entry per camera. Gain and power are averaged, times added up.
pub fn summate_cycles(entries: &[SpectrumEntry], experiment: &str, cycles: &[u32]) -> Result<Vec<SpectrumEntry>> {
    if cycles.is_empty() {
        bail!("no cycles selected");
    }
    let chosen: BTreeSet<u32> = cycles.iter().copied().collect();
    let by_cycle = cycles_by_number(entries, experiment);
    let order: Vec<u32> = by_cycle.keys().copied().collect();

    let mut sums = Vec::new();
    for camera in Camera::BOTH {
        let of_camera = |cycle: u32| {
            by_cycle
                .get(&cycle)
                .and_then(|group| group.iter().copied().find(|e| e.identity.camera() == camera))
        };

        let mut total: Option<SpectrumEntry> = None;
        let mut used = Vec::new();
        let mut gains = Vec::new();
        let mut powers = Vec::new();
        let mut time = 0.0;

        for (i, &cycle) in order.iter().enumerate() {
            if !chosen.contains(&cycle) {
                continue;
            }
            let Some(current) = of_camera(cycle) else {
                continue;
            };
            let previous = i.checked_sub(1).and_then(|j| of_camera(order[j]));
            let delta = cycle_delta(current, previous)?;

            total = Some(match total {
                None => delta,
                Some(mut acc) => {
                    add_channels(&mut acc, &delta)?;
                    acc
                }
            });
            used.push(cycle);
            gains.extend(current.info.gain);
            powers.extend(current.info.power);
            time += current.info.total_time.iter().sum::<f64>();
        }

        let Some(mut sum) = total else {
            continue;
        };
        sum.identity = EntryIdentity::Derived {
            derived: DerivedKind::Sum,
            experiment: experiment.to_string(),
            camera,
            first_cycle: used.iter().copied().min().unwrap_or(0),
            last_cycle: used.iter().copied().max().unwrap_or(0),
            normalized: false,
        };
        sum.info = AcquisitionInfo {
            gain: mean(&gains),
            power: mean(&powers.iter().map(|&p| p as f64).collect::<Vec<_>>()).map(|p| p.round() as i64),
            cycles: Some(used.len() as u32),
            total_time: vec![time],
        };
        sums.push(sum);
    }
    Ok(sums)
}

/// Min-max scale every channel into [0, 1] and mark the identity as
/// normalised, which gives the view its own cache UID.
pub fn normalize(entry: &SpectrumEntry) -> SpectrumEntry {
    let mut out = entry.clone();
    out.baselines = None;
    for values in out.channels.values_mut() {
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        if range.abs() < f64::EPSILON {
            values.iter_mut().for_each(|v| *v = 0.0);
        } else {
            values.iter_mut().for_each(|v| *v = (*v - min) / range);
        }
    }
    out.identity.set_normalized(true);
    out
}

/// Combine one camera-A and one camera-B entry: both are linearly
/// interpolated onto the sorted union of their grids, zero outside their own
/// range, and averaged point-wise. Channels follow `a`; `b` must have them all.
pub fn merge_cameras(a: &SpectrumEntry, b: &SpectrumEntry) -> Result<SpectrumEntry> {
    if a.identity.camera() != Camera::A || b.identity.camera() != Camera::B {
        bail!(
            "merging needs camera A then camera B, got {} and {}",
            a.identity.camera(),
            b.identity.camera()
        );
    }

    let mut grid: Vec<f64> = a.wavenumbers.iter().chain(&b.wavenumbers).copied().collect();
    grid.sort_by(f64::total_cmp);
    grid.dedup();

    let mut channels = BTreeMap::new();
    for (name, ya) in &a.channels {
        let Some(yb) = b.channel(name) else {
            bail!("{}: missing channel '{name}'", b.uid());
        };
        let fa = interpolate(&a.wavenumbers, ya, &grid)?;
        let fb = interpolate(&b.wavenumbers, yb, &grid)?;
        let merged = fa.iter().zip(&fb).map(|(u, v)| (u + v) / 2.0).collect();
        channels.insert(name.clone(), merged);
    }

    let (a_lo, a_hi) = a.identity.cycle_range();
    let (b_lo, b_hi) = b.identity.cycle_range();
    Ok(SpectrumEntry {
        identity: EntryIdentity::Derived {
            derived: DerivedKind::Merged,
            experiment: a.identity.experiment().to_string(),
            camera: Camera::A,
            first_cycle: a_lo.min(b_lo),
            last_cycle: a_hi.max(b_hi),
            normalized: a.identity.normalized(),
        },
        info: a.info.clone(),
        wavenumbers: grid,
        channels,
        baselines: None,
    })
}

// -- helpers --

/// Piecewise-linear `y(x)` sampled at `at`; zero outside `[min x, max x]`.
fn interpolate(x: &[f64], y: &[f64], at: &[f64]) -> Result<Vec<f64>> {
    if x.len() != y.len() {
        bail!("{} wavenumbers but {} intensities", x.len(), y.len());
    }
    let mut points: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).collect();
    points.sort_by(|p, q| p.0.total_cmp(&q.0));

    let (Some(&(lo, _)), Some(&(hi, _))) = (points.first(), points.last()) else {
        return Ok(vec![0.0; at.len()]);
    };

    Ok(at
        .iter()
        .map(|&t| {
            if t < lo || t > hi {
                return 0.0;
            }
            let i = points.partition_point(|p| p.0 < t);
            let (x1, y1) = points[i];
            if x1 == t || i == 0 {
                return y1;
            }
            let (x0, y0) = points[i - 1];
            y0 + (y1 - y0) * (t - x0) / (x1 - x0)
        })
        .collect())
}

fn ensure_same_grid(a: &SpectrumEntry, b: &SpectrumEntry) -> Result<()> {
    let same = a.wavenumbers.len() == b.wavenumbers.len()
        && a
            .wavenumbers
            .iter()
            .zip(&b.wavenumbers)
            .all(|(x, y)| (x - y).abs() <= 1e-9 * x.abs().max(1.0));
    if !same {
        bail!("{} and {} are on different wavenumber grids", a.uid(), b.uid());
    }
    Ok(())
}

fn add_channels(acc: &mut SpectrumEntry, other: &SpectrumEntry) -> Result<()> {
    ensure_same_grid(acc, other)?;
    for (name, values) in acc.channels.iter_mut() {
        let Some(o) = other.channel(name) else {
            bail!("{}: missing channel '{name}'", other.uid());
        };
        for (v, x) in values.iter_mut().zip(o) {
            *v += x;
        }
    }
    Ok(())
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn raw(experiment: &str, camera: Camera, cycle: u32, scp: Vec<f64>) -> SpectrumEntry {
        let mut e = SpectrumEntry::new(
            EntryIdentity::Raw {
                experiment: experiment.into(),
                path: PathBuf::from(format!("{experiment}_{camera}-{cycle}_out.txt")),
                camera,
                cycle,
                normalized: false,
            },
            (0..scp.len()).map(|i| 200.0 + i as f64).collect(),
            BTreeMap::from([("SCP Raman".to_string(), scp)]),
        );
        e.info = AcquisitionInfo {
            gain: Some(2.0 * cycle as f64),
            power: Some(100),
            cycles: Some(cycle),
            total_time: vec![1.0, 0.5],
        };
        e
    }

    /// Cumulative acquisitions: cycle c holds c * (1, 2, 3).
    fn experiment() -> Vec<SpectrumEntry> {
        let mut entries = Vec::new();
        for cycle in 1..=4 {
            let c = cycle as f64;
            entries.push(raw("lyso", Camera::B, cycle, vec![c, 2.0 * c, 3.0 * c]));
            entries.push(raw("lyso", Camera::A, cycle, vec![c, 2.0 * c, 3.0 * c]));
        }
        entries.push(raw("other", Camera::A, 1, vec![0.0; 3]));
        entries
    }

    #[test]
    fn lists_experiments() {
        let names: Vec<_> = experiments(&experiment()).into_iter().collect();
        assert_eq!(names, vec!["lyso", "other"]);
    }

    #[test]
    fn first_and_last_give_both_cameras() {
        let selection = CycleSelection { first: true, last: true, average: None };
        let selected = select_entries(&experiment(), "lyso", &selection).unwrap();
        let keys: Vec<_> = selected
            .iter()
            .map(|e| (e.identity.cycle_range().0, e.identity.camera()))
            .collect();
        assert_eq!(keys, vec![(1, Camera::A), (1, Camera::B), (4, Camera::A), (4, Camera::B)]);
    }

    #[test]
    fn nothing_selected_is_empty() {
        let selected = select_entries(&experiment(), "lyso", &CycleSelection::default()).unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn average_over_range_is_derived_per_camera() {
        let selection = CycleSelection { average: Some((2, 4)), ..Default::default() };
        let averaged = select_entries(&experiment(), "lyso", &selection).unwrap();
        assert_eq!(averaged.len(), 2);

        let a = &averaged[0];
        assert_eq!(a.identity.camera(), Camera::A);
        assert_eq!(a.channels["SCP Raman"], vec![3.0, 6.0, 9.0]);
        assert_eq!(a.identity.uid(), "<avg:lyso>|A|2-4|norm=0");
        assert_eq!(a.identity.index_label(), "2-4");
    }

    #[test]
    fn reversed_range_is_rejected() {
        let selection = CycleSelection { average: Some((4, 2)), ..Default::default() };
        assert!(select_entries(&experiment(), "lyso", &selection).is_err());
    }

    #[test]
    fn averaging_different_grids_fails() {
        let a = raw("lyso", Camera::A, 1, vec![1.0, 2.0, 3.0]);
        let mut b = raw("lyso", Camera::A, 2, vec![1.0, 2.0, 3.0]);
        b.wavenumbers[1] += 0.5;
        assert!(average_entries(&[&a, &b]).is_err());
        assert!(average_entries(&[]).unwrap().is_none());
    }

    #[test]
    fn summed_deltas_telescope() {
        let sums = summate_cycles(&experiment(), "lyso", &[2, 3, 4]).unwrap();
        assert_eq!(sums.len(), 2);

        // (c2 - c1) + (c3 - c2) + (c4 - c3) = c4 - c1
        let a = &sums[0];
        assert_eq!(a.channels["SCP Raman"], vec![3.0, 6.0, 9.0]);
        assert_eq!(a.identity.index_label(), "sum_2-4");
        assert_eq!(a.info.cycles, Some(3));
        assert_eq!(a.info.gain, Some(6.0));
        assert_eq!(a.info.power, Some(100));
        assert_eq!(a.info.total_time, vec![4.5]);
    }

    #[test]
    fn first_cycle_delta_is_against_zero() {
        let sums = summate_cycles(&experiment(), "lyso", &[1]).unwrap();
        assert_eq!(sums[0].channels["SCP Raman"], vec![1.0, 2.0, 3.0]);
        assert!(summate_cycles(&experiment(), "lyso", &[]).is_err());
    }

    #[test]
    fn normalize_scales_and_flags() {
        let mut e = raw("lyso", Camera::A, 1, vec![2.0, 4.0, 6.0]);
        e.channels.insert("SCP ROA".into(), vec![5.0; 3]);
        let n = normalize(&e);

        assert_eq!(n.channels["SCP Raman"], vec![0.0, 0.5, 1.0]);
        assert_eq!(n.channels["SCP ROA"], vec![0.0; 3]);
        assert!(n.identity.normalized());
        assert_ne!(n.uid(), e.uid());
    }

    fn on_grid(camera: Camera, x: Vec<f64>, scp: Vec<f64>) -> SpectrumEntry {
        let mut e = raw("lyso", camera, 3, scp);
        e.wavenumbers = x;
        e
    }

    #[test]
    fn merge_interpolates_onto_union_grid_with_zero_fill() {
        let a = on_grid(Camera::A, vec![0.0, 1.0, 2.0], vec![0.0, 2.0, 4.0]);
        let b = on_grid(Camera::B, vec![1.5, 2.5, 3.0], vec![1.0, 1.0, 1.0]);
        let merged = merge_cameras(&a, &b).unwrap();

        assert_eq!(merged.wavenumbers, vec![0.0, 1.0, 1.5, 2.0, 2.5, 3.0]);
        // A is zero above 2, B is zero below 1.5; 1.5 on A is interpolated to 3.
        assert_eq!(merged.channels["SCP Raman"], vec![0.0, 1.0, 2.0, 2.5, 0.5, 0.5]);
        assert_eq!(merged.uid(), "<ab:lyso>|A|3-3|norm=0");
        assert_eq!(merged.identity.index_label(), "AB_3-3");
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn merge_on_shared_grid_is_the_mean() {
        let a = raw("lyso", Camera::A, 2, vec![1.0, 2.0, 3.0]);
        let b = raw("lyso", Camera::B, 2, vec![3.0, 4.0, 5.0]);
        let merged = merge_cameras(&a, &b).unwrap();
        assert_eq!(merged.wavenumbers, a.wavenumbers);
        assert_eq!(merged.channels["SCP Raman"], vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn merge_needs_one_entry_per_camera_and_shared_channels() {
        let a = raw("lyso", Camera::A, 1, vec![1.0, 2.0, 3.0]);
        let b = raw("lyso", Camera::B, 1, vec![1.0, 2.0, 3.0]);
        assert!(merge_cameras(&a, &a).is_err());
        assert!(merge_cameras(&b, &a).is_err());

        let mut extra = a.clone();
        extra.channels.insert("SCP ROA".into(), vec![0.0; 3]);
        assert!(merge_cameras(&extra, &b).is_err());
    }
}
