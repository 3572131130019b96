use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use rusty_roa::data::loader::save_entries;
use rusty_roa::data::model::{AcquisitionInfo, Camera, EntryIdentity, Modality, SpectrumEntry};

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Broad fluorescence hump that decays slowly over the cycles (photobleaching).
fn fluorescence(x: f64, cycle: u32) -> f64 {
    let bleach = 0.85f64.powi(cycle as i32 - 1);
    bleach * (400.0 + 0.15 * x + gaussian(x, 1600.0, 700.0, 900.0))
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);

    // Wavenumbers: 200 → 1998, step 2
    let wavenumbers: Vec<f64> = (0..900).map(|i| 200.0 + i as f64 * 2.0).collect();

    // (position, width, Raman height, ROA sign × height)
    let bands = [
        (520.0, 8.0, 120.0, 0.8),
        (1003.0, 5.0, 300.0, -1.5),
        (1250.0, 12.0, 90.0, 0.6),
        (1450.0, 10.0, 150.0, -0.9),
        (1660.0, 14.0, 200.0, 1.2),
    ];
    // Per-modality intensity scale of the same sample.
    let scales = [(Modality::Scp, 1.0), (Modality::Dcpi, 0.8), (Modality::Dcpii, 0.6), (Modality::Scpc, 0.9)];

    let experiment = "lysozyme";
    let mut entries = Vec::new();

    for cycle in 1..=6u32 {
        for camera in Camera::BOTH {
            let gain = if camera == Camera::A { 2.0 } else { 2.2 };
            let mut channels = BTreeMap::new();

            for &(modality, scale) in &scales {
                // Acquisition is cumulative, so cycle n holds n cycles of signal.
                let n = cycle as f64;
                let raman: Vec<f64> = wavenumbers
                    .iter()
                    .map(|&x| {
                        let peaks: f64 = bands.iter().map(|&(mu, s, h, _)| gaussian(x, mu, s, h)).sum();
                        n * scale * peaks + fluorescence(x, cycle) + rng.gauss(0.0, 4.0)
                    })
                    .collect();
                let roa: Vec<f64> = wavenumbers
                    .iter()
                    .map(|&x| {
                        let peaks: f64 = bands.iter().map(|&(mu, s, _, r)| gaussian(x, mu, s, r)).sum();
                        n * scale * peaks + rng.gauss(0.0, 0.05)
                    })
                    .collect();

                channels.insert(modality.raman_column().to_string(), raman);
                channels.insert(modality.roa_column().to_string(), roa);
            }

            let mut entry = SpectrumEntry::new(
                EntryIdentity::Raw {
                    experiment: experiment.to_string(),
                    path: PathBuf::from(format!("{experiment}_{camera}-{cycle}_out.txt")),
                    camera,
                    cycle,
                    normalized: false,
                },
                wavenumbers.clone(),
                channels,
            );
            entry.info = AcquisitionInfo {
                gain: Some(gain),
                power: Some(300),
                cycles: Some(cycle),
                total_time: vec![cycle as f64 * 12.5],
            };
            entries.push(entry);
        }
    }

    let output_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sample_data/lysozyme_cycles.json".to_string());
    save_entries(Path::new(&output_path), &entries)?;

    println!(
        "Wrote {} spectra ({} wavenumbers each) to {output_path}",
        entries.len(),
        wavenumbers.len()
    );
    Ok(())
}
