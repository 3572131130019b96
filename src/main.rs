use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use rusty_roa::config::BaselineConfig;
use rusty_roa::data::export::export_separately;
use rusty_roa::data::loader::load_entries;
use rusty_roa::state::AppState;

const USAGE: &str = "usage: rusty-roa <entries.json> [config.json] [output-prefix]";

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(input) = args.next() else {
        bail!(USAGE);
    };
    let config = match args.next() {
        Some(path) => BaselineConfig::load(Path::new(&path))?,
        None => BaselineConfig::default(),
    };
    let output = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("corrected/spectrum"));

    let mut state = AppState::from_config(config);
    state.set_entries(load_entries(Path::new(&input))?);

    let Some(experiment) = state.experiment.clone() else {
        bail!("{input} contains no spectra");
    };
    log::info!("experiment '{experiment}', selection {:?}", state.selection);

    let fitted = state.create_baselines()?;
    if fitted.is_empty() {
        bail!("selection is empty; enable first/last cycle or an average range");
    }
    let corrected = state.subtract_baselines()?;
    if let Some(msg) = &state.status_message {
        log::info!("{msg}");
    }

    let modalities: Vec<_> = state.modalities.enabled().collect();
    let written = export_separately(&output, &corrected, &modalities)?;
    println!("Wrote {} files with prefix {}", written.len(), output.display());
    Ok(())
}
