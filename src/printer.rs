//! Console and text-file report stream.
//!
//! Everything user-facing goes through the `log` macros; initialization
//! installs a combined logger that mirrors the console to the text output
//! file. Batch mode keeps the console quiet and logs to the file only.

use crate::driver::TimeSample;
use crate::engine::ReactorEngine;
use log::{LevelFilter, info};
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

pub const DIVIDER: &str =
    "********************************************************************************";

#[derive(Debug, Error)]
pub enum PrinterError {
    #[error("cannot open the output file: {0}")]
    Io(#[from] std::io::Error),
    #[error("the logger was already initialized")]
    Logger(#[from] log::SetLoggerError),
}

fn log_config() -> Config {
    ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_location_level(LevelFilter::Off)
        .set_level_padding(simplelog::LevelPadding::Off)
        .build()
}

/// Install the report stream: the terminal, mirrored to a text output file
/// when one is given. Batch runs keep the output file for the summary table
/// and log to the terminal only.
pub fn init_logging(output: Option<&Path>, console: bool) -> Result<(), PrinterError> {
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if console {
        loggers.push(TermLogger::new(
            LevelFilter::Info,
            log_config(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }
    if let Some(path) = output {
        loggers.push(WriteLogger::new(
            LevelFilter::Info,
            log_config(),
            File::create(path)?,
        ));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}

/// Header block describing the loaded mechanism and the initial state.
pub fn mechanism_summary(engine: &dyn ReactorEngine, mechanism: &Path) {
    info!("{}", DIVIDER);
    info!("Mechanism file: {}", mechanism.display());
    info!("Number of species:   {:>6}", engine.n_species());
    info!("Number of reactions: {:>6}", engine.n_reactions());
    info!("Initial temperature (K) = {:>13.4}", engine.temperature());
    info!("Initial pressure (Pa)   = {:>13.4E}", engine.pressure());
    info!("Initial volume (m**3)   = {:>13.4E}", engine.volume());
}

/// Pretty-print one reactor state snapshot. The state arrives explicitly
/// because print points are usually interpolated between engine steps.
pub fn reactor_state(
    sample: &TimeSample,
    species_names: &[String],
    ignition_time: Option<f64>,
    end: bool,
) {
    info!("{}", DIVIDER);
    if end {
        info!("End time reached (s) = {:E}", sample.time);
    } else {
        info!("Solution time (s) = {:E}", sample.time);
    }
    if let Some(t_ign) = ignition_time {
        info!("Ignition time (s) = {:E}", t_ign);
    } else if end {
        info!("Ignition was not found.");
    }
    info!("Reactor Temperature (K) = {:>13.4}", sample.temperature);
    info!("Reactor Pressure (Pa)   = {:>13.4E}", sample.pressure);
    info!("Reactor Volume (m**3)   = {:>13.4E}", sample.volume);
    info!("Reactor Vdot (m**3/s)   = {:>13.4E}", sample.wall_rate);
    info!("Gas Phase Mole Fractions:");

    // Pack the species columns into an 80-character line. Each entry takes
    // the longest name plus " = " plus a 6-digit exponential value.
    let name_width = species_names.iter().map(String::len).max().unwrap_or(1) + 1;
    let part_length = name_width + 3 + 8 + 5;
    let num_cols = (80 / part_length).max(1);
    let entries: Vec<String> = species_names
        .iter()
        .zip(sample.mole_fractions.iter())
        .map(|(name, x)| format!("{:>name_width$} = {:.6E}", name, x))
        .collect();
    for chunk in entries.chunks(num_cols) {
        info!("{}", chunk.join(""));
    }
    info!("{}\n", DIVIDER);
}
