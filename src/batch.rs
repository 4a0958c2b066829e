//! Parallel execution of multi-case input files.
//!
//! A multi-case file is cut at END keywords; each case is an independent
//! simulation, run quietly with no time-series persistence. A fixed pool of
//! worker threads pulls case indices from a shared counter and reports
//! results over a channel, so no worker ever touches another worker's case.
//! A case that fails to parse or integrate is logged and left out of the
//! summary; it never aborts the sweep.

use crate::driver::{Simulation, SimulationError};
use crate::engine::{EngineError, ReactorEngine};
use crate::keywords::{self, Configuration, KeywordError};
use log::{error, info};
use prettytable::{Table, row};
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaseError {
    #[error(transparent)]
    Keyword(#[from] KeywordError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// Outcome of one case in a sweep. Pressure and temperature are the initial
/// values of the case, for identifying the point in the sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub case_index: usize,
    pub ignition_time: Option<f64>,
    /// atm
    pub pressure: f64,
    /// K
    pub temperature: f64,
    pub eq_ratio: Option<f64>,
}

/// Split a multi-case input into the line lists of the individual cases.
/// Comment lines are dropped, END closes a case, trailing lines with no END
/// are discarded.
pub fn split_cases(text: &str) -> Vec<Vec<String>> {
    let mut cases = Vec::new();
    let mut current = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty()
            || trimmed.starts_with('!')
            || trimmed.starts_with('.')
            || trimmed.starts_with('/')
        {
            continue;
        }
        current.push(line.to_string());
        if trimmed.to_uppercase().starts_with("END") {
            cases.push(std::mem::take(&mut current));
        }
    }
    cases
}

fn run_one<F>(lines: &[String], factory: &F) -> Result<BatchResult, CaseError>
where
    F: Fn(&Configuration) -> Result<Box<dyn ReactorEngine>, EngineError>,
{
    let config = keywords::parse_input(lines)?;
    let engine = factory(&config)?;
    let mut sim = Simulation::new(config, engine).quiet();
    sim.setup()?;
    sim.run(None)?;
    Ok(BatchResult {
        case_index: 0,
        ignition_time: sim.ignition_time(),
        pressure: sim.config().initial_pressure,
        temperature: sim.config().initial_temperature,
        eq_ratio: sim.eq_ratio(),
    })
}

/// Run all cases on `n_workers` OS threads (0 means one per available
/// core). Results come back in input order; failed cases are omitted.
pub fn run_batch<F>(cases: &[Vec<String>], n_workers: usize, factory: F) -> Vec<BatchResult>
where
    F: Fn(&Configuration) -> Result<Box<dyn ReactorEngine>, EngineError> + Sync,
{
    let n_workers = if n_workers == 0 {
        thread::available_parallelism().map_or(1, usize::from)
    } else {
        n_workers
    }
    .min(cases.len().max(1));

    let next_case = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<(usize, Result<BatchResult, CaseError>)>();

    thread::scope(|scope| {
        for _ in 0..n_workers {
            let tx = tx.clone();
            let next_case = &next_case;
            let factory = &factory;
            scope.spawn(move || {
                loop {
                    let index = next_case.fetch_add(1, Ordering::SeqCst);
                    if index >= cases.len() {
                        break;
                    }
                    let result = run_one(&cases[index], factory).map(|mut res| {
                        res.case_index = index;
                        res
                    });
                    info!("Done with {}", index);
                    if tx.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(tx);

    let mut results: Vec<BatchResult> = rx
        .into_iter()
        .filter_map(|(index, result)| match result {
            Ok(res) => Some(res),
            Err(err) => {
                error!("case {} failed: {}", index, err);
                None
            }
        })
        .collect();
    results.sort_by_key(|r| r.case_index);
    results
}

/// Write the ignition-delay sweep summary. A case that never ignited gets a
/// dash in the delay column.
pub fn write_summary<W: Write>(results: &[BatchResult], out: &mut W) -> io::Result<()> {
    writeln!(
        out,
        "# Ignition delay [s], Pressure [atm], Temperature [K], Equivalence ratio"
    )?;
    for res in results {
        let delay = match res.ignition_time {
            Some(t) => format!("{:.8e}", t),
            None => "-".to_string(),
        };
        match res.eq_ratio {
            Some(phi) => writeln!(
                out,
                "{} {:.2} {:.1} {:.2}",
                delay, res.pressure, res.temperature, phi
            )?,
            None => writeln!(out, "{} {:.2} {:.1}", delay, res.pressure, res.temperature)?,
        }
    }
    Ok(())
}

/// Console display of the sweep results.
pub fn print_summary_table(results: &[BatchResult]) {
    let mut table = Table::new();
    table.add_row(row![
        "Case",
        "Ignition delay [s]",
        "Pressure [atm]",
        "Temperature [K]",
        "Equivalence ratio"
    ]);
    for res in results {
        let delay = match res.ignition_time {
            Some(t) => format!("{:.8e}", t),
            None => "-".to_string(),
        };
        let phi = match res.eq_ratio {
            Some(phi) => format!("{:.2}", phi),
            None => String::new(),
        };
        table.add_row(row![
            res.case_index,
            delay,
            format!("{:.2}", res.pressure),
            format!("{:.1}", res.temperature),
            phi
        ]);
    }
    table.printstd();
}
