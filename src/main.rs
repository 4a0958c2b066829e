use RuSen::batch;
use RuSen::driver::{Simulation, SimulationError};
use RuSen::engine::{EngineError, ReactorEngine};
use RuSen::ideal_gas::{IdealGasEngine, Mechanism};
use RuSen::keywords::{self, KeywordError};
use RuSen::model::ReactorModel;
use RuSen::printer::{self, PrinterError};
use RuSen::save::SaveFile;
use clap::{CommandFactory, Parser};
use log::info;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{self, Command};
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(
    name = "rusen",
    about = "SENKIN-style zero-dimensional reactor simulation driver",
    disable_version_flag = true
)]
struct Args {
    /// Keyword input file
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// Mechanism file
    #[arg(short = 'c', long = "chem", default_value = "chem.json")]
    chem: PathBuf,

    /// Thermodynamic database for mechanism conversion
    #[arg(short = 'd', long = "thermo")]
    thermo: Option<PathBuf>,

    /// Text output file
    #[arg(short = 'o', long = "output", default_value = "output.out")]
    output: PathBuf,

    /// Binary-equivalent time-series save file
    #[arg(short = 'x', long = "save", default_value = "save.jsonl")]
    save: PathBuf,

    /// Convert the mechanism with ck2yaml and exit
    #[arg(long = "convert")]
    convert: bool,

    /// Run the cases in the input file in parallel on N workers
    /// (defaults to one per core)
    #[arg(
        short = 'm',
        long = "multi",
        num_args = 0..=1,
        default_missing_value = "0",
        value_name = "N"
    )]
    multi: Option<usize>,

    /// Print version information and exit
    #[arg(short = 'V', long = "version")]
    version: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("the specified file \"{0}\" does not exist")]
    FileNotFound(PathBuf),
    #[error("an input file is required")]
    NoInput,
    #[error("mechanism conversion failed with status {0}")]
    Convert(process::ExitStatus),
    #[error(transparent)]
    Keyword(#[from] KeywordError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Printer(#[from] PrinterError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn require_exists(path: &Path) -> Result<(), CliError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CliError::FileNotFound(path.to_path_buf()))
    }
}

/// One-shot CHEMKIN mechanism conversion through the external ck2yaml tool.
fn convert_mech(chem: &Path, thermo: Option<&Path>) -> Result<PathBuf, CliError> {
    let converted = chem.with_extension("yaml");
    let mut cmd = Command::new("ck2yaml");
    cmd.arg(format!("--input={}", chem.display()));
    if let Some(thermo) = thermo {
        cmd.arg(format!("--thermo={}", thermo.display()));
    }
    cmd.arg(format!("--output={}", converted.display()));
    let status = cmd.status()?;
    if !status.success() {
        return Err(CliError::Convert(status));
    }
    Ok(converted)
}

fn run(args: Args) -> Result<(), CliError> {
    if args.version {
        let exe = std::env::current_exe().unwrap_or_default();
        println!(
            "{} {} from {} ()",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            exe.display()
        );
        return Ok(());
    }

    if args.convert {
        require_exists(&args.chem)?;
        if let Some(thermo) = &args.thermo {
            require_exists(thermo)?;
        }
        let converted = convert_mech(&args.chem, args.thermo.as_deref())?;
        println!("Converted mechanism written to {}", converted.display());
        return Ok(());
    }

    let input = args.input.as_deref().ok_or(CliError::NoInput)?;
    require_exists(input)?;
    require_exists(&args.chem)?;
    if let Some(thermo) = &args.thermo {
        require_exists(thermo)?;
    }

    let text = fs::read_to_string(input)?;
    let mechanism = Mechanism::from_file(&args.chem)?;

    match args.multi {
        Some(n_workers) => {
            // Batch mode: the output file carries the summary table, the
            // console carries progress and per-case failures.
            printer::init_logging(None, true)?;
            let cases = batch::split_cases(&text);
            let results = batch::run_batch(&cases, n_workers, |config| {
                let model = ReactorModel::resolve(config.problem_type);
                let engine: Box<dyn ReactorEngine> =
                    Box::new(IdealGasEngine::new(&mechanism, model)?);
                Ok(engine)
            });
            let mut out = File::create(&args.output)?;
            batch::write_summary(&results, &mut out)?;
            batch::print_summary_table(&results);
        }
        None => {
            printer::init_logging(Some(&args.output), true)?;
            info!(
                "This is {}, a SENKIN-style reactor simulation driver.\nVersion: {}\n",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            );
            let config = keywords::parse_str(&text)?;
            let model = ReactorModel::resolve(config.problem_type);
            let engine = IdealGasEngine::new(&mechanism, model)?;
            printer::mechanism_summary(&engine, &args.chem);
            let mut save_file = SaveFile::create(&args.save)?;
            let mut sim = Simulation::new(config, Box::new(engine));
            sim.run_simulation(Some(&mut save_file))?;
        }
    }
    Ok(())
}

fn main() {
    if std::env::args().len() == 1 {
        let _ = Args::command().print_help();
        process::exit(1);
    }
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}
