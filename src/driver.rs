//! Time-stepping driver: advances the engine to the end time, reports at
//! the print cadence, persists rows at the save cadence, and watches for
//! ignition.
//!
//! The engine steps with its own internal step size and may overshoot the
//! end time; the driver then interpolates the state back to exactly the end
//! time. Linear interpolation is poor if the end time falls inside the
//! ignition event itself, but the engine takes small steps there.

use crate::engine::{EngineError, ReactorEngine};
use crate::keywords::Configuration;
use crate::mixture::{self, CompositionError};
use crate::model::{BoundaryKind, ReactorModel};
use crate::printer;
use crate::profiles::{
    BoundaryProfile, IcEngineKinematics, Profile, TemperatureTableProfile, UserFunction,
    VolumeRateProfile,
};
use crate::save::{SaveFile, SavedRow};
use log::{info, warn};
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;
use thiserror::Error;

/// Pa
pub const ONE_ATM: f64 = 101325.0;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Composition(#[from] CompositionError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("cannot write the save file: {0}")]
    Io(#[from] std::io::Error),
    #[error("inconsistent configuration: {0}")]
    Config(String),
}

/// How a simulation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// the end time was reached
    Completed,
    /// ignition was detected and the case asked to stop there
    IgnitionStop,
}

/// Snapshot of the reactor state at one instant, used for printing and for
/// the back-interpolation at the end time.
#[derive(Debug, Clone)]
pub struct TimeSample {
    pub time: f64,
    pub temperature: f64,
    pub pressure: f64,
    pub volume: f64,
    pub wall_rate: f64,
    pub mole_fractions: DVector<f64>,
}

/// Affine interpolation between two samples at `time`, which must lie
/// between them.
pub fn interpolate_state(time: f64, prev: &TimeSample, cur: &TimeSample) -> TimeSample {
    let frac = (time - prev.time) / (cur.time - prev.time);
    TimeSample {
        time,
        temperature: prev.temperature + frac * (cur.temperature - prev.temperature),
        pressure: prev.pressure + frac * (cur.pressure - prev.pressure),
        volume: prev.volume + frac * (cur.volume - prev.volume),
        wall_rate: prev.wall_rate + frac * (cur.wall_rate - prev.wall_rate),
        mole_fractions: &prev.mole_fractions
            + (&cur.mole_fractions - &prev.mole_fractions) * frac,
    }
}

/// One simulation case: a configuration, the resolved reactor model and the
/// engine that integrates it.
pub struct Simulation {
    config: Configuration,
    model: ReactorModel,
    engine: Box<dyn ReactorEngine>,
    /// imposed-temperature boundary, applied before every step
    temp_profile: Option<BoundaryProfile>,
    ignition_time: Option<f64>,
    /// suppress console reporting, for batch workers
    quiet: bool,
}

impl Simulation {
    pub fn new(config: Configuration, engine: Box<dyn ReactorEngine>) -> Self {
        let model = ReactorModel::resolve(config.problem_type);
        Simulation {
            config,
            model,
            engine,
            temp_profile: None,
            ignition_time: None,
            quiet: false,
        }
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn model(&self) -> ReactorModel {
        self.model
    }

    pub fn engine(&self) -> &dyn ReactorEngine {
        self.engine.as_ref()
    }

    pub fn ignition_time(&self) -> Option<f64> {
        self.ignition_time
    }

    /// Equivalence ratio of the initial charge, when it was specified that
    /// way.
    pub fn eq_ratio(&self) -> Option<f64> {
        self.config.mixture.as_ref().map(|m| m.eq_ratio)
    }

    /// Push the configuration into the engine: volume, initial state,
    /// tolerances, boundary condition, sensitivity.
    pub fn setup(&mut self) -> Result<(), SimulationError> {
        let composition: HashMap<String, f64> = match (&self.config.reactants, &self.config.mixture)
        {
            (Some(reactants), _) => reactants.iter().cloned().collect(),
            (None, Some(spec)) => mixture::compose(spec)?,
            (None, None) => {
                return Err(SimulationError::Config(
                    "no initial composition".to_string(),
                ));
            }
        };

        self.engine.set_volume(self.config.reactor_volume);
        self.engine.set_state(
            self.config.initial_temperature,
            self.config.initial_pressure * ONE_ATM,
            &composition,
        )?;
        self.engine
            .set_tolerances(self.config.abs_tol(), self.config.rel_tol());
        self.engine.set_max_time_step(self.config.max_step());

        match self.model.boundary {
            BoundaryKind::None => {}
            BoundaryKind::VolumeTable => {
                let (times, volumes) = self.config.volume_profile.clone().ok_or_else(|| {
                    SimulationError::Config("volume profile table is empty".to_string())
                })?;
                self.engine
                    .install_wall(VolumeRateProfile::new(times, volumes).into());
            }
            BoundaryKind::EngineKinematics => {
                let geom = self.config.engine.clone().ok_or_else(|| {
                    SimulationError::Config("engine geometry is missing".to_string())
                })?;
                self.engine.install_wall(
                    IcEngineKinematics::new(
                        geom.rev_per_min,
                        geom.start_crank_angle,
                        geom.stroke_length,
                        geom.rod_radius_ratio,
                    )
                    .into(),
                );
            }
            BoundaryKind::VolumeFunction => {
                warn!("no user volume routine is installed, the wall will not move");
                self.engine.install_wall(UserFunction::zero().into());
            }
            BoundaryKind::TemperatureFunction => {
                warn!(
                    "no user temperature routine is installed, the temperature \
                     will be held at its initial value"
                );
                self.temp_profile =
                    Some(UserFunction::constant(self.config.initial_temperature).into());
            }
            BoundaryKind::TemperatureTable => {
                let (times, temps) = self.config.temperature_profile.clone().ok_or_else(|| {
                    SimulationError::Config("temperature profile table is empty".to_string())
                })?;
                self.temp_profile = Some(TemperatureTableProfile::new(times, temps).into());
            }
        }

        if self.config.sensitivity {
            self.engine
                .enable_sensitivity(self.config.sens_abs_tol(), self.config.sens_rel_tol());
        }
        Ok(())
    }

    /// Replace the default boundary routine for the user-function models.
    pub fn install_user_routine(&mut self, func: Box<dyn Fn(f64) -> f64 + Send + Sync>) {
        match self.model.boundary {
            BoundaryKind::VolumeFunction => {
                self.engine.install_wall(UserFunction::new(func).into());
            }
            BoundaryKind::TemperatureFunction => {
                self.temp_profile = Some(UserFunction::new(func).into());
            }
            _ => warn!("the reactor model takes no user routine, ignoring it"),
        }
    }

    fn sample(&self) -> TimeSample {
        let time = self.engine.time();
        TimeSample {
            time,
            temperature: self.engine.temperature(),
            pressure: self.engine.pressure(),
            volume: self.engine.volume(),
            wall_rate: self.engine.wall_rate(time),
            mole_fractions: self.engine.mole_fractions(),
        }
    }

    fn exact_row(&self) -> SavedRow {
        SavedRow {
            time: self.engine.time(),
            temperature: self.engine.temperature(),
            pressure: self.engine.pressure(),
            volume: self.engine.volume(),
            mass_fractions: self.engine.mass_fractions().iter().copied().collect(),
            sensitivity: self
                .config
                .sensitivity
                .then(|| matrix_rows(&self.engine.sensitivities())),
        }
    }

    /// Run the case to completion, optionally persisting the time-series.
    pub fn run(&mut self, mut save: Option<&mut SaveFile>) -> Result<Outcome, SimulationError> {
        let tend = self.config.end_time;
        let print_step = self.config.print_step();
        let mut print_time = print_step;
        let mut save_time = self.config.save_interval;
        let temp_limit = self.config.temp_limit_abs();
        let species: Vec<String> = self.engine.species_names().to_vec();
        self.ignition_time = None;
        let mut ignition_found = false;

        // Snapshot before the first step: the sensitivity of the initial
        // state is identically zero.
        let mut prev = self.sample();
        let mut last_saved: Option<(f64, DMatrix<f64>)> = None;
        if let Some(file) = save.as_deref_mut() {
            let mut row = self.exact_row();
            if self.config.sensitivity {
                let zeros = DMatrix::zeros(
                    self.model.n_vars(self.engine.n_species()),
                    self.engine.n_sensitivity_params(),
                );
                row.sensitivity = Some(matrix_rows(&zeros));
                last_saved = Some((prev.time, zeros));
            }
            file.write_row(&row)?;
        }

        if !self.quiet {
            info!("{}", printer::DIVIDER);
            info!("Kinetic Mechanism Details:\n");
            info!(
                "Total Gas Phase Species     = {}\nTotal Gas Phase Reactions   = {}",
                self.engine.n_species(),
                self.engine.n_reactions()
            );
            if self.config.sensitivity {
                info!(
                    "Total Sensitivity Reactions = {}",
                    self.engine.n_sensitivity_params()
                );
            }
            info!("{}\n", printer::DIVIDER);
            printer::reactor_state(&prev, &species, self.ignition_time, false);
        }

        while self.engine.time() < tend {
            if let Some(profile) = &self.temp_profile {
                self.engine
                    .set_temperature(profile.value_at(self.engine.time()));
            }

            let new_time = self.engine.step(tend)?;
            let cur = self.sample();

            if new_time > tend {
                // Overshot: report and save the state interpolated back to
                // exactly the end time.
                let interp = interpolate_state(tend, &prev, &cur);
                if !self.quiet {
                    printer::reactor_state(&interp, &species, self.ignition_time, true);
                }
                if let Some(file) = save.as_deref_mut() {
                    let sensitivity = match (&last_saved, self.config.sensitivity) {
                        (Some((t_prev, s_prev)), true) => {
                            let s_cur = self.engine.sensitivities();
                            let frac = (tend - t_prev) / (new_time - t_prev);
                            Some(matrix_rows(&(s_prev + (s_cur - s_prev) * frac)))
                        }
                        (None, true) => Some(matrix_rows(&self.engine.sensitivities())),
                        _ => None,
                    };
                    file.write_row(&SavedRow {
                        time: tend,
                        temperature: interp.temperature,
                        pressure: interp.pressure,
                        volume: interp.volume,
                        mass_fractions: mass_from_moles(
                            &interp.mole_fractions,
                            self.engine.molecular_weights(),
                        ),
                        sensitivity,
                    })?;
                    file.flush()?;
                }
                break;
            }

            // Save cadence: exact solver states only, never interpolated.
            // Without an interval every step is saved.
            match save_time {
                Some(due) if new_time > due => {
                    if let Some(file) = save.as_deref_mut() {
                        let row = self.exact_row();
                        if let Some(sens) = &row.sensitivity {
                            last_saved = Some((row.time, rows_matrix(sens)));
                        }
                        file.write_row(&row)?;
                    }
                    save_time = Some(due + self.config.save_interval.unwrap_or(0.0));
                }
                Some(_) => {}
                None => {
                    if let Some(file) = save.as_deref_mut() {
                        let row = self.exact_row();
                        if let Some(sens) = &row.sensitivity {
                            last_saved = Some((row.time, rows_matrix(sens)));
                        }
                        file.write_row(&row)?;
                    }
                }
            }

            // Print cadence: interpolate when the step jumped over the
            // print point, print exactly when it landed on it.
            if new_time > print_time {
                let interp = interpolate_state(print_time, &prev, &cur);
                if !self.quiet {
                    printer::reactor_state(&interp, &species, self.ignition_time, false);
                }
                print_time += print_step;
            } else if new_time == print_time {
                if !self.quiet {
                    printer::reactor_state(&cur, &species, self.ignition_time, false);
                }
                print_time += print_step;
            }

            if !ignition_found && self.engine.temperature() >= temp_limit {
                self.ignition_time = Some(new_time);
                ignition_found = true;
                if self.config.break_on_ignition {
                    if !self.quiet {
                        printer::reactor_state(&cur, &species, self.ignition_time, false);
                    }
                    if let Some(file) = save.as_deref_mut() {
                        file.flush()?;
                    }
                    return Ok(Outcome::IgnitionStop);
                }
            }

            prev = cur;
        }

        if let Some(file) = save.as_deref_mut() {
            file.flush()?;
        }
        Ok(Outcome::Completed)
    }

    /// Setup followed by run, for cases with no user routine to install.
    pub fn run_simulation(
        &mut self,
        save: Option<&mut SaveFile>,
    ) -> Result<Outcome, SimulationError> {
        self.setup()?;
        self.run(save)
    }
}

fn matrix_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}

fn rows_matrix(rows: &[Vec<f64>]) -> DMatrix<f64> {
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, Vec::len);
    DMatrix::from_fn(nrows, ncols, |i, j| rows[i][j])
}

/// Mole fractions to mass fractions with the engine's molecular weights.
fn mass_from_moles(mole_fractions: &DVector<f64>, weights: &DVector<f64>) -> Vec<f64> {
    let weighted = mole_fractions.component_mul(weights);
    let total = weighted.sum();
    weighted.iter().map(|w| w / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockEngine;
    use crate::keywords::parse_str;
    use crate::save;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn build(input: &str, dt: f64, ramp: f64) -> Simulation {
        let config = parse_str(input).unwrap();
        Simulation::new(config, Box::new(MockEngine::new(dt, ramp))).quiet()
    }

    const BASE: &str = "CONV\nTEMP 1000\nPRES 1.0\nTIME 1e-4\nREAC A 1.0\nREAC B 3.0\nSTPT 3e-5\n";

    #[test]
    fn interpolation_is_affine() {
        let prev = TimeSample {
            time: 0.0,
            temperature: 1000.0,
            pressure: 100000.0,
            volume: 1e-6,
            wall_rate: 0.0,
            mole_fractions: DVector::from_vec(vec![1.0, 0.0]),
        };
        let cur = TimeSample {
            time: 2.0,
            temperature: 2000.0,
            pressure: 200000.0,
            volume: 3e-6,
            wall_rate: 1.0,
            mole_fractions: DVector::from_vec(vec![0.0, 1.0]),
        };
        let mid = interpolate_state(0.5, &prev, &cur);
        assert_relative_eq!(mid.temperature, 1250.0);
        assert_relative_eq!(mid.pressure, 125000.0);
        assert_relative_eq!(mid.volume, 1.5e-6);
        assert_relative_eq!(mid.wall_rate, 0.25);
        assert_relative_eq!(mid.mole_fractions[0], 0.75);
        assert_relative_eq!(mid.mole_fractions[1], 0.25);
        // the endpoints reproduce the samples exactly
        let left = interpolate_state(0.0, &prev, &cur);
        assert_relative_eq!(left.temperature, prev.temperature);
        assert_relative_eq!(left.mole_fractions[0], prev.mole_fractions[0]);
        let right = interpolate_state(2.0, &prev, &cur);
        assert_relative_eq!(right.temperature, cur.temperature);
        assert_relative_eq!(right.mole_fractions[1], cur.mole_fractions[1]);
    }

    #[test]
    fn setup_normalizes_the_reactants() {
        let mut sim = build(BASE, 3e-5, 0.0);
        sim.setup().unwrap();
        let x = sim.engine().mole_fractions();
        assert_relative_eq!(x[0], 0.25);
        assert_relative_eq!(x[1], 0.75);
        assert_relative_eq!(sim.engine().pressure(), ONE_ATM);
    }

    #[test]
    fn overshoot_ends_exactly_at_the_end_time() {
        let dir = tempdir().expect("failed to create temp dir");
        let path = dir.path().join("save.jsonl");
        let mut file = SaveFile::create(&path).unwrap();
        // steps at 3e-5, 6e-5, 9e-5, 1.2e-4; the last overshoots 1e-4
        let mut sim = build(BASE, 3e-5, 1e6);
        sim.setup().unwrap();
        let outcome = sim.run(Some(&mut file)).unwrap();
        assert_eq!(outcome, Outcome::Completed);

        let rows = save::read_rows(&path).unwrap();
        // initial + three exact steps + the interpolated terminal row
        assert_eq!(rows.len(), 5);
        assert_relative_eq!(rows[0].time, 0.0);
        assert_relative_eq!(rows[3].time, 9e-5, epsilon = 1e-12);
        let last = rows.last().unwrap();
        assert_relative_eq!(last.time, 1e-4, epsilon = 1e-15);
        // the ramp is linear so the interpolation is exact
        assert_relative_eq!(last.temperature, 1000.0 + 1e6 * 1e-4, epsilon = 1e-6);
        assert_relative_eq!(last.mass_fractions.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn ignition_is_detected_once() {
        // T = 1000 + 1e7*t crosses the default 1400 K limit at t = 4e-5,
        // first observed at the step landing on 6e-5
        let mut sim = build(BASE, 3e-5, 1e7);
        sim.setup().unwrap();
        let outcome = sim.run(None).unwrap();
        assert_eq!(outcome, Outcome::Completed);
        assert_relative_eq!(sim.ignition_time().unwrap(), 6e-5, epsilon = 1e-12);
    }

    #[test]
    fn explicit_temperature_limit_overrides_the_offset() {
        let input = format!("{}TLIM 1150\n", BASE);
        let mut sim = build(&input, 3e-5, 1e7);
        sim.setup().unwrap();
        sim.run(None).unwrap();
        // 1150 K is crossed at 1.5e-5, first seen at 3e-5
        assert_relative_eq!(sim.ignition_time().unwrap(), 3e-5, epsilon = 1e-12);
    }

    #[test]
    fn break_on_ignition_stops_the_case() {
        let input = format!("{}IGNBREAK\n", BASE);
        let mut sim = build(&input, 3e-5, 1e7);
        sim.setup().unwrap();
        let outcome = sim.run(None).unwrap();
        assert_eq!(outcome, Outcome::IgnitionStop);
        assert_relative_eq!(sim.ignition_time().unwrap(), 6e-5, epsilon = 1e-12);
    }

    #[test]
    fn no_ignition_below_the_limit() {
        let mut sim = build(BASE, 3e-5, 1e5);
        sim.setup().unwrap();
        sim.run(None).unwrap();
        assert!(sim.ignition_time().is_none());
    }

    #[test]
    fn save_interval_skips_intermediate_steps() {
        let dir = tempdir().expect("failed to create temp dir");
        let path = dir.path().join("save.jsonl");
        let mut file = SaveFile::create(&path).unwrap();
        // steps every 2e-5 up to exactly 1e-4, saving only past 5e-5
        let input = "CONV\nTEMP 1000\nPRES 1.0\nTIME 1e-4\nREAC A 1.0\nDTSV 5e-5\nSTPT 2e-5\n";
        let mut sim = build(input, 2e-5, 0.0);
        sim.setup().unwrap();
        sim.run(Some(&mut file)).unwrap();
        let rows = save::read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_relative_eq!(rows[0].time, 0.0);
        assert_relative_eq!(rows[1].time, 6e-5, epsilon = 1e-12);
    }

    #[test]
    fn sensitivity_rows_have_zero_initial_matrix() {
        let dir = tempdir().expect("failed to create temp dir");
        let path = dir.path().join("save.jsonl");
        let mut file = SaveFile::create(&path).unwrap();
        let input = format!("{}SENS\n", BASE);
        let mut sim = build(&input, 3e-5, 0.0);
        sim.setup().unwrap();
        sim.run(Some(&mut file)).unwrap();
        let rows = save::read_rows(&path).unwrap();
        let first = rows[0].sensitivity.as_ref().unwrap();
        // two species plus mass, volume and temperature, one parameter
        assert_eq!(first.len(), 5);
        assert_eq!(first[0].len(), 1);
        assert!(first.iter().all(|r| r[0] == 0.0));
        // the mock reports its time as the sensitivity, so the terminal row
        // interpolates between 9e-5 and 1.2e-4 back to 1e-4
        let last = rows.last().unwrap().sensitivity.as_ref().unwrap();
        assert_relative_eq!(last[0][0], 1e-4, epsilon = 1e-12);
    }

    #[test]
    fn imposed_temperature_table_overrides_the_engine() {
        let input = "TPRO 0.0 500\nTPRO 1e-4 700\nTEMP 500\nPRES 1.0\nTIME 1e-4\n\
                     REAC A 1.0\nSTPT 2e-5\n";
        let mut sim = build(input, 2e-5, 0.0);
        sim.setup().unwrap();
        sim.run(None).unwrap();
        // the last override happened at t = 8e-5
        assert_relative_eq!(sim.engine().temperature(), 660.0, epsilon = 1e-9);
    }

    #[test]
    fn held_temperature_for_the_function_model_defaults_to_initial() {
        let input = "TTIM\nTEMP 800\nPRES 1.0\nTIME 1e-4\nREAC A 1.0\nSTPT 2e-5\n";
        let mut sim = build(input, 2e-5, 0.0);
        sim.setup().unwrap();
        sim.run(None).unwrap();
        assert_relative_eq!(sim.engine().temperature(), 800.0, epsilon = 1e-9);
    }

    #[test]
    fn user_routine_replaces_the_default() {
        let input = "TTIM\nTEMP 800\nPRES 1.0\nTIME 1e-4\nREAC A 1.0\nSTPT 2e-5\n";
        let mut sim = build(input, 2e-5, 0.0);
        sim.setup().unwrap();
        sim.install_user_routine(Box::new(|t| 800.0 + 1e6 * t));
        sim.run(None).unwrap();
        // last override at t = 8e-5
        assert_relative_eq!(sim.engine().temperature(), 880.0, epsilon = 1e-9);
    }

    mod end_to_end {
        use super::*;
        use crate::ideal_gas::{IdealGasEngine, Mechanism};

        fn hydrogen_case(extra: &str) -> Simulation {
            let mech: Mechanism = serde_json::from_str(
                r#"{
                    "species": ["H2", "O2", "H2O", "N2"],
                    "reaction": {
                        "eq": "2H2+O2=2H2O",
                        "A": 20.0, "n": 0.0, "E": 0.0, "Q": 4.8e5
                    }
                }"#,
            )
            .unwrap();
            let input = format!(
                "CONV\nTEMP 1000\nPRES 1.0\nTIME 1e-3\nREAC H2 2.0\nREAC O2 1.0\n\
                 REAC N2 3.76\nSTPT 1e-6\n{}",
                extra
            );
            let config = parse_str(&input).unwrap();
            let model = ReactorModel::resolve(config.problem_type);
            let engine = IdealGasEngine::new(&mech, model).unwrap();
            Simulation::new(config, Box::new(engine)).quiet()
        }

        #[test]
        fn hydrogen_charge_ignites_before_the_end_time() {
            let mut sim = hydrogen_case("");
            sim.setup().unwrap();
            let outcome = sim.run(None).unwrap();
            assert_eq!(outcome, Outcome::Completed);
            let t_ign = sim.ignition_time().expect("the charge must ignite");
            assert!(t_ign > 0.0 && t_ign < 1e-3, "ignition at {t_ign}");
            assert!(sim.engine().temperature() >= 1400.0);
        }

        #[test]
        fn ignition_delay_is_reproducible() {
            let run_once = || {
                let mut sim = hydrogen_case("IGNBREAK\n");
                sim.setup().unwrap();
                let outcome = sim.run(None).unwrap();
                assert_eq!(outcome, Outcome::IgnitionStop);
                sim.ignition_time().unwrap()
            };
            assert_eq!(run_once().to_bits(), run_once().to_bits());
        }
    }
}
