//! Interface to the reactor-integration engine.
//!
//! The driver owns cadence, reporting, ignition detection and persistence;
//! everything about chemistry and ODE integration lives behind
//! [`ReactorEngine`]. The engine advances by single internal steps of its
//! own choosing and is allowed to overshoot the requested end time; the
//! driver interpolates back. Integration failures are fatal for the case.

use crate::profiles::BoundaryProfile;
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown species '{0}' in the initial composition")]
    UnknownSpecies(String),
    #[error("integration failed at t = {time} s: {reason}")]
    IntegrationFailure { time: f64, reason: String },
    #[error("mechanism error: {0}")]
    Mechanism(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub trait ReactorEngine: Send {
    /// Current simulation time, s.
    fn time(&self) -> f64;

    /// Take one internal time step toward `t_end` and return the new time.
    /// The step may land past `t_end`.
    fn step(&mut self, t_end: f64) -> Result<f64, EngineError>;

    fn temperature(&self) -> f64;
    /// Pa
    fn pressure(&self) -> f64;
    /// m³
    fn volume(&self) -> f64;

    fn mole_fractions(&self) -> DVector<f64>;
    fn mass_fractions(&self) -> DVector<f64>;
    fn species_names(&self) -> &[String];
    fn n_species(&self) -> usize;
    /// kg/mol, indexed like the fraction vectors
    fn molecular_weights(&self) -> &DVector<f64>;
    fn n_reactions(&self) -> usize;

    /// Set temperature, pressure (Pa) and composition (relative mole
    /// fractions, normalized by the engine).
    fn set_state(
        &mut self,
        temperature: f64,
        pressure: f64,
        mole_fractions: &HashMap<String, f64>,
    ) -> Result<(), EngineError>;

    fn set_volume(&mut self, volume: f64);

    /// Impose a temperature without touching the composition.
    fn set_temperature(&mut self, temperature: f64);

    fn set_tolerances(&mut self, abs_tol: f64, rel_tol: f64);
    fn set_max_time_step(&mut self, max_step: f64);

    /// Install a moving-wall boundary whose profile gives the rate of
    /// volume change per unit volume.
    fn install_wall(&mut self, profile: BoundaryProfile);

    /// Rate of volume change currently imposed by the wall, 1/s.
    fn wall_rate(&self, time: f64) -> f64;

    fn enable_sensitivity(&mut self, abs_tol: f64, rel_tol: f64);
    fn n_sensitivity_params(&self) -> usize;
    /// (n_vars x n_sensitivity_params) at the current time.
    fn sensitivities(&self) -> DMatrix<f64>;
}
