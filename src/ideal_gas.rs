//! Reference reactor backend: a fixed-property ideal gas with an optional
//! one-step global Arrhenius reaction.
//!
//! This backend exists so the shipped binary runs end to end without an
//! external kinetics library. It integrates the species moles, temperature
//! and volume with a fixed-step RK4 scheme whose step size is the maximum
//! time step handed down by the driver. A production engine with detailed
//! chemistry plugs in behind the same [`ReactorEngine`] trait.

use crate::engine::{EngineError, ReactorEngine};
use crate::mixture;
use crate::model::{KineticsModel, ReactorModel};
use crate::profiles::{BoundaryProfile, Profile};
use nalgebra::{DMatrix, DVector};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Universal gas constant, J/(mol K)
pub const R_G: f64 = 8.314;

/// One-step global reaction, k = A * T^n * exp(-E / (R T)), heat release Q
/// per mole of reaction. The stoichiometry comes from the equation string,
/// e.g. `2H2+O2=2H2O`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct GlobalReaction {
    pub eq: String,
    pub A: f64,
    pub n: f64,
    /// activation energy, J/mol
    pub E: f64,
    /// heat of reaction, J/mol
    pub Q: f64,
}

/// Minimal mechanism file: the species list and the optional global
/// reaction. Species names double as chemical formulas for the molecular
/// weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mechanism {
    pub species: Vec<String>,
    #[serde(default)]
    pub reaction: Option<GlobalReaction>,
}

impl Mechanism {
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| EngineError::Mechanism(format!("{}: {}", path.display(), e)))
    }
}

/// Split a reaction equation into (species, coefficient) pairs for each
/// side. `=`, `=>` and `<=>` all separate the sides.
fn parse_equation(eq: &str) -> Result<(Vec<(String, f64)>, Vec<(String, f64)>), EngineError> {
    let sides: Vec<&str> = if eq.contains("<=>") {
        eq.splitn(2, "<=>").collect()
    } else if eq.contains("=>") {
        eq.splitn(2, "=>").collect()
    } else {
        eq.splitn(2, '=').collect()
    };
    if sides.len() != 2 {
        return Err(EngineError::Mechanism(format!(
            "reaction '{}' has no product side",
            eq
        )));
    }
    let term_re = Regex::new(r"^\s*(\d+(?:\.\d+)?)?\s*([A-Za-z][A-Za-z0-9]*)\s*$").unwrap();
    let parse_side = |side: &str| -> Result<Vec<(String, f64)>, EngineError> {
        side.split('+')
            .map(|term| {
                let cap = term_re.captures(term).ok_or_else(|| {
                    EngineError::Mechanism(format!(
                        "cannot parse term '{}' of reaction '{}'",
                        term.trim(),
                        eq
                    ))
                })?;
                let coeff = cap
                    .get(1)
                    .map_or(1.0, |m| m.as_str().parse().unwrap_or(1.0));
                Ok((cap[2].to_string(), coeff))
            })
            .collect()
    };
    Ok((parse_side(sides[0])?, parse_side(sides[1])?))
}

/// A [`GlobalReaction`] with the stoichiometry resolved to species indices.
struct Reaction {
    params: GlobalReaction,
    reactants: Vec<(usize, f64)>,
    products: Vec<(usize, f64)>,
}

impl Reaction {
    fn resolve(params: &GlobalReaction, species: &[String]) -> Result<Self, EngineError> {
        let (reactants, products) = parse_equation(&params.eq)?;
        let index = |pairs: Vec<(String, f64)>| -> Result<Vec<(usize, f64)>, EngineError> {
            pairs
                .into_iter()
                .map(|(name, coeff)| {
                    species
                        .iter()
                        .position(|s| *s == name)
                        .map(|i| (i, coeff))
                        .ok_or_else(|| {
                            EngineError::Mechanism(format!(
                                "reaction '{}' references undeclared species '{}'",
                                params.eq, name
                            ))
                        })
                })
                .collect()
        };
        Ok(Reaction {
            params: params.clone(),
            reactants: index(reactants)?,
            products: index(products)?,
        })
    }

    /// mol/(m³ s) at the given temperature and concentrations (mol/m³)
    fn rate(&self, temperature: f64, conc: &DVector<f64>) -> f64 {
        let k = self.params.A
            * temperature.powf(self.params.n)
            * (-self.params.E / (R_G * temperature)).exp();
        self.reactants
            .iter()
            .fold(k, |r, &(i, coeff)| r * conc[i].max(0.0).powf(coeff))
    }
}

/// Fixed molar heat capacity of a diatomic-like ideal gas, J/(mol K).
const CV_MOLAR: f64 = 2.5 * R_G;

pub struct IdealGasEngine {
    model: ReactorModel,
    time: f64,
    temperature: f64,
    volume: f64,
    /// held pressure for the constant-pressure formulation, Pa
    fixed_pressure: f64,
    /// moles per species
    moles: DVector<f64>,
    species: Vec<String>,
    weights: DVector<f64>,
    reaction: Option<Reaction>,
    max_dt: f64,
    wall: Option<BoundaryProfile>,
    sensitivity: bool,
}

impl IdealGasEngine {
    pub fn new(mechanism: &Mechanism, model: ReactorModel) -> Result<Self, EngineError> {
        if mechanism.species.is_empty() {
            return Err(EngineError::Mechanism(
                "the mechanism declares no species".to_string(),
            ));
        }
        let mut weights = DVector::zeros(mechanism.species.len());
        for (i, name) in mechanism.species.iter().enumerate() {
            // g/mol -> kg/mol
            weights[i] = mixture::molar_mass(name)
                .map_err(|e| EngineError::Mechanism(e.to_string()))?
                / 1.0e3;
        }
        let reaction = mechanism
            .reaction
            .as_ref()
            .map(|params| Reaction::resolve(params, &mechanism.species))
            .transpose()?;
        Ok(IdealGasEngine {
            model,
            time: 0.0,
            temperature: 300.0,
            volume: 1.0e-6,
            fixed_pressure: 101325.0,
            moles: DVector::from_element(mechanism.species.len(), 1.0e-9),
            species: mechanism.species.clone(),
            weights,
            reaction,
            max_dt: 1.0e-5,
            wall: None,
            sensitivity: false,
        })
    }

    fn total_moles(&self) -> f64 {
        self.moles.sum()
    }

    /// d/dt of (moles, temperature, volume) at the given state.
    fn derivatives(
        &self,
        time: f64,
        moles: &DVector<f64>,
        temperature: f64,
        volume: f64,
    ) -> (DVector<f64>, f64, f64) {
        let n_total = moles.sum();
        let pressure = n_total * R_G * temperature / volume;

        let mut dn = DVector::zeros(moles.len());
        let mut heat_rate = 0.0;
        if let Some(reaction) = &self.reaction {
            let conc = moles / volume;
            let r = reaction.rate(temperature, &conc);
            for &(i, coeff) in &reaction.reactants {
                dn[i] -= coeff * r * volume;
            }
            for &(i, coeff) in &reaction.products {
                dn[i] += coeff * r * volume;
            }
            heat_rate = reaction.params.Q * r * volume;
        }

        let dv = match self.model.kinetics {
            KineticsModel::ConstVolume => self.wall.as_ref().map_or(0.0, |w| w.value_at(time)),
            // volume follows from the gas law after the step
            KineticsModel::ConstPressure => 0.0,
        };

        let dt_temp = if self.model.energy {
            let work = match self.model.kinetics {
                KineticsModel::ConstVolume => pressure * dv,
                KineticsModel::ConstPressure => 0.0,
            };
            let heat_capacity = match self.model.kinetics {
                KineticsModel::ConstVolume => n_total * CV_MOLAR,
                KineticsModel::ConstPressure => n_total * (CV_MOLAR + R_G),
            };
            (heat_rate - work) / heat_capacity
        } else {
            0.0
        };

        (dn, dt_temp, dv)
    }
}

impl ReactorEngine for IdealGasEngine {
    fn time(&self) -> f64 {
        self.time
    }

    fn step(&mut self, _t_end: f64) -> Result<f64, EngineError> {
        let h = self.max_dt;
        let y0 = self.moles.clone();
        let t0 = self.temperature;
        let v0 = self.volume;

        let (k1n, k1t, k1v) = self.derivatives(self.time, &y0, t0, v0);
        let (k2n, k2t, k2v) = self.derivatives(
            self.time + h / 2.0,
            &(&y0 + &k1n * (h / 2.0)),
            t0 + k1t * h / 2.0,
            v0 + k1v * h / 2.0,
        );
        let (k3n, k3t, k3v) = self.derivatives(
            self.time + h / 2.0,
            &(&y0 + &k2n * (h / 2.0)),
            t0 + k2t * h / 2.0,
            v0 + k2v * h / 2.0,
        );
        let (k4n, k4t, k4v) = self.derivatives(
            self.time + h,
            &(&y0 + &k3n * h),
            t0 + k3t * h,
            v0 + k3v * h,
        );

        self.moles = &y0 + (k1n + k2n * 2.0 + k3n * 2.0 + k4n) * (h / 6.0);
        self.moles.iter_mut().for_each(|n| *n = n.max(0.0));
        self.temperature = t0 + (k1t + 2.0 * k2t + 2.0 * k3t + k4t) * h / 6.0;
        self.volume = v0 + (k1v + 2.0 * k2v + 2.0 * k3v + k4v) * h / 6.0;
        if self.model.kinetics == KineticsModel::ConstPressure {
            self.volume = self.total_moles() * R_G * self.temperature / self.fixed_pressure;
        }
        self.time += h;

        if !self.temperature.is_finite() || !self.volume.is_finite() || self.volume <= 0.0 {
            return Err(EngineError::IntegrationFailure {
                time: self.time,
                reason: "state left the physical domain".to_string(),
            });
        }
        Ok(self.time)
    }

    fn temperature(&self) -> f64 {
        self.temperature
    }

    fn pressure(&self) -> f64 {
        match self.model.kinetics {
            KineticsModel::ConstVolume => {
                self.total_moles() * R_G * self.temperature / self.volume
            }
            KineticsModel::ConstPressure => self.fixed_pressure,
        }
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn mole_fractions(&self) -> DVector<f64> {
        &self.moles / self.total_moles()
    }

    fn mass_fractions(&self) -> DVector<f64> {
        let mut w = self.moles.component_mul(&self.weights);
        let total = w.sum();
        w /= total;
        w
    }

    fn species_names(&self) -> &[String] {
        &self.species
    }

    fn n_species(&self) -> usize {
        self.species.len()
    }

    fn molecular_weights(&self) -> &DVector<f64> {
        &self.weights
    }

    fn n_reactions(&self) -> usize {
        self.reaction.is_some() as usize
    }

    fn set_state(
        &mut self,
        temperature: f64,
        pressure: f64,
        mole_fractions: &HashMap<String, f64>,
    ) -> Result<(), EngineError> {
        let mut fractions = DVector::zeros(self.species.len());
        for (name, frac) in mole_fractions {
            let idx = self
                .species
                .iter()
                .position(|s| s == name)
                .ok_or_else(|| EngineError::UnknownSpecies(name.clone()))?;
            fractions[idx] = *frac;
        }
        let total = fractions.sum();
        if total <= 0.0 {
            return Err(EngineError::Mechanism(
                "the initial composition is empty".to_string(),
            ));
        }
        self.temperature = temperature;
        self.fixed_pressure = pressure;
        let n_total = pressure * self.volume / (R_G * temperature);
        self.moles = fractions * (n_total / total);
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) {
        // rescale the moles so temperature and pressure are preserved
        let scale = volume / self.volume;
        self.moles *= scale;
        self.volume = volume;
    }

    fn set_temperature(&mut self, temperature: f64) {
        self.temperature = temperature;
        if self.model.kinetics == KineticsModel::ConstPressure {
            self.volume = self.total_moles() * R_G * temperature / self.fixed_pressure;
        }
    }

    fn set_tolerances(&mut self, _abs_tol: f64, _rel_tol: f64) {
        // the fixed-step scheme has no error control to tune
    }

    fn set_max_time_step(&mut self, max_step: f64) {
        self.max_dt = max_step;
    }

    fn install_wall(&mut self, profile: BoundaryProfile) {
        self.wall = Some(profile);
    }

    fn wall_rate(&self, time: f64) -> f64 {
        self.wall.as_ref().map_or(0.0, |w| w.value_at(time))
    }

    fn enable_sensitivity(&mut self, _abs_tol: f64, _rel_tol: f64) {
        self.sensitivity = true;
    }

    fn n_sensitivity_params(&self) -> usize {
        if self.sensitivity { self.n_reactions() } else { 0 }
    }

    fn sensitivities(&self) -> DMatrix<f64> {
        DMatrix::zeros(
            self.model.n_vars(self.species.len()),
            self.n_sensitivity_params(),
        )
    }
}
