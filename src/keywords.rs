//! # Keyword Input Interpreter
//!
//! Parses the SENKIN-style line-oriented keyword language into a typed
//! [`Configuration`]. The first whitespace-delimited token of each line is
//! the keyword, matched case-insensitively; lines starting with `!`, `.`,
//! `/` or blank lines are comments and are echoed to the report stream.
//!
//! Parsing is a pure function: all validation failures come back as
//! [`KeywordError`] values instead of aborting the process, so a malformed
//! case in a batch run only kills that case.

use crate::mixture::{CompositionError, MixtureSpec};
use log::{info, warn};
use std::collections::HashMap;
use std::f64::consts::PI;
use thiserror::Error;

/// Recognized SENKIN keywords that this driver does not implement. They
/// produce a non-fatal warning and are otherwise ignored.
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "ADAP", "AEXT", "AFRA", "AGGA", "AGGB", "AGGD", "AGGE", "AGGFD", "AGGMN",
    "AINT", "AREA", "AREAQ", "AROP", "ASEN", "ASTEPS", "AVALUE", "AVAR",
    "BETA", "BLKEQ", "BULK", "CLSC", "CLSM", "CNTN", "CNTT", "COLR", "DIST",
    "ENRG", "EPSG", "EPSR", "EPSS", "EPST", "ETCH", "GFAC", "GMHTC", "HTC",
    "HTRN", "IPSR", "IRET", "ISTP", "KLIM", "MAXIT", "MCUT", "MMASS", "NADAP",
    "NEWRUN", "NMOM", "NNEG", "NOCG", "NSOL", "PNDE", "PPRO", "PRNT", "PROE",
    "PVFE", "QFUN", "QLOS", "QPRO", "QRGEQ", "QRSEQ", "RELAXC", "ROP", "RSTR",
    "SCLM", "SCLS", "SCOR", "SENG", "SENT", "SFAC", "SIZE",
    "SOLUTION_TECHNIQUE", "SSTT", "SURF", "TAMB", "TGIV", "TIFP", "TRAN",
    "TRES", "TRST", "TSRF", "TSTR", "UIGN", "USET", "WENG", "XMLI",
];

/// The nine reactor/boundary-condition models selectable from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemType {
    /// CONV: constant volume, adiabatic
    ConstVolume,
    /// CONP: constant pressure, adiabatic
    ConstPressure,
    /// VPRO: volume as a tabulated function of time
    VolumeProfile,
    /// CONT: constant temperature and pressure
    ConstTempPressure,
    /// COTV: constant temperature and volume
    ConstTempVolume,
    /// VTIM: volume from a user-supplied function of time
    VolumeFunction,
    /// TTIM: temperature from a user-supplied function of time
    TemperatureFunction,
    /// TPRO: temperature as a tabulated function of time
    TemperatureProfile,
    /// ICEN: reciprocating internal-combustion engine kinematics
    IcEngine,
}

impl ProblemType {
    pub fn keyword(&self) -> &'static str {
        match self {
            ProblemType::ConstVolume => "CONV",
            ProblemType::ConstPressure => "CONP",
            ProblemType::VolumeProfile => "VPRO",
            ProblemType::ConstTempPressure => "CONT",
            ProblemType::ConstTempVolume => "COTV",
            ProblemType::VolumeFunction => "VTIM",
            ProblemType::TemperatureFunction => "TTIM",
            ProblemType::TemperatureProfile => "TPRO",
            ProblemType::IcEngine => "ICEN",
        }
    }
}

#[derive(Debug, Error)]
pub enum KeywordError {
    #[error(
        "more than one problem type keyword was specified: \
         {second} after {first}"
    )]
    MultipleProblem { first: String, second: String },
    #[error("keyword not defined: {0}")]
    Undefined(String),
    #[error("required keyword missing, expected one of: {}", .0.join(", "))]
    MissingRequired(Vec<String>),
    #[error("bad argument for keyword {keyword}: {reason}")]
    BadArgument { keyword: String, reason: String },
    #[error("only two of 'VOLD', 'VOLC' and 'CMPR' may be specified")]
    RedundantVolumes,
    #[error(transparent)]
    Composition(#[from] CompositionError),
}

/// Geometry of the reciprocating-engine model after the derivation cascade.
/// All lengths are in meters; the start crank angle is in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineGeometry {
    pub rev_per_min: f64,
    pub start_crank_angle: f64,
    pub stroke_length: f64,
    pub rod_radius_ratio: f64,
}

/// Validated, typed configuration of one simulation case.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub problem_type: ProblemType,
    /// end of the integration, s
    pub end_time: f64,
    /// initial temperature, K
    pub initial_temperature: f64,
    /// initial pressure, atm
    pub initial_pressure: f64,
    /// explicit reactant list from REAC lines, relative mole fractions
    pub reactants: Option<Vec<(String, f64)>>,
    /// equivalence-ratio composition from EQUI/FUEL/OXID/CPROD/ADD
    pub mixture: Option<MixtureSpec>,
    /// absolute ignition temperature, K (TLIM)
    pub temp_limit: Option<f64>,
    /// ignition threshold above the initial temperature, K (DTIGN)
    pub temp_threshold: f64,
    pub abs_tol: Option<f64>,
    pub rel_tol: Option<f64>,
    pub print_interval: Option<f64>,
    pub save_interval: Option<f64>,
    pub max_time_step: Option<f64>,
    pub sensitivity: bool,
    pub sens_abs_tol: Option<f64>,
    pub sens_rel_tol: Option<f64>,
    pub break_on_ignition: bool,
    /// initial reactor volume, m³
    pub reactor_volume: f64,
    /// (time, volume) table for VPRO
    pub volume_profile: Option<(Vec<f64>, Vec<f64>)>,
    /// (time, temperature) table for TPRO
    pub temperature_profile: Option<(Vec<f64>, Vec<f64>)>,
    /// engine geometry for ICEN
    pub engine: Option<EngineGeometry>,
}

impl Configuration {
    /// Absolute ignition temperature: explicit TLIM, else the initial
    /// temperature plus the DTIGN offset (default 400 K).
    pub fn temp_limit_abs(&self) -> f64 {
        self.temp_limit
            .unwrap_or(self.initial_temperature + self.temp_threshold)
    }

    /// SENKIN default solver tolerances apply when none were given.
    pub fn abs_tol(&self) -> f64 {
        self.abs_tol.unwrap_or(1.0e-20)
    }

    pub fn rel_tol(&self) -> f64 {
        self.rel_tol.unwrap_or(1.0e-8)
    }

    pub fn sens_abs_tol(&self) -> f64 {
        self.sens_abs_tol.unwrap_or(1.0e-6)
    }

    pub fn sens_rel_tol(&self) -> f64 {
        self.sens_rel_tol.unwrap_or(1.0e-4)
    }

    /// Console-report interval; defaults to a hundredth of the end time.
    pub fn print_step(&self) -> f64 {
        self.print_interval.unwrap_or(self.end_time / 100.0)
    }

    /// Maximum internal time step of the engine: the smallest of the print,
    /// save and explicit step limits, else a hundredth of the end time.
    pub fn max_step(&self) -> f64 {
        [self.print_interval, self.save_interval, self.max_time_step]
            .iter()
            .flatten()
            .fold(f64::INFINITY, |acc, &v| acc.min(v))
            .min(if self.print_interval.is_none()
                && self.save_interval.is_none()
                && self.max_time_step.is_none()
            {
                self.end_time / 100.0
            } else {
                f64::INFINITY
            })
    }
}

/// Mutable state accumulated while scanning the input lines.
#[derive(Debug, Default)]
struct ParserState {
    problem: Option<(ProblemType, String)>,
    end_time: Option<f64>,
    temperature: Option<f64>,
    pressure: Option<f64>,
    reactants: Vec<(String, f64)>,
    eq_ratio: Option<f64>,
    fuel: HashMap<String, f64>,
    oxidizer: HashMap<String, f64>,
    complete_products: Vec<String>,
    additional_species: HashMap<String, f64>,
    temp_limit: Option<f64>,
    temp_threshold: Option<f64>,
    abs_tol: Option<f64>,
    rel_tol: Option<f64>,
    print_interval: Option<f64>,
    save_interval: Option<f64>,
    max_time_step: Option<f64>,
    sensitivity: bool,
    sens_abs_tol: Option<f64>,
    sens_rel_tol: Option<f64>,
    break_on_ignition: bool,
    reactor_volume: Option<f64>,
    vpro_time: Vec<f64>,
    vpro_vol: Vec<f64>,
    tpro_time: Vec<f64>,
    tpro_temp: Vec<f64>,
    // raw IC engine inputs, SI units
    comp_ratio: Option<f64>,
    start_crank_angle: Option<f64>,
    swept_volume: Option<f64>,
    clear_volume: Option<f64>,
    rod_radius_ratio: Option<f64>,
    rev_per_min: Option<f64>,
    cyl_bore: Option<f64>,
    stroke_length: Option<f64>,
    connect_rod_len: Option<f64>,
    crank_radius: Option<f64>,
}

/// Parse the lines of one case into a [`Configuration`].
///
/// Line-level errors (unknown keywords, malformed arguments, repeated
/// problem types) abort immediately; the required-keyword checks run only
/// after the whole file has been scanned.
pub fn parse_input(lines: &[String]) -> Result<Configuration, KeywordError> {
    let mut st = ParserState::default();

    info!("{}", crate::printer::DIVIDER);
    info!("Keyword Input:");
    for line in lines {
        // Echo the input back to the report stream.
        info!("{:10}{}", "", line);
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('!')
            || trimmed.starts_with('.')
            || trimmed.starts_with('/')
        {
            continue;
        }
        parse_line(&mut st, trimmed)?;
    }
    info!("{}", crate::printer::DIVIDER);

    finalize(st)
}

/// Convenience wrapper splitting a whole input text into lines.
pub fn parse_str(text: &str) -> Result<Configuration, KeywordError> {
    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    parse_input(&lines)
}

fn parse_line(st: &mut ParserState, line: &str) -> Result<(), KeywordError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let keyword = tokens[0].to_uppercase();

    match keyword.as_str() {
        "CONV" => set_problem(st, ProblemType::ConstVolume, &keyword)?,
        "CONP" => set_problem(st, ProblemType::ConstPressure, &keyword)?,
        "CONT" => set_problem(st, ProblemType::ConstTempPressure, &keyword)?,
        "COTV" => set_problem(st, ProblemType::ConstTempVolume, &keyword)?,
        "VTIM" => set_problem(st, ProblemType::VolumeFunction, &keyword)?,
        "TTIM" => set_problem(st, ProblemType::TemperatureFunction, &keyword)?,
        "ICEN" => set_problem(st, ProblemType::IcEngine, &keyword)?,
        "VPRO" => {
            // every VPRO line after the first appends to the profile
            match &st.problem {
                None => st.problem = Some((ProblemType::VolumeProfile, keyword.clone())),
                Some((ProblemType::VolumeProfile, _)) => {}
                Some(_) => return Err(multiple_problem(st, &keyword)),
            }
            st.vpro_time.push(arg_f64(&tokens, 1, &keyword)?);
            st.vpro_vol.push(arg_f64(&tokens, 2, &keyword)?);
        }
        "TPRO" => {
            match &st.problem {
                None => st.problem = Some((ProblemType::TemperatureProfile, keyword.clone())),
                Some((ProblemType::TemperatureProfile, _)) => {}
                Some(_) => return Err(multiple_problem(st, &keyword)),
            }
            st.tpro_time.push(arg_f64(&tokens, 1, &keyword)?);
            st.tpro_temp.push(arg_f64(&tokens, 2, &keyword)?);
        }
        "TEMP" => st.temperature = Some(arg_f64(&tokens, 1, &keyword)?),
        "PRES" => st.pressure = Some(arg_f64(&tokens, 1, &keyword)?),
        "TIME" => st.end_time = Some(arg_f64(&tokens, 1, &keyword)?),
        "REAC" => {
            let species = arg_str(&tokens, 1, &keyword)?;
            let frac = arg_f64(&tokens, 2, &keyword)?;
            st.reactants.push((species, frac));
        }
        "EQUI" => st.eq_ratio = Some(arg_f64(&tokens, 1, &keyword)?),
        "FUEL" => {
            let species = arg_str(&tokens, 1, &keyword)?;
            st.fuel.insert(species, arg_f64(&tokens, 2, &keyword)?);
        }
        "OXID" => {
            let species = arg_str(&tokens, 1, &keyword)?;
            st.oxidizer.insert(species, arg_f64(&tokens, 2, &keyword)?);
        }
        "CPROD" => st.complete_products.push(arg_str(&tokens, 1, &keyword)?),
        "ADD" => {
            let species = arg_str(&tokens, 1, &keyword)?;
            st.additional_species
                .insert(species, arg_f64(&tokens, 2, &keyword)?);
        }
        "TLIM" => st.temp_limit = Some(arg_f64(&tokens, 1, &keyword)?),
        "DTIGN" => st.temp_threshold = Some(arg_f64(&tokens, 1, &keyword)?),
        "ATOL" => st.abs_tol = Some(arg_f64(&tokens, 1, &keyword)?),
        "RTOL" => st.rel_tol = Some(arg_f64(&tokens, 1, &keyword)?),
        "DELT" => st.print_interval = Some(arg_f64(&tokens, 1, &keyword)?),
        "DTSV" => st.save_interval = Some(arg_f64(&tokens, 1, &keyword)?),
        "STPT" => st.max_time_step = Some(arg_f64(&tokens, 1, &keyword)?),
        "SENS" => st.sensitivity = true,
        "ATLS" => st.sens_abs_tol = Some(arg_f64(&tokens, 1, &keyword)?),
        "RTLS" => st.sens_rel_tol = Some(arg_f64(&tokens, 1, &keyword)?),
        "IGNBREAK" => st.break_on_ignition = true,
        // volumes arrive in cm³ and lengths in cm; convert to SI here
        "VOL" => st.reactor_volume = Some(arg_f64(&tokens, 1, &keyword)? / 1.0e6),
        "VOLD" => st.swept_volume = Some(arg_f64(&tokens, 1, &keyword)? / 1.0e6),
        "VOLC" => st.clear_volume = Some(arg_f64(&tokens, 1, &keyword)? / 1.0e6),
        "BORE" => st.cyl_bore = Some(arg_f64(&tokens, 1, &keyword)? / 1.0e2),
        "STROKE" => st.stroke_length = Some(arg_f64(&tokens, 1, &keyword)? / 1.0e2),
        "RODL" => st.connect_rod_len = Some(arg_f64(&tokens, 1, &keyword)? / 1.0e2),
        "CRAD" => st.crank_radius = Some(arg_f64(&tokens, 1, &keyword)? / 1.0e2),
        "CMPR" => st.comp_ratio = Some(arg_f64(&tokens, 1, &keyword)?),
        "DEG0" => st.start_crank_angle = Some(arg_f64(&tokens, 1, &keyword)?),
        "LOLR" => st.rod_radius_ratio = Some(arg_f64(&tokens, 1, &keyword)?),
        "RPM" => st.rev_per_min = Some(arg_f64(&tokens, 1, &keyword)?),
        "END" => {}
        kw if UNSUPPORTED_KEYWORDS.contains(&kw) => {
            warn!("keyword {} is not supported yet and has been ignored", kw);
        }
        _ => return Err(KeywordError::Undefined(tokens[0].to_string())),
    }
    Ok(())
}

fn set_problem(
    st: &mut ParserState,
    pt: ProblemType,
    keyword: &str,
) -> Result<(), KeywordError> {
    if st.problem.is_some() {
        return Err(multiple_problem(st, keyword));
    }
    st.problem = Some((pt, keyword.to_string()));
    Ok(())
}

fn multiple_problem(st: &ParserState, second: &str) -> KeywordError {
    let first = st
        .problem
        .as_ref()
        .map(|(_, kw)| kw.clone())
        .unwrap_or_default();
    KeywordError::MultipleProblem {
        first,
        second: second.to_string(),
    }
}

fn arg_str(tokens: &[&str], idx: usize, keyword: &str) -> Result<String, KeywordError> {
    tokens
        .get(idx)
        .map(|s| s.to_string())
        .ok_or_else(|| KeywordError::BadArgument {
            keyword: keyword.to_string(),
            reason: format!("argument {} is missing", idx),
        })
}

fn arg_f64(tokens: &[&str], idx: usize, keyword: &str) -> Result<f64, KeywordError> {
    let raw = arg_str(tokens, idx, keyword)?;
    raw.parse().map_err(|_| KeywordError::BadArgument {
        keyword: keyword.to_string(),
        reason: format!("cannot parse '{}' as a number", raw),
    })
}

fn missing(keywords: &[&str]) -> KeywordError {
    KeywordError::MissingRequired(keywords.iter().map(|s| s.to_string()).collect())
}

/// Post-scan validation: required keywords, composition exclusivity, the
/// IC-engine derivation cascades and the defaults.
fn finalize(st: ParserState) -> Result<Configuration, KeywordError> {
    let end_time = st.end_time.ok_or_else(|| missing(&["TIME"]))?;
    let initial_temperature = st.temperature.ok_or_else(|| missing(&["TEMP"]))?;
    let initial_pressure = st.pressure.ok_or_else(|| missing(&["PRES"]))?;
    let (problem_type, _) = st.problem.clone().ok_or_else(|| {
        missing(&[
            "CONP", "CONV", "VPRO", "CONT", "ICEN", "TPRO", "COTV", "TTIM", "VTIM",
        ])
    })?;

    let mut reactor_volume = st.reactor_volume;
    let engine = if problem_type == ProblemType::IcEngine {
        Some(derive_engine_geometry(&st, &mut reactor_volume)?)
    } else {
        None
    };

    let reactor_volume = match reactor_volume {
        Some(v) => v,
        None => {
            warn!("no reactor volume specified, assuming 1.0 cm**3");
            1.0e-6
        }
    };

    // The reactants come from REAC or from the EQUI quadruple, never both.
    let equi_given = st.eq_ratio.is_some()
        || !st.fuel.is_empty()
        || !st.oxidizer.is_empty()
        || !st.complete_products.is_empty()
        || !st.additional_species.is_empty();
    let (reactants, mixture) = if !st.reactants.is_empty() && equi_given {
        return Err(CompositionError::ReacAndEqui.into());
    } else if st.eq_ratio.is_some()
        && (st.fuel.is_empty() || st.oxidizer.is_empty() || st.complete_products.is_empty())
    {
        return Err(CompositionError::IncompleteEquivalence.into());
    } else if !st.reactants.is_empty() {
        (Some(st.reactants), None)
    } else if let Some(eq_ratio) = st.eq_ratio {
        let spec = MixtureSpec {
            eq_ratio,
            fuel: st.fuel,
            oxidizer: st.oxidizer,
            complete_products: st.complete_products,
            additional_species: st.additional_species,
        };
        (None, Some(spec))
    } else if equi_given {
        // FUEL/OXID/CPROD without EQUI is as incomplete as the reverse
        return Err(CompositionError::IncompleteEquivalence.into());
    } else {
        return Err(missing(&["REAC", "EQUI"]));
    };

    Ok(Configuration {
        problem_type,
        end_time,
        initial_temperature,
        initial_pressure,
        reactants,
        mixture,
        temp_limit: st.temp_limit,
        temp_threshold: st.temp_threshold.unwrap_or(400.0),
        abs_tol: st.abs_tol,
        rel_tol: st.rel_tol,
        print_interval: st.print_interval,
        save_interval: st.save_interval,
        max_time_step: st.max_time_step,
        sensitivity: st.sensitivity,
        sens_abs_tol: st.sens_abs_tol,
        sens_rel_tol: st.sens_rel_tol,
        break_on_ignition: st.break_on_ignition,
        reactor_volume,
        volume_profile: if st.vpro_time.is_empty() {
            None
        } else {
            Some((st.vpro_time, st.vpro_vol))
        },
        temperature_profile: if st.tpro_time.is_empty() {
            None
        } else {
            Some((st.tpro_time, st.tpro_temp))
        },
        engine,
    })
}

/// Derivation cascades for the IC-engine geometry. Each quantity is derived
/// from the first satisfied alternative, in the stated priority order.
fn derive_engine_geometry(
    st: &ParserState,
    reactor_volume: &mut Option<f64>,
) -> Result<EngineGeometry, KeywordError> {
    let rev_per_min = st.rev_per_min.ok_or_else(|| missing(&["RPM"]))?;

    // stroke length: STROKE, else VOLD+BORE, else CMPR+VOLC+BORE, else 2*CRAD
    let stroke_length = if let Some(stroke) = st.stroke_length {
        info!(
            "'STROKE' was specified and will be used for the stroke length \
             regardless of other parameters"
        );
        stroke
    } else if let (Some(vold), Some(bore)) = (st.swept_volume, st.cyl_bore) {
        info!("using swept volume and cylinder bore to calculate stroke length");
        vold * 4.0 / (PI * bore * bore)
    } else if let (Some(cmpr), Some(volc), Some(bore)) =
        (st.comp_ratio, st.clear_volume, st.cyl_bore)
    {
        info!(
            "using compression ratio, clearance volume and cylinder bore to \
             calculate stroke length"
        );
        volc * (cmpr - 1.0) * 4.0 / (PI * bore * bore)
    } else if let Some(crad) = st.crank_radius {
        info!("using crank radius to compute the stroke length");
        2.0 * crad
    } else {
        return Err(missing(&["STROKE", "VOLD", "BORE", "CMPR", "VOLC", "CRAD"]));
    };

    // initial volume: VOL, else VOLD+VOLC, else CMPR*VOLC, else CMPR+VOLD,
    // else clearance + bore/stroke geometry
    if reactor_volume.is_some() {
        info!(
            "the initial reactor volume was specified by the VOL keyword and \
             this value will be used regardless of other settings"
        );
    } else if st.swept_volume.is_some() && st.clear_volume.is_some() && st.comp_ratio.is_some() {
        return Err(KeywordError::RedundantVolumes);
    } else if let (Some(vold), Some(volc)) = (st.swept_volume, st.clear_volume) {
        info!("computing initial reactor volume from the swept and clearance volumes");
        *reactor_volume = Some(vold + volc);
    } else if let (Some(cmpr), Some(volc)) = (st.comp_ratio, st.clear_volume) {
        info!("computing initial reactor volume from the compression ratio and clearance volume");
        *reactor_volume = Some(cmpr * volc);
    } else if let (Some(cmpr), Some(vold)) = (st.comp_ratio, st.swept_volume) {
        info!("computing initial reactor volume from the compression ratio and swept volume");
        *reactor_volume = Some(vold * (1.0 + 1.0 / (cmpr - 1.0)));
    } else if let (Some(volc), Some(bore)) = (st.clear_volume, st.cyl_bore) {
        info!(
            "computing initial reactor volume from the cylinder bore, stroke \
             length and clearance volume"
        );
        *reactor_volume = Some(PI / 4.0 * bore * bore * stroke_length + volc);
    } else {
        return Err(missing(&["VOLD", "VOLC", "CMPR", "BORE", "VOL"]));
    }

    // rod length to crank radius ratio: LOLR, else RODL/CRAD
    let rod_radius_ratio = if let Some(lolr) = st.rod_radius_ratio {
        info!(
            "the connecting rod length to crank radius ratio was specified by \
             the 'LOLR' keyword and this value will be used regardless of \
             other settings"
        );
        lolr
    } else if let (Some(rodl), Some(crad)) = (st.connect_rod_len, st.crank_radius) {
        info!("using the given connecting rod length and crank radius to compute the ratio");
        rodl / crad
    } else {
        return Err(missing(&["LOLR", "CRAD", "RODL"]));
    };

    Ok(EngineGeometry {
        rev_per_min,
        start_crank_angle: st.start_crank_angle.unwrap_or(180.0),
        stroke_length,
        rod_radius_ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    const BASE: &str = "CONV\nTEMP 1000\nPRES 1.0\nTIME 1e-3\nREAC H2 2.0\nREAC O2 1.0\nREAC N2 3.76\nEND\n";

    #[test]
    fn parses_minimal_case() {
        let cfg = parse_str(BASE).unwrap();
        assert_eq!(cfg.problem_type, ProblemType::ConstVolume);
        assert_relative_eq!(cfg.end_time, 1e-3);
        assert_relative_eq!(cfg.initial_temperature, 1000.0);
        assert_relative_eq!(cfg.initial_pressure, 1.0);
        let reac = cfg.reactants.clone().unwrap();
        assert_eq!(reac.len(), 3);
        assert_eq!(reac[0], ("H2".to_string(), 2.0));
        // defaults
        assert_relative_eq!(cfg.temp_threshold, 400.0);
        assert_relative_eq!(cfg.temp_limit_abs(), 1400.0);
        assert_relative_eq!(cfg.abs_tol(), 1e-20);
        assert_relative_eq!(cfg.rel_tol(), 1e-8);
        assert_relative_eq!(cfg.print_step(), 1e-5);
        assert_relative_eq!(cfg.max_step(), 1e-5);
        assert_relative_eq!(cfg.reactor_volume, 1e-6);
        assert!(!cfg.break_on_ignition);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let text = "conv\ntemp 900\npres 2\ntime 0.1\nreac AR 1.0\n";
        let cfg = parse_str(text).unwrap();
        assert_eq!(cfg.problem_type, ProblemType::ConstVolume);
        assert_relative_eq!(cfg.initial_temperature, 900.0);
    }

    #[test]
    fn comment_lines_are_skipped() {
        let text = format!("! a comment\n. another\n/ and a third\n\n{}", BASE);
        assert!(parse_str(&text).is_ok());
    }

    #[test]
    fn missing_required_keywords() {
        let without = |kw: &str| -> String {
            BASE.lines()
                .filter(|l| !l.to_uppercase().starts_with(kw))
                .map(|l| format!("{l}\n"))
                .collect()
        };
        for (kw, expect) in [("TIME", "TIME"), ("TEMP", "TEMP"), ("PRES", "PRES")] {
            match parse_str(&without(kw)) {
                Err(KeywordError::MissingRequired(kws)) => {
                    assert!(kws.contains(&expect.to_string()))
                }
                other => panic!("expected MissingRequired for {kw}, got {other:?}"),
            }
        }
        match parse_str(&without("CONV")) {
            Err(KeywordError::MissingRequired(kws)) => {
                assert!(kws.contains(&"CONP".to_string()));
                assert!(kws.contains(&"ICEN".to_string()));
            }
            other => panic!("expected MissingRequired, got {other:?}"),
        }
    }

    #[test]
    fn multiple_problem_types_are_fatal() {
        let text = format!("CONP\n{}", BASE);
        match parse_str(&text) {
            Err(KeywordError::MultipleProblem { first, second }) => {
                assert_eq!(first, "CONP");
                assert_eq!(second, "CONV");
            }
            other => panic!("expected MultipleProblem, got {other:?}"),
        }
    }

    #[test]
    fn vpro_lines_accumulate() {
        let text = "VPRO 0.0 10.0\nVPRO 1e-3 5.0\nVPRO 2e-3 2.5\n\
                    TEMP 1000\nPRES 1\nTIME 2e-3\nREAC N2 1\n";
        let cfg = parse_str(text).unwrap();
        assert_eq!(cfg.problem_type, ProblemType::VolumeProfile);
        let (t, v) = cfg.volume_profile.unwrap();
        assert_eq!(t, vec![0.0, 1e-3, 2e-3]);
        assert_eq!(v, vec![10.0, 5.0, 2.5]);
    }

    #[test]
    fn vpro_after_other_problem_is_fatal() {
        let text = "CONV\nVPRO 0.0 10.0\nTEMP 1000\nPRES 1\nTIME 1\nREAC N2 1\n";
        assert!(matches!(
            parse_str(text),
            Err(KeywordError::MultipleProblem { .. })
        ));
    }

    #[test]
    fn reac_and_equi_are_exclusive() {
        let text = "CONV\nTEMP 1000\nPRES 1\nTIME 1\nREAC H2 1\nEQUI 1.0\n\
                    FUEL H2 1\nOXID O2 1\nCPROD H2O\n";
        assert!(matches!(
            parse_str(text),
            Err(KeywordError::Composition(CompositionError::ReacAndEqui))
        ));
    }

    #[test]
    fn equi_requires_the_full_quadruple() {
        let text = "CONV\nTEMP 1000\nPRES 1\nTIME 1\nEQUI 1.0\nOXID O2 1\nCPROD H2O\n";
        assert!(matches!(
            parse_str(text),
            Err(KeywordError::Composition(
                CompositionError::IncompleteEquivalence
            ))
        ));
    }

    #[test]
    fn neither_reac_nor_equi_is_fatal() {
        let text = "CONV\nTEMP 1000\nPRES 1\nTIME 1\n";
        match parse_str(text) {
            Err(KeywordError::MissingRequired(kws)) => {
                assert_eq!(kws, vec!["REAC".to_string(), "EQUI".to_string()]);
            }
            other => panic!("expected MissingRequired, got {other:?}"),
        }
    }

    #[test]
    fn equi_quadruple_builds_a_mixture_spec() {
        let text = "CONP\nTEMP 1000\nPRES 1\nTIME 1\nEQUI 0.5\nFUEL CH4 1.0\n\
                    OXID O2 1.0\nOXID N2 3.76\nCPROD CO2\nCPROD H2O\nCPROD N2\nADD AR 0.1\n";
        let cfg = parse_str(text).unwrap();
        let spec = cfg.mixture.unwrap();
        assert_relative_eq!(spec.eq_ratio, 0.5);
        assert_eq!(spec.fuel.len(), 1);
        assert_eq!(spec.oxidizer.len(), 2);
        assert_eq!(spec.complete_products.len(), 3);
        assert_relative_eq!(spec.additional_species["AR"], 0.1);
    }

    #[test]
    fn unknown_keyword_is_fatal() {
        let text = format!("NOTAKEY 1.0\n{}", BASE);
        match parse_str(&text) {
            Err(KeywordError::Undefined(kw)) => assert_eq!(kw, "NOTAKEY"),
            other => panic!("expected Undefined, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_keyword_is_a_warning_only() {
        let text = format!("HTC 10.0\nTRES 0.5\n{}", BASE);
        assert!(parse_str(&text).is_ok());
    }

    #[test]
    fn unit_conversions() {
        let text = "CONV\nTEMP 1000\nPRES 1\nTIME 1\nREAC N2 1\nVOL 500.0\n";
        let cfg = parse_str(text).unwrap();
        // 500 cm³ -> 5e-4 m³
        assert_relative_eq!(cfg.reactor_volume, 5.0e-4);
    }

    #[test]
    fn max_step_uses_smallest_interval() {
        let text = format!("DELT 1e-4\nDTSV 2e-5\nSTPT 5e-5\n{}", BASE);
        let cfg = parse_str(&text).unwrap();
        assert_relative_eq!(cfg.max_step(), 2e-5);
        assert_relative_eq!(cfg.print_step(), 1e-4);
    }

    const ICEN_TAIL: &str = "TEMP 700\nPRES 1\nTIME 0.02\nREAC N2 1\nRPM 1500\n";

    #[test]
    fn icen_stroke_from_explicit_keyword() {
        let text = format!("ICEN\nSTROKE 10.0\nVOL 600\nLOLR 3.5\n{}", ICEN_TAIL);
        let cfg = parse_str(&text).unwrap();
        let eng = cfg.engine.unwrap();
        assert_relative_eq!(eng.stroke_length, 0.1);
        assert_relative_eq!(eng.rod_radius_ratio, 3.5);
        assert_relative_eq!(eng.start_crank_angle, 180.0);
        assert_relative_eq!(cfg.reactor_volume, 6.0e-4);
    }

    #[test]
    fn icen_stroke_from_swept_volume_and_bore() {
        let text = format!("ICEN\nVOLD 500\nVOLC 50\nBORE 8.0\nLOLR 3.5\n{}", ICEN_TAIL);
        let cfg = parse_str(&text).unwrap();
        let eng = cfg.engine.unwrap();
        // stroke = Vd * 4 / (pi * bore²)
        let expected = 5.0e-4 * 4.0 / (PI * 0.08 * 0.08);
        assert_relative_eq!(eng.stroke_length, expected, epsilon = 1e-12);
        // volume = Vd + Vc
        assert_relative_eq!(cfg.reactor_volume, 5.5e-4, epsilon = 1e-12);
    }

    #[test]
    fn icen_stroke_from_compression_ratio() {
        let text = format!("ICEN\nCMPR 11.0\nVOLC 50\nBORE 8.0\nLOLR 3.5\n{}", ICEN_TAIL);
        let cfg = parse_str(&text).unwrap();
        let eng = cfg.engine.unwrap();
        let vold = 5.0e-5 * 10.0;
        let expected = vold * 4.0 / (PI * 0.08 * 0.08);
        assert_relative_eq!(eng.stroke_length, expected, epsilon = 1e-12);
        // volume from the compression ratio and clearance volume
        assert_relative_eq!(cfg.reactor_volume, 11.0 * 5.0e-5, epsilon = 1e-12);
    }

    #[test]
    fn icen_stroke_from_crank_radius() {
        let text = format!("ICEN\nCRAD 5.0\nRODL 16.0\nVOL 600\n{}", ICEN_TAIL);
        let cfg = parse_str(&text).unwrap();
        let eng = cfg.engine.unwrap();
        assert_relative_eq!(eng.stroke_length, 0.1);
        assert_relative_eq!(eng.rod_radius_ratio, 3.2, epsilon = 1e-12);
    }

    #[test]
    fn icen_redundant_volumes_are_fatal() {
        let text = format!(
            "ICEN\nSTROKE 10\nVOLD 500\nVOLC 50\nCMPR 11\nLOLR 3.5\n{}",
            ICEN_TAIL
        );
        assert!(matches!(
            parse_str(&text),
            Err(KeywordError::RedundantVolumes)
        ));
    }

    #[test]
    fn icen_requires_rpm() {
        let text = "ICEN\nSTROKE 10\nVOL 600\nLOLR 3.5\nTEMP 700\nPRES 1\nTIME 0.02\nREAC N2 1\n";
        match parse_str(text) {
            Err(KeywordError::MissingRequired(kws)) => assert_eq!(kws, vec!["RPM"]),
            other => panic!("expected MissingRequired, got {other:?}"),
        }
    }

    #[test]
    fn icen_underspecified_geometry() {
        let text = format!("ICEN\nVOL 600\nLOLR 3.5\n{}", ICEN_TAIL);
        assert!(matches!(
            parse_str(&text),
            Err(KeywordError::MissingRequired(_))
        ));
    }

    #[test]
    fn parse_from_file() {
        let dir = tempdir().expect("failed to create temp dir");
        let path = dir.path().join("case.inp");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(BASE.as_bytes()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let cfg = parse_str(&text).unwrap();
        assert_eq!(cfg.problem_type, ProblemType::ConstVolume);
    }
}
