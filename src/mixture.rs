//! # Mixture Composer
//!
//! Converts a (fuel, oxidizer, complete products, equivalence ratio)
//! specification into absolute mole fractions of the initial reactor charge.
//! The oxidizer demand is back-computed from the oxidation balance of the
//! complete products, so the same routine covers hydrocarbon/air mixtures as
//! well as hydrogen or CO systems.
//!
//! Species element tables are built here by parsing the species' chemical
//! formula (`C3H8`, `CO2`, `AR`, ...); the integration engine is never
//! consulted for atom counts.

use log::warn;
use std::collections::HashMap;
use thiserror::Error;

/// Atomic masses for the elements that show up in combustion mechanisms.
const ELEMENTS: &[(&str, f64)] = &[
    ("H", 1.008),
    ("He", 4.0026),
    ("C", 12.011),
    ("N", 14.007),
    ("O", 15.999),
    ("F", 18.998),
    ("Ne", 20.18),
    ("Na", 22.99),
    ("Mg", 24.305),
    ("Al", 26.98),
    ("Si", 28.085),
    ("P", 30.974),
    ("S", 32.065),
    ("Cl", 35.45),
    ("Ar", 39.948),
    ("K", 39.102),
    ("Ca", 40.08),
    ("Fe", 55.845),
    ("Br", 79.904),
    ("Kr", 83.798),
    ("Xe", 131.293),
];

#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("REAC and EQUI cannot both be specified")]
    ReacAndEqui,
    #[error("if EQUI is specified, all of FUEL, OXID and CPROD must be as well")]
    IncompleteEquivalence,
    #[error("cannot parse chemical formula '{0}'")]
    BadFormula(String),
    #[error(
        "element {0} is not balanced: all elements in the fuel + oxidizer must \
         appear in the complete products and vice-versa"
    )]
    ElementClosure(String),
    #[error("additional species must sum to less than 1, got {0}")]
    AdditionalSpecies(f64),
    #[error("the {0} mixture has no species with a positive fraction")]
    EmptyMixture(&'static str),
    #[error("the oxidizer contains no oxygen atoms")]
    NoOxidizerOxygen,
}

/// Reactant composition given by an equivalence ratio. Fuel and oxidizer
/// fractions are relative within their own mixture; additional-species
/// fractions are absolute fractions of the final charge.
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureSpec {
    pub eq_ratio: f64,
    pub fuel: HashMap<String, f64>,
    pub oxidizer: HashMap<String, f64>,
    pub complete_products: Vec<String>,
    pub additional_species: HashMap<String, f64>,
}

/// Parse a chemical formula into element counts. Element symbols are matched
/// case-insensitively (mechanism species are usually all-caps, e.g. `AR`),
/// longest match first so `CL` is chlorine rather than carbon + unknown.
pub fn parse_formula(formula: &str) -> Result<HashMap<String, usize>, CompositionError> {
    let chars: Vec<char> = formula.chars().collect();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut i = 0;
    while i < chars.len() {
        let rest: String = chars[i..].iter().collect();
        let symbol = match_element(&rest).ok_or_else(|| {
            CompositionError::BadFormula(formula.to_string())
        })?;
        i += symbol.len();
        let mut digits = String::new();
        while i < chars.len() && chars[i].is_ascii_digit() {
            digits.push(chars[i]);
            i += 1;
        }
        let count: usize = if digits.is_empty() {
            1
        } else {
            digits
                .parse()
                .map_err(|_| CompositionError::BadFormula(formula.to_string()))?
        };
        *counts.entry(symbol.to_uppercase()).or_insert(0) += count;
    }
    if counts.is_empty() {
        return Err(CompositionError::BadFormula(formula.to_string()));
    }
    Ok(counts)
}

fn match_element(rest: &str) -> Option<&'static str> {
    // two-letter symbols first
    for &(symbol, _) in ELEMENTS {
        if symbol.len() == 2 && starts_with_ci(rest, symbol) {
            return Some(symbol);
        }
    }
    for &(symbol, _) in ELEMENTS {
        if symbol.len() == 1 && starts_with_ci(rest, symbol) {
            return Some(symbol);
        }
    }
    None
}

fn starts_with_ci(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Molar mass of a species in g/mol, from its formula.
pub fn molar_mass(formula: &str) -> Result<f64, CompositionError> {
    let counts = parse_formula(formula)?;
    let mut mass = 0.0;
    for (element, count) in counts {
        for &(symbol, atomic_mass) in ELEMENTS {
            if symbol.eq_ignore_ascii_case(&element) {
                mass += atomic_mass * count as f64;
                break;
            }
        }
    }
    Ok(mass)
}

/// Compute the mole fractions of the initial mixture from the equivalence
/// ratio.
///
/// The fuel and oxidizer fractions are normalized to sum to one within their
/// own mixture. For every element in the system the atom counts are summed,
/// weighted by mole fraction, over fuel, oxidizer and complete products; the
/// oxidation balance of the complete products then gives the amount of
/// oxidizer needed to exactly consume the fuel at the given equivalence
/// ratio. Additional species keep their absolute fractions; fuel and
/// oxidizer are scaled by `1 - sum(additional)` so the charge sums to one.
pub fn compose(spec: &MixtureSpec) -> Result<HashMap<String, f64>, CompositionError> {
    let fuel = normalized(&spec.fuel, "fuel")?;
    let oxidizer = normalized(&spec.oxidizer, "oxidizer")?;

    // Per-element, per-species atom counts of the complete products.
    let mut cprod_elems: HashMap<String, HashMap<String, usize>> = HashMap::new();
    for sp in &spec.complete_products {
        let counts = parse_formula(sp)?;
        for (el, n) in counts {
            cprod_elems.entry(el).or_default().insert(sp.clone(), n);
        }
    }

    // Mole-fraction-weighted atom counts of fuel and oxidizer.
    let fuel_elems = weighted_elements(&fuel)?;
    let oxid_elems = weighted_elements(&oxidizer)?;

    let num_c_cprod: usize = cprod_elems.get("C").map_or(0, |m| m.values().sum());
    let num_h_cprod: usize = cprod_elems.get("H").map_or(0, |m| m.values().sum());
    let num_o_cprod: usize = cprod_elems.get("O").map_or(0, |m| m.values().sum());

    let oxid_state =
        4 * num_c_cprod as i64 + num_h_cprod as i64 - 2 * num_o_cprod as i64;
    if oxid_state != 0 {
        warn!("one or more products of incomplete combustion were specified");
    }

    // Element closure: everything in the fuel + oxidizer must show up in the
    // complete products and vice-versa.
    let mut universe: Vec<String> = cprod_elems.keys().cloned().collect();
    for el in fuel_elems.keys().chain(oxid_elems.keys()) {
        if !universe.contains(el) {
            universe.push(el.clone());
        }
    }
    for el in &universe {
        let in_cprod: usize = cprod_elems.get(el).map_or(0, |m| m.values().sum());
        let in_reactants = fuel_elems.get(el).copied().unwrap_or(0.0)
            + oxid_elems.get(el).copied().unwrap_or(0.0);
        if (in_cprod > 0 && in_reactants == 0.0) || (in_cprod == 0 && in_reactants > 0.0) {
            return Err(CompositionError::ElementClosure(el.clone()));
        }
    }

    // Oxygen demand of each fuel atom, taken from the products it ends up in.
    let c_multiplier = oxygen_per_atom(&cprod_elems, "C", num_c_cprod);
    let h_multiplier = oxygen_per_atom(&cprod_elems, "H", num_h_cprod);

    let num_c_fuel = fuel_elems.get("C").copied().unwrap_or(0.0);
    let num_h_fuel = fuel_elems.get("H").copied().unwrap_or(0.0);
    let num_o_fuel = fuel_elems.get("O").copied().unwrap_or(0.0);
    let num_o_oxid = oxid_elems.get("O").copied().unwrap_or(0.0);
    if num_o_oxid == 0.0 {
        return Err(CompositionError::NoOxidizerOxygen);
    }

    let num_o_req = num_c_fuel * c_multiplier + num_h_fuel * h_multiplier - num_o_fuel;
    let o_mult = num_o_req / num_o_oxid;

    let total_oxid_moles: f64 = oxidizer.values().map(|amt| o_mult * amt).sum();
    let total_fuel_moles: f64 = fuel.values().map(|amt| spec.eq_ratio * amt).sum();
    let total_reactant_moles = total_oxid_moles + total_fuel_moles;

    let mut reactants: HashMap<String, f64> = HashMap::new();
    let remain = if spec.additional_species.is_empty() {
        1.0
    } else {
        let total_additional: f64 = spec.additional_species.values().sum();
        if total_additional >= 1.0 {
            return Err(CompositionError::AdditionalSpecies(total_additional));
        }
        for (sp, x) in &spec.additional_species {
            *reactants.entry(sp.clone()).or_insert(0.0) += x;
        }
        1.0 - total_additional
    };

    for (sp, amt) in &oxidizer {
        *reactants.entry(sp.clone()).or_insert(0.0) +=
            amt * o_mult / total_reactant_moles * remain;
    }
    for (sp, amt) in &fuel {
        *reactants.entry(sp.clone()).or_insert(0.0) +=
            amt * spec.eq_ratio / total_reactant_moles * remain;
    }

    Ok(reactants)
}

fn normalized(
    mixture: &HashMap<String, f64>,
    which: &'static str,
) -> Result<HashMap<String, f64>, CompositionError> {
    let total: f64 = mixture.values().sum();
    if total <= 0.0 {
        return Err(CompositionError::EmptyMixture(which));
    }
    Ok(mixture
        .iter()
        .map(|(sp, x)| (sp.clone(), x / total))
        .collect())
}

fn weighted_elements(
    mixture: &HashMap<String, f64>,
) -> Result<HashMap<String, f64>, CompositionError> {
    let mut elems: HashMap<String, f64> = HashMap::new();
    for (sp, frac) in mixture {
        for (el, n) in parse_formula(sp)? {
            *elems.entry(el).or_insert(0.0) += n as f64 * frac;
        }
    }
    Ok(elems)
}

/// Oxygen atoms in the complete products that contain `element`, per atom of
/// `element`. Zero when the element is absent from the products.
fn oxygen_per_atom(
    cprod_elems: &HashMap<String, HashMap<String, usize>>,
    element: &str,
    total_atoms: usize,
) -> f64 {
    if total_atoms == 0 {
        return 0.0;
    }
    let carriers = &cprod_elems[element];
    let oxygens = cprod_elems.get("O");
    let ox: usize = carriers
        .iter()
        .filter(|&(_, &n)| n > 0)
        .filter_map(|(sp, _)| oxygens.and_then(|m| m.get(sp)))
        .sum();
    ox as f64 / total_atoms as f64
}
