//! Mapping from the parsed problem type to the reactor model the engine is
//! asked to integrate: which state variable is held by the kinetics
//! formulation, whether the energy equation is solved, and which boundary
//! condition drives the wall or the temperature.

use crate::keywords::ProblemType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KineticsModel {
    ConstVolume,
    ConstPressure,
}

/// The boundary condition attached to the reactor, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    None,
    VolumeTable,
    TemperatureTable,
    VolumeFunction,
    TemperatureFunction,
    EngineKinematics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactorModel {
    pub kinetics: KineticsModel,
    /// whether the energy equation is integrated
    pub energy: bool,
    pub boundary: BoundaryKind,
}

impl ReactorModel {
    pub fn resolve(problem: ProblemType) -> Self {
        use BoundaryKind as B;
        use KineticsModel as K;
        let (kinetics, energy, boundary) = match problem {
            ProblemType::ConstVolume => (K::ConstVolume, true, B::None),
            ProblemType::ConstPressure => (K::ConstPressure, true, B::None),
            ProblemType::VolumeProfile => (K::ConstVolume, true, B::VolumeTable),
            ProblemType::ConstTempPressure => (K::ConstPressure, false, B::None),
            ProblemType::ConstTempVolume => (K::ConstVolume, false, B::None),
            ProblemType::VolumeFunction => (K::ConstVolume, true, B::VolumeFunction),
            ProblemType::TemperatureFunction => {
                (K::ConstPressure, false, B::TemperatureFunction)
            }
            ProblemType::TemperatureProfile => {
                (K::ConstPressure, false, B::TemperatureTable)
            }
            ProblemType::IcEngine => (K::ConstVolume, true, B::EngineKinematics),
        };
        ReactorModel {
            kinetics,
            energy,
            boundary,
        }
    }

    /// Number of state variables the engine integrates for sensitivity
    /// bookkeeping. The constant-volume formulation carries mass, volume and
    /// temperature alongside the species; the constant-pressure one has no
    /// volume variable.
    pub fn n_vars(&self, n_species: usize) -> usize {
        match self.kinetics {
            KineticsModel::ConstVolume => n_species + 3,
            KineticsModel::ConstPressure => n_species + 2,
        }
    }

    /// Temperature is imposed externally rather than integrated.
    pub fn overrides_temperature(&self) -> bool {
        matches!(
            self.boundary,
            BoundaryKind::TemperatureTable | BoundaryKind::TemperatureFunction
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_type_mapping() {
        let cases = [
            (ProblemType::ConstVolume, KineticsModel::ConstVolume, true, BoundaryKind::None),
            (ProblemType::ConstPressure, KineticsModel::ConstPressure, true, BoundaryKind::None),
            (ProblemType::VolumeProfile, KineticsModel::ConstVolume, true, BoundaryKind::VolumeTable),
            (ProblemType::ConstTempPressure, KineticsModel::ConstPressure, false, BoundaryKind::None),
            (ProblemType::ConstTempVolume, KineticsModel::ConstVolume, false, BoundaryKind::None),
            (ProblemType::VolumeFunction, KineticsModel::ConstVolume, true, BoundaryKind::VolumeFunction),
            (ProblemType::TemperatureFunction, KineticsModel::ConstPressure, false, BoundaryKind::TemperatureFunction),
            (ProblemType::TemperatureProfile, KineticsModel::ConstPressure, false, BoundaryKind::TemperatureTable),
            (ProblemType::IcEngine, KineticsModel::ConstVolume, true, BoundaryKind::EngineKinematics),
        ];
        for (pt, kinetics, energy, boundary) in cases {
            let model = ReactorModel::resolve(pt);
            assert_eq!(model.kinetics, kinetics, "{pt:?}");
            assert_eq!(model.energy, energy, "{pt:?}");
            assert_eq!(model.boundary, boundary, "{pt:?}");
        }
    }

    #[test]
    fn state_vector_sizes() {
        let cv = ReactorModel::resolve(ProblemType::ConstVolume);
        let cp = ReactorModel::resolve(ProblemType::ConstPressure);
        assert_eq!(cv.n_vars(10), 13);
        assert_eq!(cp.n_vars(10), 12);
    }

    #[test]
    fn temperature_override_models() {
        assert!(ReactorModel::resolve(ProblemType::TemperatureProfile).overrides_temperature());
        assert!(ReactorModel::resolve(ProblemType::TemperatureFunction).overrides_temperature());
        assert!(!ReactorModel::resolve(ProblemType::ConstTempVolume).overrides_temperature());
    }
}
