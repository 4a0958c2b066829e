//! Boundary-condition profiles driving the reactor wall or temperature.
//!
//! Each profile answers one question, `value_at(t)`. For volume-type
//! boundaries the value is the wall velocity normalized by the wall area,
//! for temperature-type boundaries it is the imposed temperature in K.

use enum_dispatch::enum_dispatch;
use std::f64::consts::PI;

#[enum_dispatch]
pub trait Profile {
    fn value_at(&self, time: f64) -> f64;
}

/// The polymorphic boundary installed on a reactor. Constructed once during
/// setup, then queried by the engine at every step.
#[enum_dispatch(Profile)]
pub enum BoundaryProfile {
    VolumeRateProfile,
    TemperatureTableProfile,
    IcEngineKinematics,
    UserFunction,
}

/// Rate of volume change from a tabulated (time, volume) history.
///
/// Volumes are normalized by the maximum of the table, so the rates have
/// units of 1/s and apply to a unit-volume reactor. The rate between two
/// table entries is the forward difference at the earlier entry and is held
/// constant until the next entry; the last entry and anything outside the
/// table get a rate of zero.
pub struct VolumeRateProfile {
    times: Vec<f64>,
    rates: Vec<f64>,
}

impl VolumeRateProfile {
    pub fn new(times: Vec<f64>, volumes: Vec<f64>) -> Self {
        let max_vol = volumes.iter().cloned().fold(f64::MIN, f64::max);
        let scaled: Vec<f64> = volumes.iter().map(|v| v / max_vol).collect();
        let mut rates = Vec::with_capacity(times.len());
        for i in 0..times.len().saturating_sub(1) {
            rates.push((scaled[i + 1] - scaled[i]) / (times[i + 1] - times[i]));
        }
        rates.push(0.0);
        VolumeRateProfile { times, rates }
    }
}

impl Profile for VolumeRateProfile {
    fn value_at(&self, time: f64) -> f64 {
        let last = match self.times.last() {
            Some(&t) => t,
            None => return 0.0,
        };
        if time < self.times[0] || time > last {
            return 0.0;
        }
        // index of the last entry <= time
        let idx = self.times.partition_point(|&t| t <= time).saturating_sub(1);
        self.rates[idx]
    }
}

/// Imposed temperature from a tabulated (time, temperature) history, with
/// linear interpolation between entries and clamping outside the table.
pub struct TemperatureTableProfile {
    times: Vec<f64>,
    temperatures: Vec<f64>,
}

impl TemperatureTableProfile {
    pub fn new(times: Vec<f64>, temperatures: Vec<f64>) -> Self {
        TemperatureTableProfile {
            times,
            temperatures,
        }
    }
}

impl Profile for TemperatureTableProfile {
    fn value_at(&self, time: f64) -> f64 {
        let n = self.times.len();
        if time <= self.times[0] {
            return self.temperatures[0];
        }
        if time >= self.times[n - 1] {
            return self.temperatures[n - 1];
        }
        let hi = self.times.partition_point(|&t| t <= time);
        let lo = hi - 1;
        let frac = (time - self.times[lo]) / (self.times[hi] - self.times[lo]);
        self.temperatures[lo] + frac * (self.temperatures[hi] - self.temperatures[lo])
    }
}

/// Piston speed of a slider-crank mechanism, for the reciprocating-engine
/// reactor. Positive values compress the charge.
pub struct IcEngineKinematics {
    /// crank angular velocity, rad/s
    omega: f64,
    /// crank angle at t = 0, rad
    start_angle: f64,
    stroke_length: f64,
    rod_radius_ratio: f64,
}

impl IcEngineKinematics {
    pub fn new(
        rev_per_min: f64,
        start_crank_angle_deg: f64,
        stroke_length: f64,
        rod_radius_ratio: f64,
    ) -> Self {
        IcEngineKinematics {
            omega: rev_per_min * PI / 30.0,
            start_angle: start_crank_angle_deg / 180.0 * PI,
            stroke_length,
            rod_radius_ratio,
        }
    }
}

impl Profile for IcEngineKinematics {
    fn value_at(&self, time: f64) -> f64 {
        let theta = self.start_angle - self.omega * time;
        let sin_t = theta.sin();
        let cos_t = theta.cos();
        self.omega * self.stroke_length / 2.0
            * sin_t
            * (1.0 + cos_t / (self.rod_radius_ratio.powi(2) - sin_t.powi(2)).sqrt())
    }
}

/// Caller-supplied boundary for the VTIM and TTIM models.
pub struct UserFunction {
    func: Box<dyn Fn(f64) -> f64 + Send + Sync>,
}

impl UserFunction {
    pub fn new(func: Box<dyn Fn(f64) -> f64 + Send + Sync>) -> Self {
        UserFunction { func }
    }

    /// Boundary that keeps the wall still.
    pub fn zero() -> Self {
        UserFunction::new(Box::new(|_| 0.0))
    }

    /// Boundary that holds a fixed value.
    pub fn constant(value: f64) -> Self {
        UserFunction::new(Box::new(move |_| value))
    }
}

impl Profile for UserFunction {
    fn value_at(&self, time: f64) -> f64 {
        (self.func)(time)
    }
}
