//! PID controller for fan speed
//!
//! Simple proportional-integral-derivative controller for holding
//! coolant temperature at the target by modulating fan speed.
//!
//! Time steps are measured against the monotonic clock internally; the
//! first calculation after construction or [`PidController::reset`]
//! uses a nominal 0.1 s step (one control tick) instead of the wall
//! time since construction.

use std::time::Instant;

/// Nominal time step applied on the first calculation after a reset.
const FIRST_CALL_DT: f64 = 0.1;

/// PID controller with clamped integral (anti-windup) and clamped output.
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    setpoint: f64,
    output_min: f64,
    output_max: f64,
    integral_min: f64,
    integral_max: f64,

    integral: f64,
    last_error: f64,
    derivative: f64,
    last_time: Option<Instant>,
}

impl PidController {
    /// Construct with gains and setpoint. Output limits default to
    /// 0–100 (percent), integral limits to ±50.
    pub fn new(kp: f64, ki: f64, kd: f64, setpoint: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            setpoint,
            output_min: 0.0,
            output_max: 100.0,
            integral_min: -50.0,
            integral_max: 50.0,
            integral: 0.0,
            last_error: 0.0,
            derivative: 0.0,
            last_time: None,
        }
    }

    /// Set output limits
    pub fn set_output_limits(&mut self, min: f64, max: f64) {
        self.output_min = min;
        self.output_max = max;
    }

    /// Set integral accumulator limits (anti-windup clamp)
    pub fn set_integral_limits(&mut self, min: f64, max: f64) {
        self.integral_min = min;
        self.integral_max = max;
    }

    /// Update setpoint. Does not reset accumulated state.
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Compute PID output for the current process value.
    pub fn calculate(&mut self, process: f64) -> f64 {
        self.calculate_at(process, Instant::now())
    }

    /// Reset controller state. The next calculation starts from a clean
    /// accumulator with the nominal first-call time step.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
        self.derivative = 0.0;
        self.last_time = None;
    }

    /// Deterministic-time entry point; `calculate` feeds it the real
    /// clock, unit tests feed it synthetic instants.
    pub(crate) fn calculate_at(&mut self, process: f64, now: Instant) -> f64 {
        let dt = match self.last_time {
            None => FIRST_CALL_DT,
            Some(last) => now.saturating_duration_since(last).as_secs_f64(),
        };

        let error = self.setpoint - process;

        // Integral with anti-windup clamp
        self.integral = (self.integral + error * dt).clamp(self.integral_min, self.integral_max);

        // Derivative: held at zero on the first call, held at its
        // previous value when two samples share a timestamp
        if self.last_time.is_some() && dt > 0.0 {
            self.derivative = (error - self.last_error) / dt;
        }

        let output = self.kp * error + self.ki * self.integral + self.kd * self.derivative;
        let output = output.clamp(self.output_min, self.output_max);

        self.last_error = error;
        self.last_time = Some(now);
        output
    }

    #[cfg(test)]
    fn integral(&self) -> f64 {
        self.integral
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::time::{Duration, Instant};

    proptest! {
        #[test]
        fn output_always_within_limits(
            setpoint in 0.0f64..150.0,
            samples in proptest::collection::vec((0.0f64..200.0, 1u64..5000), 1..50),
        ) {
            let mut p = PidController::new(2.5, 0.5, 0.1, setpoint);
            let mut now = Instant::now();
            for (process, step_ms) in samples {
                now += Duration::from_millis(step_ms);
                let out = p.calculate_at(process, now);
                prop_assert!((0.0..=100.0).contains(&out),
                    "output {out} out of bounds for process={process}");
            }
        }

        #[test]
        fn integral_always_within_limits(
            setpoint in 0.0f64..150.0,
            samples in proptest::collection::vec((0.0f64..200.0, 1u64..5000), 1..50),
        ) {
            let mut p = PidController::new(2.5, 0.5, 0.1, setpoint);
            let mut now = Instant::now();
            for (process, step_ms) in samples {
                now += Duration::from_millis(step_ms);
                p.calculate_at(process, now);
                prop_assert!((-50.0..=50.0).contains(&p.integral()));
            }
        }
    }
}
