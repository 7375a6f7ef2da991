//! Propagates simulated time; time is abstract, measured in reciprocal rate units (§1).

use super::random::RandomStream;
use rand_distr::{Distribution, Exp};

/// Tracks the simulation clock. Advances by a sample from `Exp(total_rate)` each time
/// [`Self::propagate`] is called, i.e. `delta_t = -ln(U) / total_rate` for `U` uniform on
/// `(0, 1]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulationTimer {
    simulation_time: f64,
    delta_time: f64,
}

impl SimulationTimer {
    /// A fresh timer starting at `t = 0`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            simulation_time: 0.0,
            delta_time: 0.0,
        }
    }

    /// Current simulated time.
    #[must_use]
    pub const fn simulation_time(&self) -> f64 {
        self.simulation_time
    }

    /// The elapsed time drawn by the most recent [`Self::propagate`] call.
    #[must_use]
    pub const fn delta_time(&self) -> f64 {
        self.delta_time
    }

    /// Draws `delta_t ~ Exp(total_rate)` and advances the clock by it.
    ///
    /// # Panics
    ///
    /// Panics if `total_rate` is not strictly positive; callers must not invoke this when the
    /// total rate is zero (§7).
    pub fn propagate(&mut self, total_rate: f64, rng: &mut RandomStream) -> f64 {
        assert!(total_rate > 0.0, "propagate called with a non-positive total rate");

        let exp = Exp::new(total_rate).expect("total_rate is finite and positive");
        let delta = exp.sample(rng);

        self.delta_time = delta;
        self.simulation_time += delta;
        delta
    }
}
