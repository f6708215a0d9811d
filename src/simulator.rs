//! # Simulation driver
//!
//! Validates the run parameters, picks the integration path (standard ODE
//! integration, or the QSSA-reduced differential-algebraic path when the
//! network contains fast intermediates) and produces the [`Trajectory`]
//! consumed by the analyzer.

use crate::error::KineticsError;
use crate::integrator::{IntegratorOptions, integrate_implicit};
use crate::qssa::integrate_reduced;
use crate::rates::RateEvaluator;
use crate::system::ReactionSystem;
use log::info;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Parameters of a single simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Total simulated duration (s)
    pub duration: f64,
    /// Temperature (K), constant over the run
    pub temperature: f64,
    /// Number of evenly spaced output samples over [0, duration]
    pub points: usize,
}

impl SimulationParameters {
    /// Default output resolution of 200 samples.
    pub fn new(duration: f64, temperature: f64) -> Result<Self, KineticsError> {
        Self::with_points(duration, temperature, 200)
    }

    pub fn with_points(
        duration: f64,
        temperature: f64,
        points: usize,
    ) -> Result<Self, KineticsError> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(KineticsError::InvalidParameters(format!(
                "duration must be positive, got {}",
                duration
            )));
        }
        if !temperature.is_finite() || temperature <= 0.0 {
            return Err(KineticsError::InvalidParameters(format!(
                "temperature must be positive, got {} K",
                temperature
            )));
        }
        if points < 2 {
            return Err(KineticsError::InvalidParameters(format!(
                "at least 2 output samples are required, got {}",
                points
            )));
        }
        Ok(Self {
            duration,
            temperature,
            points,
        })
    }

    /// Evenly spaced sample times over [0, duration].
    pub fn time_grid(&self) -> Vec<f64> {
        let n = self.points;
        (0..n)
            .map(|i| self.duration * i as f64 / (n - 1) as f64)
            .collect()
    }
}

/// Result of a simulation run: a time grid paired with the concentration of
/// every species at every sample. Read-only once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    /// Strictly increasing sample times (s)
    pub time: Vec<f64>,
    /// Concentration matrix, species x time sample (mol/L)
    pub concentrations: DMatrix<f64>,
    pub species_names: Vec<String>,
    /// QSSA steady-state convergence failures recovered by epsilon fallback
    /// during this run; 0 on the standard path
    pub steady_state_failures: usize,
}

impl Trajectory {
    pub fn n_samples(&self) -> usize {
        self.time.len()
    }

    /// Concentration time series of one species.
    pub fn species_concentrations(&self, species_idx: usize) -> Vec<f64> {
        self.concentrations.row(species_idx).iter().copied().collect()
    }
}

/// Simulate the time evolution of `system` and return the trajectory
/// sampled on the requested output grid.
pub fn simulate(
    system: &ReactionSystem,
    params: &SimulationParameters,
) -> Result<Trajectory, KineticsError> {
    simulate_with_options(system, params, &IntegratorOptions::default())
}

pub fn simulate_with_options(
    system: &ReactionSystem,
    params: &SimulationParameters,
    opts: &IntegratorOptions,
) -> Result<Trajectory, KineticsError> {
    let t_eval = params.time_grid();
    let rates = RateEvaluator::new(system, params.temperature);
    let n = system.species.len();

    let (states, failures) = if system.has_intermediates() {
        info!(
            "simulating {} species / {} reactions at {} K via QSSA reduction",
            n,
            system.reactions.len(),
            params.temperature
        );
        integrate_reduced(system, &rates, &t_eval, opts)?
    } else {
        info!(
            "simulating {} species / {} reactions at {} K (standard integration)",
            n,
            system.reactions.len(),
            params.temperature
        );
        let y0 = system.initial_concentrations();
        let states = integrate_implicit(
            |_t, y: &DVector<f64>, dy: &mut DVector<f64>| {
                rates.derivatives_into(system, y, dy);
            },
            &y0,
            &t_eval,
            opts,
        )?;
        (states, 0)
    };

    let concentrations = DMatrix::from_fn(n, states.len(), |i, j| states[j][i]);
    Ok(Trajectory {
        time: t_eval,
        concentrations,
        species_names: system.species_names(),
        steady_state_failures: failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{PartialOrder, Reaction, Species};
    use approx::assert_relative_eq;

    #[test]
    fn test_parameter_validation() {
        assert!(SimulationParameters::new(-1.0, 298.15).is_err());
        assert!(SimulationParameters::new(10.0, 0.0).is_err());
        assert!(SimulationParameters::with_points(10.0, 298.15, 1).is_err());
        assert!(SimulationParameters::new(10.0, 298.15).is_ok());
    }

    #[test]
    fn test_time_grid() {
        let params = SimulationParameters::with_points(10.0, 298.15, 5).unwrap();
        assert_eq!(params.time_grid(), vec![0.0, 2.5, 5.0, 7.5, 10.0]);
    }

    #[test]
    fn test_trajectory_serde_round_trip() {
        let species = vec![Species::new("A", 1.0), Species::new("B", 0.0)];
        let reaction = Reaction::new(
            vec![(0, 1)],
            vec![(1, 1)],
            "k1",
            0.5,
            0.0,
            0.0,
            PartialOrder::Stoichiometric,
        )
        .unwrap();
        let system = ReactionSystem::new(species, vec![reaction]).unwrap();
        let params = SimulationParameters::with_points(1.0, 298.15, 11).unwrap();
        let trajectory = simulate(&system, &params).unwrap();
        let json = serde_json::to_string(&trajectory).unwrap();
        let parsed: Trajectory = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.time, trajectory.time);
        assert_eq!(parsed.concentrations, trajectory.concentrations);
        assert_eq!(parsed.species_names, trajectory.species_names);
    }

    #[test]
    fn test_first_order_decay_trajectory() {
        let species = vec![Species::new("A", 1.0), Species::new("B", 0.0)];
        let reaction = Reaction::new(
            vec![(0, 1)],
            vec![(1, 1)],
            "k1",
            0.5,
            0.0,
            0.0,
            PartialOrder::Explicit(1.0),
        )
        .unwrap();
        let system = ReactionSystem::new(species, vec![reaction]).unwrap();
        let params = SimulationParameters::with_points(5.0, 298.15, 101).unwrap();
        let trajectory = simulate(&system, &params).unwrap();
        assert_eq!(trajectory.n_samples(), 101);
        assert_eq!(trajectory.steady_state_failures, 0);
        for (t, a) in trajectory
            .time
            .iter()
            .zip(trajectory.species_concentrations(0))
        {
            assert_relative_eq!(a, (-0.5 * t).exp(), max_relative = 1e-4, epsilon = 1e-9);
        }
        // mass conservation: [A] + [B] = 1
        for j in 0..trajectory.n_samples() {
            let total = trajectory.concentrations[(0, j)] + trajectory.concentrations[(1, j)];
            assert_relative_eq!(total, 1.0, max_relative = 1e-6);
        }
    }
}
