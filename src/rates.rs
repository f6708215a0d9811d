//! # Rate law evaluation
//!
//! Arrhenius rate constants and mass-action / empirical-order reaction rates.
//! These functions sit in the innermost loop of the integrator, so the
//! derivative assembly writes into a caller-owned buffer and allocates
//! nothing per call.

use crate::system::{R, Reaction, ReactionSystem};
use nalgebra::DVector;

/// Rate constant k = A * T^n * exp(-Ea/(R*T)) at temperature `t_kelvin`.
///
/// A reaction with A = 0 is inert: the short-circuit returns an exact 0.0
/// before touching the exponential.
pub fn rate_constant(reaction: &Reaction, t_kelvin: f64) -> f64 {
    if reaction.arrhenius_a == 0.0 {
        return 0.0;
    }
    reaction.arrhenius_a
        * t_kelvin.powf(reaction.temp_exponent)
        * (-reaction.activation_energy / (R * t_kelvin)).exp()
}

/// Reaction rate v = k * ∏ [Ci]^order_i over the resolved reactant orders.
///
/// Concentrations are clamped to 0 when negative: implicit integrators can
/// transiently undershoot zero and a negative base under a fractional power
/// would produce NaN.
pub fn reaction_rate(reaction: &Reaction, k: f64, conc: &DVector<f64>) -> f64 {
    let mut rate = k;
    for &(idx, order) in reaction.reactant_orders() {
        let c = conc[idx].max(0.0);
        rate *= c.powf(order);
    }
    rate
}

/// Evaluates reaction rates and assembles the concentration derivative
/// vector for a fixed run temperature.
///
/// The per-reaction rate constants only depend on temperature, which is
/// constant over a simulation run, so they are computed once here instead of
/// at every right-hand-side evaluation.
#[derive(Debug, Clone)]
pub struct RateEvaluator {
    /// Precomputed rate constant per reaction
    k: Vec<f64>,
}

impl RateEvaluator {
    pub fn new(system: &ReactionSystem, t_kelvin: f64) -> Self {
        let k = system
            .reactions
            .iter()
            .map(|r| rate_constant(r, t_kelvin))
            .collect();
        Self { k }
    }

    /// Rate of reaction `reaction_idx` at the given concentrations.
    pub fn rate(&self, system: &ReactionSystem, reaction_idx: usize, conc: &DVector<f64>) -> f64 {
        reaction_rate(&system.reactions[reaction_idx], self.k[reaction_idx], conc)
    }

    /// Precomputed rate constant of reaction `reaction_idx`.
    pub fn rate_constant(&self, reaction_idx: usize) -> f64 {
        self.k[reaction_idx]
    }

    /// Assemble d[C]/dt for the full species vector into `dydt`.
    ///
    /// For every reaction: each reactant loses stoichiometry * rate, each
    /// product gains stoichiometry * rate.
    pub fn derivatives_into(
        &self,
        system: &ReactionSystem,
        conc: &DVector<f64>,
        dydt: &mut DVector<f64>,
    ) {
        dydt.fill(0.0);
        for (reaction, &k) in system.reactions.iter().zip(self.k.iter()) {
            let rate = reaction_rate(reaction, k, conc);
            for &(idx, stoich) in &reaction.reactants {
                dydt[idx] -= stoich as f64 * rate;
            }
            for &(idx, stoich) in &reaction.products {
                dydt[idx] += stoich as f64 * rate;
            }
        }
    }
}
