//! # Empirical order-of-reaction analysis
//!
//! Consumes a completed [`Trajectory`] and infers, per reaction, which
//! kinetic order (0th, 1st or 2nd) best explains the observed decay of its
//! principal reactant. Each candidate order has a linearization whose slope
//! yields the rate constant:
//!
//! - zero order:   [A] vs t        k = -slope    mol·L⁻¹·s⁻¹
//! - first order:  ln[A] vs t      k = -slope    s⁻¹
//! - second order: 1/[A] vs t      k = +slope    L·mol⁻¹·s⁻¹
//!
//! The order with the highest R² wins; on a tie the lower order is reported
//! (deterministic rule, not an accident of iteration order). Reactions
//! without a qualifying reactant or with fewer than 2 valid samples simply
//! produce no record — an expected degenerate case, not an error.

use crate::simulator::Trajectory;
use crate::system::{Reaction, ReactionSystem};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Concentrations at or below this are excluded from the regressions
/// (guards the logarithm and the reciprocal).
pub const CONCENTRATION_EPS: f64 = 1e-9;

/// Kinetic order class of the empirical rate law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderClass {
    Zero,
    First,
    Second,
}

impl OrderClass {
    /// Unit of the rate constant for this order.
    pub fn unit(&self) -> &'static str {
        match self {
            OrderClass::Zero => "mol·L⁻¹·s⁻¹",
            OrderClass::First => "s⁻¹",
            OrderClass::Second => "L·mol⁻¹·s⁻¹",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderClass::Zero => "zero_order",
            OrderClass::First => "first_order",
            OrderClass::Second => "second_order",
        }
    }

    /// Rate constant from the fitted slope of this order's linearization.
    fn rate_constant(&self, slope: f64) -> f64 {
        match self {
            OrderClass::Zero | OrderClass::First => -slope,
            OrderClass::Second => slope,
        }
    }
}

/// Raw result of one ordinary-least-squares fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFit {
    pub order: OrderClass,
    pub slope: f64,
    pub r_squared: f64,
    pub unit: String,
}

/// Per-reaction analysis result, keyed by the reaction's rate label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Name of the reactant the analysis was performed on
    pub reactant: String,
    pub best_order: OrderClass,
    /// Rate constant recovered from the winning fit
    pub k: f64,
    pub k_unit: String,
    /// R² of the winning fit
    pub r_squared: f64,
    /// All three raw fits, for transparency
    pub fits: Vec<OrderFit>,
}

/// Ordinary least squares of y on x: (slope, intercept, R²).
///
/// A degenerate input (zero variance in x or y) reports R² = 0 so that
/// comparisons stay ordered and NaN never leaks into records.
fn linear_regression(x: &[f64], y: &[f64]) -> (f64, f64, f64) {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let dx = xi - mx;
        let dy = yi - my;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    if sxx == 0.0 {
        return (0.0, my, 0.0);
    }
    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    let r_squared = if syy == 0.0 {
        0.0
    } else {
        let r2 = (sxy * sxy) / (sxx * syy);
        if r2.is_finite() { r2.min(1.0) } else { 0.0 }
    };
    (slope, intercept, r_squared)
}

/// Pick the reactant to run the regressions on.
///
/// Primary heuristic: the reactant with the greatest *relative* decrease
/// `(start - end) / start` (requires `start > end` and a non-negligible
/// start). This targets the dominant consumed species and ignores catalysts.
/// Fallback, for reactants that start at zero (intermediates that rise and
/// fall): the greatest absolute range `max - min` over the trajectory. The
/// fallback can pick a non-monotonic species for reasons unrelated to net
/// consumption; that ambiguity is inherited and documented, not corrected.
pub fn select_principal_reactant(reaction: &Reaction, trajectory: &Trajectory) -> Option<usize> {
    let last = trajectory.n_samples().checked_sub(1)?;
    let mut best = None;
    let mut max_relative_decrease = -1.0;
    for &(idx, _) in &reaction.reactants {
        let start = trajectory.concentrations[(idx, 0)];
        let end = trajectory.concentrations[(idx, last)];
        if start > end && start > CONCENTRATION_EPS {
            let relative_decrease = (start - end) / start;
            if relative_decrease > max_relative_decrease {
                max_relative_decrease = relative_decrease;
                best = Some(idx);
            }
        }
    }
    if best.is_some() {
        return best;
    }
    let mut max_range = -1.0;
    for &(idx, _) in &reaction.reactants {
        let row = trajectory.concentrations.row(idx);
        let lo = row.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if hi - lo > max_range {
            max_range = hi - lo;
            best = Some(idx);
        }
    }
    best
}

/// Run the three order regressions over the valid samples of one species.
/// Returns `None` when fewer than 2 samples survive the validity filter.
fn fit_reaction_order(time: &[f64], concentration: &[f64]) -> Option<Vec<OrderFit>> {
    let mut t_valid = Vec::with_capacity(time.len());
    let mut c_valid = Vec::with_capacity(time.len());
    for (&t, &c) in time.iter().zip(concentration.iter()) {
        if c > CONCENTRATION_EPS {
            t_valid.push(t);
            c_valid.push(c);
        }
    }
    if t_valid.len() < 2 {
        return None;
    }

    let transforms: [(OrderClass, fn(f64) -> f64); 3] = [
        (OrderClass::Zero, |c| c),
        (OrderClass::First, f64::ln),
        (OrderClass::Second, |c| 1.0 / c),
    ];
    let fits = transforms
        .iter()
        .map(|&(order, transform)| {
            let y: Vec<f64> = c_valid.iter().map(|&c| transform(c)).collect();
            let (slope, _, r_squared) = linear_regression(&t_valid, &y);
            OrderFit {
                order,
                slope,
                r_squared,
                unit: order.unit().to_owned(),
            }
        })
        .collect();
    Some(fits)
}

/// Analyze every reaction of `system` against the completed trajectory.
///
/// Returns one [`AnalysisRecord`] per reaction that produced a result,
/// keyed by rate label; reactions with no qualifying reactant or too few
/// valid samples are silently absent from the map.
pub fn analyze_kinetics(
    trajectory: &Trajectory,
    system: &ReactionSystem,
) -> HashMap<String, AnalysisRecord> {
    let mut analysis = HashMap::new();
    for reaction in &system.reactions {
        let Some(reactant_idx) = select_principal_reactant(reaction, trajectory) else {
            continue;
        };
        let concentration = trajectory.species_concentrations(reactant_idx);
        let Some(fits) = fit_reaction_order(&trajectory.time, &concentration) else {
            continue;
        };

        // highest R² wins; scanning Zero -> First -> Second with a strict
        // comparison makes the lower order win ties
        let mut best = &fits[0];
        for fit in &fits[1..] {
            if fit.r_squared > best.r_squared {
                best = fit;
            }
        }

        analysis.insert(
            reaction.rate_label.clone(),
            AnalysisRecord {
                reactant: system.species[reactant_idx].name.clone(),
                best_order: best.order,
                k: best.order.rate_constant(best.slope),
                k_unit: best.unit.clone(),
                r_squared: best.r_squared,
                fits: fits.clone(),
            },
        );
    }
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{PartialOrder, Species};
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    /// Trajectory built directly from rows, bypassing the integrator.
    fn trajectory_from_rows(time: Vec<f64>, rows: Vec<Vec<f64>>, names: &[&str]) -> Trajectory {
        let n = rows.len();
        let m = time.len();
        Trajectory {
            time,
            concentrations: DMatrix::from_fn(n, m, |i, j| rows[i][j]),
            species_names: names.iter().map(|s| s.to_string()).collect(),
            steady_state_failures: 0,
        }
    }

    fn two_reactant_system() -> ReactionSystem {
        let species = vec![Species::new("A", 10.0), Species::new("B", 1.0)];
        let reaction = Reaction::new(
            vec![(0, 1), (1, 1)],
            vec![(0, 1)],
            "k1",
            1.0,
            0.0,
            0.0,
            PartialOrder::Stoichiometric,
        )
        .unwrap();
        ReactionSystem::new(species, vec![reaction]).unwrap()
    }

    #[test]
    fn test_linear_regression_exact_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let (slope, intercept, r2) = linear_regression(&x, &y);
        assert_relative_eq!(slope, 2.0, max_relative = 1e-12);
        assert_relative_eq!(intercept, 1.0, max_relative = 1e-12);
        assert_relative_eq!(r2, 1.0, max_relative = 1e-12);
    }

    #[test]
    fn test_linear_regression_degenerate_is_zero() {
        let x = [0.0, 1.0, 2.0];
        let y = [4.0, 4.0, 4.0];
        let (slope, _, r2) = linear_regression(&x, &y);
        assert_eq!(slope, 0.0);
        assert_eq!(r2, 0.0);
    }

    #[test]
    fn test_principal_reactant_prefers_relative_decrease() {
        // A: 10 -> 9 (10% relative), B: 1 -> 0.05 (95% relative).
        // B wins despite the smaller absolute decrease.
        let system = two_reactant_system();
        let trajectory = trajectory_from_rows(
            vec![0.0, 1.0, 2.0],
            vec![vec![10.0, 9.5, 9.0], vec![1.0, 0.5, 0.05]],
            &["A", "B"],
        );
        let idx = select_principal_reactant(&system.reactions[0], &trajectory);
        assert_eq!(idx, Some(1));
    }

    #[test]
    fn test_principal_reactant_fallback_to_range() {
        // neither reactant net-decreases; the one with the larger swing wins
        let system = two_reactant_system();
        let trajectory = trajectory_from_rows(
            vec![0.0, 1.0, 2.0],
            vec![vec![1.0, 1.0, 1.0], vec![0.0, 0.8, 0.0]],
            &["A", "B"],
        );
        let idx = select_principal_reactant(&system.reactions[0], &trajectory);
        assert_eq!(idx, Some(1));
    }

    #[test]
    fn test_insufficient_valid_samples_yield_no_record() {
        let system = two_reactant_system();
        // everything below the validity epsilon
        let trajectory = trajectory_from_rows(
            vec![0.0, 1.0, 2.0],
            vec![vec![1e-12, 1e-12, 1e-12], vec![1e-13, 1e-13, 1e-13]],
            &["A", "B"],
        );
        let analysis = analyze_kinetics(&trajectory, &system);
        assert!(analysis.is_empty());
    }

    #[test]
    fn test_tie_break_prefers_lower_order() {
        // a perfectly flat reactant degenerates all three fits to R² = 0;
        // the documented tie-break reports zero order
        let system = two_reactant_system();
        let trajectory = trajectory_from_rows(
            vec![0.0, 1.0, 2.0],
            vec![vec![1.0, 1.0, 1.0], vec![1.0, 1.0, 1.0]],
            &["A", "B"],
        );
        let analysis = analyze_kinetics(&trajectory, &system);
        let record = &analysis["k1"];
        assert_eq!(record.best_order, OrderClass::Zero);
        assert_eq!(record.r_squared, 0.0);
        assert_eq!(record.k, 0.0);
    }

    #[test]
    fn test_exact_first_order_series_recovers_k() {
        let species = vec![Species::new("A", 1.0), Species::new("P", 0.0)];
        let reaction = Reaction::new(
            vec![(0, 1)],
            vec![(1, 1)],
            "k1",
            1.0,
            0.0,
            0.0,
            PartialOrder::Stoichiometric,
        )
        .unwrap();
        let system = ReactionSystem::new(species, vec![reaction]).unwrap();
        let time: Vec<f64> = (0..100).map(|i| i as f64 * 0.1).collect();
        let a: Vec<f64> = time.iter().map(|t| (-0.3 * t).exp()).collect();
        let p: Vec<f64> = a.iter().map(|c| 1.0 - c).collect();
        let trajectory = trajectory_from_rows(time, vec![a, p], &["A", "P"]);
        let analysis = analyze_kinetics(&trajectory, &system);
        let record = &analysis["k1"];
        assert_eq!(record.best_order, OrderClass::First);
        assert_eq!(record.k_unit, "s⁻¹");
        assert_relative_eq!(record.k, 0.3, max_relative = 1e-10);
        assert!(record.r_squared > 0.999999);
        assert_eq!(record.fits.len(), 3);
    }
}
