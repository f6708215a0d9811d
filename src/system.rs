//! # Reaction network data model
//!
//! Species, reactions and the `ReactionSystem` container consumed by the
//! simulation and analysis stages. A `ReactionSystem` is built once per run
//! and never mutated during integration; everything structurally wrong with
//! a network (empty reactant/product lists, dangling species indices,
//! negative initial concentrations) is rejected here at construction and
//! never reaches the integrator.

use crate::error::KineticsError;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Universal gas constant in J/(mol·K)
pub const R: f64 = 8.31446261815324;

/// A single chemical species.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    pub name: String,
    /// Initial concentration (mol/L), must be >= 0
    pub start_concentration: f64,
    /// Fast intermediate eligible for quasi-steady-state reduction
    pub is_intermediate: bool,
    /// Optional free-form metadata (diffusion coefficients, database ids, ...)
    /// carried for external collaborators; the core never interprets it
    pub meta: HashMap<String, Value>,
}

impl Species {
    pub fn new(name: &str, start_concentration: f64) -> Self {
        Self {
            name: name.to_owned(),
            start_concentration,
            is_intermediate: false,
            meta: HashMap::new(),
        }
    }

    /// Species flagged as a fast intermediate (QSSA candidate).
    pub fn intermediate(name: &str, start_concentration: f64) -> Self {
        Self {
            is_intermediate: true,
            ..Self::new(name, start_concentration)
        }
    }
}

/// How the partial order of each reactant is determined.
///
/// `Stoichiometric` is the mass-action mode: each reactant's order equals its
/// summed stoichiometric coefficient. `Explicit(v)` is the empirical mode:
/// every reactant of the reaction receives the same overall order `v`.
/// The choice is resolved once, at `Reaction` construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PartialOrder {
    Stoichiometric,
    Explicit(f64),
}

/// A single reaction with Arrhenius kinetic parameters.
///
/// Rate constant: k = A * T^n * exp(-Ea/(R*T))
/// Rate law:      v = k * ∏ [Ci]^order_i over the reactants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    /// (species index, stoichiometric coefficient), duplicates merged
    pub reactants: Vec<(usize, u32)>,
    /// (species index, stoichiometric coefficient), duplicates merged
    pub products: Vec<(usize, u32)>,
    /// Label correlating this reaction with its analysis record
    pub rate_label: String,
    /// Pre-exponential factor (units depend on the overall order)
    pub arrhenius_a: f64,
    /// Activation energy (J/mol)
    pub activation_energy: f64,
    /// Temperature exponent (dimensionless)
    pub temp_exponent: f64,
    /// Order mode this reaction was constructed with
    pub order: PartialOrder,
    /// Resolved (species index, partial order) per distinct reactant
    orders: Vec<(usize, f64)>,
}

impl Reaction {
    pub fn new(
        reactants: Vec<(usize, u32)>,
        products: Vec<(usize, u32)>,
        rate_label: &str,
        arrhenius_a: f64,
        activation_energy: f64,
        temp_exponent: f64,
        order: PartialOrder,
    ) -> Result<Self, KineticsError> {
        if reactants.is_empty() {
            return Err(KineticsError::InvalidNetwork(format!(
                "reaction '{}' has no reactants",
                rate_label
            )));
        }
        if products.is_empty() {
            return Err(KineticsError::InvalidNetwork(format!(
                "reaction '{}' has no products",
                rate_label
            )));
        }
        if reactants.iter().chain(products.iter()).any(|&(_, s)| s == 0) {
            return Err(KineticsError::InvalidNetwork(format!(
                "reaction '{}' has a zero stoichiometric coefficient",
                rate_label
            )));
        }
        let reactants = merge_stoichiometry(&reactants);
        let products = merge_stoichiometry(&products);
        let orders = match order {
            // mass-action mode: partial order = summed stoichiometry
            PartialOrder::Stoichiometric => reactants
                .iter()
                .map(|&(idx, stoich)| (idx, stoich as f64))
                .collect(),
            // empirical mode: one overall order shared by every reactant
            PartialOrder::Explicit(value) => {
                reactants.iter().map(|&(idx, _)| (idx, value)).collect()
            }
        };
        Ok(Self {
            reactants,
            products,
            rate_label: rate_label.to_owned(),
            arrhenius_a,
            activation_energy,
            temp_exponent,
            order,
            orders,
        })
    }

    /// Resolved (species index, partial order) pairs, one per distinct reactant.
    pub fn reactant_orders(&self) -> &[(usize, f64)] {
        &self.orders
    }

    /// Net stoichiometric change of species `idx` in this reaction
    /// (negative: consumed, positive: produced).
    pub fn net_stoichiometry(&self, idx: usize) -> i64 {
        let consumed: i64 = self
            .reactants
            .iter()
            .filter(|&&(i, _)| i == idx)
            .map(|&(_, s)| s as i64)
            .sum();
        let produced: i64 = self
            .products
            .iter()
            .filter(|&&(i, _)| i == idx)
            .map(|&(_, s)| s as i64)
            .sum();
        produced - consumed
    }
}

/// Merge duplicate species entries by summing their coefficients,
/// preserving first-encounter order.
fn merge_stoichiometry(pairs: &[(usize, u32)]) -> Vec<(usize, u32)> {
    let mut merged: Vec<(usize, u32)> = Vec::with_capacity(pairs.len());
    for &(idx, stoich) in pairs {
        match merged.iter_mut().find(|(i, _)| *i == idx) {
            Some((_, s)) => *s += stoich,
            None => merged.push((idx, stoich)),
        }
    }
    merged
}

/// The entire network: an index-addressable species list plus the reactions
/// referencing those indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionSystem {
    pub species: Vec<Species>,
    pub reactions: Vec<Reaction>,
}

impl ReactionSystem {
    pub fn new(species: Vec<Species>, reactions: Vec<Reaction>) -> Result<Self, KineticsError> {
        if species.is_empty() {
            return Err(KineticsError::InvalidNetwork(
                "species list is empty".to_owned(),
            ));
        }
        for s in &species {
            if !(s.start_concentration >= 0.0) {
                return Err(KineticsError::InvalidNetwork(format!(
                    "species '{}' has negative initial concentration {}",
                    s.name, s.start_concentration
                )));
            }
        }
        for reaction in &reactions {
            for &(idx, _) in reaction.reactants.iter().chain(reaction.products.iter()) {
                if idx >= species.len() {
                    return Err(KineticsError::InvalidNetwork(format!(
                        "reaction '{}' references species index {} but only {} species exist",
                        reaction.rate_label,
                        idx,
                        species.len()
                    )));
                }
            }
        }
        Ok(Self { species, reactions })
    }

    pub fn initial_concentrations(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.species.len(),
            self.species.iter().map(|s| s.start_concentration),
        )
    }

    pub fn species_names(&self) -> Vec<String> {
        self.species.iter().map(|s| s.name.clone()).collect()
    }

    pub fn has_intermediates(&self) -> bool {
        self.species.iter().any(|s| s.is_intermediate)
    }

    /// Indices of species flagged as fast intermediates.
    pub fn intermediate_indices(&self) -> Vec<usize> {
        self.species
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_intermediate)
            .map(|(i, _)| i)
            .collect()
    }

    /// Textual representation of the differential rate law, one
    /// `d[X]/dt = ...` line per species. Terms are rendered in sorted order
    /// so the output is deterministic.
    pub fn rate_law_equations(&self) -> String {
        let names: Vec<&str> = self.species.iter().map(|s| s.name.as_str()).collect();
        let mut equations = Vec::with_capacity(self.species.len());
        for i in 0..self.species.len() {
            let lhs = format!("d[{}]/dt =", names[i]);
            let mut rhs_terms: Vec<String> = Vec::new();
            for reaction in &self.reactions {
                let net = reaction.net_stoichiometry(i);
                if net == 0 {
                    continue;
                }
                let mut rate_parts = vec![reaction.rate_label.clone()];
                let mut orders = reaction.reactant_orders().to_vec();
                orders.sort_by_key(|&(idx, _)| idx);
                for (idx, order) in orders {
                    let power = if order != 1.0 {
                        format!("^{}", order)
                    } else {
                        String::new()
                    };
                    rate_parts.push(format!("[{}]{}", names[idx], power));
                }
                let rate_expr = rate_parts.join(" * ");
                let sign = if net > 0 { "+" } else { "-" };
                let coeff = if net.abs() != 1 {
                    format!("{} * ", net.abs())
                } else {
                    String::new()
                };
                rhs_terms.push(format!("{} {}{}", sign, coeff, rate_expr));
            }
            if rhs_terms.is_empty() {
                equations.push(format!("{} 0.0", lhs));
            } else {
                rhs_terms.sort();
                let mut rhs = rhs_terms.join(" ");
                if let Some(stripped) = rhs.strip_prefix("+ ") {
                    rhs = stripped.to_owned();
                } else if let Some(stripped) = rhs.strip_prefix("- ") {
                    rhs = format!("-{}", stripped);
                }
                equations.push(format!("{} {}", lhs, rhs));
            }
        }
        equations.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decay_reaction(order: PartialOrder) -> Reaction {
        Reaction::new(vec![(0, 1)], vec![(1, 1)], "k1", 1.0, 0.0, 0.0, order).unwrap()
    }

    #[test]
    fn test_empty_reactants_rejected() {
        let r = Reaction::new(
            vec![],
            vec![(0, 1)],
            "k1",
            1.0,
            0.0,
            0.0,
            PartialOrder::Stoichiometric,
        );
        assert!(matches!(r, Err(KineticsError::InvalidNetwork(_))));
    }

    #[test]
    fn test_empty_products_rejected() {
        let r = Reaction::new(
            vec![(0, 1)],
            vec![],
            "k1",
            1.0,
            0.0,
            0.0,
            PartialOrder::Stoichiometric,
        );
        assert!(matches!(r, Err(KineticsError::InvalidNetwork(_))));
    }

    #[test]
    fn test_duplicate_reactants_merged() {
        // A + A -> B written as two entries collapses to stoichiometry 2
        let r = Reaction::new(
            vec![(0, 1), (0, 1)],
            vec![(1, 1)],
            "k1",
            1.0,
            0.0,
            0.0,
            PartialOrder::Stoichiometric,
        )
        .unwrap();
        assert_eq!(r.reactants, vec![(0, 2)]);
        assert_eq!(r.reactant_orders(), &[(0, 2.0)]);
        assert_eq!(r.net_stoichiometry(0), -2);
    }

    #[test]
    fn test_explicit_order_overrides_stoichiometry() {
        let r = Reaction::new(
            vec![(0, 2), (1, 1)],
            vec![(2, 1)],
            "k1",
            1.0,
            0.0,
            0.0,
            PartialOrder::Explicit(1.0),
        )
        .unwrap();
        assert_eq!(r.reactant_orders(), &[(0, 1.0), (1, 1.0)]);
    }

    #[test]
    fn test_dangling_index_rejected() {
        let species = vec![Species::new("A", 1.0)];
        let reaction = Reaction::new(
            vec![(0, 1)],
            vec![(5, 1)],
            "k1",
            1.0,
            0.0,
            0.0,
            PartialOrder::Stoichiometric,
        )
        .unwrap();
        let system = ReactionSystem::new(species, vec![reaction]);
        assert!(matches!(system, Err(KineticsError::InvalidNetwork(_))));
    }

    #[test]
    fn test_negative_start_concentration_rejected() {
        let species = vec![Species::new("A", -0.5)];
        let system = ReactionSystem::new(species, vec![]);
        assert!(matches!(system, Err(KineticsError::InvalidNetwork(_))));
    }

    #[test]
    fn test_rate_law_equations() {
        let species = vec![Species::new("A", 1.0), Species::new("B", 0.0)];
        let system =
            ReactionSystem::new(species, vec![decay_reaction(PartialOrder::Stoichiometric)])
                .unwrap();
        let eqs = system.rate_law_equations();
        assert_eq!(eqs, "d[A]/dt = -k1 * [A]\nd[B]/dt = k1 * [A]");
    }

    #[test]
    fn test_rate_law_equations_with_order() {
        let species = vec![Species::new("A", 1.0), Species::new("B", 0.0)];
        let system =
            ReactionSystem::new(species, vec![decay_reaction(PartialOrder::Explicit(2.0))])
                .unwrap();
        let eqs = system.rate_law_equations();
        assert!(eqs.starts_with("d[A]/dt = -k1 * [A]^2"));
    }

    #[test]
    fn test_initial_concentrations() {
        let species = vec![Species::new("A", 2.0), Species::intermediate("I", 0.0)];
        let system = ReactionSystem::new(species, vec![]).unwrap();
        let c0 = system.initial_concentrations();
        assert_eq!(c0.as_slice(), &[2.0, 0.0]);
        assert!(system.has_intermediates());
        assert_eq!(system.intermediate_indices(), vec![1]);
    }
}
