//! # kinsim
//!
//! Deterministic simulation and analysis of chemical reaction networks:
//! Arrhenius rate constants, mass-action (or explicit-order) kinetics,
//! implicit stiff integration, quasi-steady-state reduction of fast
//! intermediates and post-hoc reaction-order regression.

pub mod analyzer;
pub mod error;
pub mod integrator;
pub mod qssa;
pub mod rates;
pub mod report;
pub mod simulator;
pub mod system;
