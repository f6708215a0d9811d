//! # Result bundle for downstream consumers
//!
//! Collects a finished trajectory, the run parameters and the analysis map
//! into one serializable structure suitable for plotting or persistence by
//! external collaborators, plus a pretty-printed summary table of the
//! per-reaction analysis.

use crate::analyzer::{AnalysisRecord, analyze_kinetics};
use crate::error::KineticsError;
use crate::simulator::{SimulationParameters, Trajectory, simulate};
use crate::system::ReactionSystem;
use prettytable::{Cell, Row, Table};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Everything a run produced, in one place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub time_points: Vec<f64>,
    pub species_names: Vec<String>,
    /// Concentration rows, one per species, aligned with `time_points`
    pub concentrations: Vec<Vec<f64>>,
    pub simulation_parameters: SimulationParameters,
    pub steady_state_failures: usize,
    /// Rate label -> analysis record; reactions with no analyzable reactant
    /// are absent
    pub analysis: HashMap<String, AnalysisRecord>,
}

impl SimulationReport {
    pub fn new(
        trajectory: &Trajectory,
        params: &SimulationParameters,
        analysis: HashMap<String, AnalysisRecord>,
    ) -> Self {
        let concentrations = (0..trajectory.species_names.len())
            .map(|i| trajectory.species_concentrations(i))
            .collect();
        Self {
            time_points: trajectory.time.clone(),
            species_names: trajectory.species_names.clone(),
            concentrations,
            simulation_parameters: params.clone(),
            steady_state_failures: trajectory.steady_state_failures,
            analysis,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, KineticsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_json(&self, path: &Path) -> Result<(), KineticsError> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    /// Summary table of the per-reaction analysis, rows sorted by rate label.
    pub fn analysis_table(&self) -> Table {
        let mut table = Table::new();
        table.add_row(Row::new(vec![
            Cell::new("reaction"),
            Cell::new("reactant"),
            Cell::new("best fit"),
            Cell::new("k"),
            Cell::new("unit"),
            Cell::new("R²"),
        ]));
        let mut labels: Vec<&String> = self.analysis.keys().collect();
        labels.sort();
        for label in labels {
            let record = &self.analysis[label];
            table.add_row(Row::new(vec![
                Cell::new(label),
                Cell::new(&record.reactant),
                Cell::new(record.best_order.label()),
                Cell::new(&format!("{:.6e}", record.k)),
                Cell::new(&record.k_unit),
                Cell::new(&format!("{:.6}", record.r_squared)),
            ]));
        }
        table
    }

    pub fn print_analysis(&self) {
        self.analysis_table().printstd();
    }
}

/// Full chain: simulate, analyze, bundle.
pub fn run_simulation_and_analysis(
    system: &ReactionSystem,
    params: &SimulationParameters,
) -> Result<SimulationReport, KineticsError> {
    let trajectory = simulate(system, params)?;
    let analysis = analyze_kinetics(&trajectory, system);
    Ok(SimulationReport::new(&trajectory, params, analysis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{PartialOrder, Reaction, Species};
    use tempfile::NamedTempFile;

    fn decay_report() -> SimulationReport {
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
        let params = SimulationParameters::with_points(5.0, 298.15, 50).unwrap();
        run_simulation_and_analysis(&system, &params).unwrap()
    }

    #[test]
    fn test_json_round_trip() {
        let report = decay_report();
        let json = report.to_json_pretty().unwrap();
        let parsed: SimulationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.species_names, report.species_names);
        assert_eq!(parsed.time_points.len(), 50);
        assert_eq!(parsed.concentrations.len(), 2);
        assert!(parsed.analysis.contains_key("k1"));
    }

    #[test]
    fn test_save_json() {
        let report = decay_report();
        let file = NamedTempFile::new().unwrap();
        report.save_json(file.path()).unwrap();
        let contents = fs::read_to_string(file.path()).unwrap();
        assert!(contents.contains("\"species_names\""));
    }

    #[test]
    fn test_analysis_table_lists_reactions() {
        let report = decay_report();
        let rendered = report.analysis_table().to_string();
        assert!(rendered.contains("k1"));
        assert!(rendered.contains("first_order"));
    }
}
