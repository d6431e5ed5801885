//! Population statistics and run summaries

use std::fmt;

use crate::algorithm::measure::Ratio;
use crate::algorithm::population::core::StudyOutput;

/// Headline numbers of one run
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationStats {
    /// Patients evaluated
    pub patients_processed: u64,
    /// Patients in the population
    pub population_size: u64,
    /// Fraction of patients in the population
    pub inclusion_rate: Ratio,
    /// Per measure: id, number of groups, reported numerator and denominator totals
    pub measures: Vec<MeasureStats>,
}

/// Totals of one measure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureStats {
    /// Measure identifier
    pub id: String,
    /// Groups in the output
    pub groups: usize,
    /// Groups withheld by suppression
    pub suppressed_groups: usize,
    /// Sum of reported numerators
    pub numerator: u64,
    /// Sum of reported denominators
    pub denominator: u64,
}

impl PopulationStats {
    /// Summarise a run
    #[must_use]
    pub fn from_output(output: &StudyOutput) -> Self {
        let measures = output
            .results
            .iter()
            .map(|result| MeasureStats {
                id: result.measure_id.clone(),
                groups: result.rows.len(),
                suppressed_groups: result
                    .rows
                    .iter()
                    .filter(|row| row.ratio == Ratio::Suppressed)
                    .count(),
                numerator: result.total_numerator(),
                denominator: result.total_denominator(),
            })
            .collect();
        Self {
            patients_processed: output.patients_processed,
            population_size: output.population_size,
            inclusion_rate: Ratio::from_counts(output.population_size, output.patients_processed),
            measures,
        }
    }
}

impl fmt::Display for PopulationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Study Population Summary:")?;
        writeln!(f, "  Patients Processed: {}", self.patients_processed)?;
        writeln!(f, "  Population Size: {}", self.population_size)?;
        match self.inclusion_rate.value() {
            Some(rate) => writeln!(f, "  Inclusion Rate: {:.1}%", rate * 100.0)?,
            None => writeln!(f, "  Inclusion Rate: {}", self.inclusion_rate)?,
        }
        for measure in &self.measures {
            writeln!(
                f,
                "  Measure {}: {} groups ({} suppressed), numerator {}, denominator {}",
                measure.id, measure.groups, measure.suppressed_groups, measure.numerator, measure.denominator
            )?;
        }
        Ok(())
    }
}
