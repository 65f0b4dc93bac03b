pub mod aggregate;
pub mod distribution;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use aggregate::{build_dashboard, failure_histogram, summarize, terminal_cases};
pub use distribution::feature_distribution;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub total: usize,
    pub eligible_count: usize,
    pub ineligible_count: usize,
    pub eligible_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureCount {
    pub criterion_name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerminalCase {
    pub patient_id: String,
    pub failed_count: usize,
    pub failed_criteria: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureDistribution {
    pub feature: String,
    pub buckets: Vec<DistributionBucket>,
    pub missing: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistributionBucket {
    pub label: String,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub eligible: usize,
    pub ineligible: usize,
}

impl DistributionBucket {
    pub fn new(label: impl Into<String>, lower: Option<f64>, upper: Option<f64>) -> Self {
        Self {
            label: label.into(),
            lower,
            upper,
            eligible: 0,
            ineligible: 0,
        }
    }

    pub fn record(&mut self, eligible: bool) {
        if eligible {
            self.eligible += 1;
        } else {
            self.ineligible += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.eligible + self.ineligible
    }
}

/// Everything the results dashboard shows, derived from a single evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardReport {
    pub generated_at: DateTime<Utc>,
    pub summary: Summary,
    pub failure_histogram: Vec<FailureCount>,
    pub terminal_cases: Vec<TerminalCase>,
}
