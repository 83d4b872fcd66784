use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tmh_core::Value;

use crate::kernel::TransitionOutcome;

/// State recorded after a post-burn-in transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainSample {
    /// Zero-based transition index.
    pub iteration: usize,
    /// Program return value of the current trace.
    pub value: Value,
    /// Log score of the current trace.
    pub score: f64,
}

/// Acceptance statistics over all transitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AcceptanceStats {
    /// Transitions attempted.
    pub proposed: usize,
    /// Transitions accepted.
    pub accepted: usize,
    /// Count of transitions per outcome label.
    pub outcomes: BTreeMap<String, usize>,
    /// Mean acceptance probability over evaluated transitions.
    pub mean_acceptance_prob: f64,
}

impl AcceptanceStats {
    /// Fraction of accepted transitions (0 when nothing was proposed).
    pub fn acceptance_rate(&self) -> f64 {
        if self.proposed == 0 {
            0.0
        } else {
            self.accepted as f64 / self.proposed as f64
        }
    }
}

/// Collects samples and transition statistics during a chain run.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    samples: Vec<ChainSample>,
    histogram: BTreeMap<String, usize>,
    stats: AcceptanceStats,
    evaluated_prob_sum: f64,
    evaluated: usize,
}

impl MetricsRecorder {
    /// Creates a new recorder instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tallies one transition.
    pub fn record_transition(&mut self, outcome: &TransitionOutcome, accepted: bool) {
        self.stats.proposed += 1;
        if accepted {
            self.stats.accepted += 1;
        }
        *self
            .stats
            .outcomes
            .entry(outcome.label().to_string())
            .or_insert(0) += 1;
        if let TransitionOutcome::Evaluated {
            acceptance_prob, ..
        } = outcome
        {
            self.evaluated_prob_sum += acceptance_prob;
            self.evaluated += 1;
        }
    }

    /// Records a retained sample.
    pub fn push_sample(&mut self, sample: ChainSample) {
        *self.histogram.entry(sample.value.to_string()).or_insert(0) += 1;
        self.samples.push(sample);
    }

    /// Retained samples in order.
    pub fn samples(&self) -> &[ChainSample] {
        &self.samples
    }

    /// Counts of retained return values keyed by their display form.
    pub fn histogram(&self) -> &BTreeMap<String, usize> {
        &self.histogram
    }

    /// Acceptance statistics so far.
    pub fn stats(&self) -> AcceptanceStats {
        let mut stats = self.stats.clone();
        stats.mean_acceptance_prob = if self.evaluated == 0 {
            0.0
        } else {
            self.evaluated_prob_sum / self.evaluated as f64
        };
        stats
    }

    /// Writes the retained samples to a CSV file.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        writeln!(file, "iteration,value,score")?;
        for sample in &self.samples {
            writeln!(
                file,
                "{},{},{:.6}",
                sample.iteration, sample.value, sample.score
            )?;
        }
        Ok(())
    }
}
