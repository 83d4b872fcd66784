use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

use log::debug;
use serde::{Deserialize, Serialize};
use tmh_core::errors::ErrorInfo;
use tmh_core::{RngHandle, TmhError};

use crate::config::ChainConfig;
use crate::determinism;
use crate::effect::Program;
use crate::init;
use crate::kernel::MhKernel;
use crate::manifest::ChainManifest;
use crate::metrics::{AcceptanceStats, ChainSample, MetricsRecorder};
use crate::runtime::Runtime;
use crate::trace::Trace;

/// Summary returned to callers after a chain run completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainSummary {
    /// Retained samples in chain order.
    pub samples: Vec<ChainSample>,
    /// Counts of retained return values keyed by their display form.
    pub histogram: BTreeMap<String, usize>,
    /// Transition statistics.
    pub acceptance: AcceptanceStats,
    /// Log score of the final trace.
    pub final_score: f64,
    /// Samples CSV written during the run.
    pub samples_path: Option<PathBuf>,
    /// Manifest path, if emitted.
    pub manifest_path: Option<PathBuf>,
}

/// Runs a single-site MH chain over complete executions of `program`.
///
/// The starting trace comes from [`init::initialize`]; each transition uses
/// its own RNG substream so runs are reproducible from the master seed.
pub fn run_chain(
    rt: &Runtime,
    program: &Program,
    config: &ChainConfig,
) -> Result<ChainSummary, TmhError> {
    config.validate()?;
    let seed = config.seed_policy.master_seed;
    let mut init_rng = RngHandle::from_seed(determinism::init_seed(seed));
    let mut current = Rc::new(init::initialize(
        rt,
        &mut init_rng,
        program,
        None,
        config.max_init_attempts,
    )?);

    let mut recorder = MetricsRecorder::new();
    for iteration in 0..config.total_transitions() {
        let mut rng = RngHandle::from_seed(determinism::transition_seed(seed, iteration));
        let transition = MhKernel::new(&mut rng, Rc::clone(&current))
            .proposal_boundary(config.proposal_boundary)
            .run(rt)?;
        recorder.record_transition(&transition.outcome, transition.accepted);
        current = transition.trace;

        if iteration < config.burn_in || (iteration - config.burn_in + 1) % config.lag != 0 {
            continue;
        }
        recorder.push_sample(sample_of(&current, iteration)?);
    }

    let acceptance = recorder.stats();
    debug!(
        "chain finished: {} transitions, acceptance rate {:.3}",
        acceptance.proposed,
        acceptance.acceptance_rate()
    );

    let mut samples_path = None;
    let mut manifest_path = None;
    if let Some(run_dir) = &config.output.run_directory {
        std::fs::create_dir_all(run_dir).map_err(|err| {
            TmhError::Config(
                ErrorInfo::new("run-dir-create", err.to_string())
                    .with_context("path", run_dir.display().to_string()),
            )
        })?;
        let path = run_dir.join(&config.output.samples_file);
        recorder.write_csv(&path).map_err(|err| {
            TmhError::Config(
                ErrorInfo::new("samples-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        let manifest = ChainManifest {
            config: config.clone(),
            master_seed: seed,
            seed_label: config.seed_policy.label.clone(),
            acceptance: acceptance.clone(),
            final_score: current.score().to_f64(),
            samples_file: Some(config.output.samples_file.clone()),
        };
        let target = run_dir.join(&config.output.manifest_file);
        manifest.write(&target)?;
        samples_path = Some(path);
        manifest_path = Some(target);
    }

    Ok(ChainSummary {
        samples: recorder.samples().to_vec(),
        histogram: recorder.histogram().clone(),
        acceptance,
        final_score: current.score().to_f64(),
        samples_path,
        manifest_path,
    })
}

fn sample_of(trace: &Trace, iteration: usize) -> Result<ChainSample, TmhError> {
    let value = trace.value().cloned().ok_or_else(|| {
        TmhError::Invariant(
            ErrorInfo::new("incomplete-state", "chain state did not run to completion")
                .with_context("iteration", iteration.to_string()),
        )
    })?;
    Ok(ChainSample {
        iteration,
        value,
        score: trace.score().to_f64(),
    })
}
