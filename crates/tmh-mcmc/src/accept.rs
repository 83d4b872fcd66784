use std::collections::BTreeSet;

use tmh_core::errors::ErrorInfo;
use tmh_core::{Address, LogScore, TmhError};

use crate::trace::Trace;

/// Metropolis-Hastings-Green acceptance probability for moving from
/// `old_trace` to `trace` by resampling choice `regen_from`.
///
/// `min(1, exp(score(trace) - score(old) + bw - fw))`. A NaN ratio is an
/// invariant violation: zero-probability states must already have been
/// rejected before this point.
pub fn accept_prob(
    trace: &Trace,
    old_trace: &Trace,
    regen_from: usize,
    reused: &BTreeSet<Address>,
    proposal_boundary: usize,
) -> Result<f64, TmhError> {
    let fw = transition_prob(old_trace, trace, regen_from, reused, proposal_boundary)?;
    let bw = transition_prob(trace, old_trace, regen_from, reused, proposal_boundary)?;
    let log_ratio = trace.score().to_f64() - old_trace.score().to_f64() + bw - fw;
    let prob = log_ratio.exp();
    if prob.is_nan() {
        return Err(TmhError::Invariant(
            ErrorInfo::new("nan-acceptance", "acceptance probability is NaN")
                .with_context("score", trace.score().to_string())
                .with_context("old_score", old_trace.score().to_string())
                .with_context("fw", fw.to_string())
                .with_context("bw", bw.to_string()),
        ));
    }
    Ok(prob.min(1.0))
}

/// Log-probability of proposing `to_trace` from `from_trace`.
///
/// Sums the proposal density of the resampled choice, the prior density of
/// every later choice in `to_trace` that was freshly sampled (reused
/// addresses cancel between directions and are left out), and the
/// `-ln(eligible)` cost of picking the site uniformly.
pub fn transition_prob(
    from_trace: &Trace,
    to_trace: &Trace,
    regen_from: usize,
    reused: &BTreeSet<Address>,
    proposal_boundary: usize,
) -> Result<f64, TmhError> {
    let regen = to_trace.choice_at_index(regen_from)?;
    let proposal = match regen.erp.proposer() {
        Some(proposer) => {
            let previous = &from_trace.choice_at_index(regen_from)?.value;
            proposer.score(&regen.params, previous, &regen.value)?
        }
        None => regen.prior_score()?,
    };

    let mut fresh = LogScore::ZERO;
    for choice in &to_trace.choices()[regen_from + 1..] {
        if !reused.contains(&choice.address) {
            fresh += choice.prior_score()?;
        }
    }

    let eligible = from_trace
        .len()
        .checked_sub(proposal_boundary)
        .filter(|count| *count > 0)
        .ok_or_else(|| {
            TmhError::Invariant(
                ErrorInfo::new("no-eligible-choices", "no choice eligible for resampling")
                    .with_context("len", from_trace.len().to_string())
                    .with_context("boundary", proposal_boundary.to_string()),
            )
        })?;

    let score = (proposal + fresh).to_f64() - (eligible as f64).ln();
    if score.is_nan() {
        return Err(TmhError::Invariant(
            ErrorInfo::new("nan-transition", "transition probability is NaN")
                .with_context("regen_from", regen_from.to_string()),
        ));
    }
    Ok(score)
}
