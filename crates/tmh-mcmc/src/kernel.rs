use std::collections::BTreeSet;
use std::mem;
use std::rc::Rc;

use log::{debug, trace};
use tmh_core::errors::ErrorInfo;
use tmh_core::{Address, LogScore, RngHandle, Store, TmhError, Value};

use crate::accept;
use crate::effect::{EffectHandler, FactorSite, Flow, SampleSite};
use crate::runtime::Runtime;
use crate::trace::Trace;

/// How a transition ended.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// No choice was eligible for resampling.
    NoOp,
    /// The resampled value equalled the previous one; decided by a fair coin.
    SelfTransition {
        /// Index of the resampled choice.
        regen_from: usize,
    },
    /// A choice or factor drove the proposal's score to `-inf`.
    ZeroProbability {
        /// Index of the resampled choice.
        regen_from: usize,
    },
    /// The proposal ran to its end and the acceptance ratio was evaluated.
    Evaluated {
        /// Index of the resampled choice.
        regen_from: usize,
        /// Acceptance probability in `[0, 1]`.
        acceptance_prob: f64,
        /// Addresses whose values were copied from the previous trace.
        reused: BTreeSet<Address>,
        /// Proposed trace, whether or not it was accepted.
        proposal: Rc<Trace>,
    },
}

impl TransitionOutcome {
    /// Stable label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            TransitionOutcome::NoOp => "no-op",
            TransitionOutcome::SelfTransition { .. } => "self-transition",
            TransitionOutcome::ZeroProbability { .. } => "zero-probability",
            TransitionOutcome::Evaluated { .. } => "evaluated",
        }
    }
}

/// Result of one kernel application.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Next state of the chain: the proposal if accepted, otherwise the
    /// previous trace.
    pub trace: Rc<Trace>,
    /// Whether the proposal was accepted.
    pub accepted: bool,
    /// Diagnostic description of the path taken.
    pub outcome: TransitionOutcome,
}

/// Where a transition stood when it finished; reported in the debug log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Prefix copied; resampling the chosen choice.
    Proposing,
    /// Re-executing the program suffix.
    Replaying,
    /// Program exited; evaluating acceptance.
    Finalizing,
    Done,
}

/// Single-site Metropolis-Hastings transition over execution traces.
///
/// One instance per transition attempt. The previous trace is shared
/// read-only; the proposal is built in a fresh trace that starts as a prefix
/// copy of it.
pub struct MhKernel<'a> {
    rng: &'a mut RngHandle,
    old_trace: Rc<Trace>,
    trace: Trace,
    reused: BTreeSet<Address>,
    regen_from: usize,
    exit_address: Option<Address>,
    proposal_boundary: usize,
    phase: Phase,
    result: Option<Transition>,
}

impl<'a> MhKernel<'a> {
    /// Kernel proposing a move away from `old_trace`.
    pub fn new(rng: &'a mut RngHandle, old_trace: Rc<Trace>) -> Self {
        Self {
            rng,
            old_trace,
            trace: Trace::new(),
            reused: BTreeSet::new(),
            regen_from: 0,
            exit_address: None,
            proposal_boundary: 0,
            phase: Phase::Idle,
            result: None,
        }
    }

    /// Stops re-execution at the factor with this address instead of program
    /// exit (rejuvenation of a suspended trace).
    pub fn exit_address(mut self, address: Option<Address>) -> Self {
        self.exit_address = address;
        self
    }

    /// Choices before this index are fixed and never resampled.
    pub fn proposal_boundary(mut self, boundary: usize) -> Self {
        self.proposal_boundary = boundary;
        self
    }

    /// Performs one transition, resampling a site chosen uniformly among the
    /// eligible choices.
    pub fn run(mut self, rt: &Runtime) -> Result<Transition, TmhError> {
        let eligible = self.eligible()?;
        if eligible == 0 {
            debug!("no eligible choices; returning previous trace");
            return Ok(Transition {
                trace: self.old_trace,
                accepted: false,
                outcome: TransitionOutcome::NoOp,
            });
        }
        let regen_from = self.proposal_boundary + self.rng.index(eligible)?;
        self.run_at(rt, regen_from)
    }

    /// Performs one transition resampling the choice at `regen_from`.
    ///
    /// The acceptance ratio still charges `-ln(eligible)` for picking the
    /// site, so callers must choose `regen_from` uniformly over
    /// `[proposal_boundary, len)` for the chain to keep its target.
    pub fn run_at(mut self, rt: &Runtime, regen_from: usize) -> Result<Transition, TmhError> {
        let eligible = self.eligible()?;
        if regen_from < self.proposal_boundary || regen_from >= self.old_trace.len() {
            return Err(TmhError::Invariant(
                ErrorInfo::new("regen-out-of-range", "resample index outside eligible range")
                    .with_context("regen_from", regen_from.to_string())
                    .with_context("boundary", self.proposal_boundary.to_string())
                    .with_context("eligible", eligible.to_string()),
            ));
        }

        let id = rt.register_handler();
        let scope = rt.install(id)?;
        rt.clear_query();

        self.regen_from = regen_from;
        self.trace = self.old_trace.upto(regen_from)?;
        self.phase = Phase::Proposing;
        let regen = self.old_trace.choice_at_index(regen_from)?;
        let site = SampleSite {
            store: regen.store.clone(),
            k: Rc::clone(&regen.k),
            address: regen.address.clone(),
            erp: Rc::clone(&regen.erp),
            params: regen.params.clone(),
        };
        trace!("resampling {} at index {}", site.address, regen_from);

        let flow = self.sample(rt, site, true)?;
        scope.drive(&mut self, flow)?;
        self.result.take().ok_or_else(|| {
            TmhError::Invariant(ErrorInfo::new(
                "transition-unfinished",
                "program stopped without reaching a terminal outcome",
            ))
        })
    }

    fn eligible(&self) -> Result<usize, TmhError> {
        self.old_trace
            .len()
            .checked_sub(self.proposal_boundary)
            .ok_or_else(|| {
                TmhError::Invariant(
                    ErrorInfo::new("boundary-out-of-range", "proposal boundary exceeds trace length")
                        .with_context("len", self.old_trace.len().to_string())
                        .with_context("boundary", self.proposal_boundary.to_string()),
                )
            })
    }

    fn finish(&mut self, trace: Rc<Trace>, accepted: bool, outcome: TransitionOutcome) -> Flow {
        debug!(
            "transition {} at index {} (from {:?}): accepted={accepted}",
            outcome.label(),
            self.regen_from,
            self.phase
        );
        self.phase = Phase::Done;
        self.result = Some(Transition {
            trace,
            accepted,
            outcome,
        });
        Flow::Done
    }

    fn reject_impossible(&mut self) -> Flow {
        let old = Rc::clone(&self.old_trace);
        let regen_from = self.regen_from;
        self.finish(old, false, TransitionOutcome::ZeroProbability { regen_from })
    }
}

impl EffectHandler for MhKernel<'_> {
    fn sample(&mut self, rt: &Runtime, site: SampleSite, forced: bool) -> Result<Flow, TmhError> {
        let previous = self
            .old_trace
            .find_choice(&site.address)
            .map(|choice| choice.value.clone());

        let value = if forced {
            let previous = previous.ok_or_else(|| {
                TmhError::Invariant(
                    ErrorInfo::new("missing-forced-choice", "resampled address absent from trace")
                        .with_context("address", site.address.to_string()),
                )
            })?;
            let proposed = match site.erp.proposer() {
                Some(proposer) => proposer.propose(&site.params, &previous, self.rng)?,
                None => site.erp.sample(&site.params, self.rng)?,
            };
            if proposed == previous {
                let accepted = self.rng.coin_flip();
                let old = Rc::clone(&self.old_trace);
                let regen_from = self.regen_from;
                return Ok(self.finish(
                    old,
                    accepted,
                    TransitionOutcome::SelfTransition { regen_from },
                ));
            }
            self.phase = Phase::Replaying;
            proposed
        } else if let Some(previous) = previous {
            self.reused.insert(site.address.clone());
            previous
        } else {
            site.erp.sample(&site.params, self.rng)?
        };

        let SampleSite {
            store,
            k,
            address,
            erp,
            params,
        } = site;
        self.trace.add_choice(
            erp,
            params,
            value.clone(),
            address,
            store.clone(),
            Rc::clone(&k),
        )?;
        if self.trace.score().is_impossible() {
            return Ok(self.reject_impossible());
        }
        Ok(Flow::Resume(k(rt, store, value)?))
    }

    fn factor(&mut self, rt: &Runtime, site: FactorSite) -> Result<Flow, TmhError> {
        let weight = LogScore::from_f64(site.weight)?;
        if weight.is_impossible() {
            return Ok(self.reject_impossible());
        }
        self.trace.add_factor(weight);
        if self.exit_address.as_ref() == Some(&site.address) {
            self.trace.save_continuation(site.k, site.store.clone())?;
            return Ok(Flow::Resume(rt.exit(site.store)));
        }
        Ok(Flow::Resume((site.k)(rt, site.store)?))
    }

    fn exit(
        &mut self,
        _rt: &Runtime,
        _store: Store,
        value: Option<Value>,
    ) -> Result<Flow, TmhError> {
        self.phase = Phase::Finalizing;
        match &self.exit_address {
            None => {
                let value = value.ok_or_else(|| {
                    TmhError::Invariant(ErrorInfo::new(
                        "missing-return-value",
                        "program stopped early without an exit address",
                    ))
                })?;
                self.trace.complete(value)?;
            }
            Some(address) => {
                if !self.trace.is_suspended() {
                    return Err(TmhError::Invariant(
                        ErrorInfo::new("exit-address-unreached", "program exited before its exit address")
                            .with_context("exit_address", address.to_string()),
                    ));
                }
            }
        }

        let acceptance_prob = accept::accept_prob(
            &self.trace,
            &self.old_trace,
            self.regen_from,
            &self.reused,
            self.proposal_boundary,
        )?;
        let accepted = self.rng.uniform() < acceptance_prob;
        let proposal = Rc::new(mem::take(&mut self.trace));
        let next = if accepted {
            Rc::clone(&proposal)
        } else {
            Rc::clone(&self.old_trace)
        };
        let outcome = TransitionOutcome::Evaluated {
            regen_from: self.regen_from,
            acceptance_prob,
            reused: mem::take(&mut self.reused),
            proposal,
        };
        Ok(self.finish(next, accepted, outcome))
    }
}

/// Continuation-passing entry point: runs one transition and hands
/// `(trace, accepted)` to `k`.
pub fn mh_kernel<R, K>(
    rt: &Runtime,
    rng: &mut RngHandle,
    k: K,
    old_trace: Rc<Trace>,
    exit_address: Option<Address>,
    proposal_boundary: usize,
) -> Result<R, TmhError>
where
    K: FnOnce(Rc<Trace>, bool) -> R,
{
    let transition = MhKernel::new(rng, old_trace)
        .exit_address(exit_address)
        .proposal_boundary(proposal_boundary)
        .run(rt)?;
    Ok(k(transition.trace, transition.accepted))
}
