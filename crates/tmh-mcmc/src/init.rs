use log::warn;
use tmh_core::errors::ErrorInfo;
use tmh_core::{Address, LogScore, RngHandle, Store, TmhError, Value};

use crate::effect::{EffectHandler, FactorSite, Flow, Program, SampleSite};
use crate::runtime::Runtime;
use crate::trace::Trace;

/// Forward-samples every choice from its prior.
struct PriorRun<'a> {
    rng: &'a mut RngHandle,
    trace: Trace,
    exit_address: Option<&'a Address>,
}

impl EffectHandler for PriorRun<'_> {
    fn sample(&mut self, rt: &Runtime, site: SampleSite, _forced: bool) -> Result<Flow, TmhError> {
        let value = site.erp.sample(&site.params, self.rng)?;
        let SampleSite {
            store,
            k,
            address,
            erp,
            params,
        } = site;
        self.trace
            .add_choice(erp, params, value.clone(), address, store.clone(), k.clone())?;
        if self.trace.score().is_impossible() {
            return Ok(Flow::Done);
        }
        Ok(Flow::Resume(k(rt, store, value)?))
    }

    fn factor(&mut self, rt: &Runtime, site: FactorSite) -> Result<Flow, TmhError> {
        let weight = LogScore::from_f64(site.weight)?;
        self.trace.add_factor(weight);
        if weight.is_impossible() {
            return Ok(Flow::Done);
        }
        if self.exit_address == Some(&site.address) {
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
        match (self.exit_address, value) {
            (None, Some(value)) => self.trace.complete(value)?,
            (None, None) => {
                return Err(TmhError::Invariant(ErrorInfo::new(
                    "missing-return-value",
                    "program stopped early without an exit address",
                )))
            }
            (Some(address), _) => {
                if !self.trace.is_suspended() {
                    return Err(TmhError::Invariant(
                        ErrorInfo::new("exit-address-unreached", "program exited before its exit address")
                            .with_context("exit_address", address.to_string()),
                    ));
                }
            }
        }
        Ok(Flow::Done)
    }
}

/// Builds a starting trace by running `program` forward from the prior.
///
/// Executions with probability zero are discarded and retried, up to
/// `max_attempts` runs. With `exit_address` set, the run stops at the factor
/// carrying that address and the trace is left suspended.
pub fn initialize(
    rt: &Runtime,
    rng: &mut RngHandle,
    program: &Program,
    exit_address: Option<&Address>,
    max_attempts: usize,
) -> Result<Trace, TmhError> {
    for attempt in 0..max_attempts {
        let id = rt.register_handler();
        let scope = rt.install(id)?;
        rt.clear_query();
        let mut run = PriorRun {
            rng: &mut *rng,
            trace: Trace::new(),
            exit_address,
        };
        let first = program.start(rt)?;
        scope.drive(&mut run, Flow::Resume(first))?;
        if !run.trace.score().is_impossible() {
            return Ok(run.trace);
        }
        warn!("initial execution {attempt} had zero probability; retrying");
    }
    Err(TmhError::Invariant(
        ErrorInfo::new("init-exhausted", "no execution with non-zero probability found")
            .with_context("attempts", max_attempts.to_string())
            .with_hint("increase max_init_attempts or check the model's constraints"),
    ))
}
