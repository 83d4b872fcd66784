use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tmh_core::errors::ErrorInfo;
use tmh_core::{Address, Erp, LogScore, Store, TmhError, Value};

use crate::effect::{FactorCont, SampleCont};

/// One random-choice record. Immutable once appended to a trace.
#[derive(Clone)]
pub struct Choice {
    /// Stable address of the choice.
    pub address: Address,
    /// Distribution the value was drawn from.
    pub erp: Rc<dyn Erp>,
    /// Arguments passed to the distribution.
    pub params: Vec<Value>,
    /// Chosen value.
    pub value: Value,
    /// Program state captured at the choice point.
    pub store: Store,
    /// Remaining computation, resumed with `(store, value)`.
    pub k: SampleCont,
    score_before: LogScore,
    factors_before: usize,
}

impl Choice {
    /// Prior log-probability of the chosen value.
    pub fn prior_score(&self) -> Result<LogScore, TmhError> {
        self.erp.score(&self.params, &self.value)
    }

    /// Cumulative trace score immediately before this choice was appended.
    pub fn score_before(&self) -> LogScore {
        self.score_before
    }
}

impl fmt::Debug for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Choice")
            .field("address", &self.address)
            .field("erp", &self.erp.name())
            .field("params", &self.params)
            .field("value", &self.value)
            .field("score_before", &self.score_before)
            .finish_non_exhaustive()
    }
}

/// Where an execution stopped.
#[derive(Clone, Default)]
pub enum TraceState {
    /// Still being extended.
    #[default]
    Running,
    /// Stopped at an exit address; resumable with the saved continuation.
    Suspended {
        /// Continuation after the exit-address factor.
        k: FactorCont,
        /// Program state at the exit address.
        store: Store,
    },
    /// Ran to program exit.
    Complete {
        /// Program return value.
        value: Value,
    },
}

impl fmt::Debug for TraceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceState::Running => f.write_str("Running"),
            TraceState::Suspended { store, .. } => f
                .debug_struct("Suspended")
                .field("store", store)
                .finish_non_exhaustive(),
            TraceState::Complete { value } => {
                f.debug_struct("Complete").field("value", value).finish()
            }
        }
    }
}

/// Ordered choice history of one execution plus its cumulative log score.
///
/// The score folds in the prior log-probability of every choice
/// ([`Trace::add_choice`]) and every factor weight ([`Trace::add_factor`]).
#[derive(Debug, Clone, Default)]
pub struct Trace {
    choices: Vec<Choice>,
    index: HashMap<Address, usize>,
    score: LogScore,
    num_factors: usize,
    state: TraceState,
}

impl Trace {
    /// Creates an empty, running trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of choices.
    pub fn len(&self) -> usize {
        self.choices.len()
    }

    /// Whether the trace holds no choices.
    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// Cumulative log score.
    pub fn score(&self) -> LogScore {
        self.score
    }

    /// Number of factors applied so far.
    pub fn num_factors(&self) -> usize {
        self.num_factors
    }

    /// All choices in execution order.
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    /// Execution state of the trace.
    pub fn state(&self) -> &TraceState {
        &self.state
    }

    /// Return value, if the trace ran to completion.
    pub fn value(&self) -> Option<&Value> {
        match &self.state {
            TraceState::Complete { value } => Some(value),
            _ => None,
        }
    }

    /// Whether the trace ran to program exit.
    pub fn is_complete(&self) -> bool {
        matches!(self.state, TraceState::Complete { .. })
    }

    /// Whether the trace stopped at an exit address with a saved continuation.
    pub fn is_suspended(&self) -> bool {
        matches!(self.state, TraceState::Suspended { .. })
    }

    /// Copy of the first `index` choices, with the score and factor count
    /// the trace had right before choice `index` was made.
    pub fn upto(&self, index: usize) -> Result<Trace, TmhError> {
        let pivot = self.choice_at_index(index)?;
        let choices = self.choices[..index].to_vec();
        let index_map = choices
            .iter()
            .enumerate()
            .map(|(position, choice)| (choice.address.clone(), position))
            .collect();
        Ok(Trace {
            choices,
            index: index_map,
            score: pivot.score_before,
            num_factors: pivot.factors_before,
            state: TraceState::Running,
        })
    }

    /// Choice at position `index`.
    pub fn choice_at_index(&self, index: usize) -> Result<&Choice, TmhError> {
        self.choices.get(index).ok_or_else(|| {
            TmhError::Trace(
                ErrorInfo::new("choice-index", "choice index out of range")
                    .with_context("index", index.to_string())
                    .with_context("len", self.choices.len().to_string()),
            )
        })
    }

    /// Choice recorded at `address`, if any.
    pub fn find_choice(&self, address: &Address) -> Option<&Choice> {
        self.index
            .get(address)
            .and_then(|position| self.choices.get(*position))
    }

    /// Appends a choice and folds its prior log-probability into the score.
    pub fn add_choice(
        &mut self,
        erp: Rc<dyn Erp>,
        params: Vec<Value>,
        value: Value,
        address: Address,
        store: Store,
        k: SampleCont,
    ) -> Result<(), TmhError> {
        self.ensure_running("add-choice")?;
        if self.index.contains_key(&address) {
            return Err(TmhError::Program(
                ErrorInfo::new("duplicate-address", "address used twice in one execution")
                    .with_context("address", address.to_string())
                    .with_hint("addresses must be unique along an execution path"),
            ));
        }
        let prior = erp.score(&params, &value)?;
        self.index.insert(address.clone(), self.choices.len());
        self.choices.push(Choice {
            address,
            erp,
            params,
            value,
            store,
            k,
            score_before: self.score,
            factors_before: self.num_factors,
        });
        self.score += prior;
        Ok(())
    }

    /// Adds a factor weight to the score.
    pub fn add_factor(&mut self, weight: LogScore) {
        self.score += weight;
        self.num_factors += 1;
    }

    /// Marks the trace as suspended at an exit address.
    pub fn save_continuation(&mut self, k: FactorCont, store: Store) -> Result<(), TmhError> {
        self.ensure_running("save-continuation")?;
        self.state = TraceState::Suspended { k, store };
        Ok(())
    }

    /// Marks the trace as complete with the program's return value.
    pub fn complete(&mut self, value: Value) -> Result<(), TmhError> {
        self.ensure_running("complete")?;
        self.state = TraceState::Complete { value };
        Ok(())
    }

    fn ensure_running(&self, operation: &str) -> Result<(), TmhError> {
        match self.state {
            TraceState::Running => Ok(()),
            _ => Err(TmhError::Trace(
                ErrorInfo::new("trace-finalised", "trace already suspended or complete")
                    .with_context("operation", operation)
                    .with_context("state", format!("{:?}", self.state)),
            )),
        }
    }
}
