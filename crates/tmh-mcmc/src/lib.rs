#![deny(missing_docs)]

//! Single-site Metropolis-Hastings over probabilistic-program execution
//! traces.
//!
//! A program is written in continuation-passing style: running any piece of
//! it yields the next [`Effect`] (`Sample`, `Factor` or `Exit`). The
//! [`MhKernel`] picks one recorded random choice uniformly, proposes a new
//! value for it, replays the rest of the program from that choice's captured
//! continuation while reusing every downstream choice whose address still
//! appears, and accepts or rejects with the Metropolis-Hastings-Green ratio.

/// Acceptance probability and transition-probability math.
pub mod accept;
/// Chain driver built on the kernel.
pub mod chain;
/// YAML configuration schema and defaults.
pub mod config;
/// Deterministic seed derivation helpers.
pub mod determinism;
/// Program effects, continuations and the handler interface.
pub mod effect;
/// Elementary random primitives.
pub mod erp;
/// Prior initialisation of starting traces.
pub mod init;
/// Single-site MH transition kernel.
pub mod kernel;
/// Run manifest serialization helpers.
pub mod manifest;
/// Sample and acceptance statistics.
pub mod metrics;
/// Execution environment: active-handler slot and query side channel.
pub mod runtime;
/// Trace store.
pub mod trace;

pub use accept::{accept_prob, transition_prob};
pub use chain::{run_chain, ChainSummary};
pub use config::{ChainConfig, OutputConfig, SeedPolicy};
pub use effect::{Effect, EffectHandler, FactorSite, Flow, Program, SampleSite};
pub use init::initialize;
pub use kernel::{mh_kernel, MhKernel, Transition, TransitionOutcome};
pub use metrics::{AcceptanceStats, ChainSample, MetricsRecorder};
pub use runtime::{HandlerId, HandlerScope, Query, Runtime};
pub use trace::{Choice, Trace, TraceState};
