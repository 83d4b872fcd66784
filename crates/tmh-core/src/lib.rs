#![deny(missing_docs)]
#![doc = "Core traits and data types for single-site trace Metropolis-Hastings inference."]

use std::fmt::Debug;

pub mod errors;
pub mod rng;
pub mod score;
mod value;

pub use errors::{ErrorInfo, TmhError};
pub use rng::{derive_substream_seed, RngHandle};
pub use score::LogScore;
pub use value::{Address, Store, Value};

/// Elementary random primitive: a named distribution that can be sampled and
/// scored, optionally carrying a secondary proposal distribution used for
/// local perturbation moves.
pub trait Erp: Debug {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Draws a value given the ERP parameters.
    fn sample(&self, params: &[Value], rng: &mut RngHandle) -> Result<Value, TmhError>;

    /// Log-probability of `value` under the ERP with the given parameters.
    fn score(&self, params: &[Value], value: &Value) -> Result<LogScore, TmhError>;

    /// Secondary distribution conditioned on the previous value, if any.
    fn proposer(&self) -> Option<&dyn Proposal> {
        None
    }
}

/// Proposal distribution conditioned on `(params, previous_value)`.
pub trait Proposal: Debug {
    /// Draws a proposed value near `previous`.
    fn propose(
        &self,
        params: &[Value],
        previous: &Value,
        rng: &mut RngHandle,
    ) -> Result<Value, TmhError>;

    /// Log-probability of proposing `value` from `previous`.
    fn score(&self, params: &[Value], previous: &Value, value: &Value)
        -> Result<LogScore, TmhError>;
}
