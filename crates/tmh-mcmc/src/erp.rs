use std::fmt::Display;
use std::rc::Rc;

use rand::Rng;
use rand_distr::{Distribution, Normal, WeightedIndex};
use statrs::distribution::{self as density, Continuous, Discrete as _};
use tmh_core::errors::ErrorInfo;
use tmh_core::{Erp, LogScore, Proposal, RngHandle, TmhError, Value};

fn bad_params(erp: &str, message: impl Into<String>, params: &[Value]) -> TmhError {
    TmhError::Erp(
        ErrorInfo::new("erp-params", message)
            .with_context("erp", erp)
            .with_context("params", format!("{params:?}")),
    )
}

/// Wraps a constructor error from `statrs` or `rand_distr`.
fn rejected(erp: &str, err: impl Display, params: &[Value]) -> TmhError {
    bad_params(erp, err.to_string(), params)
}

fn real_param(erp: &str, params: &[Value], position: usize) -> Result<f64, TmhError> {
    match params.get(position) {
        Some(Value::Real(raw)) => Ok(*raw),
        Some(Value::Int(raw)) => Ok(*raw as f64),
        _ => Err(bad_params(
            erp,
            format!("expected numeric parameter at position {position}"),
            params,
        )),
    }
}

fn arity(erp: &str, params: &[Value], expected: usize) -> Result<(), TmhError> {
    if params.len() != expected {
        return Err(bad_params(
            erp,
            format!("expected {expected} parameters, got {}", params.len()),
            params,
        ));
    }
    Ok(())
}

/// `bernoulli(p)`: `true` with probability `p`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bernoulli;

impl Bernoulli {
    fn weight(params: &[Value]) -> Result<f64, TmhError> {
        arity("bernoulli", params, 1)?;
        let p = real_param("bernoulli", params, 0)?;
        if !(0.0..=1.0).contains(&p) {
            return Err(bad_params("bernoulli", "p must lie in [0, 1]", params));
        }
        Ok(p)
    }
}

impl Erp for Bernoulli {
    fn name(&self) -> &'static str {
        "bernoulli"
    }

    fn sample(&self, params: &[Value], rng: &mut RngHandle) -> Result<Value, TmhError> {
        let p = Self::weight(params)?;
        Ok(Value::Bool(rng.uniform() < p))
    }

    fn score(&self, params: &[Value], value: &Value) -> Result<LogScore, TmhError> {
        let p = Self::weight(params)?;
        let mass = density::Bernoulli::new(p)
            .map_err(|err| rejected("bernoulli", err, params))?;
        match value {
            Value::Bool(flag) => LogScore::from_f64(mass.ln_pmf(u64::from(*flag))),
            _ => Ok(LogScore::NegInfinity),
        }
    }
}

/// `uniform(a, b)`: continuous uniform on `[a, b)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uniform;

impl Uniform {
    fn bounds(params: &[Value]) -> Result<(f64, f64), TmhError> {
        arity("uniform", params, 2)?;
        let low = real_param("uniform", params, 0)?;
        let high = real_param("uniform", params, 1)?;
        if !(low < high) {
            return Err(bad_params("uniform", "requires a < b", params));
        }
        Ok((low, high))
    }
}

impl Erp for Uniform {
    fn name(&self) -> &'static str {
        "uniform"
    }

    fn sample(&self, params: &[Value], rng: &mut RngHandle) -> Result<Value, TmhError> {
        let (low, high) = Self::bounds(params)?;
        Ok(Value::Real(rng.inner_mut().gen_range(low..high)))
    }

    fn score(&self, params: &[Value], value: &Value) -> Result<LogScore, TmhError> {
        let (low, high) = Self::bounds(params)?;
        let pdf = density::Uniform::new(low, high)
            .map_err(|err| rejected("uniform", err, params))?;
        // statrs treats the support as closed; `high` itself is never drawn.
        match value {
            Value::Real(x) if (low..high).contains(x) => LogScore::from_f64(pdf.ln_pdf(*x)),
            _ => Ok(LogScore::NegInfinity),
        }
    }
}

/// `gaussian(mu, sigma)` with a symmetric drift proposer centred on the
/// previous value.
#[derive(Debug, Clone, Copy)]
pub struct Gaussian {
    drift: GaussianDrift,
}

impl Gaussian {
    /// Gaussian whose proposer perturbs by `drift_scale * sigma`.
    pub fn with_drift(drift_scale: f64) -> Self {
        Self {
            drift: GaussianDrift { drift_scale },
        }
    }

    fn moments(params: &[Value]) -> Result<(f64, f64), TmhError> {
        arity("gaussian", params, 2)?;
        let mu = real_param("gaussian", params, 0)?;
        let sigma = real_param("gaussian", params, 1)?;
        if !(sigma > 0.0) || !mu.is_finite() {
            return Err(bad_params("gaussian", "requires finite mu and sigma > 0", params));
        }
        Ok((mu, sigma))
    }
}

impl Default for Gaussian {
    fn default() -> Self {
        Self::with_drift(0.5)
    }
}

impl Erp for Gaussian {
    fn name(&self) -> &'static str {
        "gaussian"
    }

    fn sample(&self, params: &[Value], rng: &mut RngHandle) -> Result<Value, TmhError> {
        let (mu, sigma) = Self::moments(params)?;
        let normal = Normal::new(mu, sigma).map_err(|err| rejected("gaussian", err, params))?;
        Ok(Value::Real(normal.sample(rng.inner_mut())))
    }

    fn score(&self, params: &[Value], value: &Value) -> Result<LogScore, TmhError> {
        let (mu, sigma) = Self::moments(params)?;
        let pdf = density::Normal::new(mu, sigma)
            .map_err(|err| rejected("gaussian", err, params))?;
        match value {
            Value::Real(x) => LogScore::from_f64(pdf.ln_pdf(*x)),
            _ => Ok(LogScore::NegInfinity),
        }
    }

    fn proposer(&self) -> Option<&dyn Proposal> {
        Some(&self.drift)
    }
}

/// Random-walk proposal `previous + N(0, drift_scale * sigma)`.
#[derive(Debug, Clone, Copy)]
pub struct GaussianDrift {
    drift_scale: f64,
}

impl GaussianDrift {
    fn width(&self, params: &[Value]) -> Result<f64, TmhError> {
        let (_, sigma) = Gaussian::moments(params)?;
        let width = sigma * self.drift_scale;
        if !(width > 0.0) {
            return Err(bad_params("gaussian-drift", "drift width must be positive", params));
        }
        Ok(width)
    }
}

impl Proposal for GaussianDrift {
    fn propose(
        &self,
        params: &[Value],
        previous: &Value,
        rng: &mut RngHandle,
    ) -> Result<Value, TmhError> {
        let width = self.width(params)?;
        let normal = Normal::new(previous.as_f64(), width)
            .map_err(|err| rejected("gaussian-drift", err, params))?;
        Ok(Value::Real(normal.sample(rng.inner_mut())))
    }

    fn score(
        &self,
        params: &[Value],
        previous: &Value,
        value: &Value,
    ) -> Result<LogScore, TmhError> {
        let width = self.width(params)?;
        let pdf = density::Normal::new(previous.as_f64(), width)
            .map_err(|err| rejected("gaussian-drift", err, params))?;
        match value {
            Value::Real(x) => LogScore::from_f64(pdf.ln_pdf(*x)),
            _ => Ok(LogScore::NegInfinity),
        }
    }
}

/// `discrete(w0, w1, ...)`: index `i` with probability `w_i / sum(w)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discrete;

impl Discrete {
    fn weights(params: &[Value]) -> Result<Vec<f64>, TmhError> {
        if params.is_empty() {
            return Err(bad_params("discrete", "requires at least one weight", params));
        }
        let weights = (0..params.len())
            .map(|position| real_param("discrete", params, position))
            .collect::<Result<Vec<_>, _>>()?;
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(bad_params("discrete", "weights must be finite", params));
        }
        Ok(weights)
    }
}

impl Erp for Discrete {
    fn name(&self) -> &'static str {
        "discrete"
    }

    fn sample(&self, params: &[Value], rng: &mut RngHandle) -> Result<Value, TmhError> {
        let weights = Self::weights(params)?;
        let index = WeightedIndex::new(&weights)
            .map_err(|err| rejected("discrete", err, params))?;
        Ok(Value::Int(index.sample(rng.inner_mut()) as i64))
    }

    fn score(&self, params: &[Value], value: &Value) -> Result<LogScore, TmhError> {
        let weights = Self::weights(params)?;
        let mass = density::Categorical::new(&weights)
            .map_err(|err| rejected("discrete", err, params))?;
        match value {
            Value::Int(raw) if (0..weights.len() as i64).contains(raw) => {
                LogScore::from_f64(mass.ln_pmf(*raw as u64))
            }
            _ => Ok(LogScore::NegInfinity),
        }
    }
}

/// `random_integer(n)`: uniform over `0..n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomInteger;

impl RandomInteger {
    fn count(params: &[Value]) -> Result<i64, TmhError> {
        arity("random-integer", params, 1)?;
        match params[0] {
            Value::Int(n) if n > 0 => Ok(n),
            _ => Err(bad_params("random-integer", "n must be a positive integer", params)),
        }
    }
}

impl Erp for RandomInteger {
    fn name(&self) -> &'static str {
        "random-integer"
    }

    fn sample(&self, params: &[Value], rng: &mut RngHandle) -> Result<Value, TmhError> {
        let n = Self::count(params)?;
        Ok(Value::Int(rng.inner_mut().gen_range(0..n)))
    }

    fn score(&self, params: &[Value], value: &Value) -> Result<LogScore, TmhError> {
        let n = Self::count(params)?;
        let mass = density::DiscreteUniform::new(0, n - 1)
            .map_err(|err| rejected("random-integer", err, params))?;
        match value {
            Value::Int(raw) if (0..n).contains(raw) => LogScore::from_f64(mass.ln_pmf(*raw)),
            _ => Ok(LogScore::NegInfinity),
        }
    }
}

/// `delta(v)`: point mass at `v`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Delta;

impl Erp for Delta {
    fn name(&self) -> &'static str {
        "delta"
    }

    fn sample(&self, params: &[Value], _rng: &mut RngHandle) -> Result<Value, TmhError> {
        arity("delta", params, 1)?;
        Ok(params[0].clone())
    }

    fn score(&self, params: &[Value], value: &Value) -> Result<LogScore, TmhError> {
        arity("delta", params, 1)?;
        if params[0] == *value {
            Ok(LogScore::ZERO)
        } else {
            Ok(LogScore::NegInfinity)
        }
    }
}

/// Shared handle to [`Bernoulli`].
pub fn bernoulli() -> Rc<dyn Erp> {
    Rc::new(Bernoulli)
}

/// Shared handle to [`Uniform`].
pub fn uniform() -> Rc<dyn Erp> {
    Rc::new(Uniform)
}

/// Shared handle to [`Gaussian`] with the default drift proposer.
pub fn gaussian() -> Rc<dyn Erp> {
    Rc::new(Gaussian::default())
}

/// Shared handle to [`Discrete`].
pub fn discrete() -> Rc<dyn Erp> {
    Rc::new(Discrete)
}

/// Shared handle to [`RandomInteger`].
pub fn random_integer() -> Rc<dyn Erp> {
    Rc::new(RandomInteger)
}

/// Shared handle to [`Delta`].
pub fn delta() -> Rc<dyn Erp> {
    Rc::new(Delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bernoulli_scores_both_outcomes() {
        let params = [Value::Real(0.25)];
        let yes = Bernoulli.score(&params, &Value::Bool(true)).unwrap();
        let no = Bernoulli.score(&params, &Value::Bool(false)).unwrap();
        assert!((yes.to_f64() - 0.25f64.ln()).abs() < 1e-12);
        assert!((no.to_f64() - 0.75f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn out_of_support_is_impossible() {
        let params = [Value::Real(0.0), Value::Real(1.0)];
        assert!(Uniform
            .score(&params, &Value::Real(2.0))
            .unwrap()
            .is_impossible());
        assert!(RandomInteger
            .score(&[Value::Int(3)], &Value::Int(3))
            .unwrap()
            .is_impossible());
    }

    #[test]
    fn gaussian_density_matches_closed_form() {
        let params = [Value::Real(0.0), Value::Real(1.0)];
        let score = Gaussian::default().score(&params, &Value::Real(0.0)).unwrap();
        assert!((score.to_f64() + 0.5 * (2.0 * std::f64::consts::PI).ln()).abs() < 1e-12);
    }

    #[test]
    fn drift_proposal_is_symmetric() {
        let erp = Gaussian::default();
        let proposer = erp.proposer().unwrap();
        let params = [Value::Real(0.0), Value::Real(2.0)];
        let a = Value::Real(0.3);
        let b = Value::Real(-1.1);
        let forward = proposer.score(&params, &a, &b).unwrap();
        let backward = proposer.score(&params, &b, &a).unwrap();
        assert!((forward.to_f64() - backward.to_f64()).abs() < 1e-12);
    }

    #[test]
    fn discrete_samples_inside_support() {
        let params = [Value::Real(1.0), Value::Real(0.0), Value::Real(3.0)];
        let mut rng = RngHandle::from_seed(5);
        for _ in 0..200 {
            let value = Discrete.sample(&params, &mut rng).unwrap();
            assert_ne!(value, Value::Int(1));
            assert!(!Discrete.score(&params, &value).unwrap().is_impossible());
        }
    }

    #[test]
    fn discrete_mass_follows_normalised_weights() {
        let params = [Value::Real(1.0), Value::Real(0.0), Value::Real(3.0)];
        let third = Discrete.score(&params, &Value::Int(2)).unwrap();
        assert!((third.to_f64() - 0.75f64.ln()).abs() < 1e-12);
        assert!(Discrete.score(&params, &Value::Int(1)).unwrap().is_impossible());
        assert!(Discrete.score(&params, &Value::Int(-1)).unwrap().is_impossible());
    }

    #[test]
    fn degenerate_weights_are_rejected() {
        let mut rng = RngHandle::from_seed(1);
        for params in [
            vec![Value::Real(0.0), Value::Real(0.0)],
            vec![Value::Real(1.0), Value::Real(-2.0)],
            vec![Value::Real(f64::INFINITY)],
        ] {
            let err = Discrete.sample(&params, &mut rng).unwrap_err();
            assert_eq!(err.info().code, "erp-params");
            let err = Discrete.score(&params, &Value::Int(0)).unwrap_err();
            assert_eq!(err.info().code, "erp-params");
        }
    }

    #[test]
    fn point_masses_at_the_edges() {
        let never = [Value::Real(0.0)];
        assert!(Bernoulli.score(&never, &Value::Bool(true)).unwrap().is_impossible());
        let certain = Bernoulli.score(&never, &Value::Bool(false)).unwrap();
        assert!(certain.to_f64().abs() < 1e-12);
        let four = [Value::Int(4)];
        let score = RandomInteger.score(&four, &Value::Int(2)).unwrap();
        assert!((score.to_f64() + 4f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn uniform_excludes_upper_bound() {
        let params = [Value::Real(-1.0), Value::Real(3.0)];
        let inside = Uniform.score(&params, &Value::Real(-1.0)).unwrap();
        assert!((inside.to_f64() + 4f64.ln()).abs() < 1e-12);
        assert!(Uniform.score(&params, &Value::Real(3.0)).unwrap().is_impossible());
    }

    #[test]
    fn invalid_params_are_reported() {
        let err = Bernoulli.score(&[Value::Real(1.5)], &Value::Bool(true)).unwrap_err();
        assert_eq!(err.info().code, "erp-params");
    }
}
