use std::rc::Rc;

use tmh_core::{Address, LogScore, Store, TmhError, Value};
use tmh_mcmc::effect::{self, Effect, FactorCont, SampleCont};
use tmh_mcmc::erp;
use tmh_mcmc::{Runtime, Trace, TraceState};

fn cont() -> SampleCont {
    Rc::new(|_rt: &Runtime, store: Store, value: Value| -> Result<Effect, TmhError> {
        Ok(effect::exit(store, value))
    })
}

fn resume() -> FactorCont {
    Rc::new(|_rt: &Runtime, store: Store| -> Result<Effect, TmhError> {
        Ok(effect::exit(store, 0i64))
    })
}

fn flip(trace: &mut Trace, address: &str, value: bool) {
    trace
        .add_choice(
            erp::bernoulli(),
            vec![Value::Real(0.25)],
            Value::Bool(value),
            Address::new(address),
            Store::new().with("flip", value),
            cont(),
        )
        .unwrap();
}

fn three_choices() -> Trace {
    let mut trace = Trace::new();
    flip(&mut trace, "a", true);
    trace.add_factor(LogScore::from_f64(-1.0).unwrap());
    flip(&mut trace, "b", false);
    trace.add_factor(LogScore::from_f64(-2.0).unwrap());
    flip(&mut trace, "c", true);
    trace
}

#[test]
fn add_choice_folds_prior_into_score() {
    let trace = three_choices();
    let expected = 0.25f64.ln() + -1.0 + 0.75f64.ln() + -2.0 + 0.25f64.ln();
    assert!((trace.score().to_f64() - expected).abs() < 1e-12);
    assert_eq!(trace.num_factors(), 2);
    assert_eq!(trace.len(), 3);
}

#[test]
fn upto_restores_score_and_factor_count() {
    let trace = three_choices();

    let prefix = trace.upto(2).unwrap();
    assert_eq!(prefix.len(), 2);
    assert_eq!(prefix.num_factors(), 2);
    let expected = 0.25f64.ln() + -1.0 + 0.75f64.ln() + -2.0;
    assert!((prefix.score().to_f64() - expected).abs() < 1e-12);
    assert!(prefix.find_choice(&Address::new("c")).is_none());
    assert!(matches!(prefix.state(), TraceState::Running));

    let empty = trace.upto(0).unwrap();
    assert!(empty.is_empty());
    assert_eq!(empty.num_factors(), 0);
    assert_eq!(empty.score(), LogScore::ZERO);

    // The source trace is left untouched.
    assert_eq!(trace.len(), 3);
    assert_eq!(trace.num_factors(), 2);
}

#[test]
fn upto_requires_an_existing_choice() {
    let trace = three_choices();
    let err = trace.upto(3).unwrap_err();
    assert!(matches!(err, TmhError::Trace(_)));
    assert_eq!(err.info().code, "choice-index");
}

#[test]
fn lookups_by_index_and_address_agree() {
    let trace = three_choices();
    for (position, name) in ["a", "b", "c"].into_iter().enumerate() {
        let by_index = trace.choice_at_index(position).unwrap();
        let by_address = trace.find_choice(&Address::new(name)).unwrap();
        assert_eq!(by_index.address, by_address.address);
        assert_eq!(by_index.store.get("flip"), Some(&by_index.value));
    }
    assert!(trace.find_choice(&Address::new("missing")).is_none());
    let err = trace.choice_at_index(7).unwrap_err();
    assert_eq!(err.info().context.get("len").map(String::as_str), Some("3"));
}

#[test]
fn duplicate_address_is_a_program_error() {
    let mut trace = three_choices();
    let err = trace
        .add_choice(
            erp::bernoulli(),
            vec![Value::Real(0.5)],
            Value::Bool(true),
            Address::new("b"),
            Store::new(),
            cont(),
        )
        .unwrap_err();
    assert!(matches!(err, TmhError::Program(_)));
    assert_eq!(err.info().code, "duplicate-address");
    assert_eq!(trace.len(), 3);
}

#[test]
fn completion_and_suspension_are_exclusive() {
    let mut complete = three_choices();
    complete.complete(Value::Int(2)).unwrap();
    assert!(complete.is_complete());
    assert_eq!(complete.value(), Some(&Value::Int(2)));
    let err = complete.save_continuation(resume(), Store::new()).unwrap_err();
    assert_eq!(err.info().code, "trace-finalised");

    let mut suspended = three_choices();
    suspended
        .save_continuation(resume(), Store::new().with("n", 3i64))
        .unwrap();
    assert!(suspended.is_suspended());
    assert!(suspended.value().is_none());
    let err = suspended.complete(Value::Int(0)).unwrap_err();
    assert_eq!(err.info().code, "trace-finalised");
    let err = suspended
        .add_choice(
            erp::bernoulli(),
            vec![Value::Real(0.5)],
            Value::Bool(true),
            Address::new("late"),
            Store::new(),
            cont(),
        )
        .unwrap_err();
    assert_eq!(err.info().code, "trace-finalised");
}

#[test]
fn out_of_support_choice_makes_trace_impossible() {
    let mut trace = Trace::new();
    trace
        .add_choice(
            erp::uniform(),
            vec![Value::Real(0.0), Value::Real(1.0)],
            Value::Real(3.0),
            Address::new("u"),
            Store::new(),
            cont(),
        )
        .unwrap();
    assert!(trace.score().is_impossible());
    assert_eq!(trace.choice_at_index(0).unwrap().score_before(), LogScore::ZERO);
}
