use std::collections::BTreeSet;
use std::rc::Rc;

use tmh_core::{Address, LogScore, RngHandle, Store, TmhError, Value};
use tmh_mcmc::effect::{self, Effect, SampleCont};
use tmh_mcmc::erp;
use tmh_mcmc::{accept_prob, initialize, transition_prob, MhKernel, Program, Runtime, Trace, TransitionOutcome};

const HEADS_WEIGHT: f64 = -0.2231435513142097; // ln 0.8
const TAILS_WEIGHT: f64 = -1.6094379124341003; // ln 0.2

/// The branch taken by `coin` decides which choice follows it, so flipping
/// the coin changes the trace structure.
fn branching() -> Program {
    Program::new(|_rt, store| {
        Ok(effect::sample(
            store,
            "coin",
            erp::bernoulli(),
            vec![Value::Real(0.5)],
            |_rt: &Runtime, store: Store, coin: Value| -> Result<Effect, TmhError> {
                let heads = coin.as_bool()?;
                let (address, erp, params) = if heads {
                    ("heads-u", erp::uniform(), vec![Value::Real(0.0), Value::Real(1.0)])
                } else {
                    ("tails-g", erp::gaussian(), vec![Value::Real(0.0), Value::Real(1.0)])
                };
                Ok(effect::sample(
                    store,
                    address,
                    erp,
                    params,
                    move |_rt: &Runtime, store: Store, _inner: Value| -> Result<Effect, TmhError> {
                        let weight = if heads { HEADS_WEIGHT } else { TAILS_WEIGHT };
                        Ok(effect::factor(store, "obs", weight, move |_rt: &Runtime, store: Store| {
                            Ok(effect::exit(store, heads))
                        }))
                    },
                ))
            },
        ))
    })
}

#[test]
fn structure_change_accepts_by_factor_ratio() {
    let rt = Runtime::new();
    let mut evaluated = 0;
    for seed in 0..200 {
        let mut init_rng = RngHandle::from_seed(seed);
        let old = Rc::new(initialize(&rt, &mut init_rng, &branching(), None, 10).unwrap());
        let was_heads = old.value() == Some(&Value::Bool(true));

        let mut rng = RngHandle::from_seed(seed + 10_000);
        let transition = MhKernel::new(&mut rng, Rc::clone(&old)).run_at(&rt, 0).unwrap();
        match transition.outcome {
            TransitionOutcome::SelfTransition { regen_from } => assert_eq!(regen_from, 0),
            TransitionOutcome::Evaluated {
                acceptance_prob,
                reused,
                proposal,
                ..
            } => {
                evaluated += 1;
                assert!(reused.is_empty());
                assert_eq!(proposal.len(), 2);
                let expected = if was_heads {
                    (TAILS_WEIGHT - HEADS_WEIGHT).exp()
                } else {
                    1.0
                };
                assert!((acceptance_prob - expected).abs() < 1e-9);

                let fw = transition_prob(&old, &proposal, 0, &reused, 0).unwrap();
                let bw = transition_prob(&proposal, &old, 0, &reused, 0).unwrap();
                let fresh_new = proposal.choice_at_index(1).unwrap().prior_score().unwrap().to_f64();
                let fresh_old = old.choice_at_index(1).unwrap().prior_score().unwrap().to_f64();
                let pick = -(2.0f64).ln();
                assert!((fw - (0.5f64.ln() + fresh_new + pick)).abs() < 1e-9);
                assert!((bw - (0.5f64.ln() + fresh_old + pick)).abs() < 1e-9);
            }
            other => panic!("unexpected outcome {}", other.label()),
        }
    }
    assert!(evaluated > 50);
}

#[test]
fn drift_proposal_is_symmetric() {
    let program = Program::new(|_rt, store| {
        Ok(effect::sample(
            store,
            "mu",
            erp::gaussian(),
            vec![Value::Real(0.0), Value::Real(2.0)],
            |_rt: &Runtime, store: Store, mu: Value| -> Result<Effect, TmhError> {
                Ok(effect::exit(store, mu))
            },
        ))
    });
    let rt = Runtime::new();
    let mut init_rng = RngHandle::from_seed(4);
    let old = Rc::new(initialize(&rt, &mut init_rng, &program, None, 10).unwrap());

    for seed in 0..20 {
        let mut rng = RngHandle::from_seed(seed);
        let transition = MhKernel::new(&mut rng, Rc::clone(&old)).run(&rt).unwrap();
        let TransitionOutcome::Evaluated {
            acceptance_prob,
            proposal,
            reused,
            ..
        } = transition.outcome
        else {
            panic!("continuous drift proposal should be evaluated");
        };
        let fw = transition_prob(&old, &proposal, 0, &reused, 0).unwrap();
        let bw = transition_prob(&proposal, &old, 0, &reused, 0).unwrap();
        assert!((fw - bw).abs() < 1e-9);

        let prior_ratio = (proposal.score().to_f64() - old.score().to_f64()).exp();
        assert!((acceptance_prob - prior_ratio.min(1.0)).abs() < 1e-9);
    }
}

fn impossible_trace() -> Trace {
    let k: SampleCont = Rc::new(|_rt: &Runtime, store: Store, value: Value| -> Result<Effect, TmhError> {
        Ok(effect::exit(store, value))
    });
    let mut trace = Trace::new();
    trace
        .add_choice(
            erp::bernoulli(),
            vec![Value::Real(0.0)],
            Value::Bool(true),
            Address::new("x"),
            Store::new(),
            k,
        )
        .unwrap();
    trace.complete(Value::Bool(true)).unwrap();
    trace
}

#[test]
fn nan_acceptance_is_fatal() {
    let old = impossible_trace();
    let new = impossible_trace();
    assert_eq!(old.score(), LogScore::NegInfinity);

    let err = accept_prob(&new, &old, 0, &BTreeSet::new(), 0).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.info().code, "nan-acceptance");
}

#[test]
fn transition_without_eligible_choices_is_fatal() {
    let old = impossible_trace();
    let err = transition_prob(&old, &old, 0, &BTreeSet::new(), 1).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.info().code, "no-eligible-choices");
}
