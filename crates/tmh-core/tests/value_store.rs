use tmh_core::{Address, LogScore, Store, Value};

#[test]
fn child_addresses_are_stable() {
    let root = Address::new("main");
    let a = root.child("loop").child(3);
    let b = Address::new("main").child("loop").child(3);
    assert_eq!(a, b);
    assert_eq!(a.as_str(), "main/loop/3");
}

#[test]
fn store_bindings_are_independent_after_clone() {
    let original = Store::new().with("x", 1.5).with("flag", true);
    let mut copy = original.clone();
    copy.set("x", 2.5);
    assert_eq!(original.get("x"), Some(&Value::Real(1.5)));
    assert_eq!(copy.get("x"), Some(&Value::Real(2.5)));
    assert_eq!(original.len(), 2);
}

#[test]
fn value_views() {
    assert_eq!(Value::Bool(true).as_f64(), 1.0);
    assert_eq!(Value::Int(4).as_int().unwrap(), 4);
    assert!(Value::Real(0.5).as_bool().is_err());
}

#[test]
fn score_sum_folds_finite_terms() {
    let total: LogScore = [LogScore::Finite(-1.0), LogScore::Finite(-2.0)]
        .into_iter()
        .sum();
    assert_eq!(total, LogScore::Finite(-3.0));
    assert_eq!(total.to_f64(), -3.0);
}
