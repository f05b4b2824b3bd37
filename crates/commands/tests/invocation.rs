mod common;

use std::cell::{Cell, RefCell};

use forgecmd::{CommandError, CommandExt, Instance, Outcome, OutcomeKind, PreflightState};
use serde_json::json;

use common::{Gate, Tagged};

#[test]
fn missing_required_name_is_invalid() {
    let invalid = Cell::new(0);
    let ok = Cell::new(0);
    let mut instance = Instance::new(Tagged, json!({})).unwrap();
    assert!(!instance.is_valid());
    assert_eq!(instance.errors().on("name"), vec!["can't be blank"]);

    instance
        .on_invalid(|errors| {
            assert!(errors.has("name", "blank"));
            invalid.set(invalid.get() + 1);
        })
        .on_ok(|_| ok.set(ok.get() + 1));

    let outcome = instance.call().unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Invalid);
    assert_eq!((invalid.get(), ok.get()), (1, 0));
}

#[test]
fn named_command_runs_with_its_own_empty_tags() {
    let ok = Cell::new(false);
    let mut a = Instance::new(Tagged, json!({ "name": "x" })).unwrap();
    let b = Instance::new(Tagged, json!({ "name": "y" })).unwrap();
    assert!(a.is_valid());

    a.on_ok(|_| ok.set(true));
    assert_eq!(a.call().unwrap(), Outcome::Ok(Some(())));
    assert!(ok.get());
    assert_eq!(a.attributes().value("tags"), Some(&json!([])));

    a.set("tags", json!(["changed"])).unwrap();
    assert_eq!(b.attributes().value("tags"), Some(&json!([])));
}

#[test]
fn preflight_queries_are_repeatable() {
    let mut instance = Instance::new(Tagged, json!({})).unwrap();
    assert!(!instance.is_valid());
    let first = instance.errors().clone();
    assert!(!instance.is_valid());
    assert_eq!(instance.errors(), &first);

    assert_eq!(instance.preflight(), PreflightState::RejectedInvalid);
    assert_eq!(instance.preflight(), PreflightState::RejectedInvalid);
    assert!(instance.is_authorized());
    assert!(!instance.is_stale());
}

#[test]
fn unattended_rejections_become_errors() {
    assert!(matches!(Gate::denied().call(json!({})), Err(CommandError::Unauthorized)));
    assert!(matches!(Gate::stale().call(json!({})), Err(CommandError::Stale)));

    let err = Gate::open().call(json!({ "broken": true })).unwrap_err();
    assert_eq!(err.outcome(), Some(OutcomeKind::Invalid));
    assert!(err.errors().is_some_and(|e| e.has("broken", "invalid")));
}

#[test]
fn unauthorized_short_circuits_everything_else() {
    let seen = RefCell::new(Vec::new());
    let outcome = Gate::denied()
        .call_with(json!({ "broken": true }), |cmd| {
            cmd.on_any(&OutcomeKind::FAILURES, |o| seen.borrow_mut().push(o.kind()))
                .on_ok(|_| seen.borrow_mut().push(OutcomeKind::Ok));
        })
        .unwrap();

    assert_eq!(outcome, Outcome::Unauthorized);
    assert_eq!(seen.into_inner(), vec![OutcomeKind::Unauthorized]);
}

#[test]
fn stale_listener_claims_the_outcome() {
    let stale = Cell::new(0);
    let outcome = Gate::stale()
        .call_with(json!({}), |cmd| {
            cmd.on_stale(|| stale.set(stale.get() + 1));
        })
        .unwrap();
    assert_eq!(outcome, Outcome::Stale);
    assert_eq!(stale.get(), 1);
}

#[test]
fn listeners_run_in_registration_order() {
    let order = RefCell::new(Vec::new());
    Gate::open()
        .call_with(json!({}), |cmd| {
            cmd.on_ok(|_| order.borrow_mut().push("first"))
                .on(OutcomeKind::Ok, |_| order.borrow_mut().push("second"))
                .on_any(&[OutcomeKind::Ok, OutcomeKind::Invalid], |_| order.borrow_mut().push("third"));
        })
        .unwrap();
    assert_eq!(order.into_inner(), vec!["first", "second", "third"]);
}

#[test]
fn ok_payload_reaches_listeners() {
    let payload = Cell::new(None);
    Gate::open()
        .call_with(json!({}), |cmd| {
            cmd.on_ok(|out| payload.set(out.copied()));
        })
        .unwrap();
    assert_eq!(payload.get(), Some("done"));
}

#[test]
fn no_exceptions_returns_failures_quietly() {
    let outcome = Gate::denied()
        .call_with(json!({}), |cmd| {
            cmd.no_exceptions();
        })
        .unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::Unauthorized);
}

#[test]
fn non_mapping_input_fails_construction() {
    let err = Tagged.call(json!("nope")).unwrap_err();
    assert!(matches!(err, CommandError::Attribute(_)));
}
