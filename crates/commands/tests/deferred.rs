mod common;

use std::cell::Cell;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use forgecmd::crud::{CreateCommand, UpdateCommand};
use forgecmd::{CommandError, CommandExt, Deferral, Input, OutcomeKind, RegisterCommand, perform};
use forgecmd_infra::RecordStore;
use forgecmd_infra::jobs::{
    CommandEnvelope, Delay, InMemoryJobStore, JobExecutor, JobResult, JobScheduler, JobStatus, JobStore,
    RetryPolicy, StoreScheduler,
};
use serde_json::{Value, json};

use common::{Gate, Post, RecordingScheduler, Tagged, crud_context, editor, logging};

#[test]
fn rejected_commands_are_never_submitted() {
    let scheduler = RecordingScheduler::default();
    let invalid = Cell::new(0);

    let deferral = Tagged
        .call_later_with(&scheduler, json!({}), |cmd| {
            cmd.on_invalid(|_| invalid.set(invalid.get() + 1));
        })
        .unwrap();

    assert_eq!(deferral, Deferral::Rejected(OutcomeKind::Invalid));
    assert_eq!(invalid.get(), 1);
    assert!(scheduler.calls().is_empty());

    let err = Gate::denied().call_later(&scheduler, json!({})).unwrap_err();
    assert!(matches!(err, CommandError::Unauthorized));
    assert!(scheduler.calls().is_empty());
}

#[test]
fn ready_commands_are_submitted_once_with_the_merged_input() {
    let scheduler = RecordingScheduler::default();
    let scheduled = Cell::new(false);

    let input = Input::from_source(json!({ "name": "from source", "tags": ["a"] })).with("name", "explicit");
    let deferral = Tagged
        .call_later_with(&scheduler, input, |cmd| {
            cmd.on_ok(|payload| scheduled.set(payload.is_none()));
        })
        .unwrap();

    assert!(deferral.is_scheduled());
    assert!(scheduled.get());

    let calls = scheduler.calls();
    assert_eq!(calls.len(), 1);
    let (envelope, delay) = &calls[0];
    assert_eq!(envelope.command, "tagged");
    assert_eq!(Value::Object(envelope.attributes.clone()), json!({ "name": "explicit", "tags": ["a"] }));
    assert_eq!(*delay, None);
}

#[test]
fn call_at_forwards_the_delay() {
    let scheduler = RecordingScheduler::default();
    let at = Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap();

    Tagged.call_at(&scheduler, at, json!({ "name": "x" })).unwrap();
    Tagged
        .call_at(&scheduler, Duration::from_secs(60), json!({ "name": "y" }))
        .unwrap();

    let delays: Vec<_> = scheduler.calls().into_iter().map(|(_, d)| d).collect();
    assert_eq!(delays, vec![Some(Delay::Until(at)), Some(Delay::Wait(Duration::from_secs(60)))]);
}

#[test]
fn perform_maps_outcomes_to_job_results() {
    let ok = CommandEnvelope::new("gate", Default::default());
    assert_eq!(perform(Gate::open(), &ok), JobResult::Success);
    assert_eq!(perform(Gate::denied(), &ok), JobResult::Cancelled("unauthorized".into()));
    assert_eq!(perform(Gate::stale(), &ok), JobResult::Cancelled("stale".into()));

    let broken = CommandEnvelope::new("gate", json!({ "broken": true }).as_object().cloned().unwrap_or_default());
    assert_eq!(perform(Gate::open(), &broken), JobResult::Cancelled("invalid".into()));

    let misrouted = CommandEnvelope::new("other", Default::default());
    assert!(matches!(perform(Gate::open(), &misrouted), JobResult::Failure(_)));
}

#[test]
fn scheduled_create_runs_on_the_executor() {
    logging();
    let (ctx, records) = crud_context();
    let jobs = InMemoryJobStore::arc();
    let scheduler = StoreScheduler::new(jobs.clone());

    let deferral = CreateCommand::<Post>::new(ctx.clone())
        .call_later(&scheduler, json!({ "title": "Later", "current_user": editor() }))
        .unwrap();
    let job_id = deferral.job_id().unwrap();
    assert!(records.list("posts").unwrap().is_empty());

    let mut executor = JobExecutor::new(jobs.clone());
    executor.register_command(move || CreateCommand::<Post>::new(ctx.clone()));
    let job = executor.run_next(None).unwrap().unwrap();

    assert_eq!(job.id, job_id);
    assert_eq!(job.status, JobStatus::Completed);
    let posts = records.list("posts").unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].field("title"), Some(&json!("Later")));
}

#[test]
fn state_change_before_execution_cancels_the_job() {
    logging();
    let (ctx, records) = crud_context();
    let jobs = InMemoryJobStore::arc();
    let scheduler = StoreScheduler::new(jobs.clone()).with_retry_policy(RetryPolicy::no_retry());
    let post = records
        .insert("posts", json!({ "title": "v1" }).as_object().cloned().unwrap_or_default())
        .unwrap();

    UpdateCommand::<Post>::new(ctx.clone())
        .call_later(
            &scheduler,
            json!({ "id": post.id.to_string(), "title": "from job", "lock_version": 1, "current_user": editor() }),
        )
        .unwrap();

    UpdateCommand::<Post>::new(ctx.clone())
        .call(json!({ "id": post.id.to_string(), "title": "meanwhile", "current_user": editor() }))
        .unwrap();

    let mut executor = JobExecutor::new(jobs.clone());
    executor.register_command(move || UpdateCommand::<Post>::new(ctx.clone()));
    let job = executor.run_next(None).unwrap().unwrap();

    assert_eq!(job.status, JobStatus::Cancelled { reason: "stale".into() });
    assert_eq!(records.find("posts", post.id).unwrap().unwrap().field("title"), Some(&json!("meanwhile")));
    assert_eq!(jobs.stats().unwrap().cancelled, 1);
}

#[test]
fn construction_failures_follow_the_retry_policy() {
    logging();
    let (ctx, records) = crud_context();
    let jobs = InMemoryJobStore::arc();
    let scheduler = StoreScheduler::new(jobs.clone()).with_retry_policy(RetryPolicy::no_retry());

    let job_id = scheduler
        .submit(CommandEnvelope::new(
            "posts.create",
            json!({ "title": "Bad", "tags": "not a list", "current_user": editor() }).as_object().cloned().unwrap_or_default(),
        ))
        .unwrap();

    let mut executor = JobExecutor::new(jobs.clone());
    executor.register_command(move || CreateCommand::<Post>::new(ctx.clone()));
    executor.run_next(None).unwrap();

    assert!(jobs.get(job_id).unwrap().is_none());
    let dead = jobs.dead_letters(10).unwrap();
    assert_eq!(dead.len(), 1);
    assert!(records.list("posts").unwrap().is_empty());
}
