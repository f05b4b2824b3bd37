use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use forgecmd::{
    AttrType, Authorizable, Command, CommandError, CommandExt, Instance, Outcome, OutcomeKind, ProcessContext, ProcessError,
    Schema, Stalenessable, Validatable,
};
use forgecmd_core::AttributeMap;
use forgecmd_infra::{InMemoryRecordStore, RecordStore, StoredRecord, TransactionError, TransactionManager};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
#[error("mail server unreachable")]
struct MailDown;

/// Inserts a post, then ends the way `mode` says.
struct Publish {
    store: Arc<InMemoryRecordStore>,
}

impl Validatable for Publish {}
impl Authorizable for Publish {}
impl Stalenessable for Publish {}

impl Command for Publish {
    type Output = StoredRecord;
    const NAME: &'static str = "posts.publish";

    fn schema() -> &'static Schema {
        Schema::cached::<Self>(|| {
            Schema::new()
                .attribute("title", AttrType::String)
                .attribute("mode", AttrType::String)
        })
    }

    fn transactions(&self) -> &dyn TransactionManager {
        &*self.store
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<StoredRecord, ProcessError> {
        let mut fields = AttributeMap::new();
        fields.insert("title".into(), json!(ctx.attributes().str("title")));
        let post = self.store.insert("posts", fields)?;

        let mode = ctx.attributes().str("mode").map(str::to_owned);
        match mode.as_deref() {
            Some("abort") => Err(ctx.abort_with("base", "failed", "Publishing is closed")),
            Some("crash") => Err(MailDown.into()),
            Some("anyhow") => Err(ProcessError::failed(anyhow::anyhow!("queue full"))),
            _ => Ok(post),
        }
    }
}

fn publish() -> (Publish, Arc<InMemoryRecordStore>) {
    let store = InMemoryRecordStore::arc();
    (Publish { store: store.clone() }, store)
}

#[test]
fn commit_happens_before_ok_is_broadcast() {
    let (command, store) = publish();
    let depth_at_ok = Cell::new(usize::MAX);
    let outcome = command
        .call_with(json!({ "title": "Hello" }), |cmd| {
            cmd.on_ok(|_| depth_at_ok.set(store.depth()));
        })
        .unwrap();

    assert_eq!(depth_at_ok.get(), 0);
    assert_eq!(outcome.payload().and_then(|p| p.field("title")), Some(&json!("Hello")));
    assert_eq!(store.list("posts").unwrap().len(), 1);
}

#[test]
fn abort_rolls_back_and_broadcasts_errors() {
    let (command, store) = publish();
    let messages = std::cell::RefCell::new(Vec::new());
    let outcome = command
        .call_with(json!({ "mode": "abort" }), |cmd| {
            cmd.on_abort(|errors| *messages.borrow_mut() = errors.full_messages());
        })
        .unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Abort);
    assert_eq!(messages.into_inner(), vec!["Publishing is closed"]);
    assert!(store.list("posts").unwrap().is_empty());
    assert_eq!(store.depth(), 0);
}

#[test]
fn unattended_abort_is_raised_with_errors() {
    let (command, _store) = publish();
    let err = command.call(json!({ "mode": "abort" })).unwrap_err();
    let CommandError::Aborted(errors) = err else {
        panic!("expected an abort");
    };
    assert!(errors.has("base", "failed"));
}

#[test]
fn body_errors_propagate_unmodified_without_a_broadcast() {
    let (command, store) = publish();
    let broadcasts = Cell::new(0);
    let err = command
        .call_with(json!({ "mode": "crash" }), |cmd| {
            cmd.on_any(
                &[
                    OutcomeKind::Ok,
                    OutcomeKind::Invalid,
                    OutcomeKind::Unauthorized,
                    OutcomeKind::Stale,
                    OutcomeKind::Abort,
                ],
                |_| broadcasts.set(broadcasts.get() + 1),
            );
        })
        .unwrap_err();

    let CommandError::Process(inner) = err else {
        panic!("expected a process error");
    };
    assert!(inner.downcast_ref::<MailDown>().is_some());
    assert_eq!(broadcasts.get(), 0);
    assert!(store.list("posts").unwrap().is_empty());
}

#[test]
fn anyhow_errors_pass_through() {
    let (command, _store) = publish();
    let err = command.call(json!({ "mode": "anyhow" })).unwrap_err();
    assert_eq!(err.to_string(), "queue full");
}

#[test]
fn exactly_one_terminal_broadcast() {
    let (command, _store) = publish();
    let broadcasts = Cell::new(0);
    command
        .call_with(json!({ "title": "once" }), |cmd| {
            cmd.on_any(&[OutcomeKind::Ok, OutcomeKind::Abort], |_| broadcasts.set(broadcasts.get() + 1))
                .on_any(&OutcomeKind::FAILURES, |_| broadcasts.set(broadcasts.get() + 10));
        })
        .unwrap();
    assert_eq!(broadcasts.get(), 1);
}

struct Bodiless;

impl Validatable for Bodiless {}
impl Authorizable for Bodiless {}
impl Stalenessable for Bodiless {}

impl Command for Bodiless {
    type Output = ();
    const NAME: &'static str = "bodiless";

    fn schema() -> &'static Schema {
        Schema::cached::<Self>(Schema::new)
    }
}

#[test]
fn missing_body_is_reported() {
    let err = Bodiless.call(json!({})).unwrap_err();
    assert!(matches!(err, CommandError::NotImplemented { command: "bodiless" }));
}

#[derive(Default)]
struct CountingTransactions {
    begun: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
}

impl TransactionManager for CountingTransactions {
    fn begin(&self) -> Result<(), TransactionError> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn commit(&self) -> Result<(), TransactionError> {
        self.committed.fetch_add(1, Ordering::SeqCst);
        Err(TransactionError::Storage("disk gone".into()))
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        self.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Counted<const TX: bool> {
    tx: CountingTransactions,
}

impl<const TX: bool> Validatable for Counted<TX> {}
impl<const TX: bool> Authorizable for Counted<TX> {}
impl<const TX: bool> Stalenessable for Counted<TX> {}

impl<const TX: bool> Command for Counted<TX> {
    type Output = ();
    const NAME: &'static str = "counted";
    const TRANSACTIONAL: bool = TX;

    fn schema() -> &'static Schema {
        Schema::cached::<Self>(Schema::new)
    }

    fn transactions(&self) -> &dyn TransactionManager {
        &self.tx
    }

    fn process(&mut self, _: &mut ProcessContext<'_>) -> Result<(), ProcessError> {
        Ok(())
    }
}

#[test]
fn non_transactional_commands_open_no_transaction() {
    let ok = Cell::new(false);
    let mut instance = Instance::new(Counted::<false> { tx: CountingTransactions::default() }, json!({})).unwrap();
    instance.on_ok(|_| ok.set(true));

    assert_eq!(instance.call().unwrap(), Outcome::Ok(Some(())));
    assert!(ok.get());
    assert_eq!(instance.command().tx.begun.load(Ordering::SeqCst), 0);
}

#[test]
fn failed_commit_rolls_back_and_skips_ok() {
    let ok = Cell::new(false);
    let mut instance = Instance::new(Counted::<true> { tx: CountingTransactions::default() }, json!({})).unwrap();
    instance.on_ok(|_| ok.set(true));

    let err = instance.call().unwrap_err();
    assert!(matches!(err, CommandError::Transaction(TransactionError::Storage(_))));
    assert!(!ok.get());

    let tx = &instance.command().tx;
    assert_eq!(tx.begun.load(Ordering::SeqCst), 1);
    assert_eq!(tx.committed.load(Ordering::SeqCst), 1);
    assert_eq!(tx.rolled_back.load(Ordering::SeqCst), 1);
}
