//! Queued command execution on the worker scheduler.

use shardgraph_core::{CollectionRead, CoreError, DomainModel, EngineConfig, WorkerScheduler};
use shardgraph_testkit::prelude::*;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn worker_domain() -> DomainModel {
    DomainModel::builder(test_model())
        .config(EngineConfig::new().worker_name("testkit-worker"))
        .build_with_worker()
        .unwrap()
}

#[tokio::test]
async fn submitted_commands_resolve_in_order() {
    init_tracing();
    let domain = worker_domain();
    let first = domain.submit(|s| add_person(s, "Ada", 36)).unwrap();
    let second = domain.submit(|s| add_person(s, "Bob", 41)).unwrap();

    let ada = first.await.unwrap();
    let bob = second.await.unwrap();
    let model = domain.model();
    assert!(people(&model).persons.contains(ada));
    assert!(people(&model).persons.contains(bob));
}

#[tokio::test]
async fn commands_run_on_the_worker_thread() {
    let domain = worker_domain();
    let name = domain
        .submit(|_| Ok(thread::current().name().map(str::to_string)))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(name.as_deref(), Some("testkit-worker"));
}

#[tokio::test]
async fn failing_command_reports_through_ticket() {
    let domain = worker_domain();
    let ticket = domain
        .submit(|s| {
            add_person(s, "Ada", 36)?;
            Err::<(), _>("rejected".into())
        })
        .unwrap();
    assert!(matches!(ticket.await, Err(CoreError::CommandInvocation { .. })));
    assert_eq!(person_count(&domain), 0);
}

#[tokio::test]
async fn panicking_command_does_not_kill_the_worker() {
    let domain = worker_domain();
    let ticket = domain
        .submit(|_| -> Result<(), shardgraph_core::CommandError> { panic!("boom") })
        .unwrap();
    let err = ticket.await.unwrap_err();
    assert!(err.to_string().contains("boom"));

    let ada = domain.submit(|s| add_person(s, "Ada", 36)).unwrap().await.unwrap();
    assert!(people(&domain.model()).persons.contains(ada));
}

#[test]
fn cancelled_command_publishes_nothing() {
    let domain = worker_domain();
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    // Park the worker so the next command is still queued when cancelled.
    let blocker = domain
        .submit(move |_| {
            started_tx.send(()).ok();
            release_rx.recv().ok();
            Ok(())
        })
        .unwrap();
    started_rx.recv().unwrap();

    let ticket = domain
        .submit(|s| {
            s.check_cancelled()?;
            add_person(s, "Ada", 36)
        })
        .unwrap();
    ticket.cancel();
    release_tx.send(()).unwrap();

    blocker.wait().unwrap();
    assert!(matches!(ticket.wait(), Err(CoreError::Cancelled)));
    assert_eq!(person_count(&domain), 0);
}

#[test]
fn blocking_wait_from_plain_threads() {
    let domain = Arc::new(worker_domain());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let domain = Arc::clone(&domain);
            thread::spawn(move || {
                domain
                    .submit(move |s| add_person(s, "worker", i))
                    .unwrap()
                    .wait()
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(person_count(&domain), 4);
}

#[test]
fn reads_do_not_wait_for_queued_commands() {
    let domain = worker_domain();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let ticket = domain
        .submit(move |s| {
            release_rx.recv_timeout(Duration::from_secs(5)).ok();
            add_person(s, "Ada", 36)
        })
        .unwrap();

    // The published model is readable while the command holds the gate.
    assert_eq!(person_count(&domain), 0);
    release_tx.send(()).unwrap();
    ticket.wait().unwrap();
    assert_eq!(person_count(&domain), 1);
}

#[test]
fn shut_down_worker_rejects_submissions() {
    let scheduler = Arc::new(WorkerScheduler::new("closing").unwrap());
    let domain = DomainModel::builder(test_model())
        .scheduler(scheduler.clone())
        .build();
    scheduler.shutdown();
    assert!(matches!(
        domain.submit(|s| add_person(s, "Ada", 36)),
        Err(CoreError::QueueClosed)
    ));
}
