// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::args::CallArgs;
use serde_json::json;
use yare::parameterized;

fn square() -> JobFn {
    JobFn::new("square", |c: CallArgs| {
        let x = c.i64_at(0).ok_or("missing arg")?;
        Ok(json!(x * x))
    })
}

fn bound(job: &Job) -> (Arc<ResourcePool>, tokio::sync::mpsc::UnboundedReceiver<Control>) {
    let pool = Arc::new(ResourcePool::new(4, None));
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    job.bind(Binding { pool: Arc::downgrade(&pool), control: tx })
        .unwrap();
    (pool, rx)
}

#[parameterized(
    pending = { Status::Pending, false },
    running = { Status::Running, false },
    done = { Status::Done, true },
    failed = { Status::Failed, true },
    cancelled = { Status::Cancelled, true },
)]
fn terminal_split(status: Status, expected: bool) {
    assert_eq!(status.is_terminal(), expected);
}

#[test]
fn status_parses_both_cancelled_spellings() {
    assert_eq!("cancelled".parse::<Status>().unwrap(), Status::Cancelled);
    assert_eq!("canceled".parse::<Status>().unwrap(), Status::Cancelled);
    let from_json: Status = serde_json::from_str("\"canceled\"").unwrap();
    assert_eq!(from_json, Status::Cancelled);
    assert_eq!(serde_json::to_string(&Status::Cancelled).unwrap(), "\"cancelled\"");
}

#[test]
fn build_derives_name_and_defaults() {
    let job = JobSpec::thread(square()).args(Args::new().pos(2i64)).build();

    assert_eq!(job.name(), "square");
    assert_eq!(job.locality(), Locality::Thread);
    assert_eq!(job.status(), Status::Pending);
    assert_eq!(job.resources(), Resources::NONE);
    assert_eq!(job.retries(), 0);
    assert_eq!(job.retry_remain(), 0);
    assert!(job.condition().is_none());
    assert!(job.cache_dir().is_none());
    assert!(job.id().as_str().starts_with(JobId::PREFIX));
}

#[test]
fn build_applies_overrides() {
    let job = JobSpec::process(CommandSpec::new("/bin/sleep").arg("1"))
        .name("napper")
        .retries(2)
        .retry_delay(Duration::from_millis(10))
        .resources(Resources::cpu(2))
        .build();

    assert_eq!(job.name(), "napper");
    assert_eq!(job.locality(), Locality::Process);
    assert_eq!(job.resources(), Resources::cpu(2));
    assert_eq!(job.retry_remain(), 2);
}

#[test]
fn process_jobs_default_to_one_cpu_slot() {
    let job = JobSpec::process(CommandSpec::new("true")).build();
    assert_eq!(job.resources(), Resources::cpu(1));
}

#[test]
fn futures_in_args_compose_implicit_condition() {
    let j1 = JobSpec::thread(square()).args(Args::new().pos(2i64)).build();
    let j2 = JobSpec::thread(square())
        .args(Args::new().pos(j1.future()))
        .build();

    match j2.condition() {
        Some(Condition::AllSatisfied(parts)) => {
            assert_eq!(parts.len(), 1);
            assert_eq!(
                parts[0],
                Condition::AfterSuccess { job: j1.id().clone() }
            );
        }
        other => panic!("expected AllSatisfied, got {:?}", other),
    }
}

#[test]
fn explicit_condition_conjoins_with_implicit() {
    let j1 = JobSpec::thread(square()).args(Args::new().pos(1i64)).build();
    let j2 = JobSpec::thread(square()).args(Args::new().pos(2i64)).build();
    let j3 = JobSpec::thread(square())
        .args(Args::new().kw("a", j2.future()))
        .condition(Condition::after(j1.id().clone()))
        .build();

    match j3.condition() {
        Some(Condition::AllSatisfied(parts)) => {
            assert_eq!(
                parts.as_slice(),
                &[
                    Condition::AfterAnother { job: j1.id().clone() },
                    Condition::AfterSuccess { job: j2.id().clone() },
                ]
            );
        }
        other => panic!("expected AllSatisfied, got {:?}", other),
    }
}

#[test]
fn unbound_job_has_no_resources_and_is_not_runnable() {
    let job = JobSpec::process(CommandSpec::new("true")).build();

    assert!(!job.has_resource());
    assert!(!job.consume_resource());
    assert!(!job.release_resource());
    assert!(!job.runnable());
}

#[test]
fn unbound_emit_is_emit_error_other_ops_invalid_state() {
    let job = JobSpec::thread(square()).build();

    assert!(matches!(job.emit(), Err(JobError::Emit(_))));
    assert!(matches!(job.rerun(), Err(JobError::InvalidState(_))));
    assert!(matches!(job.result(), Err(JobError::InvalidState(_))));
    assert!(matches!(job.cancel(), Err(JobError::InvalidState(_))));

    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    assert!(matches!(
        rt.block_on(job.join()),
        Err(JobError::InvalidState(_))
    ));
}

#[test]
fn bound_job_consumes_and_releases_slots() {
    let job = JobSpec::process(CommandSpec::new("true")).build();
    let (pool, _rx) = bound(&job);

    assert!(job.runnable());
    assert!(job.has_resource());
    assert!(job.consume_resource());
    assert_eq!(pool.cpu_in_use(), 1);
    assert!(job.release_resource());
    assert_eq!(pool.cpu_in_use(), 0);
}

#[test]
fn binding_twice_is_rejected() {
    let job = JobSpec::thread(square()).build();
    let (_pool, _rx) = bound(&job);

    let pool2 = Arc::new(ResourcePool::new(1, None));
    let (tx2, _rx2) = tokio::sync::mpsc::unbounded_channel();
    let err = job
        .bind(Binding { pool: Arc::downgrade(&pool2), control: tx2 })
        .unwrap_err();
    assert!(matches!(err, JobError::Runtime(_)));
}

#[test]
fn emit_requires_pending() {
    let job = JobSpec::thread(square()).args(Args::new().pos(3i64)).build();
    let (_pool, mut rx) = bound(&job);

    job.emit().unwrap();
    assert_eq!(rx.try_recv().unwrap(), Control::Emit(job.id().clone()));

    job.mark_running(1).unwrap();
    assert!(matches!(job.emit(), Err(JobError::Emit(_))));
}

#[test]
fn lifecycle_pending_running_done() {
    let job = JobSpec::thread(square()).args(Args::new().pos(3i64)).build();
    let (_pool, _rx) = bound(&job);

    job.mark_running(10).unwrap();
    assert_eq!(job.status(), Status::Running);
    assert_eq!(job.attempts(), 1);
    assert_eq!(job.started_at_ms(), Some(10));

    job.complete(json!(9), 20).unwrap();
    assert_eq!(job.status(), Status::Done);
    assert_eq!(job.stopped_at_ms(), Some(20));
    assert!(job.future().resolved());
    assert_eq!(job.result().unwrap(), json!(9));
}

#[test]
fn terminal_status_is_monotonic() {
    let job = JobSpec::thread(square()).build();
    let (_pool, _rx) = bound(&job);
    job.mark_running(1).unwrap();
    job.fail(JobError::user("boom"), 2).unwrap();

    assert!(job.complete(json!(1), 3).is_err());
    assert!(job.cancel_terminal(None, 3).is_err());
    assert!(job.mark_running(3).is_err());
    assert_eq!(job.status(), Status::Failed);
    assert_eq!(job.error(), Some(JobError::user("boom")));
}

#[test]
fn result_unavailable_unless_done() {
    let job = JobSpec::thread(square()).build();
    let (_pool, _rx) = bound(&job);
    assert!(matches!(job.result(), Err(JobError::InvalidState(_))));

    job.mark_running(1).unwrap();
    job.fail(JobError::user("boom"), 2).unwrap();
    assert!(matches!(job.result(), Err(JobError::InvalidState(_))));
}

#[test]
fn schedule_retry_decrements_budget() {
    let job = JobSpec::thread(square()).retries(2).build();
    let (_pool, _rx) = bound(&job);

    job.mark_running(1).unwrap();
    assert!(job.schedule_retry(100));
    assert_eq!(job.status(), Status::Pending);
    assert_eq!(job.retry_remain(), 1);
    assert_eq!(job.next_attempt_at_ms(), Some(100));

    job.mark_running(101).unwrap();
    assert!(job.schedule_retry(200));
    assert_eq!(job.retry_remain(), 0);

    // Budget exhausted
    job.mark_running(201).unwrap();
    assert!(!job.schedule_retry(300));
}

#[test]
fn rerun_resets_outcome_and_budget() {
    let job = JobSpec::thread(square()).retries(1).build();
    let (_pool, mut rx) = bound(&job);

    job.mark_running(1).unwrap();
    assert!(job.schedule_retry(5));
    job.mark_running(6).unwrap();
    job.complete(json!(4), 7).unwrap();
    assert_eq!(job.retry_remain(), 0);

    job.rerun().unwrap();
    assert_eq!(rx.try_recv().unwrap(), Control::Rerun(job.id().clone()));
    assert_eq!(job.status(), Status::Pending);
    assert_eq!(job.retry_remain(), 1);
    assert!(job.error().is_none());
    assert!(!job.future().resolved());
}

#[test]
fn rerun_requires_terminal() {
    let job = JobSpec::thread(square()).build();
    let (_pool, _rx) = bound(&job);
    assert!(matches!(job.rerun(), Err(JobError::InvalidState(_))));

    job.mark_running(1).unwrap();
    assert!(matches!(job.rerun(), Err(JobError::InvalidState(_))));
}

#[tokio::test]
async fn join_returns_terminal_status() {
    let job = JobSpec::thread(square()).build();
    let (_pool, _rx) = bound(&job);

    let waiter = {
        let job = job.clone();
        tokio::spawn(async move { job.join().await })
    };
    job.mark_running(1).unwrap();
    job.cancel_terminal(None, 2).unwrap();

    assert_eq!(waiter.await.unwrap().unwrap(), Status::Cancelled);
}

#[test]
fn cancel_terminal_records_upstream_error() {
    let job = JobSpec::thread(square()).build();
    let (_pool, _rx) = bound(&job);
    let upstream = JobError::Upstream {
        job: JobId::new("job-up"),
        status: Status::Failed,
    };
    job.cancel_terminal(Some(upstream.clone()), 5).unwrap();

    assert_eq!(job.status(), Status::Cancelled);
    assert_eq!(job.error(), Some(upstream));
    assert!(job.cancel_token().is_cancelled());
}

#[test]
fn snapshot_round_trip() {
    let job = JobSpec::thread(square())
        .args(Args::new().pos(3i64))
        .build();
    let (_pool, _rx) = bound(&job);
    job.mark_running(10).unwrap();
    job.complete(json!(9), 20).unwrap();

    let snap = job.snapshot();
    assert_eq!(snap.status, Status::Done);
    assert_eq!(snap.result, Some(json!(9)));
    assert_eq!(snap.args, "(3)");

    let json_text = serde_json::to_string(&snap).unwrap();
    let parsed: JobSnapshot = serde_json::from_str(&json_text).unwrap();
    assert_eq!(parsed, snap);

    let restored = Job::from_snapshot(parsed);
    assert_eq!(restored.id(), job.id());
    assert_eq!(restored.status(), Status::Done);
    assert_eq!(restored.result().unwrap(), json!(9));
    assert!(!restored.runnable());
    assert!(matches!(restored.rerun(), Err(JobError::InvalidState(_))));
}
