// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gig_core::{Args, CallArgs, CommandSpec, JobFn, JobSpec, Resources, WebAppSpec};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn add() -> JobFn {
    JobFn::new("add", |c: CallArgs| {
        let a = c.i64_at(0).ok_or("missing a")?;
        let b = c.i64_at(1).ok_or("missing b")?;
        Ok(json!(a + b))
    })
}

fn sleepy(ms: u64) -> JobFn {
    JobFn::new("sleepy", move |_c: CallArgs| {
        std::thread::sleep(Duration::from_millis(ms));
        Ok(json!(null))
    })
}

fn quick_setting() -> EngineSetting {
    EngineSetting::default().tick_interval_ms(5).print_traceback(false)
}

#[tokio::test]
async fn thread_job_runs_to_done() {
    let engine = Engine::new(quick_setting());
    let job = JobSpec::thread(add()).args(Args::new().pos(1i64).pos(2i64)).build();

    engine.submit(&job).unwrap();
    assert_eq!(engine.wait_job(&job).await.unwrap(), Status::Done);
    assert_eq!(job.result().unwrap(), json!(3));
    assert_eq!(engine.jobs().counts().done, 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn local_async_job_runs_on_the_loop() {
    let engine = Engine::new(quick_setting());
    let job = JobSpec::local(JobFn::task("delayed", |c: CallArgs| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(json!(c.i64_at(0).unwrap_or(0) * 2))
    }))
    .args(Args::new().pos(21i64))
    .build();

    engine.submit(&job).unwrap();
    engine.wait().await;
    assert_eq!(job.result().unwrap(), json!(42));
    engine.shutdown().await;
}

#[tokio::test]
async fn submit_rejects_future_of_unsubmitted_job() {
    let engine = Engine::new(quick_setting());
    let ghost = JobSpec::thread(add()).args(Args::new().pos(1i64).pos(2i64)).build();
    let dependent = JobSpec::thread(add())
        .args(Args::new().pos(ghost.future()).pos(3i64))
        .build();

    let err = engine.submit(&dependent).unwrap_err();
    assert!(matches!(
        err.as_job_error(),
        Some(gig_core::JobError::InvalidState(_))
    ));

    // Same pair inside one batch is fine
    engine.submit_all(&[dependent.clone(), ghost.clone()]).unwrap();
    engine.wait().await;
    assert_eq!(dependent.result().unwrap(), json!(6));
    engine.shutdown().await;
}

#[tokio::test]
async fn resubmission_is_rejected() {
    let engine = Engine::new(quick_setting());
    let job = JobSpec::thread(add()).args(Args::new().pos(1i64).pos(1i64)).build();
    engine.submit(&job).unwrap();

    let err = engine.submit(&job).unwrap_err();
    assert!(matches!(
        err.as_job_error(),
        Some(gig_core::JobError::Runtime(_))
    ));
    engine.shutdown().await;
}

#[tokio::test]
async fn cancel_of_pending_job_leaves_capacity_unchanged() {
    let setting = quick_setting().cpu_slots(1).max_jobs(1);
    let engine = Engine::new(setting);
    let pool = engine.resources();

    // Occupy the engine so the second job stays pending
    let blocker = JobSpec::thread(sleepy(100)).resources(Resources::cpu(1)).build();
    let pending = JobSpec::thread(add())
        .args(Args::new().pos(1i64).pos(2i64))
        .resources(Resources::cpu(1))
        .build();
    engine.submit_all(&[blocker.clone(), pending.clone()]).unwrap();

    engine.cancel(&pending).unwrap();
    assert_eq!(engine.wait_job(&pending).await.unwrap(), Status::Cancelled);
    engine.wait().await;

    assert_eq!(pool.cpu_in_use(), 0);
    assert_eq!(blocker.status(), Status::Done);
    engine.shutdown().await;
}

#[tokio::test]
async fn cpu_slots_serialize_competing_jobs() {
    let engine = Engine::new(quick_setting().cpu_slots(1));
    let live = std::sync::Arc::new(AtomicUsize::new(0));
    let peak = std::sync::Arc::new(AtomicUsize::new(0));

    let mut jobs = Vec::new();
    for _ in 0..3 {
        let live = std::sync::Arc::clone(&live);
        let peak = std::sync::Arc::clone(&peak);
        let f = JobFn::new("tracked", move |_c: CallArgs| {
            let now = live.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            live.fetch_sub(1, Ordering::SeqCst);
            Ok(json!(null))
        });
        jobs.push(JobSpec::thread(f).resources(Resources::cpu(1)).build());
    }
    engine.submit_all(&jobs).unwrap();
    engine.wait().await;

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(jobs.iter().all(|j| j.status() == Status::Done));
    engine.shutdown().await;
}

#[tokio::test]
async fn submit_async_applies_back_pressure() {
    let engine = Engine::new(quick_setting().max_jobs(1));
    let first = JobSpec::thread(sleepy(50)).build();
    let second = JobSpec::thread(add()).args(Args::new().pos(2i64).pos(2i64)).build();

    engine.submit(&first).unwrap();
    engine.submit_async(&second).await.unwrap();

    // The engine was full until the first job finished
    assert!(first.is_terminal());
    engine.wait().await;
    assert_eq!(second.result().unwrap(), json!(4));
    engine.shutdown().await;
}

#[tokio::test]
async fn process_job_captures_stdout() {
    let engine = Engine::new(quick_setting());
    let job = JobSpec::process(CommandSpec::new("echo").arg("hello")).build();

    engine.submit(&job).unwrap();
    assert_eq!(engine.wait_job(&job).await.unwrap(), Status::Done);
    assert_eq!(job.result().unwrap(), json!("hello"));
    engine.shutdown().await;
}

#[tokio::test]
async fn process_job_failure_captures_stderr() {
    let engine = Engine::new(quick_setting());
    let job = JobSpec::process(CommandSpec::new("ls").arg("/definitely/not/here")).build();

    engine.submit(&job).unwrap();
    assert_eq!(engine.wait_job(&job).await.unwrap(), Status::Failed);
    let err = job.error().unwrap();
    assert!(err.to_string().contains("command failed"));
    engine.shutdown().await;
}

#[tokio::test]
async fn retry_budget_runs_out() {
    let engine = Engine::new(quick_setting());
    let tries = std::sync::Arc::new(AtomicUsize::new(0));
    let f = {
        let tries = std::sync::Arc::clone(&tries);
        JobFn::new("always_fails", move |_c: CallArgs| {
            tries.fetch_add(1, Ordering::SeqCst);
            Err("nope".to_string())
        })
    };
    let job = JobSpec::thread(f)
        .retries(2)
        .retry_delay(Duration::from_millis(10))
        .build();
    assert_eq!(job.retry_remain(), 2);

    engine.submit(&job).unwrap();
    assert_eq!(engine.wait_job(&job).await.unwrap(), Status::Failed);

    assert_eq!(tries.load(Ordering::SeqCst), 3);
    assert_eq!(job.retry_remain(), 0);
    assert_eq!(job.attempts(), 3);
    engine.shutdown().await;
}

#[tokio::test]
async fn shutdown_cancelling_stops_running_jobs() {
    let engine = Engine::new(quick_setting());
    let job = JobSpec::local(JobFn::task("forever", |_c: CallArgs| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(json!(null))
    }))
    .build();
    engine.submit(&job).unwrap();

    // Let it dispatch, then tear everything down
    tokio::time::sleep(Duration::from_millis(30)).await;
    engine.shutdown_cancelling().await;

    assert_eq!(job.status(), Status::Cancelled);
}

#[tokio::test]
async fn webapp_fails_when_port_never_answers() {
    let engine = Engine::new(quick_setting());
    // Nothing listens on port 1
    let app = WebAppSpec::new(CommandSpec::new("sleep").arg("30"), "127.0.0.1", 1)
        .check_delta(Duration::from_millis(20))
        .max_missed_probes(2);
    let job = JobSpec::webapp(app).build();

    engine.submit(&job).unwrap();
    assert_eq!(engine.wait_job(&job).await.unwrap(), Status::Failed);
    assert!(job.error().unwrap().to_string().contains("not responding"));
    engine.shutdown().await;
}

#[tokio::test]
async fn webapp_runs_until_cancelled() {
    let engine = Engine::new(quick_setting());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let app = WebAppSpec::new(CommandSpec::new("sleep").arg("30"), "127.0.0.1", port)
        .check_delta(Duration::from_millis(20));
    let job = JobSpec::webapp(app).build();
    engine.submit(&job).unwrap();

    // Survives several probe rounds against the live listener
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(job.status(), Status::Running);

    engine.cancel(&job).unwrap();
    assert_eq!(engine.wait_job(&job).await.unwrap(), Status::Cancelled);
    drop(listener);
    engine.shutdown().await;
}

#[tokio::test]
async fn emit_nudges_only_pending_jobs() {
    let engine = Engine::new(quick_setting());
    let job = JobSpec::thread(add()).args(Args::new().pos(1i64).pos(1i64)).build();
    engine.submit(&job).unwrap();

    // Racing the scheduler: either the nudge lands while pending or
    // the job already moved on.
    match job.emit() {
        Ok(()) => {}
        Err(e) => assert!(matches!(e, gig_core::JobError::Emit(_))),
    }

    engine.wait().await;
    assert!(matches!(job.emit(), Err(gig_core::JobError::Emit(_))));
    engine.shutdown().await;
}

#[tokio::test]
async fn wait_returns_immediately_when_empty() {
    let engine = Engine::new(quick_setting());
    engine.wait().await;
    engine.shutdown().await;
}

#[tokio::test]
async fn callbacks_fire_after_transitions() {
    let engine = Engine::new(quick_setting());
    let seen = std::sync::Arc::new(AtomicUsize::new(0));

    let on_done = {
        let seen = std::sync::Arc::clone(&seen);
        move |v: &serde_json::Value| {
            assert_eq!(v, &json!(5));
            seen.fetch_add(1, Ordering::SeqCst);
        }
    };
    let ok_job = JobSpec::thread(add())
        .args(Args::new().pos(2i64).pos(3i64))
        .on_done(on_done)
        .build();

    let on_error = {
        let seen = std::sync::Arc::clone(&seen);
        move |_e: &gig_core::JobError| {
            seen.fetch_add(10, Ordering::SeqCst);
        }
    };
    let bad_job = JobSpec::thread(JobFn::new("boom", |_c: CallArgs| Err("boom".into())))
        .on_error(on_error)
        .build();

    engine.submit_all(&[ok_job, bad_job]).unwrap();
    engine.wait().await;

    assert_eq!(seen.load(Ordering::SeqCst), 11);
    engine.shutdown().await;
}
