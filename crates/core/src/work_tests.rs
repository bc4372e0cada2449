// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::args::Args;
use serde_json::json;

fn call(args: Args) -> CallArgs {
    args.resolve().unwrap()
}

#[test]
fn sync_fn_runs_blocking_and_as_future() {
    let add = JobFn::new("add", |c: CallArgs| {
        let a = c.i64_at(0).ok_or("missing a")?;
        let b = c.i64_at(1).ok_or("missing b")?;
        Ok(json!(a + b))
    });

    let args = call(Args::new().pos(1i64).pos(2i64));
    assert_eq!(add.call_blocking(args.clone()).unwrap(), json!(3));

    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    assert_eq!(rt.block_on(add.call(args)).unwrap(), json!(3));
}

#[test]
fn async_fn_rejected_on_worker_thread() {
    let f = JobFn::task("sleepy", |_c: CallArgs| async { Ok(json!(1)) });
    let err = f.call_blocking(CallArgs::default()).unwrap_err();
    assert!(err.contains("sleepy"));
}

#[test]
fn command_name_is_program_basename() {
    assert_eq!(CommandSpec::new("/usr/bin/sort").name(), "sort");
    assert_eq!(CommandSpec::new("echo").name(), "echo");
}

#[test]
fn command_argv_appends_resolved_args() {
    let cmd = CommandSpec::new("tool").arg("--fixed");
    let callargs = call(Args::new().pos("abc").pos(7i64).kw("level", "high"));
    assert_eq!(
        cmd.argv(&callargs),
        vec!["--fixed", "abc", "7", "--level=high"]
    );
}

#[test]
fn work_names_and_localities() {
    let f = JobFn::new("square", |_| Ok(json!(4)));
    assert_eq!(Work::Local(f.clone()).locality(), Locality::Local);
    assert_eq!(Work::Thread(f.clone()).callable_name(), "square");

    let cmd = CommandSpec::new("/bin/server");
    let app = WebAppSpec::new(cmd.clone(), "127.0.0.1", 8080);
    assert_eq!(Work::WebApp(app).callable_name(), "server");
    assert_eq!(Work::Process(cmd).locality(), Locality::Process);
}

#[test]
fn default_resources_per_variant() {
    let f = JobFn::new("noop", |_| Ok(Value::Null));
    assert!(Work::Local(f.clone()).default_resources().is_none());
    assert!(Work::Thread(f).default_resources().is_none());

    let cmd = CommandSpec::new("x");
    assert_eq!(Work::Process(cmd.clone()).default_resources(), Resources::cpu(1));
    let app = WebAppSpec::new(cmd, "127.0.0.1", 1234);
    assert_eq!(Work::WebApp(app).default_resources(), Resources::cpu(1));
}

#[test]
fn locality_display() {
    assert_eq!(Locality::Webapp.to_string(), "webapp");
    assert_eq!(Locality::Local.to_string(), "local");
}
