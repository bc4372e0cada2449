// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn generated_ids_carry_prefix_and_are_unique() {
    let a = JobId::generate();
    let b = JobId::generate();
    assert!(a.as_str().starts_with(JobId::PREFIX));
    assert_eq!(a.as_str().len(), JobId::PREFIX.len() + 16);
    assert_ne!(a, b);
}

#[test]
fn job_id_display() {
    let id = JobId::new("job-abc");
    assert_eq!(id.to_string(), "job-abc");
}

#[test]
fn job_id_from_str() {
    let id: JobId = "job-xyz".into();
    assert_eq!(id.as_str(), "job-xyz");
    assert_eq!(id, "job-xyz");
}

#[test]
fn suffix_strips_prefix() {
    let id = JobId::new("job-abcdef");
    assert_eq!(id.suffix(), "abcdef");
    assert_eq!(id.short(3), "abc");

    // Unprefixed ids pass through
    let id = JobId::new("weird");
    assert_eq!(id.suffix(), "weird");
}

#[test]
fn job_id_serde() {
    let id = JobId::new("job-42");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"job-42\"");

    let parsed: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}
