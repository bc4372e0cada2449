// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job argument trees and the future-resolution visitor.

use crate::error::JobError;
use crate::future::JobFuture;
use crate::id::JobId;
use indexmap::IndexMap;
use serde_json::Value;

/// One argument slot: a plain JSON value, a future standing in for
/// another job's result, or a nested structure containing either.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Value(Value),
    Future(JobFuture),
    List(Vec<ArgValue>),
    Map(IndexMap<String, ArgValue>),
}

impl ArgValue {
    /// Replace futures with their resolved values, leaving all other
    /// structure intact. Deterministic: retried jobs re-resolve to the
    /// same tree. An unresolved future here is a programming error.
    pub fn resolve(&self) -> Result<Value, JobError> {
        match self {
            ArgValue::Value(v) => Ok(v.clone()),
            ArgValue::Future(f) => f.get(),
            ArgValue::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.resolve()?);
                }
                Ok(Value::Array(out))
            }
            ArgValue::Map(entries) => {
                let mut out = serde_json::Map::with_capacity(entries.len());
                for (key, item) in entries {
                    out.insert(key.clone(), item.resolve()?);
                }
                Ok(Value::Object(out))
            }
        }
    }

    fn collect_futures<'a>(&'a self, out: &mut Vec<&'a JobFuture>) {
        match self {
            ArgValue::Value(_) => {}
            ArgValue::Future(f) => out.push(f),
            ArgValue::List(items) => {
                for item in items {
                    item.collect_futures(out);
                }
            }
            ArgValue::Map(entries) => {
                for item in entries.values() {
                    item.collect_futures(out);
                }
            }
        }
    }

    fn summarize(&self, out: &mut String) {
        match self {
            ArgValue::Value(v) => out.push_str(&v.to_string()),
            ArgValue::Future(f) => {
                out.push('<');
                out.push_str(f.job_id().as_str());
                out.push('>');
            }
            ArgValue::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.summarize(out);
                }
                out.push(']');
            }
            ArgValue::Map(entries) => {
                out.push('{');
                for (i, (key, item)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(key);
                    out.push_str(": ");
                    item.summarize(out);
                }
                out.push('}');
            }
        }
    }
}

impl From<Value> for ArgValue {
    fn from(v: Value) -> Self {
        ArgValue::Value(v)
    }
}

impl From<JobFuture> for ArgValue {
    fn from(f: JobFuture) -> Self {
        ArgValue::Future(f)
    }
}

impl From<&JobFuture> for ArgValue {
    fn from(f: &JobFuture) -> Self {
        ArgValue::Future(f.clone())
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Value(Value::from(v))
    }
}

impl From<u64> for ArgValue {
    fn from(v: u64) -> Self {
        ArgValue::Value(Value::from(v))
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Value(Value::from(v))
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Value(Value::from(v))
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Value(Value::from(v))
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Value(Value::from(v))
    }
}

/// Positional and keyword arguments for one job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub positional: Vec<ArgValue>,
    pub keyword: IndexMap<String, ArgValue>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn pos(mut self, v: impl Into<ArgValue>) -> Self {
        self.positional.push(v.into());
        self
    }

    /// Set a keyword argument.
    pub fn kw(mut self, key: impl Into<String>, v: impl Into<ArgValue>) -> Self {
        self.keyword.insert(key.into(), v.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    /// Futures referenced anywhere in the tree, deduplicated by owning
    /// job in first-occurrence order (positional before keyword).
    pub fn futures(&self) -> Vec<JobFuture> {
        let mut raw = Vec::new();
        for item in &self.positional {
            item.collect_futures(&mut raw);
        }
        for item in self.keyword.values() {
            item.collect_futures(&mut raw);
        }
        let mut seen: Vec<&JobId> = Vec::new();
        let mut out = Vec::new();
        for fut in raw {
            if !seen.contains(&fut.job_id()) {
                seen.push(fut.job_id());
                out.push(fut.clone());
            }
        }
        out
    }

    /// Resolve every slot into plain values for dispatch.
    pub fn resolve(&self) -> Result<CallArgs, JobError> {
        let mut positional = Vec::with_capacity(self.positional.len());
        for item in &self.positional {
            positional.push(item.resolve()?);
        }
        let mut keyword = IndexMap::with_capacity(self.keyword.len());
        for (key, item) in &self.keyword {
            keyword.insert(key.clone(), item.resolve()?);
        }
        Ok(CallArgs { positional, keyword })
    }

    /// Short human-readable rendering for persisted records and logs.
    pub fn summary(&self) -> String {
        const MAX: usize = 120;
        let mut out = String::from("(");
        let mut first = true;
        for item in &self.positional {
            if !first {
                out.push_str(", ");
            }
            first = false;
            item.summarize(&mut out);
        }
        for (key, item) in &self.keyword {
            if !first {
                out.push_str(", ");
            }
            first = false;
            out.push_str(key);
            out.push('=');
            item.summarize(&mut out);
        }
        out.push(')');
        if out.len() > MAX {
            let cut = out
                .char_indices()
                .take_while(|(i, _)| *i < MAX - 4)
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            out.truncate(cut);
            out.push_str("...)");
        }
        out
    }
}

/// Fully resolved arguments handed to a callable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keyword: IndexMap<String, Value>,
}

impl CallArgs {
    /// Positional argument by index.
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.positional.get(idx)
    }

    /// Keyword argument by name.
    pub fn get_kw(&self, key: &str) -> Option<&Value> {
        self.keyword.get(key)
    }

    /// Positional-then-keyword lookup as an integer, for numeric
    /// callables.
    pub fn i64_at(&self, idx: usize) -> Option<i64> {
        self.positional.get(idx).and_then(Value::as_i64)
    }
}

#[cfg(test)]
#[path = "args_tests.rs"]
mod tests;
