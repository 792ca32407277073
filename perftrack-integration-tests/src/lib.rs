//! Sleeping units of work shared by the end-to-end scenarios.

use perftrack_common::InvocationError;
use perftrack_core::FnInvoker;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

pub type Call = Result<(), InvocationError>;

/// The n-th call (0-based) sleeps `delays[n]` ms, repeating the last delay once the list runs out.
pub fn sleeping(id: &str, delays: Vec<u64>) -> FnInvoker<impl Fn() -> Call + Send + Sync> {
    scripted(id, delays, |_| Ok(()))
}

/// Like [`sleeping`], with the n-th call's result decided by `outcome(n)`.
pub fn scripted(
    id: &str,
    delays: Vec<u64>,
    outcome: impl Fn(usize) -> Call + Send + Sync,
) -> FnInvoker<impl Fn() -> Call + Send + Sync> {
    let calls = AtomicUsize::new(0);
    FnInvoker::new(id, move || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = delays.get(n).or(delays.last()) {
            thread::sleep(Duration::from_millis(*delay));
        }
        outcome(n)
    })
}

/// Every call sleeps `delay` ms and fails with a declared execution error.
pub fn always_failing(id: &str, delay: u64) -> FnInvoker<impl Fn() -> Call + Send + Sync> {
    scripted(id, vec![delay], |n| Err(InvocationError::execution(format!("call {n} failed"))))
}
