//! Single-flight execution guard.

use crate::errors::BusyError;
use std::sync::atomic::{AtomicBool, Ordering};

/// Holds the engine's "executing" flag for the duration of one run.
///
/// Acquisition fails immediately when the flag is already set; the flag
/// is released on drop, including on early error returns.
#[derive(Debug)]
pub(crate) struct ExecutionGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ExecutionGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool, operation: &str) -> Result<Self, BusyError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BusyError::new(operation))?;
        Ok(Self { flag })
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails() {
        let flag = AtomicBool::new(false);
        let guard = ExecutionGuard::acquire(&flag, "execute_batch").unwrap();
        let err = ExecutionGuard::acquire(&flag, "execute_stage").unwrap_err();
        assert_eq!(err.operation, "execute_stage");

        drop(guard);
        assert!(!flag.load(Ordering::Acquire));
        assert!(ExecutionGuard::acquire(&flag, "execute_stage").is_ok());
    }
}
