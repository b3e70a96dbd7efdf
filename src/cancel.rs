//! Cooperative cancellation for long-running searches.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::error::{Error, Result};

/// A cloneable flag shared between a running search and whoever may want to
/// stop it. Searches poll it periodically and unwind with
/// [`Error::Cancelled`] once it is set.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every search holding a clone of this handle to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Return `Err(Error::Cancelled)` if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Poll an optional handle.
pub(crate) fn check(cancel: Option<&Cancellation>) -> Result<()> {
    cancel.map_or(Ok(()), Cancellation::check)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let handle = Cancellation::new();
        let other = handle.clone();
        assert!(other.check().is_ok());
        handle.cancel();
        assert_eq!(other.check(), Err(Error::Cancelled));
    }
}
