//! Callback-based progress reporting.

use crate::batch::BatchReport;

use super::handler::{ProgressEvent, ProgressHandler};

/// A progress handler that invokes a callback function.
pub struct CallbackProgress<F>
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    callback: F,
    complete_callback: Option<Box<dyn Fn(&BatchReport) + Send + Sync>>,
}

impl<F> CallbackProgress<F>
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    /// Create a new callback progress handler.
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            complete_callback: None,
        }
    }

    /// Set a completion callback.
    pub fn on_complete<C>(mut self, callback: C) -> Self
    where
        C: Fn(&BatchReport) + Send + Sync + 'static,
    {
        self.complete_callback = Some(Box::new(callback));
        self
    }
}

impl<F> ProgressHandler for CallbackProgress<F>
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        (self.callback)(event);
    }

    fn on_complete(&self, report: &BatchReport) {
        if let Some(ref callback) = self.complete_callback {
            callback(report);
        }
    }
}
