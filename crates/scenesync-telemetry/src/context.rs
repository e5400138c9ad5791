//! Run-level span helpers.
//!
//! # Design
//! - One span per process run carries the run id, mode, and build SHA so every
//!   log line of a run can be correlated.

use tracing::{Span, span::Entered};
use uuid::Uuid;

use crate::init::build_sha;

/// Guard that keeps the run-level span entered for the lifetime of the process.
pub struct RunContextGuard {
    run_id: Uuid,
    _guard: Entered<'static>,
}

impl RunContextGuard {
    /// Enter the run span for the given pipeline mode (`full` or `download_only`).
    #[must_use]
    pub fn new(mode: &str) -> Self {
        let run_id = Uuid::new_v4();
        let span: &'static Span = Box::leak(Box::new(tracing::info_span!(
            "run",
            run_id = %run_id,
            mode = %mode,
            build_sha = %build_sha()
        )));
        let guard = span.enter();
        Self {
            run_id,
            _guard: guard,
        }
    }

    /// Identifier generated for this run.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }
}
