#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Typed access to the single remote inference worker.
//!
//! Layout: `executor.rs` (the [`RemoteExecutor`] capability set),
//! `command.rs` (typed remote command lines), `shell.rs` (POSIX quoting),
//! `ssh.rs` (ssh/scp implementation with per-call timeouts), `retry.rs`
//! (retries for transient failures of idempotent calls), `error.rs`.

pub mod command;
pub mod error;
pub mod executor;
pub mod retry;
pub mod shell;
pub mod ssh;

pub use command::{InferenceInvocation, RemoteCommand};
pub use error::{RemoteError, RemoteResult};
pub use executor::{CommandOutput, RemoteExecutor};
pub use retry::{RetryPolicy, RetryingExecutor};
pub use ssh::SshExecutor;
