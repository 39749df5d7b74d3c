//! Polling client for long-running optimization jobs.
//!
//! [`JobPollingClient`] starts or re-attaches to a job on a [`JobService`], polls it with a
//! log cursor, and keeps a [`ClientPollState`] that observers can watch.

mod client;
mod config;
mod error;
mod state;

pub use client::{JobPollingClient, PollOutcome};
pub use config::PollConfig;
pub use error::{PollerError, START_FAILED_FALLBACK};
pub use state::{select_reconnect_target, ClientPollState, CursorMismatch};

pub use job_types::{JobService, JobStatus, LocalFailure};
