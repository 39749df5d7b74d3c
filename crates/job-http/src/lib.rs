//! HTTP client for the optimization Job Service.

mod http;
#[cfg(feature = "test-util")]
pub mod mock;

pub use http::HttpJobService;
pub use job_types::{JobService, JobServiceError};

#[cfg(feature = "test-util")]
pub use mock::MockJobService;
