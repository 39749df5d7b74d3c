//! Core types and traits for the prompt-optimization job client.
//!
//! Request/response DTOs mirror the Job Service JSON bodies field for field.

mod dto;
mod lifecycle;
mod traits;

pub use dto::*;
pub use lifecycle::*;
pub use traits::*;
