//! Query subsystems behind the HTTP API, plus the source factory.

pub mod aggregate;
pub mod compare;
pub mod export;
pub mod gaps;
pub mod peaks;
pub mod source;
pub mod transcripts;
