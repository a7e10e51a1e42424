//! AWS SDK plumbing
//!
//! - `context`: shared SDK configuration and per-service client construction
//! - `account`: caller-identity resolution and the account confirmation gate
//! - `error`: typed error classification keyed on AWS error codes
//! - `retry`: bounded backoff for throttled calls

pub mod account;
pub mod context;
pub mod error;
pub mod retry;

pub use context::{AwsContext, DEFAULT_REGION};
pub use error::{classify_anyhow_error, classify_error_code, classify_sdk_error, AwsError};
pub use retry::retry_throttled;
