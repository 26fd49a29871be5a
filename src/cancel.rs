//! Cooperative cancellation for a running job.
//!
//! Dropping a job future would abandon its artifacts on disk, so a job is
//! instead cancelled by signalling a [`CancellationToken`]. The engine runner
//! watches the token alongside the child process and the time budget; when it
//! fires, the engine's process group is killed and the job proceeds through
//! its normal cleanup path, returning [`crate::error::OcrJobError::Cancelled`].
//!
//! The token is `tokio_util`'s. Clones share one state, and cancelling a
//! parent also cancels every `child_token()`.

pub use tokio_util::sync::CancellationToken;
