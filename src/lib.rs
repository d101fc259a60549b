//! # buildpulse
//!
//! A progress-reporting pipeline for long-running external build and sync
//! commands. It launches the command, consumes its unstructured textual output
//! through one of two interchangeable transports, translates that output into
//! normalized progress events, and guarantees the operation reaches exactly one
//! terminal outcome despite concurrently firing event sources.
//!
//! ## Modules
//!
//! - `arbiter` - Single-settlement completion arbiter over the operation lifecycle
//! - `cancel` - Idempotent cancellation handle and process-tree termination
//! - `error` - Error taxonomy for spawn, runtime, exit-code and transport failures
//! - `framing` - Lossless line framing over arbitrarily chunked output
//! - `invoker` - External process spawning with per-kind environment overrides
//! - `operation` - Operation model, lifecycle states, registry and the driver
//! - `progress` - Progress events, the sink seam and the line-grammar parser
//! - `tee` - Forwarding helper body duplicating stdin to stdout and the relay endpoint
//! - `transport` - Output transports: direct pipe and socket relay

pub mod arbiter;
pub mod cancel;
pub mod error;
pub mod framing;
pub mod invoker;
pub mod operation;
pub mod progress;
pub mod tee;
pub mod transport;

pub use arbiter::{CompletionArbiter, SettleSignal};
pub use cancel::CancelHandle;
pub use error::OperationError;
pub use operation::driver::run_operation;
pub use operation::{LifecycleState, OperationKind, OperationRegistry, OperationSpec, Outcome};
pub use progress::{ProgressEvent, ProgressSink};
pub use transport::TransportKind;
