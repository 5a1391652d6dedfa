//! Trace and generation recording for model calls.
//!
//! A [`MonitoringTrace`] is owned by the caller of a pipeline run. The
//! [`TraceRecorder`] opens it once, hangs one [`GenerationSpan`] per model call
//! under it, and closes it with a [`TraceStatus`].

mod backend;
pub use backend::*;

mod error;
pub use error::*;

mod langfuse;
pub use langfuse::*;

mod recorder;
pub use recorder::*;

mod trace;
pub use trace::*;
