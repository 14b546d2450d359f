//! The job scheduler and type-resolution engine (§4.1-§4.6): turns an
//! already-parsed, per-file declaration scope into the typed tree and
//! constant-value arena consumed by `talc-lower`.

pub mod builtins;
pub mod check;
pub mod coerce;
pub mod context;
pub mod eval;
pub mod job;
pub mod polymorph;
pub mod resolve;

pub use builtins::Builtins;
pub use context::CompilerContext;
pub use job::{JobDriver, JobId, JobKind, JobOutput, JobResult, JobState, Scheduler, TypeError};
pub use resolve::{resolve_name, Resolution};
