//! Runtime core: supervision, construction and process orchestration.
//!
//! - [`Supervisor`]: runs one callback invocation, reports and swallows its failure
//! - [`Runtime`] / [`RuntimeBuilder`]: own the bus, subscribers, root lifecycle and schedules
//! - `shutdown`: cross-platform termination signal handling

mod builder;
mod runtime;
mod shutdown;
mod supervise;

pub use builder::RuntimeBuilder;
pub use runtime::Runtime;
pub use supervise::{ExecKind, ExecLabels, Supervisor};
