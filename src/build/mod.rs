pub mod error;
pub mod executor;
pub mod runner;
pub mod status;
pub mod trigger;
pub mod types;

pub use error::BuildFailure;
pub use executor::{BuildCommand, BuildExecutor};
pub use runner::{CommandRunner, ProcessOutcome, ProcessRunner, ProcessSpec, Stream};
pub use status::StatusStore;
pub use trigger::BuildTrigger;
pub use types::{BuildRun, BuildState, RunId};
