//! Services module - the process-orchestration and event-relay core.
//!
//! Nothing here depends on the UI layer; the GUI controller and the tests drive
//! these types the same way.
//!
//! # Components
//!
//! - [`build_args`]: maps an input path and [`ProcessingOptions`](crate::models::ProcessingOptions)
//!   to the tool's argument vector (`-i <input> [-Area] [-STD <name>] [-GBK] [-dev]`)
//! - [`ExecutableLocator`]: finds the external tool for the current [`RuntimeMode`] and
//!   checks that it exists, fresh on every run
//! - [`ProcessOrchestrator`]: launches the tool, relays stdout/stderr chunks as
//!   [`RunEvent`]s while it runs, and classifies how it ended
//! - [`ArtifactPaths`]: the `-summary.tsv` / `-cal.tsv` files expected beside the input
//! - [`ResultReporter`]: packages a run for the UI and opens artifacts in their default viewer
//!
//! # Usage Example
//!
//! ```ignore
//! use calcrelay::services::{ProcessOrchestrator, RunControl, RunEvent};
//!
//! let orchestrator = ProcessOrchestrator::new(locator, metrics);
//! let mut handle = orchestrator.submit(request, RunControl::new());
//!
//! while let Some(event) = handle.recv().await {
//!     match event {
//!         RunEvent::Progress(text) => print!("{}", text),
//!         RunEvent::Error(text) => eprint!("{}", text),
//!         RunEvent::Completed(result) => println!("success: {}", result.success),
//!     }
//! }
//! ```

pub mod artifacts;
pub mod command;
pub mod executable;
pub mod orchestrator;
pub mod reporter;

pub use artifacts::{ArtifactPaths, CALCULATION_SUFFIX, SUMMARY_SUFFIX};
pub use command::build_args;
pub use executable::{
    ExecutableLocator, ResolveError, RuntimeMode, executable_file_name, locate_executable,
    resolve_executable_path,
};
pub use orchestrator::{
    OrchestratorError, ProcessOrchestrator, RunControl, RunEvent, RunHandle, RunPhase,
};
pub use reporter::{ArtifactOpener, ResultReporter, SystemOpener};
