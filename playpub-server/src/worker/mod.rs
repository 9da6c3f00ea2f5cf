//! Worker layer
//!
//! Background execution of builds. Each submitted build runs in its own
//! task, walking the stage table and finally handing its inputs to the
//! packager. A separate sweeper task enforces the timeout and retention
//! policy.

pub mod executor;
pub mod packager;
pub mod stages;
pub mod sweeper;

pub use executor::{BuildExecutor, PreparedBuild};
pub use packager::{CommandPackager, ExecutionError, PackageOutput, PackageRequest, Packager, SimulatedPackager};
pub use sweeper::Sweeper;
