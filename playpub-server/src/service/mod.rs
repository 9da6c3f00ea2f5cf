//! Service Module
//!
//! Business logic layer for the build server.
//! Services orchestrate between the job store, upload storage and the worker.

pub mod build;

pub use build::{BuildError, BuildService, SweepPolicy, SweepReport};
