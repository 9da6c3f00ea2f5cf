//! Data Transfer Objects for the HTTP API
//!
//! This module contains the request and response shapes exchanged between
//! the server and its clients. Full job snapshots travel as
//! [`BuildJob`](crate::domain::build::BuildJob) itself.

pub mod build;
