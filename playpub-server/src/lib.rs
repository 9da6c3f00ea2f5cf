//! Build server for the Play Store publisher.
//!
//! Accepts AAB build submissions over HTTP, runs them in background tasks
//! and serves their status to polling clients.

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;
pub mod storage;
pub mod worker;
