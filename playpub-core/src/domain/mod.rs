//! Core domain types
//!
//! This module contains the core domain structures used across Playpub crates.
//! They are shared between the server (which stores and mutates jobs) and the
//! client (which only reads snapshots).

pub mod build;
pub mod config;
pub mod log;
