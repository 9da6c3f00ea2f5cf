//! Playpub Core
//!
//! Core types and abstractions for the Playpub build tracker.
//!
//! This crate contains:
//! - Domain types: Build jobs, their lifecycle rules, logs and configuration
//! - DTOs: Wire shapes exchanged between the server and its clients

pub mod domain;
pub mod dto;
