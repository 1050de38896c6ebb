//! # kaitcheck-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the kaitcheck workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and holds the vocabulary the runtime and CLI crates share:
//! port specifications, probe tables, lifecycle phases, and the harness
//! configuration file format.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
