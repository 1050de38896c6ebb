//! Container launch, readiness, probing and teardown for kaitcheck.
//!
//! The entry point is [`harness::Harness`], which drives a
//! [`backend::ContainerRuntime`] through one verification run and hands back
//! a [`report::VerificationReport`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod container;
pub mod exec;
pub mod harness;
pub mod probe;
pub mod report;
pub mod request;
pub mod wait;
