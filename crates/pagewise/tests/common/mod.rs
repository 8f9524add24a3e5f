//! Shared test utilities for pagewise integration tests.
//!
//! This module provides:
//! - `TestHarness`, an engine over an in-memory store and a temp export dir
//! - Fakes for the document normalizer, inference service and remote store

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::{HarnessOptions, TestHarness};
