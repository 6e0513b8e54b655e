//! Crate-level integration tests and shared test doubles.

pub mod support;
