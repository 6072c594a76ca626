//! Integration tests for `CommerceCore`
//!
//! This crate contains integration tests that verify the interaction between
//! the core workflows and the in-memory store backend: scenario
//! walkthroughs, atomicity under failure, and behavior under concurrent
//! writers.

// This is a test-only crate
#![cfg(test)]
