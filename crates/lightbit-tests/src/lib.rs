//! # lightbit-tests
//!
//! Integration tests for the lightbit client.
//!
//! This crate provides:
//! - A mock-peer harness speaking the real wire protocol over loopback
//! - Proptest generators for core types
//! - Property-based tests for consensus-visible invariants
//! - End-to-end scenarios for handshake, download and pool failover

pub mod generators;
pub mod harness;

#[cfg(test)]
mod confidence_tests;

#[cfg(test)]
mod pool_tests;


#[cfg(test)]
mod sync_tests;

pub use harness::*;
