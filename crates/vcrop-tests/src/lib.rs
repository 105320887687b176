//! Integration test crate for vcrop.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! Recordings run against the in-memory codec platform and a player on a
//! virtual clock, so every scenario is deterministic.

#[cfg(test)]
mod harness;

#[cfg(test)]
mod capture;

#[cfg(test)]
mod recording;

#[cfg(test)]
mod failures;
