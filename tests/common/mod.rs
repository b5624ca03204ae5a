//! Common test utilities
//!
//! Each integration test crate uses a different subset of these helpers.
#![allow(dead_code)]

pub mod homey_mock;
pub mod test_fixtures;
