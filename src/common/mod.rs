//! Common utilities shared by the filters, the fusion engine and the
//! gesture recognizer.
//!
//! This module contains fixed-size linear algebra helpers, deterministic
//! random number generation and timestamp handling.

pub mod linalg;
pub mod rng;
pub mod time;
