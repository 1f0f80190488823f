//! Rolling rate-window accounting.
//!
//! This module tracks how many requests were admitted in the last second and
//! the last minute:
//! - Each window is a sliding log of admission instants
//! - Admission checks and increments happen under one lock
//! - Counters move on admission, not completion, so slow calls cannot cause bursts
//!
//! A request is admissible only when both windows are below their limits.

mod tracker;
mod window;

pub use tracker::RateWindowTracker;
