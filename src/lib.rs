//! Explorer cache library
//!
//! A blockchain explorer client built around a time-bucketed response cache.
//! Daily chart statistics are fetched at most once per calendar day, chain
//! statistics once per hour, and one-time flags (halving acknowledgements)
//! are stored in a bucket that never rolls over.

pub mod app;
pub mod cache;
pub mod cli;
pub mod data;
pub mod halving;
