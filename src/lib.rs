//! Delta distribution of feature flag and segment definitions.

pub mod application;
pub mod config;
pub mod delta;
pub mod domain;
pub mod infra;
