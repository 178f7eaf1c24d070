//! Resilience helpers.
//!
//! # Design Decisions
//! - Accept loops never spin on persistent socket errors: each consecutive
//!   failure doubles the pause, capped by configuration

pub mod backoff;
