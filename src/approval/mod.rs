//! Approval request aggregate - domain model and state transitions.
//!
//! This module re-exports types from `domain::approval`.
//! See that module for the actual implementations.

pub use crate::domain::approval::state::*;
