//! Approval request aggregate - domain model and state transitions.
//!
//! This module contains the core domain logic for approval requests:
//! - Request types and states (typestate pattern)
//! - The status table checked for requests whose state is only known at runtime
//! - State transition methods

pub mod state;
pub mod transitions;

pub use state::*;
