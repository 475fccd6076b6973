//! Core domain types for the approval gate.
//!
//! - Approval request typestate machine and its transitions
//! - Request and decision statuses

pub mod approval;
