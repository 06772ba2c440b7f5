//! Approval system for mutating capabilities.
//!
//! The turn executor consults an [`ApprovalGate`] before every capability
//! flagged `requires_approval`. A rejection ends the turn.

pub mod gate;

pub use gate::{
    ApprovalDecision, ApprovalError, ApprovalGate, AutoApproveGate, ConsoleApprovalGate,
    ScriptedApprovalGate,
};
