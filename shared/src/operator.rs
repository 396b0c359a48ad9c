//! Operator attribution metadata
//!
//! Identity is established by the authentication layer upstream; the core
//! only records who performed a mutation, it never authenticates.

use serde::{Deserialize, Serialize};

/// Operator attached to every mutating call for audit attribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub operator_id: String,
    pub operator_name: String,
}

impl Operator {
    pub fn new(operator_id: impl Into<String>, operator_name: impl Into<String>) -> Self {
        Self {
            operator_id: operator_id.into(),
            operator_name: operator_name.into(),
        }
    }
}
