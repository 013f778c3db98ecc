//! Domain validation interface
//!
//! The object model only knows about versions. Whether a proposed state makes
//! sense for the business (status ladder, KYC payload shape, write-once
//! fields) is decided by a `Validator` supplied by the host.

use crate::command::Command;
use crate::object::OffChainObject;
use std::fmt;

/// Refusal from a validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Machine-readable code, e.g. `status_regression`
    pub code: String,
    /// Human-readable detail
    pub detail: String,
}

impl ValidationFailure {
    /// Create a failure
    pub fn new(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}

/// Domain-specific schema and business-rule check
pub trait Validator: Send + Sync {
    /// Check `command` against the version it extends (`None` on creation)
    fn validate(
        &self,
        prior: Option<&OffChainObject>,
        command: &Command,
    ) -> Result<(), ValidationFailure>;
}

/// Validator that accepts every state
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(
        &self,
        _prior: Option<&OffChainObject>,
        _command: &Command,
    ) -> Result<(), ValidationFailure> {
        Ok(())
    }
}
