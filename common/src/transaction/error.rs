use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::crypto::Pubkey;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("No instruction to compile")]
    Empty,
    #[error("Too many accounts: {0}, maximum is 255")]
    TooManyAccounts(usize),
    #[error("Account {0} is not part of the transaction")]
    UnknownAccount(Pubkey),
}

// Why the executing environment refused a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionKind {
    // missing or wrong signer, unauthorized authority
    InsufficientAuthority,
    // account missing, wrong owner, insufficient funds, trigger or constraint not met
    PreconditionUnmet,
    // account already in use, slot already taken
    ResourceConflict,
    // bad instruction data or transaction encoding
    Malformed,
}

impl RejectionKind {
    /// Classify a rejection from the ledger error message and program logs.
    ///
    /// Unknown messages fall back to `PreconditionUnmet`, they are surfaced and
    /// never retried automatically.
    pub fn classify(message: &str, logs: &[String]) -> Self {
        let haystack = std::iter::once(message)
            .chain(logs.iter().map(String::as_str))
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("\n");

        const CONFLICT: &[&str] = &[
            "already in use",
            "already occupied",
            "accountalreadyinitialized",
            "task slot taken",
            "already delegated",
        ];
        const AUTHORITY: &[&str] = &[
            "missing required signature",
            "constraintsigner",
            "unauthorized",
            "constrainthasone",
            "invalid queue authority",
        ];
        const MALFORMED: &[&str] = &[
            "instructiondidnotdeserialize",
            "invalid instruction data",
            "failed to deserialize",
            "invalid transaction",
            "instructionfallbacknotfound",
            "notenoughaccountkeys",
        ];

        let contains_any = |needles: &[&str]| needles.iter().any(|n| haystack.contains(n));
        if contains_any(CONFLICT) {
            Self::ResourceConflict
        } else if contains_any(AUTHORITY) {
            Self::InsufficientAuthority
        } else if contains_any(MALFORMED) {
            Self::Malformed
        } else {
            Self::PreconditionUnmet
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InsufficientAuthority => "insufficient authority",
            Self::PreconditionUnmet => "precondition unmet",
            Self::ResourceConflict => "resource conflict",
            Self::Malformed => "malformed",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_from_logs() {
        let logs = vec![
            "Program log: Instruction: QueueTaskV0".to_string(),
            "Allocate: account Address { address: 9x.., base: None } already in use".to_string(),
        ];
        assert_eq!(
            RejectionKind::classify("custom program error: 0x0", &logs),
            RejectionKind::ResourceConflict
        );
        assert_eq!(
            RejectionKind::classify("Transaction signature verification failure: missing required signature", &[]),
            RejectionKind::InsufficientAuthority
        );
        assert_eq!(
            RejectionKind::classify("Error Code: InstructionDidNotDeserialize", &[]),
            RejectionKind::Malformed
        );
        assert_eq!(
            RejectionKind::classify("Error Code: EscrowNotExpired", &[]),
            RejectionKind::PreconditionUnmet
        );
    }
}
