use std::fmt;

/// Error codes for all lowering diagnostics.
///
/// Format: E#### where the first digit indicates the failing phase:
/// - E1xxx: structural (procedure shape the segmenter cannot handle)
/// - E2xxx: suspension classification
/// - E3xxx: persistent storage
/// - E9xxx: internal errors
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    // Structural Errors (E1xxx)
    /// Expression-bodied async procedure
    E1001,
    /// Suspension inside a closure
    E1002,
    /// Unstructured jump (`goto`/label)
    E1003,
    /// `break`/`continue` outside a loop
    E1004,
    /// Early `return` across a segment boundary
    E1005,
    /// Generator yield combined with suspension
    E1006,
    /// Suspension inside nested control flow
    E1007,
    /// Suspension not at statement level
    E1008,
    /// Cancellation handle is not a cancellation parameter
    E1009,

    // Classification Errors (E2xxx)
    /// Unrecognized suspension operand
    E2001,
    /// Scheduling primitive arity mismatch
    E2002,
    /// Non-numeric timing argument
    E2003,
    /// Join operand is not a deferred result
    E2004,
    /// Value taken from a suspension that delivers none
    E2005,

    // Storage Errors (E3xxx)
    /// Hoisted value has no persistent representation
    E3001,

    // Internal Errors (E9xxx)
    /// Internal lowering error
    E9001,
    /// Too many errors
    E9002,
}

/// Phase a code belongs to.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Phase {
    Structural,
    Classification,
    Storage,
    Internal,
}

impl ErrorCode {
    /// Get the numeric code as a string (e.g., "E1001").
    pub fn as_str(&self) -> &'static str {
        match self {
            // Structural
            ErrorCode::E1001 => "E1001",
            ErrorCode::E1002 => "E1002",
            ErrorCode::E1003 => "E1003",
            ErrorCode::E1004 => "E1004",
            ErrorCode::E1005 => "E1005",
            ErrorCode::E1006 => "E1006",
            ErrorCode::E1007 => "E1007",
            ErrorCode::E1008 => "E1008",
            ErrorCode::E1009 => "E1009",
            // Classification
            ErrorCode::E2001 => "E2001",
            ErrorCode::E2002 => "E2002",
            ErrorCode::E2003 => "E2003",
            ErrorCode::E2004 => "E2004",
            ErrorCode::E2005 => "E2005",
            // Storage
            ErrorCode::E3001 => "E3001",
            // Internal
            ErrorCode::E9001 => "E9001",
            ErrorCode::E9002 => "E9002",
        }
    }

    pub fn phase(&self) -> Phase {
        match self.as_str().as_bytes()[1] {
            b'1' => Phase::Structural,
            b'2' => Phase::Classification,
            b'3' => Phase::Storage,
            _ => Phase::Internal,
        }
    }

    /// Structural (E1xxx) errors.
    pub fn is_structural(&self) -> bool {
        self.phase() == Phase::Structural
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
