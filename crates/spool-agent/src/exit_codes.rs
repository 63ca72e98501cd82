//! Exit codes for the spool CLI.
//!
//! These are stable for automation:
//! - 0: success
//! - 1: the operation ran but hit storage or I/O failures
//! - 2: bad arguments or configuration (also what clap uses for parse errors)

use spool_common::ErrorCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Clean = 0,
    /// Storage or I/O failure.
    OperationalError = 1,
    /// Invalid arguments or configuration.
    UsageError = 2,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// Name used in JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::OperationalError => "ERR_OPERATIONAL",
            ExitCode::UsageError => "ERR_USAGE",
        }
    }

    pub fn for_category(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Config => ExitCode::UsageError,
            ErrorCategory::Format | ErrorCategory::Io => ExitCode::OperationalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
