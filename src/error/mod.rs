//! Centralized error handling for the loan engine
//!
//! Every operation of the engine and its store surfaces failures through
//! [`LoanError`], so callers can tell caller mistakes apart from storage
//! failures without string matching.

use thiserror::Error;
use uuid::Uuid;

/// Loan engine error type with stable error codes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoanError {
    #[error("Invalid schedule parameters: {0}")]
    InvalidScheduleParameters(String),

    #[error("Invalid repayment amount: {0}")]
    InvalidRepaymentAmount(i64),

    #[error("Invalid currency code: '{0}'")]
    InvalidCurrency(String),

    #[error("Currency mismatch: loan is in {expected}, payment is in {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    #[error("Overpayment: offered {offered} against {outstanding} outstanding")]
    OverpaymentDiscrepancy { offered: i64, outstanding: i64 },

    #[error("Inconsistent schedule: {0}")]
    InconsistentSchedule(String),

    #[error("Loan not found: {0}")]
    LoanNotFound(Uuid),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl LoanError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            LoanError::InvalidScheduleParameters(_) => "INVALID_SCHEDULE_PARAMETERS",
            LoanError::InvalidRepaymentAmount(_) => "INVALID_REPAYMENT_AMOUNT",
            LoanError::InvalidCurrency(_) => "INVALID_CURRENCY",
            LoanError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            LoanError::OverpaymentDiscrepancy { .. } => "OVERPAYMENT_DISCREPANCY",
            LoanError::InconsistentSchedule(_) => "INCONSISTENT_SCHEDULE",
            LoanError::LoanNotFound(_) => "LOAN_NOT_FOUND",
            LoanError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    /// Whether the error was caused by the values the caller supplied.
    ///
    /// Inconsistent stored state and storage failures are not client errors.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            LoanError::InconsistentSchedule(_) | LoanError::Persistence(_)
        )
    }

    /// Log the error at a level matching its origin
    pub fn log(&self) {
        let code = self.error_code();
        if self.is_client_error() {
            tracing::debug!(error = %self, code = %code, "Loan request rejected");
        } else {
            tracing::error!(error = %self, code = %code, "Loan engine failure");
        }
    }
}

impl From<sqlx::Error> for LoanError {
    fn from(err: sqlx::Error) -> Self {
        LoanError::Persistence(err.to_string())
    }
}

/// Result type alias using LoanError
pub type LoanResult<T> = Result<T, LoanError>;
