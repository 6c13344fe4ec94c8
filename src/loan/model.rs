//! Loan models and data structures

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LoanError, LoanResult};
use crate::loan::schedule::check_parameters;

/// Loan status enum
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Due,
    Repaid,
}

/// Status of a single installment
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "scheduled_repayment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RepaymentStatus {
    Due,     // Nothing paid yet
    Partial, // Some, but not all, of the installment paid
    Repaid,  // Fully settled
}

/// Loan model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct Loan {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub amount: i64, // Principal in minor currency units
    pub currency_code: String,
    pub terms: i32,
    pub outstanding_amount: i64,
    pub processed_at: NaiveDate,
    pub status: LoanStatus,
}

impl Loan {
    pub fn is_repaid(&self) -> bool {
        self.status == LoanStatus::Repaid
    }
}

/// One installment of a loan's schedule
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct ScheduledRepayment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub amount: i64,
    pub outstanding_amount: i64,
    pub currency_code: String,
    pub due_date: NaiveDate,
    pub status: RepaymentStatus,
}

impl ScheduledRepayment {
    /// Whether the status agrees with the outstanding amount.
    ///
    /// Due means nothing paid, Partial means strictly between zero and the
    /// full amount, Repaid means nothing left.
    pub fn is_consistent(&self) -> bool {
        if self.amount <= 0 || self.outstanding_amount < 0 || self.outstanding_amount > self.amount
        {
            return false;
        }
        match self.status {
            RepaymentStatus::Due => self.outstanding_amount == self.amount,
            RepaymentStatus::Partial => {
                self.outstanding_amount > 0 && self.outstanding_amount < self.amount
            }
            RepaymentStatus::Repaid => self.outstanding_amount == 0,
        }
    }

    /// Amount already paid toward this installment
    pub fn paid_amount(&self) -> i64 {
        self.amount - self.outstanding_amount
    }
}

/// Receipt of an incoming payment
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct ReceivedRepayment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub amount: i64, // Amount actually applied, never the amount offered
    pub currency_code: String,
    pub received_at: NaiveDate,
}

/// Request to disburse a new loan
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLoanRequest {
    pub owner_id: Uuid,
    pub amount: i64,
    pub currency_code: String,
    pub terms: i32,
    pub processed_at: NaiveDate,
}

impl CreateLoanRequest {
    /// Validate request
    pub fn validate(&self) -> LoanResult<()> {
        check_parameters(self.amount, self.terms)?;
        validate_currency_code(&self.currency_code)
    }
}

/// Request to record an incoming repayment
#[derive(Debug, Clone, Deserialize)]
pub struct RepayLoanRequest {
    pub loan_id: Uuid,
    pub amount: i64,
    pub currency_code: String,
    pub received_at: NaiveDate,
}

impl RepayLoanRequest {
    /// Validate request
    pub fn validate(&self) -> LoanResult<()> {
        if self.amount < 0 {
            return Err(LoanError::InvalidRepaymentAmount(self.amount));
        }
        validate_currency_code(&self.currency_code)
    }
}

/// Full view of a loan: schedule, receipts and what comes next
#[derive(Debug, Clone, Serialize)]
pub struct LoanStatement {
    pub loan: Loan,
    pub scheduled_repayments: Vec<ScheduledRepayment>,
    pub received_repayments: Vec<ReceivedRepayment>,
    pub total_received: i64,
    pub next_due: Option<ScheduledRepayment>,
}

impl LoanStatement {
    pub fn new(
        loan: Loan,
        scheduled_repayments: Vec<ScheduledRepayment>,
        received_repayments: Vec<ReceivedRepayment>,
    ) -> Self {
        let total_received = received_repayments.iter().map(|r| r.amount).sum();
        let next_due = scheduled_repayments
            .iter()
            .find(|s| s.status != RepaymentStatus::Repaid)
            .cloned();

        Self {
            loan,
            scheduled_repayments,
            received_repayments,
            total_received,
            next_due,
        }
    }
}

/// Currency codes are three uppercase ASCII letters (ISO 4217 shape)
pub fn validate_currency_code(code: &str) -> LoanResult<()> {
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(LoanError::InvalidCurrency(code.to_string()))
    }
}
