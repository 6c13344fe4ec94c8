//! Persistence for loans, their schedules and receipts
//!
//! The engine itself never touches storage. A [`LoanStore`] keeps the records
//! and provides the unit of work a repayment runs in: `settle` hands the
//! current loan and schedule to a pure function and persists whatever it
//! returns, all or nothing.

mod memory;
mod postgres;

pub use memory::MemoryLoanStore;
pub use postgres::PgLoanStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::LoanResult;
use crate::loan::{Loan, ReceivedRepayment, ScheduledRepayment, Settlement};

#[async_trait]
pub trait LoanStore: Send + Sync {
    /// Store a new loan together with its full schedule
    async fn insert_loan(&self, loan: &Loan, schedule: &[ScheduledRepayment]) -> LoanResult<()>;

    async fn find_loan(&self, id: Uuid) -> LoanResult<Option<Loan>>;

    /// Installments of a loan in ascending due-date order
    async fn scheduled_repayments(&self, loan_id: Uuid) -> LoanResult<Vec<ScheduledRepayment>>;

    /// Receipts of a loan by ascending received date, ties in recording order
    async fn received_repayments(&self, loan_id: Uuid) -> LoanResult<Vec<ReceivedRepayment>>;

    /// Run `settle` against the loan's current state with exclusive access to
    /// the loan, then persist the updated loan, the changed installments and
    /// the new receipt atomically. Nothing is written if `settle` fails.
    async fn settle<F>(&self, loan_id: Uuid, settle: F) -> LoanResult<Settlement>
    where
        F: FnOnce(&Loan, &[ScheduledRepayment]) -> LoanResult<Settlement> + Send;
}
