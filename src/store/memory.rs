//! In-process loan store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{LoanError, LoanResult};
use crate::loan::{Loan, ReceivedRepayment, ScheduledRepayment, Settlement};
use crate::store::LoanStore;

struct LoanRecord {
    loan: Loan,
    schedule: Vec<ScheduledRepayment>,
    receipts: Vec<ReceivedRepayment>,
}

/// Loan store backed by a map behind a single async mutex.
///
/// The lock is held for the whole of `settle`, so repayments are serialized
/// across all loans.
#[derive(Default)]
pub struct MemoryLoanStore {
    loans: Mutex<HashMap<Uuid, LoanRecord>>,
}

impl MemoryLoanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of loans held
    pub async fn len(&self) -> usize {
        self.loans.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.loans.lock().await.is_empty()
    }
}

#[async_trait]
impl LoanStore for MemoryLoanStore {
    async fn insert_loan(&self, loan: &Loan, schedule: &[ScheduledRepayment]) -> LoanResult<()> {
        let mut loans = self.loans.lock().await;
        if loans.contains_key(&loan.id) {
            return Err(LoanError::Persistence(format!(
                "loan {} already exists",
                loan.id
            )));
        }

        let mut schedule = schedule.to_vec();
        schedule.sort_by_key(|s| s.due_date);

        loans.insert(
            loan.id,
            LoanRecord {
                loan: loan.clone(),
                schedule,
                receipts: Vec::new(),
            },
        );
        Ok(())
    }

    async fn find_loan(&self, id: Uuid) -> LoanResult<Option<Loan>> {
        Ok(self.loans.lock().await.get(&id).map(|r| r.loan.clone()))
    }

    async fn scheduled_repayments(&self, loan_id: Uuid) -> LoanResult<Vec<ScheduledRepayment>> {
        Ok(self
            .loans
            .lock()
            .await
            .get(&loan_id)
            .map(|r| r.schedule.clone())
            .unwrap_or_default())
    }

    async fn received_repayments(&self, loan_id: Uuid) -> LoanResult<Vec<ReceivedRepayment>> {
        Ok(self
            .loans
            .lock()
            .await
            .get(&loan_id)
            .map(|r| r.receipts.clone())
            .unwrap_or_default())
    }

    async fn settle<F>(&self, loan_id: Uuid, settle: F) -> LoanResult<Settlement>
    where
        F: FnOnce(&Loan, &[ScheduledRepayment]) -> LoanResult<Settlement> + Send,
    {
        let mut loans = self.loans.lock().await;
        let record = loans
            .get_mut(&loan_id)
            .ok_or(LoanError::LoanNotFound(loan_id))?;

        let settlement = settle(&record.loan, &record.schedule)?;

        record.loan = settlement.loan.clone();
        record.schedule = settlement.installments.clone();
        // Backdated receipts go before later ones, after any on the same date
        let at = record
            .receipts
            .partition_point(|r| r.received_at <= settlement.receipt.received_at);
        record.receipts.insert(at, settlement.receipt.clone());

        Ok(settlement)
    }
}
