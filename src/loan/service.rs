//! Loan service layer - entry points for disbursing and repaying loans

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{LoanError, LoanResult};
use crate::loan::allocation::{apply_repayment, AllocationPolicy, Settlement};
use crate::loan::model::{
    CreateLoanRequest, Loan, LoanStatement, ReceivedRepayment, RepayLoanRequest,
    ScheduledRepayment,
};
use crate::loan::schedule::generate_schedule;
use crate::store::LoanStore;

/// Loan service for managing the loan lifecycle
pub struct LoanService<S> {
    store: Arc<S>,
    policy: AllocationPolicy,
}

impl<S> Clone for LoanService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy,
        }
    }
}

impl<S: LoanStore> LoanService<S> {
    /// Create a new loan service instance
    pub fn new(store: Arc<S>, policy: AllocationPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> AllocationPolicy {
        self.policy
    }

    /// Disburse a loan: generate its schedule and store both together
    #[tracing::instrument(skip(self, request), fields(owner_id = %request.owner_id))]
    pub async fn create_loan(&self, request: CreateLoanRequest) -> LoanResult<Loan> {
        let result = self.try_create_loan(request).await;
        if let Err(e) = &result {
            e.log();
        }
        result
    }

    async fn try_create_loan(&self, request: CreateLoanRequest) -> LoanResult<Loan> {
        request.validate()?;

        let (loan, schedule) = generate_schedule(
            request.owner_id,
            request.amount,
            &request.currency_code,
            request.terms,
            request.processed_at,
        )?;

        self.store.insert_loan(&loan, &schedule).await?;

        tracing::info!(
            loan_id = %loan.id,
            amount = loan.amount,
            currency = %loan.currency_code,
            terms = loan.terms,
            "Loan created"
        );

        Ok(loan)
    }

    /// Apply a payment to a loan and return the updated loan
    pub async fn repay_loan(&self, request: RepayLoanRequest) -> LoanResult<Loan> {
        self.record_repayment(request).await.map(|s| s.loan)
    }

    /// Apply a payment to a loan and return everything it changed
    #[tracing::instrument(skip(self, request), fields(loan_id = %request.loan_id))]
    pub async fn record_repayment(&self, request: RepayLoanRequest) -> LoanResult<Settlement> {
        let result = self.try_record_repayment(request).await;
        if let Err(e) = &result {
            e.log();
        }
        result
    }

    async fn try_record_repayment(&self, request: RepayLoanRequest) -> LoanResult<Settlement> {
        request.validate()?;

        let policy = self.policy;
        let RepayLoanRequest {
            loan_id,
            amount,
            currency_code,
            received_at,
        } = request;

        let settlement = self
            .store
            .settle(loan_id, move |loan, schedule| {
                apply_repayment(loan, schedule, amount, &currency_code, received_at, policy)
            })
            .await?;

        tracing::info!(
            loan_id = %loan_id,
            offered = amount,
            applied = settlement.receipt.amount,
            unapplied = settlement.unapplied,
            outstanding = settlement.loan.outstanding_amount,
            status = ?settlement.loan.status,
            "Repayment recorded"
        );

        Ok(settlement)
    }

    /// Get loan by ID
    pub async fn get_loan(&self, id: Uuid) -> LoanResult<Option<Loan>> {
        self.store.find_loan(id).await
    }

    /// Installments of a loan, earliest due first
    pub async fn scheduled_repayments(&self, loan_id: Uuid) -> LoanResult<Vec<ScheduledRepayment>> {
        self.store.scheduled_repayments(loan_id).await
    }

    /// Receipts recorded against a loan, oldest first
    pub async fn received_repayments(&self, loan_id: Uuid) -> LoanResult<Vec<ReceivedRepayment>> {
        self.store.received_repayments(loan_id).await
    }

    /// Loan together with its schedule and receipts
    pub async fn statement(&self, loan_id: Uuid) -> LoanResult<LoanStatement> {
        let loan = self
            .store
            .find_loan(loan_id)
            .await?
            .ok_or(LoanError::LoanNotFound(loan_id))?;
        let schedule = self.store.scheduled_repayments(loan_id).await?;
        let receipts = self.store.received_repayments(loan_id).await?;

        Ok(LoanStatement::new(loan, schedule, receipts))
    }
}
