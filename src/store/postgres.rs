//! PostgreSQL loan store

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::config::Config;
use crate::db::{self, DbError};
use crate::error::{LoanError, LoanResult};
use crate::loan::{Loan, ReceivedRepayment, ScheduledRepayment, Settlement};
use crate::store::LoanStore;

const LOAN_COLUMNS: &str =
    "id, owner_id, amount, currency_code, terms, outstanding_amount, processed_at, status";

const SCHEDULED_COLUMNS: &str =
    "id, loan_id, amount, outstanding_amount, currency_code, due_date, status";

const RECEIVED_COLUMNS: &str = "id, loan_id, amount, currency_code, received_at";

/// Loan store on top of a sqlx connection pool.
///
/// Each call runs in its own transaction. `settle` takes a row lock on the
/// loan, so concurrent repayments of the same loan run one after the other
/// while different loans proceed in parallel.
#[derive(Clone)]
pub struct PgLoanStore {
    db_pool: PgPool,
}

impl PgLoanStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Connect, apply the loan schema and confirm it is in place
    pub async fn connect(config: &Config) -> Result<Self, DbError> {
        let db_pool = db::create_pool(config).await?;
        db::run_migrations(&db_pool).await?;
        db::check_schema(&db_pool).await?;

        Ok(Self::new(db_pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.db_pool
    }

    async fn lock_loan(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> LoanResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(LoanError::LoanNotFound(id))
    }

    async fn write_settlement(
        tx: &mut Transaction<'_, Postgres>,
        settlement: &Settlement,
    ) -> LoanResult<()> {
        let loan = &settlement.loan;
        sqlx::query(
            "UPDATE loans SET outstanding_amount = $1, status = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(loan.outstanding_amount)
        .bind(loan.status)
        .bind(loan.id)
        .execute(&mut **tx)
        .await?;

        for installment in settlement.changed_installments() {
            sqlx::query(
                r#"
                UPDATE scheduled_repayments
                SET outstanding_amount = $1, status = $2, updated_at = NOW()
                WHERE id = $3 AND loan_id = $4
                "#,
            )
            .bind(installment.outstanding_amount)
            .bind(installment.status)
            .bind(installment.id)
            .bind(installment.loan_id)
            .execute(&mut **tx)
            .await?;
        }

        let receipt = &settlement.receipt;
        sqlx::query(
            r#"
            INSERT INTO received_repayments (id, loan_id, amount, currency_code, received_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(receipt.id)
        .bind(receipt.loan_id)
        .bind(receipt.amount)
        .bind(&receipt.currency_code)
        .bind(receipt.received_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LoanStore for PgLoanStore {
    async fn insert_loan(&self, loan: &Loan, schedule: &[ScheduledRepayment]) -> LoanResult<()> {
        let mut tx = self.db_pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO loans (
                id, owner_id, amount, currency_code, terms,
                outstanding_amount, processed_at, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(loan.id)
        .bind(loan.owner_id)
        .bind(loan.amount)
        .bind(&loan.currency_code)
        .bind(loan.terms)
        .bind(loan.outstanding_amount)
        .bind(loan.processed_at)
        .bind(loan.status)
        .execute(&mut *tx)
        .await?;

        for installment in schedule {
            sqlx::query(
                r#"
                INSERT INTO scheduled_repayments (
                    id, loan_id, amount, outstanding_amount,
                    currency_code, due_date, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(installment.id)
            .bind(installment.loan_id)
            .bind(installment.amount)
            .bind(installment.outstanding_amount)
            .bind(&installment.currency_code)
            .bind(installment.due_date)
            .bind(installment.status)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn find_loan(&self, id: Uuid) -> LoanResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(loan)
    }

    async fn scheduled_repayments(&self, loan_id: Uuid) -> LoanResult<Vec<ScheduledRepayment>> {
        let schedule = sqlx::query_as::<_, ScheduledRepayment>(&format!(
            "SELECT {} FROM scheduled_repayments WHERE loan_id = $1 ORDER BY due_date ASC",
            SCHEDULED_COLUMNS
        ))
        .bind(loan_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(schedule)
    }

    async fn received_repayments(&self, loan_id: Uuid) -> LoanResult<Vec<ReceivedRepayment>> {
        let receipts = sqlx::query_as::<_, ReceivedRepayment>(&format!(
            "SELECT {} FROM received_repayments WHERE loan_id = $1 ORDER BY received_at ASC, created_at ASC",
            RECEIVED_COLUMNS
        ))
        .bind(loan_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(receipts)
    }

    async fn settle<F>(&self, loan_id: Uuid, settle: F) -> LoanResult<Settlement>
    where
        F: FnOnce(&Loan, &[ScheduledRepayment]) -> LoanResult<Settlement> + Send,
    {
        let mut tx = self.db_pool.begin().await?;

        let loan = Self::lock_loan(&mut tx, loan_id).await?;
        let schedule = sqlx::query_as::<_, ScheduledRepayment>(&format!(
            "SELECT {} FROM scheduled_repayments WHERE loan_id = $1 ORDER BY due_date ASC",
            SCHEDULED_COLUMNS
        ))
        .bind(loan_id)
        .fetch_all(&mut *tx)
        .await?;

        // Dropping the transaction on error rolls it back
        let settlement = settle(&loan, &schedule)?;
        Self::write_settlement(&mut tx, &settlement).await?;

        tx.commit().await?;

        Ok(settlement)
    }
}
