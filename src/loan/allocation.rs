//! Repayment allocation
//!
//! An incoming payment is spread over a loan's installments in due-date
//! order: the oldest unpaid installment is always settled first, and whatever
//! cannot cover an installment in full leaves it Partial. Nothing here touches
//! storage; the allocator takes the current state and returns the next one.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LoanError, LoanResult};
use crate::loan::model::{
    validate_currency_code, Loan, LoanStatus, ReceivedRepayment, RepaymentStatus,
    ScheduledRepayment,
};

/// Which settled amounts count toward the receipt and the loan balance
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptAccounting {
    /// Everything settled counts, whatever the installment's prior status
    #[default]
    Settled,
    /// Only amounts settled on installments that were Due count. Amounts that
    /// land on an already Partial installment settle it but are left out of
    /// the receipt and the loan balance.
    DueOnly,
}

/// What to do with a payment larger than everything still owed
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverpaymentPolicy {
    /// Apply what can be applied, leave the excess untracked
    #[default]
    Absorb,
    /// Refuse the payment
    Reject,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocationPolicy {
    pub receipt_accounting: ReceiptAccounting,
    pub overpayment: OverpaymentPolicy,
}

/// Result of applying one payment to a loan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub loan: Loan,
    /// Every installment of the loan, in due-date order, after the payment
    pub installments: Vec<ScheduledRepayment>,
    /// Ids of the installments the payment touched
    pub changed: Vec<Uuid>,
    pub receipt: ReceivedRepayment,
    /// Part of the offered amount that could not be applied to anything
    pub unapplied: i64,
}

impl Settlement {
    pub fn changed_installments(&self) -> impl Iterator<Item = &ScheduledRepayment> {
        self.installments
            .iter()
            .filter(move |s| self.changed.contains(&s.id))
    }
}

/// Move one installment forward by as much of `remaining` as it can take.
///
/// Returns the new installment and the amount consumed from `remaining`.
pub fn next_state(installment: &ScheduledRepayment, remaining: i64) -> (ScheduledRepayment, i64) {
    if installment.status == RepaymentStatus::Repaid || remaining <= 0 {
        return (installment.clone(), 0);
    }

    let mut next = installment.clone();
    if remaining >= installment.outstanding_amount {
        next.outstanding_amount = 0;
        next.status = RepaymentStatus::Repaid;
        (next, installment.outstanding_amount)
    } else {
        next.outstanding_amount -= remaining;
        next.status = RepaymentStatus::Partial;
        (next, remaining)
    }
}

/// Check the stored schedule before allocating against it
fn check_schedule(loan: &Loan, installments: &[ScheduledRepayment]) -> LoanResult<()> {
    for installment in installments {
        if installment.loan_id != loan.id {
            return Err(LoanError::InconsistentSchedule(format!(
                "installment {} belongs to loan {}, not {}",
                installment.id, installment.loan_id, loan.id
            )));
        }
        if !installment.is_consistent() {
            return Err(LoanError::InconsistentSchedule(format!(
                "installment {} is {:?} with {} of {} outstanding",
                installment.id, installment.status, installment.outstanding_amount, installment.amount
            )));
        }
    }

    if let Some(pair) = installments
        .windows(2)
        .find(|pair| pair[1].due_date < pair[0].due_date)
    {
        return Err(LoanError::InconsistentSchedule(format!(
            "installment due {} comes after installment due {}",
            pair[1].due_date, pair[0].due_date
        )));
    }

    Ok(())
}

/// Apply an incoming payment to a loan's installments.
///
/// `installments` must be the loan's complete schedule in ascending due-date
/// order. Each installment is visited once. The receipt records the applied
/// amount, which under [`OverpaymentPolicy::Absorb`] may be less than
/// `incoming`.
pub fn apply_repayment(
    loan: &Loan,
    installments: &[ScheduledRepayment],
    incoming: i64,
    currency_code: &str,
    received_at: NaiveDate,
    policy: AllocationPolicy,
) -> LoanResult<Settlement> {
    if incoming < 0 {
        return Err(LoanError::InvalidRepaymentAmount(incoming));
    }
    validate_currency_code(currency_code)?;
    if currency_code != loan.currency_code {
        return Err(LoanError::CurrencyMismatch {
            expected: loan.currency_code.clone(),
            actual: currency_code.to_string(),
        });
    }
    check_schedule(loan, installments)?;

    let total_outstanding: i64 = installments.iter().map(|s| s.outstanding_amount).sum();
    if policy.overpayment == OverpaymentPolicy::Reject && incoming > total_outstanding {
        return Err(LoanError::OverpaymentDiscrepancy {
            offered: incoming,
            outstanding: total_outstanding,
        });
    }

    let mut remaining = incoming;
    let mut applied_total = 0;
    let mut changed = Vec::new();
    let mut next_installments = Vec::with_capacity(installments.len());

    for installment in installments {
        let (next, consumed) = next_state(installment, remaining);
        if consumed > 0 {
            remaining -= consumed;
            let counted = match (policy.receipt_accounting, installment.status) {
                (ReceiptAccounting::DueOnly, RepaymentStatus::Partial) => 0,
                _ => consumed,
            };
            applied_total += counted;
            changed.push(next.id);

            tracing::debug!(
                loan_id = %loan.id,
                installment_id = %next.id,
                due_date = %next.due_date,
                from = ?installment.status,
                to = ?next.status,
                consumed = consumed,
                counted = counted,
                "Installment settled"
            );
        }
        next_installments.push(next);
    }

    if applied_total > loan.outstanding_amount {
        return Err(LoanError::InconsistentSchedule(format!(
            "loan {} has {} outstanding but its installments took {}",
            loan.id, loan.outstanding_amount, applied_total
        )));
    }

    let mut next_loan = loan.clone();
    next_loan.outstanding_amount -= applied_total;
    if next_loan.outstanding_amount == 0 {
        next_loan.status = LoanStatus::Repaid;
    }

    if remaining > 0 {
        tracing::warn!(
            loan_id = %loan.id,
            offered = incoming,
            applied = applied_total,
            unapplied = remaining,
            "Payment exceeds what is owed, excess not applied"
        );
    }

    let receipt = ReceivedRepayment {
        id: Uuid::new_v4(),
        loan_id: loan.id,
        amount: applied_total,
        currency_code: currency_code.to_string(),
        received_at,
    };

    Ok(Settlement {
        loan: next_loan,
        installments: next_installments,
        changed,
        receipt,
        unapplied: remaining,
    })
}
