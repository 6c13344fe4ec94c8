//! Schedule generation for newly disbursed loans
//!
//! A loan of `principal` over `terms` months is split into `terms`
//! installments, due one calendar month apart starting one month after the
//! disbursement date. Each installment is the remaining principal divided by
//! the number of remaining terms, rounded up, so the installments always add
//! up to the principal and any uneven minor units land on the earliest
//! installments (10000 over 3 terms is 3334, 3333, 3333).

use chrono::{Months, NaiveDate};
use uuid::Uuid;

use crate::error::{LoanError, LoanResult};
use crate::loan::model::{
    validate_currency_code, Loan, LoanStatus, RepaymentStatus, ScheduledRepayment,
};

/// Reject principal and term values the generator cannot work with
pub fn check_parameters(principal: i64, terms: i32) -> LoanResult<()> {
    if principal <= 0 {
        return Err(LoanError::InvalidScheduleParameters(format!(
            "principal must be greater than 0, got {}",
            principal
        )));
    }
    if terms <= 0 {
        return Err(LoanError::InvalidScheduleParameters(format!(
            "terms must be greater than 0, got {}",
            terms
        )));
    }
    if principal < i64::from(terms) {
        return Err(LoanError::InvalidScheduleParameters(format!(
            "principal {} cannot cover {} installments of at least one minor unit",
            principal, terms
        )));
    }
    Ok(())
}

/// Split `principal` into `terms` installment amounts.
///
/// Callers must have passed [`check_parameters`].
pub fn installment_amounts(principal: i64, terms: i32) -> Vec<i64> {
    let terms = i64::from(terms);
    let mut remaining = principal;

    (0..terms)
        .map(|i| {
            let left = terms - i;
            let mut amount = remaining / left;
            if remaining % left != 0 {
                amount += 1;
            }
            remaining -= amount;
            amount
        })
        .collect()
}

/// Due date of the `n`th installment (1-based), always measured from the start
/// date. Days past the end of a shorter month clamp to its last day.
pub fn due_date(start_date: NaiveDate, n: u32) -> LoanResult<NaiveDate> {
    start_date.checked_add_months(Months::new(n)).ok_or_else(|| {
        LoanError::InvalidScheduleParameters(format!(
            "due date {} months after {} is out of range",
            n, start_date
        ))
    })
}

/// Create a loan and its full repayment schedule.
///
/// The loan starts with the whole principal outstanding. Every installment
/// starts Due with its outstanding amount equal to its amount.
pub fn generate_schedule(
    owner_id: Uuid,
    principal: i64,
    currency_code: &str,
    terms: i32,
    start_date: NaiveDate,
) -> LoanResult<(Loan, Vec<ScheduledRepayment>)> {
    check_parameters(principal, terms)?;
    validate_currency_code(currency_code)?;
    // The last due date bounds every other one
    due_date(start_date, terms.unsigned_abs())?;

    let loan = Loan {
        id: Uuid::new_v4(),
        owner_id,
        amount: principal,
        currency_code: currency_code.to_string(),
        terms,
        outstanding_amount: principal,
        processed_at: start_date,
        status: LoanStatus::Due,
    };

    let schedule = installment_amounts(principal, terms)
        .into_iter()
        .zip(1u32..)
        .map(|(amount, n)| {
            Ok(ScheduledRepayment {
                id: Uuid::new_v4(),
                loan_id: loan.id,
                amount,
                outstanding_amount: amount,
                currency_code: loan.currency_code.clone(),
                due_date: due_date(start_date, n)?,
                status: RepaymentStatus::Due,
            })
        })
        .collect::<LoanResult<Vec<_>>>()?;

    tracing::debug!(
        loan_id = %loan.id,
        principal = principal,
        terms = terms,
        first_installment = schedule.first().map(|s| s.amount).unwrap_or_default(),
        "Generated repayment schedule"
    );

    Ok((loan, schedule))
}
