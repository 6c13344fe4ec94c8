//! Loan lifecycle tests against the in-memory store

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use loan_engine::loan::{
    AllocationPolicy, LoanStatus, OverpaymentPolicy, ReceiptAccounting, RepaymentStatus,
};
use loan_engine::store::{LoanStore, MemoryLoanStore};
use loan_engine::{CreateLoanRequest, LoanError, LoanService, RepayLoanRequest};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn service(policy: AllocationPolicy) -> LoanService<MemoryLoanStore> {
    LoanService::new(Arc::new(MemoryLoanStore::new()), policy)
}

fn create_request(amount: i64, terms: i32) -> CreateLoanRequest {
    CreateLoanRequest {
        owner_id: Uuid::new_v4(),
        amount,
        currency_code: "VND".to_string(),
        terms,
        processed_at: date(2023, 1, 1),
    }
}

fn repay_request(loan_id: Uuid, amount: i64) -> RepayLoanRequest {
    RepayLoanRequest {
        loan_id,
        amount,
        currency_code: "VND".to_string(),
        received_at: date(2023, 2, 1),
    }
}

// ============================================================================
// Loan creation
// ============================================================================

#[tokio::test]
async fn test_create_loan_persists_schedule() {
    let service = service(AllocationPolicy::default());

    let loan = service.create_loan(create_request(10000, 3)).await.unwrap();
    assert_eq!(loan.outstanding_amount, 10000);
    assert_eq!(loan.status, LoanStatus::Due);

    let stored = service.get_loan(loan.id).await.unwrap();
    assert_eq!(stored, Some(loan.clone()));

    let schedule = service.scheduled_repayments(loan.id).await.unwrap();
    let rows: Vec<(i64, NaiveDate, RepaymentStatus)> = schedule
        .iter()
        .map(|s| (s.amount, s.due_date, s.status))
        .collect();
    assert_eq!(
        rows,
        vec![
            (3334, date(2023, 2, 1), RepaymentStatus::Due),
            (3333, date(2023, 3, 1), RepaymentStatus::Due),
            (3333, date(2023, 4, 1), RepaymentStatus::Due),
        ]
    );
}

#[tokio::test]
async fn test_create_loan_rejects_invalid_terms() {
    let store = Arc::new(MemoryLoanStore::new());
    let service = LoanService::new(store.clone(), AllocationPolicy::default());

    let result = service.create_loan(create_request(10000, 0)).await;
    assert!(matches!(
        result,
        Err(LoanError::InvalidScheduleParameters(_))
    ));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_create_loan_rejects_invalid_currency() {
    let service = service(AllocationPolicy::default());

    let mut request = create_request(10000, 3);
    request.currency_code = "dong".to_string();
    assert!(matches!(
        service.create_loan(request).await,
        Err(LoanError::InvalidCurrency(_))
    ));
}

// ============================================================================
// Repayment scenarios
// ============================================================================

#[tokio::test]
async fn test_repayment_scenarios() {
    let service = service(AllocationPolicy::default());
    let loan = service.create_loan(create_request(10000, 3)).await.unwrap();

    // Exactly the first installment
    let loan_after = service.repay_loan(repay_request(loan.id, 3334)).await.unwrap();
    assert_eq!(loan_after.outstanding_amount, 6666);
    assert_eq!(loan_after.status, LoanStatus::Due);
    let schedule = service.scheduled_repayments(loan.id).await.unwrap();
    assert_eq!(schedule[0].status, RepaymentStatus::Repaid);
    assert_eq!(schedule[0].outstanding_amount, 0);
    assert_eq!(schedule[1].status, RepaymentStatus::Due);
    assert_eq!(schedule[2].status, RepaymentStatus::Due);

    // Second installment in full, third in part
    let loan_after = service.repay_loan(repay_request(loan.id, 5000)).await.unwrap();
    assert_eq!(loan_after.outstanding_amount, 1666);
    let schedule = service.scheduled_repayments(loan.id).await.unwrap();
    assert_eq!(schedule[1].status, RepaymentStatus::Repaid);
    assert_eq!(schedule[2].status, RepaymentStatus::Partial);
    assert_eq!(schedule[2].outstanding_amount, 1666);

    // The rest
    let loan_after = service.repay_loan(repay_request(loan.id, 1666)).await.unwrap();
    assert_eq!(loan_after.outstanding_amount, 0);
    assert_eq!(loan_after.status, LoanStatus::Repaid);
    let schedule = service.scheduled_repayments(loan.id).await.unwrap();
    assert!(schedule.iter().all(|s| s.status == RepaymentStatus::Repaid));

    let receipts: Vec<i64> = service
        .received_repayments(loan.id)
        .await
        .unwrap()
        .iter()
        .map(|r| r.amount)
        .collect();
    assert_eq!(receipts, vec![3334, 5000, 1666]);
}

#[tokio::test]
async fn test_overpayment_receipt_records_applied_amount() {
    let service = service(AllocationPolicy::default());
    let loan = service.create_loan(create_request(1000, 2)).await.unwrap();

    let settlement = service
        .record_repayment(repay_request(loan.id, 5000))
        .await
        .unwrap();
    assert_eq!(settlement.receipt.amount, 1000);
    assert_eq!(settlement.unapplied, 4000);
    assert_eq!(settlement.loan.outstanding_amount, 0);
    assert_eq!(settlement.loan.status, LoanStatus::Repaid);

    let receipts = service.received_repayments(loan.id).await.unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].amount, 1000);
}

#[tokio::test]
async fn test_overpayment_rejected_leaves_loan_untouched() {
    let service = service(AllocationPolicy {
        overpayment: OverpaymentPolicy::Reject,
        ..Default::default()
    });
    let loan = service.create_loan(create_request(1000, 2)).await.unwrap();

    let result = service.repay_loan(repay_request(loan.id, 5000)).await;
    assert!(matches!(
        result,
        Err(LoanError::OverpaymentDiscrepancy { offered: 5000, outstanding: 1000 })
    ));

    assert_eq!(service.get_loan(loan.id).await.unwrap(), Some(loan.clone()));
    assert!(service.received_repayments(loan.id).await.unwrap().is_empty());
    let schedule = service.scheduled_repayments(loan.id).await.unwrap();
    assert!(schedule.iter().all(|s| s.status == RepaymentStatus::Due));
}

#[tokio::test]
async fn test_due_only_accounting_keeps_balance_open() {
    let service = service(AllocationPolicy {
        receipt_accounting: ReceiptAccounting::DueOnly,
        ..Default::default()
    });
    let loan = service.create_loan(create_request(1000, 1)).await.unwrap();

    service.repay_loan(repay_request(loan.id, 400)).await.unwrap();
    let loan_after = service.repay_loan(repay_request(loan.id, 600)).await.unwrap();

    // The installment is settled but the second payment never reached the balance
    let schedule = service.scheduled_repayments(loan.id).await.unwrap();
    assert_eq!(schedule[0].status, RepaymentStatus::Repaid);
    assert_eq!(loan_after.outstanding_amount, 600);
    assert_eq!(loan_after.status, LoanStatus::Due);
}

#[tokio::test]
async fn test_repay_unknown_loan() {
    let service = service(AllocationPolicy::default());
    let id = Uuid::new_v4();

    assert_eq!(
        service.repay_loan(repay_request(id, 100)).await,
        Err(LoanError::LoanNotFound(id))
    );
    assert!(matches!(
        service.statement(id).await,
        Err(LoanError::LoanNotFound(_))
    ));
}

#[tokio::test]
async fn test_repay_with_other_currency() {
    let service = service(AllocationPolicy::default());
    let loan = service.create_loan(create_request(1000, 2)).await.unwrap();

    let mut request = repay_request(loan.id, 100);
    request.currency_code = "USD".to_string();
    assert!(matches!(
        service.repay_loan(request).await,
        Err(LoanError::CurrencyMismatch { .. })
    ));
    assert!(service.received_repayments(loan.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repay_negative_amount() {
    let service = service(AllocationPolicy::default());
    let loan = service.create_loan(create_request(1000, 2)).await.unwrap();

    assert_eq!(
        service.repay_loan(repay_request(loan.id, -10)).await,
        Err(LoanError::InvalidRepaymentAmount(-10))
    );
}

#[tokio::test]
async fn test_backdated_repayment_listed_by_received_date() {
    let service = service(AllocationPolicy::default());
    let loan = service.create_loan(create_request(10000, 3)).await.unwrap();

    let mut march = repay_request(loan.id, 1000);
    march.received_at = date(2023, 3, 1);
    let mut february = repay_request(loan.id, 2000);
    february.received_at = date(2023, 2, 1);
    let mut march_again = repay_request(loan.id, 3000);
    march_again.received_at = date(2023, 3, 1);

    service.repay_loan(march).await.unwrap();
    service.repay_loan(february).await.unwrap();
    service.repay_loan(march_again).await.unwrap();

    let receipts: Vec<(NaiveDate, i64)> = service
        .received_repayments(loan.id)
        .await
        .unwrap()
        .iter()
        .map(|r| (r.received_at, r.amount))
        .collect();
    assert_eq!(
        receipts,
        vec![
            (date(2023, 2, 1), 2000),
            (date(2023, 3, 1), 1000),
            (date(2023, 3, 1), 3000),
        ]
    );

    let statement = service.statement(loan.id).await.unwrap();
    assert_eq!(statement.received_repayments[0].received_at, date(2023, 2, 1));
}

// ============================================================================
// Statement
// ============================================================================

#[tokio::test]
async fn test_statement_tracks_progress() {
    let service = service(AllocationPolicy::default());
    let loan = service.create_loan(create_request(9000, 3)).await.unwrap();

    service.repay_loan(repay_request(loan.id, 3000)).await.unwrap();
    service.repay_loan(repay_request(loan.id, 1000)).await.unwrap();

    let statement = service.statement(loan.id).await.unwrap();
    assert_eq!(statement.loan.outstanding_amount, 5000);
    assert_eq!(statement.total_received, 4000);
    assert_eq!(statement.received_repayments.len(), 2);

    let next = statement.next_due.expect("an installment is still open");
    assert_eq!(next.due_date, date(2023, 3, 1));
    assert_eq!(next.status, RepaymentStatus::Partial);
    assert_eq!(next.outstanding_amount, 2000);
}

#[tokio::test]
async fn test_statement_of_repaid_loan_has_nothing_due() {
    let service = service(AllocationPolicy::default());
    let loan = service.create_loan(create_request(900, 3)).await.unwrap();

    service.repay_loan(repay_request(loan.id, 900)).await.unwrap();

    let statement = service.statement(loan.id).await.unwrap();
    assert!(statement.loan.is_repaid());
    assert!(statement.next_due.is_none());
    assert_eq!(statement.total_received, 900);
}

// ============================================================================
// Store behaviour
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_repayments_are_serialized() {
    let service = service(AllocationPolicy::default());
    let loan = service.create_loan(create_request(10000, 10)).await.unwrap();

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let service = service.clone();
            let loan_id = loan.id;
            tokio::spawn(async move { service.repay_loan(repay_request(loan_id, 50)).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let statement = service.statement(loan.id).await.unwrap();
    assert_eq!(statement.received_repayments.len(), 100);
    assert_eq!(statement.total_received, 5000);
    assert_eq!(statement.loan.outstanding_amount, 5000);

    let open: i64 = statement
        .scheduled_repayments
        .iter()
        .map(|s| s.outstanding_amount)
        .sum();
    assert_eq!(open, 5000);
}

#[tokio::test]
async fn test_store_rejects_duplicate_loan() {
    let store = MemoryLoanStore::new();
    let (loan, schedule) =
        loan_engine::loan::generate_schedule(Uuid::new_v4(), 1000, "VND", 2, date(2023, 1, 1))
            .unwrap();

    store.insert_loan(&loan, &schedule).await.unwrap();
    assert!(matches!(
        store.insert_loan(&loan, &schedule).await,
        Err(LoanError::Persistence(_))
    ));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_failed_settlement_writes_nothing() {
    let store = MemoryLoanStore::new();
    let (loan, schedule) =
        loan_engine::loan::generate_schedule(Uuid::new_v4(), 1000, "VND", 2, date(2023, 1, 1))
            .unwrap();
    store.insert_loan(&loan, &schedule).await.unwrap();

    let result = store
        .settle(loan.id, |_, _| {
            Err(LoanError::InconsistentSchedule("test".to_string()))
        })
        .await;
    assert!(result.is_err());

    assert_eq!(store.find_loan(loan.id).await.unwrap(), Some(loan.clone()));
    assert_eq!(store.scheduled_repayments(loan.id).await.unwrap(), schedule);
    assert!(store.received_repayments(loan.id).await.unwrap().is_empty());
}
