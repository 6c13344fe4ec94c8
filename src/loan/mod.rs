//! Loan domain module
//!
//! Contains the models, the schedule generator, the repayment allocator and
//! the service that ties them to a [`LoanStore`](crate::store::LoanStore).

pub mod allocation;
mod model;
pub mod schedule;
mod service;

pub use allocation::{
    apply_repayment, next_state, AllocationPolicy, OverpaymentPolicy, ReceiptAccounting,
    Settlement,
};
pub use model::*;
pub use schedule::generate_schedule;
pub use service::LoanService;
