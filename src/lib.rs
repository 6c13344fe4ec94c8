//! Installment loan engine
//!
//! Generates repayment schedules for disbursed loans and applies incoming
//! payments against them, oldest installment first.

pub mod config;
pub mod db;
pub mod error;
pub mod loan;
pub mod store;

pub use error::{LoanError, LoanResult};
pub use loan::{CreateLoanRequest, LoanService, RepayLoanRequest};
