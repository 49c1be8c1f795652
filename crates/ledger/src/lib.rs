//! `coffer-ledger` — transaction ledger domain model.
//!
//! Pure types and arithmetic for monetary transactions and their
//! amortization schedules. Persistence lives in `coffer-infra`.

pub mod amortization;
pub mod transaction;

pub use amortization::{add_months, expand_installments, BillingDuration};
pub use transaction::{NewTransaction, Transaction};
