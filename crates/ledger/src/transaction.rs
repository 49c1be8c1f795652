//! Transaction row models.

use serde::{Deserialize, Serialize};

use coffer_core::{TransactionId, UnixTime, UserId};

use crate::amortization::BillingDuration;

/// A stored ledger row.
///
/// One purchase maps to one row when applied immediately, or to a parent
/// row (`applied_at` deferred to NULL) plus N installment rows referencing
/// it via `amortized_transaction_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Owning user; cleared (SET NULL) when the user is deleted.
    pub user_id: Option<UserId>,
    /// Source system (e.g. "stripe"). Installments carry "{source}.amortized".
    pub source: String,
    /// Store-assigned transaction id; unique together with `source`.
    pub external_id: String,
    pub product_id: Option<String>,
    pub price: f64,
    pub tax_percentage: f64,
    pub commission_percentage: f64,
    pub takehome_percentage: Option<f64>,
    pub takehome_amount: f64,
    pub created_at: UnixTime,
    pub transacted_at: UnixTime,
    /// When the amount applies to the user's account; NULL on a parent row
    /// whose schedule is still open.
    pub applied_at: Option<UnixTime>,
    pub currency: Option<String>,
    /// Parent row when this record is an amortized installment.
    pub amortized_transaction_id: Option<TransactionId>,
}

/// Input for recording a purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub user_id: Option<UserId>,
    pub source: String,
    pub external_id: String,
    pub product_id: Option<String>,
    pub price: f64,
    pub tax_percentage: f64,
    pub commission_percentage: f64,
    pub takehome_percentage: f64,
    pub takehome_amount: f64,
    pub created_at: UnixTime,
    pub applied_at: UnixTime,
    pub duration: BillingDuration,
    pub currency: Option<String>,
}
