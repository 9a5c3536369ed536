use entity::{
    credits_balance, credits_batch, credits_transaction,
    sea_orm_active_enums::{
        CreditsBalanceStatus, CreditsBatchSource, CreditsTransactionType,
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::common::SuccessResponse;

/// Request to spend credits on a service
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeCreditsRequest {
    #[validate(range(min = 1))]
    pub amount: i32,

    #[validate(length(min = 1, max = 100))]
    pub service_name: String,

    #[validate(length(max = 500))]
    pub description: Option<String>,

    pub metadata: Option<serde_json::Value>,

    /// Replaying a key returns the original result instead of charging again
    #[validate(length(min = 1, max = 255))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckCreditsRequest {
    #[validate(range(min = 1))]
    pub amount: i32,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<u64>,
    #[validate(range(max = 1_000_000))]
    pub offset: Option<u64>,
}

/// Balance summary returned to the account owner
pub type CreditsBalanceResponse = SuccessResponse<CreditsBalanceData>;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreditsBalanceData {
    pub balance: i32,
    pub total_earned: i32,
    pub total_spent: i32,
    pub status: CreditsBalanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_bonus_granted: Option<bool>,
}

impl From<credits_balance::Model> for CreditsBalanceData {
    fn from(balance: credits_balance::Model) -> Self {
        Self {
            balance: balance.balance,
            total_earned: balance.total_earned,
            total_spent: balance.total_spent,
            status: balance.status,
            registration_bonus_granted: None,
        }
    }
}

pub type ActiveBatchesResponse = SuccessResponse<Vec<CreditsBatchRecord>>;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreditsBatchRecord {
    pub id: Uuid,
    pub amount: i32,
    pub remaining: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: time::OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<time::OffsetDateTime>,
    pub source_type: CreditsBatchSource,
}

impl From<credits_batch::Model> for CreditsBatchRecord {
    fn from(batch: credits_batch::Model) -> Self {
        Self {
            id: batch.id,
            amount: batch.amount,
            remaining: batch.remaining,
            issued_at: batch.issued_at,
            expires_at: batch.expires_at,
            source_type: batch.source_type,
        }
    }
}

pub type TransactionsResponse = SuccessResponse<Vec<CreditsTransactionRecord>>;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreditsTransactionRecord {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub transaction_type: CreditsTransactionType,
    pub amount: i32,
    pub debit_account: String,
    pub credit_account: String,
    pub balance_after: i32,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

impl From<credits_transaction::Model> for CreditsTransactionRecord {
    fn from(tx: credits_transaction::Model) -> Self {
        Self {
            id: tx.id,
            transaction_type: tx.transaction_type,
            amount: tx.amount,
            debit_account: tx.debit_account,
            credit_account: tx.credit_account,
            balance_after: tx.balance_after,
            description: tx.description,
            created_at: tx.created_at,
        }
    }
}

pub type ConsumeCreditsResponse = SuccessResponse<ConsumeCreditsData>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeCreditsData {
    pub consumed_amount: i32,
    pub remaining_balance: i32,
    pub transaction_id: Uuid,
    pub consumed_batches: Vec<ConsumedBatch>,
    /// True when an idempotency key matched an earlier consumption
    pub replayed: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumedBatch {
    pub batch_id: Uuid,
    pub amount: i32,
}

pub type CheckCreditsResponse = SuccessResponse<CheckCreditsData>;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CheckCreditsData {
    pub available: bool,
    pub current_balance: i32,
    pub required: i32,
    pub status: CreditsBalanceStatus,
}

/// Outcome of a grant
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GrantCreditsData {
    pub batch_id: Uuid,
    pub transaction_id: Uuid,
    pub amount: i32,
    pub new_balance: i32,
}

pub type GrantCreditsResponse = SuccessResponse<GrantCreditsData>;

pub type PackagesResponse = SuccessResponse<Vec<crate::config::CreditPackage>>;

/// Admin: manual top-up
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdminGrantRequest {
    pub user_id: Uuid,

    #[validate(range(min = 1, max = 1_000_000))]
    pub amount: i32,

    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

/// Billing hook: a completed one-off package payment
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseGrantRequest {
    pub user_id: Uuid,

    /// Explicit amount; falls back to the package's credits
    #[validate(range(min = 1))]
    pub credits: Option<i32>,

    #[validate(length(min = 1, max = 255))]
    pub payment_id: String,

    #[validate(length(min = 1, max = 100))]
    pub package_id: Option<String>,
}

/// Billing hook: a subscription period was paid
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionGrantRequest {
    pub user_id: Uuid,

    #[validate(length(min = 1, max = 255))]
    pub subscription_id: String,

    #[validate(length(min = 1, max = 100))]
    pub plan: String,

    #[serde(with = "time::serde::rfc3339")]
    pub period_start: time::OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub period_end: time::OffsetDateTime,

    #[validate(length(max = 100))]
    pub billing_reason: Option<String>,
}

pub type SubscriptionGrantResponse = SuccessResponse<SubscriptionGrantData>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionGrantData {
    /// `None` when this period was already credited
    pub grant: Option<GrantCreditsData>,
    pub already_granted: bool,
    pub credits: i32,
    pub yearly: bool,
}

pub type ExpireBatchesResponse = SuccessResponse<ExpireBatchesData>;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExpireBatchesData {
    pub processed: usize,
    pub details: Vec<ExpiredBatch>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: time::OffsetDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExpiredBatch {
    pub batch_id: Uuid,
    pub user_id: Uuid,
    pub expired_amount: i32,
}
