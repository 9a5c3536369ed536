use crate::{
    error::{ApiError, Result},
    models::{
        credits::{ConsumeCreditsData, ConsumedBatch, ExpiredBatch, GrantCreditsData},
        credits_batch_ext::{plan_consumption, CreditsBatchExt},
        ledger::LedgerAccount,
    },
};
use anyhow::anyhow;
use entity::{
    credits_balance, credits_batch, credits_transaction, credits_transaction_batch,
    sea_orm_active_enums::{
        CreditsBalanceStatus, CreditsBatchSource, CreditsBatchStatus, CreditsTransactionType,
    },
};
use sea_orm::{
    entity::*, query::*, sea_query::OnConflict, Condition, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, PaginatorTrait, TransactionTrait,
};
use serde_json::{json, Map, Value as Json};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_TRANSACTIONS_LIMIT: u64 = 20;
pub const MAX_TRANSACTIONS_LIMIT: u64 = 100;
pub const MAX_TRANSACTIONS_OFFSET: u64 = 1_000_000;

/// A grant of credits into a user's wallet
#[derive(Debug, Clone)]
pub struct GrantCredits {
    pub user_id: Uuid,
    pub amount: i32,
    pub source_type: CreditsBatchSource,
    /// Funding account debited by the grant
    pub debit_account: LedgerAccount,
    pub transaction_type: CreditsTransactionType,
    pub expires_at: Option<OffsetDateTime>,
    /// Unique per source type; a repeated reference is rejected as a conflict
    pub source_ref: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Json>,
}

/// A debit of credits from a user's wallet to a service
#[derive(Debug, Clone)]
pub struct ConsumeCredits {
    pub user_id: Uuid,
    pub amount: i32,
    pub service_name: String,
    pub description: Option<String>,
    pub metadata: Option<Json>,
    pub idempotency_key: Option<String>,
}

/// A ledger row about to be appended
struct LedgerEntry {
    user_id: Uuid,
    transaction_type: CreditsTransactionType,
    amount: i32,
    debit_account: String,
    credit_account: String,
    balance_after: i32,
    description: Option<String>,
    metadata: Option<Json>,
    idempotency_key: Option<String>,
    batches: Vec<(Uuid, i32)>,
    created_at: OffsetDateTime,
}

pub struct CreditsService {
    db: DatabaseConnection,
}

impl CreditsService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Get the user's balance row, creating an empty active account if needed
    #[instrument(skip(self))]
    pub async fn ensure_balance(&self, user_id: Uuid) -> Result<credits_balance::Model> {
        ensure_balance_row(&self.db, user_id).await
    }

    /// Current balance, after retiring any batches that lapsed since the last sweep
    #[instrument(skip(self))]
    pub async fn get_credits_balance(&self, user_id: Uuid) -> Result<credits_balance::Model> {
        let txn = self.db.begin().await?;

        ensure_balance_row(&txn, user_id).await?;
        let balance = lock_balance_row(&txn, user_id)
            .await?
            .ok_or_else(|| missing_balance(user_id))?;
        let (balance, _) = self
            .expire_account_batches(balance, db_now(), &txn)
            .await?;

        txn.commit().await?;
        Ok(balance)
    }

    /// Whether the account is active and holds at least `required` credits
    #[instrument(skip(self))]
    pub async fn check_credits_available(
        &self,
        user_id: Uuid,
        required: i32,
    ) -> Result<(bool, credits_balance::Model)> {
        let balance = self.get_credits_balance(user_id).await?;
        let available =
            balance.status == CreditsBalanceStatus::Active && balance.balance >= required;
        Ok((available, balance))
    }

    /// Grant credits: creates one batch and one ledger transaction atomically
    #[instrument(skip(self, grant), fields(user_id = %grant.user_id, amount = grant.amount))]
    pub async fn grant_credits(&self, grant: GrantCredits) -> Result<GrantCreditsData> {
        let txn = self.db.begin().await?;

        match self.grant_credits_in_txn(grant, &txn).await {
            Ok(granted) => {
                txn.commit().await?;
                Ok(granted)
            }
            Err(e) => {
                txn.rollback().await?;
                Err(e)
            }
        }
    }

    /// Grant credits within an existing transaction
    /// Used by services that need to combine eligibility checks with the grant
    #[instrument(skip(self, grant, txn), fields(user_id = %grant.user_id, amount = grant.amount))]
    pub async fn grant_credits_in_txn(
        &self,
        grant: GrantCredits,
        txn: &DatabaseTransaction,
    ) -> Result<GrantCreditsData> {
        if grant.amount <= 0 {
            return Err(ApiError::BadRequest(
                "Credit amount must be greater than 0".to_string(),
            ));
        }

        let user_id = grant.user_id;
        let now = db_now();

        ensure_balance_row(txn, user_id).await?;
        let balance = lock_balance_row(txn, user_id)
            .await?
            .ok_or_else(|| missing_balance(user_id))?;

        if balance.status == CreditsBalanceStatus::Frozen {
            return Err(ApiError::AccountFrozen(user_id));
        }

        let (balance, _) = self.expire_account_batches(balance, now, txn).await?;

        let new_balance = balance.balance.checked_add(grant.amount).ok_or_else(|| {
            ApiError::BadRequest("Grant would overflow the account balance".to_string())
        })?;

        // Insert the batch; a repeated (source_type, source_ref) inserts nothing
        let batch_id = Uuid::new_v4();
        let new_batch = credits_batch::ActiveModel {
            id: Set(batch_id),
            user_id: Set(user_id),
            amount: Set(grant.amount),
            remaining: Set(grant.amount),
            issued_at: Set(now),
            expires_at: Set(grant.expires_at),
            status: Set(CreditsBatchStatus::Active),
            source_type: Set(grant.source_type),
            source_ref: Set(grant.source_ref.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = credits_batch::Entity::insert(new_batch)
            .on_conflict(
                OnConflict::columns([
                    credits_batch::Column::SourceType,
                    credits_batch::Column::SourceRef,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(txn)
            .await?;

        if inserted == 0 {
            return Err(ApiError::Conflict(format!(
                "Credits for {:?} source {} were already granted",
                grant.source_type,
                grant.source_ref.as_deref().unwrap_or_default()
            )));
        }

        let metadata = merge_metadata(
            grant.metadata,
            json!({ "batchId": batch_id, "sourceRef": grant.source_ref }),
        );

        let transaction_id = insert_ledger_entry(
            txn,
            LedgerEntry {
                user_id,
                transaction_type: grant.transaction_type,
                amount: grant.amount,
                debit_account: grant.debit_account.to_string(),
                credit_account: LedgerAccount::Wallet(user_id).to_string(),
                balance_after: new_balance,
                description: grant.description,
                metadata: Some(metadata),
                idempotency_key: None,
                batches: vec![(batch_id, grant.amount)],
                created_at: now,
            },
        )
        .await?;

        let total_earned = balance.total_earned.saturating_add(grant.amount);
        let mut balance_active: credits_balance::ActiveModel = balance.into();
        balance_active.balance = Set(new_balance);
        balance_active.total_earned = Set(total_earned);
        balance_active.updated_at = Set(now);
        balance_active.update(txn).await?;

        info!(
            user_id = %user_id,
            batch_id = %batch_id,
            transaction_id = %transaction_id,
            amount = grant.amount,
            new_balance,
            "Granted credits"
        );

        Ok(GrantCreditsData {
            batch_id,
            transaction_id,
            amount: grant.amount,
            new_balance,
        })
    }

    /// Consume credits from eligible batches, soonest expiry first
    ///
    /// Writes one consumption transaction linked to every batch it drew from.
    /// Nothing changes when the eligible total is short.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, amount = request.amount))]
    pub async fn consume_credits(&self, request: ConsumeCredits) -> Result<ConsumeCreditsData> {
        if request.amount <= 0 {
            return Err(ApiError::BadRequest(
                "Consumption amount must be greater than 0".to_string(),
            ));
        }

        let user_id = request.user_id;
        let amount = request.amount;
        let txn = self.db.begin().await?;

        // 1. Lock the account; this serializes concurrent debits
        let Some(balance) = lock_balance_row(&txn, user_id).await? else {
            txn.rollback().await?;
            return Err(ApiError::InsufficientCredits {
                required: amount,
                available: 0,
            });
        };

        if balance.status == CreditsBalanceStatus::Frozen {
            txn.rollback().await?;
            return Err(ApiError::AccountFrozen(user_id));
        }

        // 2. Replays return the original outcome
        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(previous) = self.find_replay(user_id, amount, key, &txn).await? {
                txn.commit().await?;
                info!(
                    user_id = %user_id,
                    transaction_id = %previous.transaction_id,
                    "Replayed idempotent consumption"
                );
                return Ok(previous);
            }
        }

        // 3. Retire lapsed batches so the cached balance matches the batches
        let now = db_now();
        let (balance, _) = self.expire_account_batches(balance, now, &txn).await?;

        // 4. Eligible batches in consumption order
        let batches = credits_batch::Entity::find()
            .filter(credits_batch::Column::UserId.eq(user_id))
            .filter(credits_batch::Column::Status.eq(CreditsBatchStatus::Active))
            .filter(credits_batch::Column::Remaining.gt(0))
            .filter(
                Condition::any()
                    .add(credits_batch::Column::ExpiresAt.is_null())
                    .add(credits_batch::Column::ExpiresAt.gte(now)),
            )
            .order_by_asc(credits_batch::Column::ExpiresAt)
            .order_by_asc(credits_batch::Column::IssuedAt)
            .order_by_asc(credits_batch::Column::Id)
            .lock_exclusive()
            .all(&txn)
            .await?;

        let eligible_total: i32 = batches
            .iter()
            .filter(|b| b.is_eligible_at(now))
            .map(|b| b.remaining)
            .sum();
        if eligible_total != balance.balance {
            warn!(
                user_id = %user_id,
                cached = balance.balance,
                batches = eligible_total,
                "Cached balance differs from batch remainders, using batches"
            );
        }

        let draws = match plan_consumption(&batches, amount, now) {
            Ok(draws) => draws,
            Err(shortfall) => {
                txn.rollback().await?;
                return Err(ApiError::InsufficientCredits {
                    required: shortfall.required,
                    available: shortfall.available,
                });
            }
        };

        // 5. Draw down the batches
        for draw in &draws {
            let batch = batches
                .iter()
                .find(|b| b.id == draw.batch_id)
                .cloned()
                .ok_or_else(|| {
                    ApiError::Internal(anyhow!("Planned batch {} not loaded", draw.batch_id))
                })?;

            let mut batch_active: credits_batch::ActiveModel = batch.into();
            batch_active.remaining = Set(draw.remaining_after);
            batch_active.status = Set(if draw.remaining_after == 0 {
                CreditsBatchStatus::Consumed
            } else {
                CreditsBatchStatus::Active
            });
            batch_active.updated_at = Set(now);
            batch_active.update(&txn).await?;
        }

        // 6. Ledger entry and balance
        let new_balance = eligible_total - amount;
        let consumed_batches: Vec<ConsumedBatch> = draws
            .iter()
            .map(|d| ConsumedBatch {
                batch_id: d.batch_id,
                amount: d.amount,
            })
            .collect();

        let metadata = merge_metadata(
            request.metadata,
            json!({
                "serviceName": request.service_name,
                "consumedBatches": consumed_batches,
            }),
        );

        let transaction_id = insert_ledger_entry(
            &txn,
            LedgerEntry {
                user_id,
                transaction_type: CreditsTransactionType::Consumption,
                amount,
                debit_account: LedgerAccount::Wallet(user_id).to_string(),
                credit_account: LedgerAccount::Service(request.service_name.clone()).to_string(),
                balance_after: new_balance,
                description: Some(
                    request
                        .description
                        .unwrap_or_else(|| format!("Used by {}", request.service_name)),
                ),
                metadata: Some(metadata),
                idempotency_key: request.idempotency_key,
                batches: draws.iter().map(|d| (d.batch_id, d.amount)).collect(),
                created_at: now,
            },
        )
        .await?;

        let total_spent = balance.total_spent.saturating_add(amount);
        let mut balance_active: credits_balance::ActiveModel = balance.into();
        balance_active.balance = Set(new_balance);
        balance_active.total_spent = Set(total_spent);
        balance_active.updated_at = Set(now);
        balance_active.update(&txn).await?;

        txn.commit().await?;

        info!(
            user_id = %user_id,
            transaction_id = %transaction_id,
            service = %request.service_name,
            amount,
            batches = consumed_batches.len(),
            remaining_balance = new_balance,
            "Consumed credits"
        );

        Ok(ConsumeCreditsData {
            consumed_amount: amount,
            remaining_balance: new_balance,
            transaction_id,
            consumed_batches,
            replayed: false,
        })
    }

    /// Look up an earlier consumption by this user with the same idempotency key
    async fn find_replay(
        &self,
        user_id: Uuid,
        amount: i32,
        key: &str,
        txn: &DatabaseTransaction,
    ) -> Result<Option<ConsumeCreditsData>> {
        let Some(previous) = credits_transaction::Entity::find()
            .filter(credits_transaction::Column::UserId.eq(user_id))
            .filter(credits_transaction::Column::IdempotencyKey.eq(key))
            .one(txn)
            .await?
        else {
            return Ok(None);
        };

        if previous.transaction_type != CreditsTransactionType::Consumption
            || previous.amount != amount
        {
            return Err(ApiError::Conflict(format!(
                "Idempotency key {} was already used for a different request",
                key
            )));
        }

        let links = credits_transaction_batch::Entity::find()
            .filter(credits_transaction_batch::Column::TransactionId.eq(previous.id))
            .order_by_asc(credits_transaction_batch::Column::Id)
            .all(txn)
            .await?;

        Ok(Some(ConsumeCreditsData {
            consumed_amount: previous.amount,
            remaining_balance: previous.balance_after,
            transaction_id: previous.id,
            consumed_batches: links
                .into_iter()
                .map(|link| ConsumedBatch {
                    batch_id: link.batch_id,
                    amount: link.amount,
                })
                .collect(),
            replayed: true,
        }))
    }

    /// Mark the account's lapsed batches expired and debit their remainders
    ///
    /// The caller must hold the balance row lock. Returns the updated balance.
    async fn expire_account_batches(
        &self,
        balance: credits_balance::Model,
        now: OffsetDateTime,
        txn: &DatabaseTransaction,
    ) -> Result<(credits_balance::Model, Vec<ExpiredBatch>)> {
        let user_id = balance.user_id;
        let lapsed = credits_batch::Entity::find()
            .filter(credits_batch::Column::UserId.eq(user_id))
            .filter(credits_batch::Column::Status.eq(CreditsBatchStatus::Active))
            .filter(credits_batch::Column::Remaining.gt(0))
            .filter(credits_batch::Column::ExpiresAt.lt(now))
            .order_by_asc(credits_batch::Column::ExpiresAt)
            .order_by_asc(credits_batch::Column::IssuedAt)
            .lock_exclusive()
            .all(txn)
            .await?;

        if lapsed.is_empty() {
            return Ok((balance, Vec::new()));
        }

        let mut running = balance.balance;
        let mut expired = Vec::with_capacity(lapsed.len());

        for batch in lapsed {
            let expired_amount = batch.remaining;
            let batch_id = batch.id;
            let original_amount = batch.amount;
            let expires_at = batch.expires_at;

            if expired_amount > running {
                warn!(
                    user_id = %user_id,
                    batch_id = %batch_id,
                    cached = running,
                    expiring = expired_amount,
                    "Expiring more credits than the cached balance holds"
                );
            }
            running = (running - expired_amount).max(0);

            // Remaining is kept for the audit trail; the status closes the batch
            let mut batch_active: credits_batch::ActiveModel = batch.into();
            batch_active.status = Set(CreditsBatchStatus::Expired);
            batch_active.updated_at = Set(now);
            batch_active.update(txn).await?;

            insert_ledger_entry(
                txn,
                LedgerEntry {
                    user_id,
                    transaction_type: CreditsTransactionType::Expiration,
                    amount: expired_amount,
                    debit_account: LedgerAccount::Wallet(user_id).to_string(),
                    credit_account: LedgerAccount::Expired.to_string(),
                    balance_after: running,
                    description: Some(format!("Batch {} expired", batch_id)),
                    metadata: Some(json!({
                        "batchId": batch_id,
                        "originalAmount": original_amount,
                        "expiredAmount": expired_amount,
                        "expiresAt": expires_at.map(|t| t.unix_timestamp()),
                    })),
                    idempotency_key: None,
                    batches: vec![(batch_id, expired_amount)],
                    created_at: now,
                },
            )
            .await?;

            expired.push(ExpiredBatch {
                batch_id,
                user_id,
                expired_amount,
            });
        }

        let mut balance_active: credits_balance::ActiveModel = balance.into();
        balance_active.balance = Set(running);
        balance_active.updated_at = Set(now);
        let balance = balance_active.update(txn).await?;

        Ok((balance, expired))
    }

    /// Expire every lapsed batch across all accounts
    ///
    /// Each account is handled in its own transaction under its balance lock.
    #[instrument(skip(self))]
    pub async fn process_expired_batches(&self) -> Result<Vec<ExpiredBatch>> {
        let now = db_now();

        let user_ids: Vec<Uuid> = credits_batch::Entity::find()
            .select_only()
            .column(credits_batch::Column::UserId)
            .distinct()
            .filter(credits_batch::Column::Status.eq(CreditsBatchStatus::Active))
            .filter(credits_batch::Column::Remaining.gt(0))
            .filter(credits_batch::Column::ExpiresAt.lt(now))
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut results = Vec::new();
        for user_id in user_ids {
            let txn = self.db.begin().await?;

            ensure_balance_row(&txn, user_id).await?;
            let balance = lock_balance_row(&txn, user_id)
                .await?
                .ok_or_else(|| missing_balance(user_id))?;
            let (_, expired) = self.expire_account_batches(balance, now, &txn).await?;

            txn.commit().await?;
            results.extend(expired);
        }

        if !results.is_empty() {
            let total_expired: i64 = results.iter().map(|r| r.expired_amount as i64).sum();
            info!(
                event_name = "credits.expired",
                count = results.len(),
                total_expired,
                "Expired credit batches"
            );
        }

        Ok(results)
    }

    /// Active, unexpired batches with credits left, in consumption order
    #[instrument(skip(self))]
    pub async fn get_user_active_batches(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<credits_batch::Model>> {
        let now = db_now();

        let batches = credits_batch::Entity::find()
            .filter(credits_batch::Column::UserId.eq(user_id))
            .filter(credits_batch::Column::Status.eq(CreditsBatchStatus::Active))
            .filter(credits_batch::Column::Remaining.gt(0))
            .filter(
                Condition::any()
                    .add(credits_batch::Column::ExpiresAt.is_null())
                    .add(credits_batch::Column::ExpiresAt.gte(now)),
            )
            .order_by_asc(credits_batch::Column::ExpiresAt)
            .order_by_asc(credits_batch::Column::IssuedAt)
            .order_by_asc(credits_batch::Column::Id)
            .all(&self.db)
            .await?;

        Ok(batches)
    }

    /// Ledger history, newest first
    #[instrument(skip(self))]
    pub async fn get_user_transactions(
        &self,
        user_id: Uuid,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<credits_transaction::Model>> {
        let limit = limit
            .unwrap_or(DEFAULT_TRANSACTIONS_LIMIT)
            .clamp(1, MAX_TRANSACTIONS_LIMIT);

        let transactions = credits_transaction::Entity::find()
            .filter(credits_transaction::Column::UserId.eq(user_id))
            .order_by_desc(credits_transaction::Column::CreatedAt)
            .order_by_desc(credits_transaction::Column::Id)
            .limit(limit)
            .offset(offset.unwrap_or(0).min(MAX_TRANSACTIONS_OFFSET))
            .all(&self.db)
            .await?;

        Ok(transactions)
    }

    /// Batches touched by one transaction
    #[instrument(skip(self))]
    pub async fn get_transaction_batches(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<credits_transaction_batch::Model>> {
        let links = credits_transaction_batch::Entity::find()
            .filter(credits_transaction_batch::Column::TransactionId.eq(transaction_id))
            .order_by_asc(credits_transaction_batch::Column::Id)
            .all(&self.db)
            .await?;

        Ok(links)
    }

    /// Whether any ledger entry exists for the user
    #[instrument(skip(self))]
    pub async fn has_transactions(&self, user_id: Uuid) -> Result<bool> {
        let count = credits_transaction::Entity::find()
            .filter(credits_transaction::Column::UserId.eq(user_id))
            .count(&self.db)
            .await?;

        Ok(count > 0)
    }

    #[instrument(skip(self))]
    pub async fn freeze_account(&self, user_id: Uuid) -> Result<credits_balance::Model> {
        self.set_account_status(user_id, CreditsBalanceStatus::Frozen)
            .await
    }

    #[instrument(skip(self))]
    pub async fn unfreeze_account(&self, user_id: Uuid) -> Result<credits_balance::Model> {
        self.set_account_status(user_id, CreditsBalanceStatus::Active)
            .await
    }

    async fn set_account_status(
        &self,
        user_id: Uuid,
        status: CreditsBalanceStatus,
    ) -> Result<credits_balance::Model> {
        let txn = self.db.begin().await?;

        ensure_balance_row(&txn, user_id).await?;
        let balance = lock_balance_row(&txn, user_id)
            .await?
            .ok_or_else(|| missing_balance(user_id))?;

        let mut balance_active: credits_balance::ActiveModel = balance.into();
        balance_active.status = Set(status);
        balance_active.updated_at = Set(db_now());
        let balance = balance_active.update(&txn).await?;

        txn.commit().await?;

        info!(user_id = %user_id, status = ?status, "Updated credits account status");
        Ok(balance)
    }
}

/// Create the balance row if missing and return it.
/// Safe under concurrency: losers of the insert race read the winner's row.
async fn ensure_balance_row<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<credits_balance::Model> {
    let now = db_now();
    let new_balance = credits_balance::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        balance: Set(0),
        total_earned: Set(0),
        total_spent: Set(0),
        status: Set(CreditsBalanceStatus::Active),
        created_at: Set(now),
        updated_at: Set(now),
    };

    credits_balance::Entity::insert(new_balance)
        .on_conflict(
            OnConflict::column(credits_balance::Column::UserId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    credits_balance::Entity::find()
        .filter(credits_balance::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| missing_balance(user_id))
}

/// SELECT ... FOR UPDATE on the account's balance row
async fn lock_balance_row(
    txn: &DatabaseTransaction,
    user_id: Uuid,
) -> Result<Option<credits_balance::Model>> {
    let balance = credits_balance::Entity::find()
        .filter(credits_balance::Column::UserId.eq(user_id))
        .lock_exclusive()
        .one(txn)
        .await?;

    Ok(balance)
}

async fn insert_ledger_entry(txn: &DatabaseTransaction, entry: LedgerEntry) -> Result<Uuid> {
    let transaction_id = Uuid::new_v4();

    let new_transaction = credits_transaction::ActiveModel {
        id: Set(transaction_id),
        user_id: Set(entry.user_id),
        transaction_type: Set(entry.transaction_type),
        amount: Set(entry.amount),
        debit_account: Set(entry.debit_account),
        credit_account: Set(entry.credit_account),
        balance_after: Set(entry.balance_after),
        description: Set(entry.description),
        metadata: Set(entry.metadata),
        idempotency_key: Set(entry.idempotency_key),
        created_at: Set(entry.created_at),
    };

    credits_transaction::Entity::insert(new_transaction)
        .exec_without_returning(txn)
        .await
        .map_err(|e| {
            if ApiError::is_unique_violation(&e) {
                ApiError::Conflict("Idempotency key already used".to_string())
            } else {
                ApiError::Database(e)
            }
        })?;

    if !entry.batches.is_empty() {
        let links = entry
            .batches
            .into_iter()
            .map(|(batch_id, amount)| credits_transaction_batch::ActiveModel {
                // Time-ordered, so links read back in draw order
                id: Set(Uuid::now_v7()),
                transaction_id: Set(transaction_id),
                batch_id: Set(batch_id),
                amount: Set(amount),
            });

        credits_transaction_batch::Entity::insert_many(links)
            .exec_without_returning(txn)
            .await?;
    }

    Ok(transaction_id)
}

fn missing_balance(user_id: Uuid) -> ApiError {
    ApiError::Internal(anyhow!(
        "Credits balance row missing for user {} after insert",
        user_id
    ))
}

/// Current time at Postgres `timestamptz` precision (microseconds)
///
/// Bound query parameters and in-memory comparisons must agree on the same instant.
pub(crate) fn db_now() -> OffsetDateTime {
    truncate_to_micros(OffsetDateTime::now_utc())
}

fn truncate_to_micros(t: OffsetDateTime) -> OffsetDateTime {
    t.replace_nanosecond(t.nanosecond() / 1_000 * 1_000)
        .unwrap_or(t)
}

/// Caller metadata with bookkeeping keys layered on top
fn merge_metadata(base: Option<Json>, bookkeeping: Json) -> Json {
    let mut merged = match base {
        Some(Json::Object(map)) => map,
        Some(Json::Null) | None => Map::new(),
        Some(other) => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };

    if let Json::Object(extra) = bookkeeping {
        merged.extend(extra);
    }

    Json::Object(merged)
}
