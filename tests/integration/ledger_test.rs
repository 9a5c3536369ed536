//! Ledger behaviour against a real Postgres (`DATABASE_URL`)

use crate::common::{setup_test_db, test_config};
use credits_ledger::{
    error::ApiError,
    models::ledger::LedgerAccount,
    services::{
        billing_credits_service::SubscriptionPeriod,
        credits_service::{ConsumeCredits, GrantCredits},
        BillingCreditsService, CreditsService, RegistrationBonusService,
    },
};
use entity::{
    credits_batch,
    sea_orm_active_enums::{
        CreditsBatchSource, CreditsBatchStatus, CreditsTransactionType,
    },
};
use sea_orm::{EntityTrait, DatabaseConnection};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

fn bonus_grant(user_id: Uuid, amount: i32, expires_at: Option<OffsetDateTime>) -> GrantCredits {
    GrantCredits {
        user_id,
        amount,
        source_type: CreditsBatchSource::Bonus,
        debit_account: LedgerAccount::RegistrationBonus,
        transaction_type: CreditsTransactionType::AdminGrant,
        expires_at,
        source_ref: Some(format!("test:{}", Uuid::new_v4())),
        description: None,
        metadata: None,
    }
}

fn consume(user_id: Uuid, amount: i32) -> ConsumeCredits {
    ConsumeCredits {
        user_id,
        amount,
        service_name: "chat".to_string(),
        description: None,
        metadata: None,
        idempotency_key: None,
    }
}

async fn batch(db: &DatabaseConnection, id: Uuid) -> credits_batch::Model {
    credits_batch::Entity::find_by_id(id)
        .one(db)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_consumption_uses_soonest_expiring_batch_first() {
    let db = setup_test_db().await;
    let service = CreditsService::new(db.clone());
    let user_id = Uuid::new_v4();
    let now = OffsetDateTime::now_utc();

    let never = service
        .grant_credits(bonus_grant(user_id, 100, None))
        .await
        .unwrap();
    let late = service
        .grant_credits(bonus_grant(user_id, 50, Some(now + Duration::days(30))))
        .await
        .unwrap();
    let soon = service
        .grant_credits(bonus_grant(user_id, 30, Some(now + Duration::days(1))))
        .await
        .unwrap();
    assert_eq!(soon.new_balance, 180);

    let consumed = service.consume_credits(consume(user_id, 60)).await.unwrap();

    assert_eq!(consumed.remaining_balance, 120);
    assert_eq!(consumed.consumed_batches.len(), 2);
    assert_eq!(consumed.consumed_batches[0].batch_id, soon.batch_id);
    assert_eq!(consumed.consumed_batches[0].amount, 30);
    assert_eq!(consumed.consumed_batches[1].batch_id, late.batch_id);
    assert_eq!(consumed.consumed_batches[1].amount, 30);

    let soon_batch = batch(&db, soon.batch_id).await;
    assert_eq!(soon_batch.remaining, 0);
    assert_eq!(soon_batch.status, CreditsBatchStatus::Consumed);
    assert_eq!(batch(&db, late.batch_id).await.remaining, 20);
    assert_eq!(batch(&db, never.batch_id).await.remaining, 100);

    let balance = service.get_credits_balance(user_id).await.unwrap();
    assert_eq!(balance.balance, 120);
    assert_eq!(balance.total_earned, 180);
    assert_eq!(balance.total_spent, 60);

    // One ledger entry per call, linked to both batches
    let history = service
        .get_user_transactions(user_id, None, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].id, consumed.transaction_id);
    assert_eq!(history[0].transaction_type, CreditsTransactionType::Consumption);
    assert_eq!(history[0].balance_after, 120);
    assert_eq!(history[0].debit_account, format!("WALLET:{}", user_id));
    assert_eq!(history[0].credit_account, "SERVICE:chat");

    let links = service
        .get_transaction_batches(consumed.transaction_id)
        .await
        .unwrap();
    assert_eq!(links.len(), 2);
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_insufficient_credits_change_nothing() {
    let db = setup_test_db().await;
    let service = CreditsService::new(db.clone());
    let user_id = Uuid::new_v4();

    let first = service
        .grant_credits(bonus_grant(user_id, 20, None))
        .await
        .unwrap();
    let second = service
        .grant_credits(bonus_grant(user_id, 10, None))
        .await
        .unwrap();

    let result = service.consume_credits(consume(user_id, 31)).await;
    match result {
        Err(ApiError::InsufficientCredits {
            required,
            available,
        }) => {
            assert_eq!(required, 31);
            assert_eq!(available, 30);
        }
        other => panic!("expected insufficient credits, got {:?}", other),
    }

    assert_eq!(batch(&db, first.batch_id).await.remaining, 20);
    assert_eq!(batch(&db, second.batch_id).await.remaining, 10);
    assert_eq!(service.get_credits_balance(user_id).await.unwrap().balance, 30);

    let history = service
        .get_user_transactions(user_id, None, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_unknown_account_has_nothing_to_consume() {
    let db = setup_test_db().await;
    let service = CreditsService::new(db);

    let result = service.consume_credits(consume(Uuid::new_v4(), 1)).await;

    assert!(matches!(
        result,
        Err(ApiError::InsufficientCredits { available: 0, .. })
    ));
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_frozen_account_blocks_grant_and_consume() {
    let db = setup_test_db().await;
    let service = CreditsService::new(db);
    let user_id = Uuid::new_v4();

    service
        .grant_credits(bonus_grant(user_id, 50, None))
        .await
        .unwrap();
    service.freeze_account(user_id).await.unwrap();

    assert!(matches!(
        service.consume_credits(consume(user_id, 10)).await,
        Err(ApiError::AccountFrozen(_))
    ));
    assert!(matches!(
        service.grant_credits(bonus_grant(user_id, 10, None)).await,
        Err(ApiError::AccountFrozen(_))
    ));

    let (available, _) = service.check_credits_available(user_id, 10).await.unwrap();
    assert!(!available);

    service.unfreeze_account(user_id).await.unwrap();
    let consumed = service.consume_credits(consume(user_id, 10)).await.unwrap();
    assert_eq!(consumed.remaining_balance, 40);
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_idempotent_consumption_replays() {
    let db = setup_test_db().await;
    let service = CreditsService::new(db);
    let user_id = Uuid::new_v4();
    let key = format!("req-{}", Uuid::new_v4());

    service
        .grant_credits(bonus_grant(user_id, 100, None))
        .await
        .unwrap();

    let request = ConsumeCredits {
        idempotency_key: Some(key.clone()),
        ..consume(user_id, 25)
    };
    let first = service.consume_credits(request.clone()).await.unwrap();
    let replay = service.consume_credits(request).await.unwrap();

    assert!(!first.replayed);
    assert!(replay.replayed);
    assert_eq!(replay.transaction_id, first.transaction_id);
    assert_eq!(replay.remaining_balance, first.remaining_balance);
    assert_eq!(
        replay.consumed_batches.iter().map(|b| b.amount).sum::<i32>(),
        25
    );
    assert_eq!(service.get_credits_balance(user_id).await.unwrap().balance, 75);

    // Same key with a different amount is not a replay
    let mismatch = ConsumeCredits {
        idempotency_key: Some(key),
        ..consume(user_id, 30)
    };
    assert!(matches!(
        service.consume_credits(mismatch).await,
        Err(ApiError::Conflict(_))
    ));
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_idempotency_key_is_scoped_to_user() {
    let db = setup_test_db().await;
    let service = CreditsService::new(db);
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let key = format!("req-{}", Uuid::new_v4());

    for user_id in [alice, bob] {
        service
            .grant_credits(bonus_grant(user_id, 100, None))
            .await
            .unwrap();
    }

    let first = service
        .consume_credits(ConsumeCredits {
            idempotency_key: Some(key.clone()),
            ..consume(alice, 25)
        })
        .await
        .unwrap();
    // A different amount would be a conflict for alice, but bob owns his own key space
    let second = service
        .consume_credits(ConsumeCredits {
            idempotency_key: Some(key),
            ..consume(bob, 40)
        })
        .await
        .unwrap();

    assert!(!first.replayed);
    assert!(!second.replayed);
    assert_ne!(first.transaction_id, second.transaction_id);
    assert_eq!(service.get_credits_balance(alice).await.unwrap().balance, 75);
    assert_eq!(service.get_credits_balance(bob).await.unwrap().balance, 60);
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_huge_transactions_offset_returns_empty_page() {
    let db = setup_test_db().await;
    let service = CreditsService::new(db);
    let user_id = Uuid::new_v4();

    service
        .grant_credits(bonus_grant(user_id, 10, None))
        .await
        .unwrap();

    let page = service
        .get_user_transactions(user_id, Some(20), Some(u64::MAX))
        .await
        .unwrap();

    assert!(page.is_empty());
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_duplicate_source_ref_is_conflict() {
    let db = setup_test_db().await;
    let service = CreditsService::new(db);
    let user_id = Uuid::new_v4();

    let grant = bonus_grant(user_id, 10, None);
    service.grant_credits(grant.clone()).await.unwrap();

    assert!(matches!(
        service.grant_credits(grant).await,
        Err(ApiError::Conflict(_))
    ));
    assert_eq!(service.get_credits_balance(user_id).await.unwrap().balance, 10);
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_lapsed_batches_expire() {
    let db = setup_test_db().await;
    let service = CreditsService::new(db.clone());
    let user_id = Uuid::new_v4();
    let now = OffsetDateTime::now_utc();

    let lapsed = service
        .grant_credits(bonus_grant(user_id, 40, Some(now - Duration::hours(1))))
        .await
        .unwrap();
    service
        .grant_credits(bonus_grant(user_id, 15, None))
        .await
        .unwrap();

    // Not spendable even before the sweep runs
    let batches = service.get_user_active_batches(user_id).await.unwrap();
    assert_eq!(batches.len(), 1);
    assert!(matches!(
        service.consume_credits(consume(user_id, 20)).await,
        Err(ApiError::InsufficientCredits { available: 15, .. })
    ));

    let balance = service.get_credits_balance(user_id).await.unwrap();
    assert_eq!(balance.balance, 15);

    let expired = batch(&db, lapsed.batch_id).await;
    assert_eq!(expired.status, CreditsBatchStatus::Expired);

    let history = service
        .get_user_transactions(user_id, None, None)
        .await
        .unwrap();
    let expiration = history
        .iter()
        .find(|tx| tx.transaction_type == CreditsTransactionType::Expiration)
        .unwrap();
    assert_eq!(expiration.amount, 40);
    assert_eq!(expiration.credit_account, "SYSTEM:expired");

    // Already retired, so the sweep has nothing left for this user
    let swept = service.process_expired_batches().await.unwrap();
    assert!(swept.iter().all(|b| b.user_id != user_id));
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_sweep_expires_across_accounts() {
    let db = setup_test_db().await;
    let service = CreditsService::new(db);
    let now = OffsetDateTime::now_utc();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    let a = service
        .grant_credits(bonus_grant(alice, 10, Some(now - Duration::minutes(5))))
        .await
        .unwrap();
    let b = service
        .grant_credits(bonus_grant(bob, 20, Some(now - Duration::minutes(5))))
        .await
        .unwrap();

    let swept = service.process_expired_batches().await.unwrap();

    assert!(swept
        .iter()
        .any(|e| e.batch_id == a.batch_id && e.expired_amount == 10));
    assert!(swept
        .iter()
        .any(|e| e.batch_id == b.batch_id && e.expired_amount == 20));
    assert_eq!(service.get_credits_balance(bob).await.unwrap().balance, 0);
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_registration_bonus_granted_once() {
    let db = setup_test_db().await;
    let config = test_config(None);
    let credits = Arc::new(CreditsService::new(db));
    let bonus = RegistrationBonusService::new(credits.clone(), &config.credits);
    let user_id = Uuid::new_v4();

    let first = bonus.ensure_registration_bonus(user_id).await.unwrap();
    let second = bonus.ensure_registration_bonus(user_id).await.unwrap();

    assert_eq!(first.unwrap().amount, 200);
    assert!(second.is_none());
    assert_eq!(credits.get_credits_balance(user_id).await.unwrap().balance, 200);
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_subscription_period_credited_once() {
    let db = setup_test_db().await;
    let config = test_config(None);
    let credits = Arc::new(CreditsService::new(db.clone()));
    let billing = BillingCreditsService::new(db, credits.clone(), &config.credits);
    let user_id = Uuid::new_v4();
    let start = OffsetDateTime::now_utc();

    let period = SubscriptionPeriod {
        user_id,
        subscription_id: format!("sub_{}", Uuid::new_v4().simple()),
        plan: "Pro".to_string(),
        period_start: start,
        period_end: start + Duration::days(365),
        billing_reason: Some("subscription_create".to_string()),
    };

    let first = billing.grant_subscription_period(period.clone()).await.unwrap();
    let again = billing.grant_subscription_period(period).await.unwrap();

    assert!(first.yearly);
    assert_eq!(first.credits, 7500 * 12);
    assert!(first.grant.is_some());
    assert!(again.already_granted);
    assert!(again.grant.is_none());
    assert_eq!(
        credits.get_credits_balance(user_id).await.unwrap().balance,
        90_000
    );
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_purchase_and_admin_grant() {
    let db = setup_test_db().await;
    let config = test_config(None);
    let credits = Arc::new(CreditsService::new(db.clone()));
    let billing = BillingCreditsService::new(db, credits.clone(), &config.credits);
    let user_id = Uuid::new_v4();
    let admin_id = Uuid::new_v4();
    let payment_id = format!("pay_{}", Uuid::new_v4().simple());

    let purchase = billing
        .grant_purchase(user_id, None, &payment_id, Some("standard"))
        .await
        .unwrap();
    assert_eq!(purchase.amount, 8000);

    assert!(matches!(
        billing
            .grant_purchase(user_id, None, &payment_id, Some("standard"))
            .await,
        Err(ApiError::Conflict(_))
    ));

    let granted = billing
        .admin_grant(admin_id, user_id, 500, "goodwill")
        .await
        .unwrap();
    assert_eq!(granted.new_balance, 8500);

    let history = credits
        .get_user_transactions(user_id, Some(1), None)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].transaction_type, CreditsTransactionType::AdminGrant);
    assert_eq!(history[0].debit_account, format!("ADMIN:{}", admin_id));
}
