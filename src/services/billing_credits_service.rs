//! Grants that originate outside the user's own actions: package purchases
//! and subscription periods reported by the billing integration, and manual
//! top-ups by administrators.

use crate::{
    config::CreditsConfig,
    error::{ApiError, Result},
    models::{
        credits::{GrantCreditsData, SubscriptionGrantData},
        ledger::LedgerAccount,
    },
    services::credits_service::{db_now, CreditsService, GrantCredits},
};
use entity::{
    credits_batch,
    sea_orm_active_enums::{CreditsBatchSource, CreditsTransactionType},
};
use sea_orm::{entity::*, query::*, DatabaseConnection};
use serde_json::json;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

/// Billing periods longer than this are yearly plans
const YEARLY_PERIOD_THRESHOLD_DAYS: i64 = 60;

/// A paid subscription period
#[derive(Debug, Clone)]
pub struct SubscriptionPeriod {
    pub user_id: Uuid,
    pub subscription_id: String,
    pub plan: String,
    pub period_start: OffsetDateTime,
    pub period_end: OffsetDateTime,
    pub billing_reason: Option<String>,
}

pub fn is_yearly_period(period_start: OffsetDateTime, period_end: OffsetDateTime) -> bool {
    let days = ((period_end - period_start).as_seconds_f64() / 86_400.0).round() as i64;
    days > YEARLY_PERIOD_THRESHOLD_DAYS
}

/// One grant per subscription and period start
pub fn subscription_period_key(subscription_id: &str, period_start: OffsetDateTime) -> String {
    format!("{}:{}", subscription_id, period_start.unix_timestamp())
}

/// Explicit credits win; otherwise the package decides the amount
pub fn resolve_purchase_amount(
    config: &CreditsConfig,
    credits: Option<i32>,
    package_id: Option<&str>,
) -> Result<i32> {
    match (credits, package_id) {
        (Some(credits), _) if credits > 0 => Ok(credits),
        (Some(credits), _) => Err(ApiError::BadRequest(format!(
            "Invalid credits value: {}",
            credits
        ))),
        (None, Some(package_id)) => config
            .package(package_id)
            .map(|p| p.credits)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown credit package: {}", package_id))),
        (None, None) => Err(ApiError::BadRequest(
            "Either credits or packageId is required".to_string(),
        )),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct BillingCreditsService {
    db: DatabaseConnection,
    credits_service: Arc<CreditsService>,
    config: CreditsConfig,
}

impl BillingCreditsService {
    pub fn new(
        db: DatabaseConnection,
        credits_service: Arc<CreditsService>,
        config: &CreditsConfig,
    ) -> Self {
        Self {
            db,
            credits_service,
            config: config.clone(),
        }
    }

    /// Credit a completed one-off payment. A repeated payment id is a conflict.
    #[instrument(skip(self))]
    pub async fn grant_purchase(
        &self,
        user_id: Uuid,
        credits: Option<i32>,
        payment_id: &str,
        package_id: Option<&str>,
    ) -> Result<GrantCreditsData> {
        let amount = resolve_purchase_amount(&self.config, credits, package_id)?;
        let now = db_now();

        let granted = self
            .credits_service
            .grant_credits(GrantCredits {
                user_id,
                amount,
                source_type: CreditsBatchSource::Purchase,
                debit_account: LedgerAccount::Payment(payment_id.to_string()),
                transaction_type: CreditsTransactionType::Purchase,
                expires_at: self.config.expires_at(now),
                source_ref: Some(payment_id.to_string()),
                description: Some(format!(
                    "Purchased {} credits ({})",
                    amount,
                    package_id.unwrap_or("custom")
                )),
                metadata: Some(json!({
                    "paymentId": payment_id,
                    "packageId": package_id,
                })),
            })
            .await?;

        info!(
            user_id = %user_id,
            payment_id,
            amount,
            batch_id = %granted.batch_id,
            "Credits purchased"
        );

        Ok(granted)
    }

    /// Credit a subscription period once. Yearly periods get twelve months of credits.
    #[instrument(skip(self), fields(user_id = %period.user_id, subscription_id = %period.subscription_id))]
    pub async fn grant_subscription_period(
        &self,
        period: SubscriptionPeriod,
    ) -> Result<SubscriptionGrantData> {
        if period.period_end <= period.period_start {
            return Err(ApiError::BadRequest(
                "periodEnd must be after periodStart".to_string(),
            ));
        }

        let monthly = self
            .config
            .monthly_credits_for_plan(&period.plan)
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "No monthly credits configured for plan: {}",
                    period.plan
                ))
            })?;

        let yearly = is_yearly_period(period.period_start, period.period_end);
        let credits = if yearly {
            monthly.checked_mul(12).ok_or_else(|| {
                ApiError::BadRequest(format!("Yearly credits overflow for plan {}", period.plan))
            })?
        } else {
            monthly
        };

        let period_key = subscription_period_key(&period.subscription_id, period.period_start);

        let existing = credits_batch::Entity::find()
            .filter(credits_batch::Column::SourceType.eq(CreditsBatchSource::Subscription))
            .filter(credits_batch::Column::SourceRef.eq(period_key.as_str()))
            .one(&self.db)
            .await?;

        if existing.is_some() {
            info!(period_key = %period_key, "Subscription period already credited, skipping");
            return Ok(SubscriptionGrantData {
                grant: None,
                already_granted: true,
                credits,
                yearly,
            });
        }

        let plan_label = capitalize(&period.plan);
        let description = if yearly {
            format!("{} yearly subscription credits ({} x 12)", plan_label, monthly)
        } else {
            format!("{} monthly subscription credits", plan_label)
        };

        let now = db_now();
        let result = self
            .credits_service
            .grant_credits(GrantCredits {
                user_id: period.user_id,
                amount: credits,
                source_type: CreditsBatchSource::Subscription,
                debit_account: LedgerAccount::Subscription(period.subscription_id.clone()),
                transaction_type: CreditsTransactionType::MonthlyGrant,
                expires_at: self.config.expires_at(now),
                source_ref: Some(period_key.clone()),
                description: Some(description),
                metadata: Some(json!({
                    "subscriptionId": period.subscription_id,
                    "planType": period.plan,
                    "billingReason": period.billing_reason,
                    "interval": if yearly { "year" } else { "month" },
                    "periodStart": period.period_start.unix_timestamp(),
                    "periodEnd": period.period_end.unix_timestamp(),
                })),
            })
            .await;

        match result {
            Ok(granted) => {
                info!(
                    period_key = %period_key,
                    credits,
                    yearly,
                    batch_id = %granted.batch_id,
                    "Subscription credits granted"
                );
                Ok(SubscriptionGrantData {
                    grant: Some(granted),
                    already_granted: false,
                    credits,
                    yearly,
                })
            }
            // Lost a race with a retried delivery of the same period
            Err(ApiError::Conflict(_)) => Ok(SubscriptionGrantData {
                grant: None,
                already_granted: true,
                credits,
                yearly,
            }),
            Err(e) => Err(e),
        }
    }

    /// Manual top-up by an administrator
    #[instrument(skip(self))]
    pub async fn admin_grant(
        &self,
        admin_id: Uuid,
        user_id: Uuid,
        amount: i32,
        reason: &str,
    ) -> Result<GrantCreditsData> {
        let now = db_now();

        let granted = self
            .credits_service
            .grant_credits(GrantCredits {
                user_id,
                amount,
                source_type: CreditsBatchSource::Bonus,
                debit_account: LedgerAccount::Admin(admin_id),
                transaction_type: CreditsTransactionType::AdminGrant,
                expires_at: self.config.expires_at(now),
                source_ref: Some(format!("admin:{}", Uuid::now_v7())),
                description: Some(format!("Admin grant: {}", reason)),
                metadata: Some(json!({
                    "grantType": "admin_manual",
                    "adminId": admin_id,
                    "reason": reason,
                })),
            })
            .await?;

        info!(
            admin_id = %admin_id,
            user_id = %user_id,
            amount,
            new_balance = granted.new_balance,
            "Admin granted credits"
        );

        Ok(granted)
    }
}
