use crate::{
    config::CreditsConfig,
    error::{ApiError, Result},
    models::{credits::GrantCreditsData, ledger::LedgerAccount},
    services::credits_service::{db_now, CreditsService, GrantCredits},
};
use entity::sea_orm_active_enums::{CreditsBatchSource, CreditsTransactionType};
use serde_json::json;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use tracing::{info, instrument};
use uuid::Uuid;

/// Source reference that makes the bonus a one-time grant per user
pub fn registration_source_ref(user_id: Uuid) -> String {
    format!("registration:{}", user_id)
}

pub struct RegistrationBonusService {
    credits_service: Arc<CreditsService>,
    config: CreditsConfig,
}

impl RegistrationBonusService {
    pub fn new(credits_service: Arc<CreditsService>, config: &CreditsConfig) -> Self {
        Self {
            credits_service,
            config: config.clone(),
        }
    }

    /// Grant the registration bonus the first time a user is seen
    ///
    /// Users with any ledger history are treated as existing users.
    /// Returns the grant when one was made.
    #[instrument(skip(self))]
    pub async fn ensure_registration_bonus(
        &self,
        user_id: Uuid,
    ) -> Result<Option<GrantCreditsData>> {
        if self.config.registration_bonus <= 0 {
            return Ok(None);
        }

        if self.credits_service.has_transactions(user_id).await? {
            return Ok(None);
        }

        let now = db_now();
        let granted_at = now
            .format(&Rfc3339)
            .map_err(|e| ApiError::Internal(e.into()))?;

        let grant = GrantCredits {
            user_id,
            amount: self.config.registration_bonus,
            source_type: CreditsBatchSource::Bonus,
            debit_account: LedgerAccount::RegistrationBonus,
            transaction_type: CreditsTransactionType::RegistrationBonus,
            expires_at: self.config.expires_at(now),
            source_ref: Some(registration_source_ref(user_id)),
            description: Some("Registration bonus".to_string()),
            metadata: Some(json!({
                "bonusType": "registration",
                "grantedAt": granted_at,
            })),
        };

        match self.credits_service.grant_credits(grant).await {
            Ok(granted) => {
                info!(
                    user_id = %user_id,
                    batch_id = %granted.batch_id,
                    amount = granted.amount,
                    "Registration bonus granted"
                );
                Ok(Some(granted))
            }
            // A concurrent request granted it first
            Err(ApiError::Conflict(_)) => Ok(None),
            Err(ApiError::AccountFrozen(_)) => {
                info!(user_id = %user_id, "Registration bonus skipped: account frozen");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
