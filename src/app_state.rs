use crate::{
    config::Config,
    services::{BillingCreditsService, CreditsService, JWTService, RegistrationBonusService},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub credits_service: Arc<CreditsService>,
    pub registration_bonus_service: Arc<RegistrationBonusService>,
    pub billing_credits_service: Arc<BillingCreditsService>,
    pub jwt_service: Arc<JWTService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let db = sea_orm::Database::connect(&config.database.url).await?;

        Ok(Self::with_connection(db, config))
    }

    /// Build the state around an existing connection
    pub fn with_connection(db: DatabaseConnection, config: Config) -> Self {
        let credits_service = Arc::new(CreditsService::new(db.clone()));
        let registration_bonus_service = Arc::new(RegistrationBonusService::new(
            credits_service.clone(),
            &config.credits,
        ));
        let billing_credits_service = Arc::new(BillingCreditsService::new(
            db,
            credits_service.clone(),
            &config.credits,
        ));
        let jwt_service = Arc::new(JWTService::new(Arc::new(config.auth.clone())));

        Self {
            credits_service,
            registration_bonus_service,
            billing_credits_service,
            jwt_service,
            config: Arc::new(config),
        }
    }
}
