// Service modules
pub mod billing_credits_service;
pub mod credits_service;
pub mod expiry_worker;
pub mod jwt_service;
pub mod registration_bonus_service;

pub use billing_credits_service::BillingCreditsService;
pub use credits_service::CreditsService;
pub use expiry_worker::spawn_expiry_worker;
pub use jwt_service::JWTService;
pub use registration_bonus_service::RegistrationBonusService;
