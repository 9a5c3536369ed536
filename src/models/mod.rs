// Request/Response models
pub mod common;
pub mod credits;
pub mod credits_batch_ext; // Extension methods for entity::credits_batch
pub mod ledger;
