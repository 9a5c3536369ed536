//! Extension methods for credits_batch entity
//!
//! Consumption rules that complement the generated entity in
//! entity/src/credits_batch.rs

use std::cmp::Ordering;

use entity::{credits_batch, sea_orm_active_enums::CreditsBatchStatus};
use time::OffsetDateTime;
use uuid::Uuid;

/// Extension trait for CreditsBatch model
pub trait CreditsBatchExt {
    /// Expired once `now` is past `expires_at`; the expiry instant itself is still usable
    fn is_expired_at(&self, now: OffsetDateTime) -> bool;

    /// Active, not expired, and with credits left
    fn is_eligible_at(&self, now: OffsetDateTime) -> bool;

    /// Check if there are remaining credits
    fn has_remaining(&self) -> bool;
}

impl CreditsBatchExt for credits_batch::Model {
    fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        matches!(self.expires_at, Some(expires_at) if now > expires_at)
    }

    fn is_eligible_at(&self, now: OffsetDateTime) -> bool {
        self.status == CreditsBatchStatus::Active
            && self.has_remaining()
            && !self.is_expired_at(now)
    }

    fn has_remaining(&self) -> bool {
        self.remaining > 0
    }
}

/// Consumption order: soonest expiry first, never-expiring batches last,
/// then oldest issue, then id.
pub fn fifo_order(a: &credits_batch::Model, b: &credits_batch::Model) -> Ordering {
    let expiry = match (a.expires_at, b.expires_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    expiry
        .then_with(|| a.issued_at.cmp(&b.issued_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Credits drawn from one batch by a consumption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDraw {
    pub batch_id: Uuid,
    pub amount: i32,
    pub remaining_after: i32,
}

/// Eligible credits fall short of the requested amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub required: i32,
    pub available: i32,
}

/// Work out which batches cover `amount`, in FIFO order.
///
/// Ineligible batches are skipped. Nothing is drawn unless the eligible total
/// covers the whole amount.
pub fn plan_consumption(
    batches: &[credits_batch::Model],
    amount: i32,
    now: OffsetDateTime,
) -> Result<Vec<BatchDraw>, Shortfall> {
    let mut eligible: Vec<&credits_batch::Model> =
        batches.iter().filter(|b| b.is_eligible_at(now)).collect();
    eligible.sort_by(|a, b| fifo_order(a, b));

    let available: i64 = eligible.iter().map(|b| b.remaining as i64).sum();
    if available < amount as i64 {
        return Err(Shortfall {
            required: amount,
            available: available.min(i32::MAX as i64) as i32,
        });
    }

    let mut outstanding = amount;
    let mut draws = Vec::new();
    for batch in eligible {
        if outstanding == 0 {
            break;
        }
        let take = outstanding.min(batch.remaining);
        draws.push(BatchDraw {
            batch_id: batch.id,
            amount: take,
            remaining_after: batch.remaining - take,
        });
        outstanding -= take;
    }

    Ok(draws)
}
