//! Double-entry account names used on ledger transactions.
//!
//! Every transaction moves credits from a debit account to a credit account.
//! Grants debit a funding source and credit the user's wallet; consumption and
//! expiry debit the wallet.

use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerAccount {
    /// A user's spendable credits
    Wallet(Uuid),
    RegistrationBonus,
    Expired,
    Subscription(String),
    Payment(String),
    Admin(Uuid),
    Service(String),
}

impl fmt::Display for LedgerAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wallet(user_id) => write!(f, "WALLET:{}", user_id),
            Self::RegistrationBonus => f.write_str("SYSTEM:registration_bonus"),
            Self::Expired => f.write_str("SYSTEM:expired"),
            Self::Subscription(id) => write!(f, "SUBSCRIPTION:{}", id),
            Self::Payment(id) => write!(f, "PAYMENT:{}", id),
            Self::Admin(admin_id) => write!(f, "ADMIN:{}", admin_id),
            Self::Service(name) => write!(f, "SERVICE:{}", name),
        }
    }
}
