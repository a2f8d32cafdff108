//! Domain types for caller accounts and their daily export usage.

use std::fmt::{Display, Formatter};

use time::Date;

/// Billing plan attached to an account. Unknown values degrade to `Free`
/// rather than failing, because plan strings are owned by the identity
/// subsystem and may grow variants we have not seen yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Free,
    Paid,
    Admin,
}

impl Plan {
    /// Total parse: never fails, anything unrecognised is `Free`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "PAID" => Self::Paid,
            "ADMIN" => Self::Admin,
            _ => Self::Free,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Paid => "PAID",
            Self::Admin => "ADMIN",
        }
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One day's worth of export usage. The count is only meaningful while
/// `date` equals the current day in the service reference timezone; a stale
/// window reads as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageWindow {
    pub date: Date,
    pub count: u32,
}

/// Snapshot of an account as stored by the identity/account subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRecord {
    pub account_id: String,
    pub plan: Plan,
    pub admin_override: bool,
    pub usage: Option<UsageWindow>,
}

impl AccountRecord {
    /// The shape assumed for callers the account store has never seen:
    /// free plan, no recorded usage.
    pub fn unseen(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            plan: Plan::Free,
            admin_override: false,
            usage: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parse_is_total() {
        assert_eq!(Plan::parse("PAID"), Plan::Paid);
        assert_eq!(Plan::parse("paid"), Plan::Paid);
        assert_eq!(Plan::parse(" admin "), Plan::Admin);
        assert_eq!(Plan::parse("FREE"), Plan::Free);
        assert_eq!(Plan::parse("enterprise"), Plan::Free);
        assert_eq!(Plan::parse(""), Plan::Free);
        assert_eq!(Plan::parse("💥"), Plan::Free);
    }

    #[test]
    fn unseen_accounts_default_to_free() {
        let account = AccountRecord::unseen("acct-1");
        assert_eq!(account.plan, Plan::Free);
        assert!(account.usage.is_none());
        assert!(!account.admin_override);
    }
}
