//! Daily export quota tracking.

use std::sync::Arc;

use chrono_tz::Tz;
use thiserror::Error;
use time::Date;
use tracing::info;

use crate::application::entitlements::Entitlement;
use crate::application::repos::{AccountsRepo, RepoError};
use crate::domain::accounts::AccountRecord;
use crate::util::timezone;

#[derive(Debug, Error)]
#[error("daily export limit of {limit} reached for plan {plan}")]
pub struct QuotaExceeded {
    pub plan: crate::domain::accounts::Plan,
    pub limit: u32,
}

/// Enforces and records the per-account, per-day export counter. Reads are
/// pure over the account snapshot; the commit delegates to the store's
/// atomic increment so concurrent exports cannot under-count.
#[derive(Clone)]
pub struct UsageMeter {
    accounts: Arc<dyn AccountsRepo>,
    timezone: Tz,
}

impl UsageMeter {
    pub fn new(accounts: Arc<dyn AccountsRepo>, timezone: Tz) -> Self {
        Self { accounts, timezone }
    }

    pub fn today(&self) -> Date {
        timezone::today_in(self.timezone)
    }

    /// The exports consumed today. A usage window carrying a stale date
    /// reads as zero.
    pub fn current_count(&self, account: &AccountRecord, today: Date) -> u32 {
        match account.usage {
            Some(window) if window.date == today => window.count,
            _ => 0,
        }
    }

    pub fn check_quota(
        &self,
        account: &AccountRecord,
        entitlement: &Entitlement,
        today: Date,
    ) -> Result<(), QuotaExceeded> {
        let used = self.current_count(account, today);
        if used >= entitlement.export_limit_per_day {
            return Err(QuotaExceeded {
                plan: entitlement.plan,
                limit: entitlement.export_limit_per_day,
            });
        }
        Ok(())
    }

    /// Record one consumed export. Only called after a successful capture;
    /// a failed render never counts against the quota.
    pub async fn commit(&self, account_id: &str) -> Result<u32, RepoError> {
        let today = self.today();
        let count = self.accounts.advance_usage(account_id, today).await?;
        info!(
            target = "mindprint::usage",
            op = "usage::commit",
            account_id,
            date = %today,
            count,
            "Export usage committed"
        );
        Ok(count)
    }
}
