//! Mapping from account plans to export rules.

use crate::domain::accounts::{AccountRecord, Plan};

/// Effectively unlimited daily exports for paid and administrative plans.
pub const UNLIMITED_EXPORTS_PER_DAY: u32 = 999;
pub const FREE_EXPORTS_PER_DAY: u32 = 1;

/// Export rules derived from an account. Recomputed on every request and
/// never cached across requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entitlement {
    pub plan: Plan,
    pub export_limit_per_day: u32,
    pub watermark_enabled: bool,
}

/// Resolves entitlements from the account snapshot plus the startup
/// allow-list of privileged caller emails. Pure, no I/O, total over every
/// plan value.
#[derive(Debug, Clone)]
pub struct EntitlementResolver {
    admin_emails: Vec<String>,
}

impl EntitlementResolver {
    pub fn new(admin_emails: Vec<String>) -> Self {
        let admin_emails = admin_emails
            .into_iter()
            .map(|email| email.trim().to_ascii_lowercase())
            .filter(|email| !email.is_empty())
            .collect();
        Self { admin_emails }
    }

    pub fn resolve(&self, account: &AccountRecord, caller_email: Option<&str>) -> Entitlement {
        let allow_listed = caller_email
            .map(|email| self.is_allow_listed(email))
            .unwrap_or(false);

        if account.plan == Plan::Admin || account.admin_override || allow_listed {
            return Entitlement {
                plan: account.plan,
                export_limit_per_day: UNLIMITED_EXPORTS_PER_DAY,
                watermark_enabled: false,
            };
        }

        match account.plan {
            Plan::Paid => Entitlement {
                plan: Plan::Paid,
                export_limit_per_day: UNLIMITED_EXPORTS_PER_DAY,
                watermark_enabled: false,
            },
            // Admin is handled by the early return above; everything that
            // is neither paid nor privileged gets the free shape.
            _ => Entitlement {
                plan: Plan::Free,
                export_limit_per_day: FREE_EXPORTS_PER_DAY,
                watermark_enabled: true,
            },
        }
    }

    fn is_allow_listed(&self, email: &str) -> bool {
        let needle = email.trim().to_ascii_lowercase();
        self.admin_emails.iter().any(|entry| *entry == needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::accounts::AccountRecord;

    fn account(plan: Plan) -> AccountRecord {
        AccountRecord {
            account_id: "acct-1".into(),
            plan,
            admin_override: false,
            usage: None,
        }
    }

    fn resolver() -> EntitlementResolver {
        EntitlementResolver::new(vec!["Ops@Example.com".into()])
    }

    #[test]
    fn free_gets_one_watermarked_export() {
        let entitlement = resolver().resolve(&account(Plan::Free), None);
        assert_eq!(entitlement.export_limit_per_day, FREE_EXPORTS_PER_DAY);
        assert!(entitlement.watermark_enabled);
        assert_eq!(entitlement.plan, Plan::Free);
    }

    #[test]
    fn paid_gets_unlimited_without_watermark() {
        let entitlement = resolver().resolve(&account(Plan::Paid), None);
        assert_eq!(entitlement.export_limit_per_day, UNLIMITED_EXPORTS_PER_DAY);
        assert!(!entitlement.watermark_enabled);
    }

    #[test]
    fn admin_plan_gets_unlimited_without_watermark() {
        let entitlement = resolver().resolve(&account(Plan::Admin), None);
        assert_eq!(entitlement.export_limit_per_day, UNLIMITED_EXPORTS_PER_DAY);
        assert!(!entitlement.watermark_enabled);
        // The admin plan must keep its own label, never degrade to free.
        assert_eq!(entitlement.plan, Plan::Admin);
    }

    #[test]
    fn admin_override_wins_over_free_plan() {
        let mut account = account(Plan::Free);
        account.admin_override = true;
        let entitlement = resolver().resolve(&account, None);
        assert_eq!(entitlement.export_limit_per_day, UNLIMITED_EXPORTS_PER_DAY);
        assert!(!entitlement.watermark_enabled);
    }

    #[test]
    fn allow_listed_email_wins_regardless_of_case() {
        let entitlement = resolver().resolve(&account(Plan::Free), Some("ops@example.COM"));
        assert_eq!(entitlement.export_limit_per_day, UNLIMITED_EXPORTS_PER_DAY);
        assert!(!entitlement.watermark_enabled);
    }

    #[test]
    fn unknown_email_does_not_elevate() {
        let entitlement = resolver().resolve(&account(Plan::Free), Some("someone@else.com"));
        assert_eq!(entitlement.export_limit_per_day, FREE_EXPORTS_PER_DAY);
        assert!(entitlement.watermark_enabled);
    }

    #[test]
    fn resolve_is_total_over_unknown_plans() {
        // Plan::parse already degrades unknown strings; the resolver must
        // yield one of the three defined shapes for every variant.
        for raw in ["FREE", "PAID", "ADMIN", "trial", "", "💥"] {
            let entitlement = resolver().resolve(&account(Plan::parse(raw)), None);
            assert!(entitlement.export_limit_per_day >= 1);
        }
    }
}
