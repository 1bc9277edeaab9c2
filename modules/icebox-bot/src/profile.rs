use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::error;

use icebox_common::{BackendError, QuotaSnapshot, UserAccount};

use crate::gatekeeper::Gatekeeper;
use crate::reset;
use crate::screens::{self, Screen};
use crate::traits::AccountingBackend;

/// Read-only account summary. Uses the same quota query as admission.
pub struct ProfileReporter {
    backend: Arc<dyn AccountingBackend>,
    gatekeeper: Gatekeeper,
}

impl ProfileReporter {
    pub fn new(backend: Arc<dyn AccountingBackend>, gatekeeper: Gatekeeper) -> Self {
        Self {
            backend,
            gatekeeper,
        }
    }

    /// Never fails: backend errors become the "could not load" screen.
    pub async fn render_profile(&self, chat_id: i64, now: DateTime<Utc>) -> Screen {
        match self.load(chat_id).await {
            Ok(Some((account, quota))) => {
                screens::profile(&account, &quota, &reset::display(reset::next_reset(now)))
            }
            Ok(None) => screens::profile_not_found(),
            Err(e) => {
                error!(chat_id, error = %e, "Profile error");
                screens::profile_failed()
            }
        }
    }

    async fn load(
        &self,
        chat_id: i64,
    ) -> Result<Option<(UserAccount, QuotaSnapshot)>, BackendError> {
        let Some(account) = self.backend.find_account(chat_id).await? else {
            return Ok(None);
        };
        let quota = self.gatekeeper.check(account.id).await?;
        Ok(Some((account, quota)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn reporter(backend: Arc<MockAccounting>) -> ProfileReporter {
        ProfileReporter::new(backend.clone(), Gatekeeper::new(backend))
    }

    #[tokio::test]
    async fn free_profile_shows_daily_usage_and_reset() {
        let mut account = free_account(42);
        account.daily_images_generated = 3;
        account.total_images_generated = 120;
        let backend = Arc::new(
            MockAccounting::new()
                .with_account(account)
                .with_quota(QuotaSnapshot::admitted(2, 0)),
        );

        let screen = reporter(backend).render_profile(42, fixed_now()).await;
        assert!(screen.text.contains("Tier            : Free"));
        assert!(screen.text.contains("Total Generated : 120"));
        assert!(screen.text.contains("Daily Limit     : 3 / 5"));
        assert!(screen.text.contains("Reset Limit     : 2026-10-20 07:00 WIB"));
        assert!(!screen.text.contains("Koin"));
        assert_eq!(screen.payloads(), vec!["main_menu"]);
    }

    #[tokio::test]
    async fn paid_profile_shows_balance() {
        let backend = Arc::new(
            MockAccounting::new()
                .with_account(paid_account(42, 250))
                .with_quota(QuotaSnapshot::admitted(0, 250)),
        );

        let screen = reporter(backend).render_profile(42, fixed_now()).await;
        assert!(screen.text.contains("Tier            : Premium"));
        assert!(screen.text.contains("Balance         : 250 Koin"));
        assert!(!screen.text.contains("Reset Limit"));
    }

    #[tokio::test]
    async fn unknown_chat_gets_not_found() {
        let backend = Arc::new(MockAccounting::new());
        let screen = reporter(backend.clone()).render_profile(42, fixed_now()).await;
        assert_eq!(screen, screens::profile_not_found());
        assert_eq!(backend.quota_checks(), 0);
    }

    #[tokio::test]
    async fn backend_failure_renders_generic_message() {
        let backend = Arc::new(
            MockAccounting::new()
                .with_account(free_account(42))
                .failing_quota(),
        );
        let screen = reporter(backend).render_profile(42, fixed_now()).await;
        assert_eq!(screen.text, "Could not load profile.");
    }
}
