use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use icebox_common::{BackendError, GenerationError, QuotaSnapshot};

use crate::traits::AccountingBackend;

/// Admission decisions against the accounting backend.
///
/// The check is advisory: it takes no lock, and two near-simultaneous requests
/// from one account can both pass before either deducts. The backend owns the
/// ledger and settles that race at deduction time.
#[derive(Clone)]
pub struct Gatekeeper {
    backend: Arc<dyn AccountingBackend>,
}

impl Gatekeeper {
    pub fn new(backend: Arc<dyn AccountingBackend>) -> Self {
        Self { backend }
    }

    /// Fresh snapshot for `account_id`. One backend call, no side effects.
    pub async fn check(&self, account_id: Uuid) -> Result<QuotaSnapshot, BackendError> {
        self.backend.check_quota(account_id).await
    }

    /// `check`, with a denial turned into `GenerationError::QuotaDenied`.
    pub async fn admit(&self, account_id: Uuid) -> Result<QuotaSnapshot, GenerationError> {
        let snapshot = self.check(account_id).await?;
        if snapshot.can_generate {
            return Ok(snapshot);
        }

        let reason = snapshot
            .reason
            .unwrap_or_else(|| "Generation is not available right now".to_string());
        info!(%account_id, reason = reason.as_str(), "Quota denied");
        Err(GenerationError::QuotaDenied { reason })
    }
}
