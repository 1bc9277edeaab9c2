use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use icebox_common::{
    DeductionReceipt, Dimensions, GenerationError, GenerationRecord, GenerationRequest, Tier,
};

use crate::gatekeeper::Gatekeeper;
use crate::reset::next_reset;
use crate::traits::{AccountingBackend, ImageProvider};

/// Allowance left after a deduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    /// Free-tier generations left today.
    Daily(i64),
    /// Paid-tier balance.
    Tokens(i64),
}

/// A delivered image and the accounting state it left behind.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub image: Vec<u8>,
    pub model: String,
    pub size: Dimensions,
    pub seed: u64,
    pub elapsed_ms: u64,
    pub tier_used: Tier,
    /// `None` when the backend did not say and the follow-up check failed.
    pub remaining: Option<Remaining>,
    /// Next free-tier renewal. Paid balances never reset.
    pub next_reset: Option<DateTime<Utc>>,
}

/// Provider call followed by exactly one log-and-deduct on success.
pub struct Orchestrator {
    provider: Arc<dyn ImageProvider>,
    backend: Arc<dyn AccountingBackend>,
    gatekeeper: Gatekeeper,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        backend: Arc<dyn AccountingBackend>,
        gatekeeper: Gatekeeper,
    ) -> Self {
        Self {
            provider,
            backend,
            gatekeeper,
        }
    }

    /// Run one admitted generation.
    ///
    /// A provider failure returns before any accounting call. After a good
    /// image the deduction is issued once; it both records the event and
    /// charges the allowance, so there is no half-applied state to undo.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        account_id: Uuid,
        chat_id: i64,
        now: DateTime<Utc>,
    ) -> Result<GenerationOutcome, GenerationError> {
        let model = self.provider.model().to_string();
        info!(
            chat_id,
            %account_id,
            size = %request.dimensions,
            seed = request.seed,
            model = model.as_str(),
            "Requesting image"
        );

        let image = self
            .provider
            .fetch(request)
            .await
            .inspect_err(|e| warn!(chat_id, error = %e, "Provider call failed, nothing deducted"))?;

        let record = GenerationRecord {
            account_id,
            chat_id,
            prompt: request.prompt.clone(),
            model: model.clone(),
            size: request.dimensions.to_string(),
            seed: request.seed,
            elapsed_ms: image.elapsed_ms,
        };
        let receipt = self.backend.log_and_deduct(&record).await?;
        info!(
            chat_id,
            tier = %receipt.tier_used,
            elapsed_ms = image.elapsed_ms,
            "Generation recorded"
        );

        let remaining = self.remaining_after(&receipt, account_id).await;
        let next_reset = match receipt.tier_used {
            Tier::Free => Some(next_reset(now)),
            Tier::Paid => None,
        };

        Ok(GenerationOutcome {
            image: image.bytes,
            model,
            size: request.dimensions,
            seed: request.seed,
            elapsed_ms: image.elapsed_ms,
            tier_used: receipt.tier_used,
            remaining,
            next_reset,
        })
    }

    /// Prefer what the receipt reports; otherwise re-read the quota once.
    async fn remaining_after(
        &self,
        receipt: &DeductionReceipt,
        account_id: Uuid,
    ) -> Option<Remaining> {
        match (receipt.tier_used, receipt.daily_remaining, receipt.tokens_remaining) {
            (Tier::Free, Some(n), _) => return Some(Remaining::Daily(n)),
            (Tier::Paid, _, Some(n)) => return Some(Remaining::Tokens(n)),
            _ => {}
        }

        match self.gatekeeper.check(account_id).await {
            Ok(snapshot) => Some(match receipt.tier_used {
                Tier::Free => Remaining::Daily(snapshot.daily_remaining),
                Tier::Paid => Remaining::Tokens(snapshot.tokens_remaining),
            }),
            Err(e) => {
                warn!(%account_id, error = %e, "Could not re-read quota after deduction");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use icebox_common::QuotaSnapshot;

    fn orchestrator(provider: MockProvider, backend: Arc<MockAccounting>) -> Orchestrator {
        Orchestrator::new(
            Arc::new(provider),
            backend.clone(),
            Gatekeeper::new(backend),
        )
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("a cat in space", Dimensions::new(1024, 1024), fixed_now())
    }

    #[tokio::test]
    async fn provider_error_skips_deduction() {
        let backend = Arc::new(MockAccounting::new());
        let orch = orchestrator(MockProvider::returning_status(500), backend.clone());

        let result = orch.generate(&request(), Uuid::nil(), 1, fixed_now()).await;
        assert!(matches!(result, Err(GenerationError::Provider(_))));
        assert!(backend.deductions().is_empty());
    }

    #[tokio::test]
    async fn success_deducts_once_with_request_fields() {
        let backend = Arc::new(MockAccounting::new().with_receipt(free_receipt(Some(4))));
        let orch = orchestrator(MockProvider::returning_image(b"png".to_vec()), backend.clone());

        let req = request();
        let outcome = orch.generate(&req, Uuid::nil(), 99, fixed_now()).await.unwrap();

        let deductions = backend.deductions();
        assert_eq!(deductions.len(), 1);
        assert_eq!(deductions[0].size, "1024x1024");
        assert_eq!(deductions[0].seed, req.seed);
        assert_eq!(deductions[0].model, "zimage");
        assert_eq!(deductions[0].chat_id, 99);
        assert_eq!(outcome.remaining, Some(Remaining::Daily(4)));
        assert_eq!(outcome.next_reset, Some(next_reset(fixed_now())));
        // Receipt carried the count, so no follow-up check.
        assert_eq!(backend.quota_checks(), 0);
    }

    #[tokio::test]
    async fn free_receipt_without_count_rechecks_quota() {
        let backend = Arc::new(
            MockAccounting::new()
                .with_quota(QuotaSnapshot::admitted(2, 0))
                .with_receipt(free_receipt(None)),
        );
        let orch = orchestrator(MockProvider::returning_image(vec![1]), backend.clone());

        let outcome = orch.generate(&request(), Uuid::nil(), 1, fixed_now()).await.unwrap();
        assert_eq!(outcome.remaining, Some(Remaining::Daily(2)));
        assert_eq!(backend.quota_checks(), 1);
        assert_eq!(backend.deductions().len(), 1);
    }

    #[tokio::test]
    async fn paid_outcome_never_resets() {
        let backend = Arc::new(MockAccounting::new().with_receipt(paid_receipt(Some(41))));
        let orch = orchestrator(MockProvider::returning_image(vec![1]), backend);

        let outcome = orch.generate(&request(), Uuid::nil(), 1, fixed_now()).await.unwrap();
        assert_eq!(outcome.tier_used, Tier::Paid);
        assert_eq!(outcome.remaining, Some(Remaining::Tokens(41)));
        assert!(outcome.next_reset.is_none());
    }

    #[tokio::test]
    async fn deduction_failure_is_a_backend_error() {
        let backend = Arc::new(MockAccounting::new().failing_deduct());
        let orch = orchestrator(MockProvider::returning_image(vec![1]), backend.clone());

        let result = orch.generate(&request(), Uuid::nil(), 1, fixed_now()).await;
        assert!(matches!(result, Err(GenerationError::Backend(_))));
        assert_eq!(backend.deductions().len(), 1);
    }

    #[tokio::test]
    async fn paid_receipt_without_balance_rechecks_quota() {
        let backend = Arc::new(
            MockAccounting::new()
                .with_quota(QuotaSnapshot::admitted(0, 17))
                .with_receipt(paid_receipt(None)),
        );
        let orch = orchestrator(MockProvider::returning_image(vec![1]), backend.clone());

        let outcome = orch.generate(&request(), Uuid::nil(), 1, fixed_now()).await.unwrap();
        assert_eq!(outcome.remaining, Some(Remaining::Tokens(17)));
        assert_eq!(backend.quota_checks(), 1);
        assert_eq!(backend.deductions().len(), 1);
    }

    #[tokio::test]
    async fn failed_recheck_keeps_the_image_without_a_count() {
        let backend = Arc::new(
            MockAccounting::new()
                .with_receipt(free_receipt(None))
                .failing_quota(),
        );
        let orch = orchestrator(MockProvider::returning_image(b"png".to_vec()), backend.clone());

        let outcome = orch.generate(&request(), Uuid::nil(), 1, fixed_now()).await.unwrap();
        assert_eq!(outcome.image, b"png");
        assert_eq!(outcome.remaining, None);
        assert_eq!(outcome.next_reset, Some(next_reset(fixed_now())));
        assert_eq!(backend.deductions().len(), 1);
        assert_eq!(backend.quota_checks(), 1);
    }
}
