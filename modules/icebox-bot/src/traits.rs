// Trait seams around the three external collaborators.
//
// AccountingBackend: identity upsert, account lookup, quota check, log-and-deduct.
// ImageProvider: one image per request, no retries.
// ChatTransport: outbound chat actions (send, edit, delete, photo).
//
// Production impls wrap SupabaseClient, PollinationsClient and the teloxide Bot.
// Tests swap in the mocks from `testing`.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use icebox_common::{
    BackendError, ChatIdentity, DeductionReceipt, GenerationRecord, GenerationRequest,
    ProviderError, QuotaSnapshot, UserAccount,
};
use pollinations_client::PollinationsClient;
use supabase_client::{ProcessGenerationParams, SupabaseClient, UpsertUserParams};

use crate::screens::Screen;

// ---------------------------------------------------------------------------
// AccountingBackend
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AccountingBackend: Send + Sync {
    /// Idempotent registration/update of the chat identity.
    async fn upsert_identity(&self, identity: &ChatIdentity) -> Result<(), BackendError>;

    /// Account registered for `chat_id`, if any.
    async fn find_account(&self, chat_id: i64) -> Result<Option<UserAccount>, BackendError>;

    /// Admission check. Never mutates the account.
    async fn check_quota(&self, account_id: Uuid) -> Result<QuotaSnapshot, BackendError>;

    /// Record the generation and deduct its cost in one backend operation.
    async fn log_and_deduct(
        &self,
        record: &GenerationRecord,
    ) -> Result<DeductionReceipt, BackendError>;
}

#[async_trait]
impl AccountingBackend for SupabaseClient {
    async fn upsert_identity(&self, identity: &ChatIdentity) -> Result<(), BackendError> {
        Ok(self
            .upsert_telegram_user(&UpsertUserParams::from(identity))
            .await?)
    }

    async fn find_account(&self, chat_id: i64) -> Result<Option<UserAccount>, BackendError> {
        match self.telegram_user_by_chat_id(chat_id).await? {
            Some(row) => Ok(Some(UserAccount::try_from(row)?)),
            None => Ok(None),
        }
    }

    async fn check_quota(&self, account_id: Uuid) -> Result<QuotaSnapshot, BackendError> {
        Ok(self.can_generate_image(account_id).await?.into())
    }

    async fn log_and_deduct(
        &self,
        record: &GenerationRecord,
    ) -> Result<DeductionReceipt, BackendError> {
        let row = self
            .process_image_generation(&ProcessGenerationParams::from(record))
            .await?;
        DeductionReceipt::try_from(row)
    }
}

// ---------------------------------------------------------------------------
// ImageProvider
// ---------------------------------------------------------------------------

/// Image bytes plus how long the provider took.
#[derive(Debug, Clone)]
pub struct ProviderImage {
    pub bytes: Vec<u8>,
    pub elapsed_ms: u64,
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Fixed model identifier sent with every request.
    fn model(&self) -> &str;

    /// Single attempt. Any non-OK answer is a `ProviderError`.
    async fn fetch(&self, request: &GenerationRequest) -> Result<ProviderImage, ProviderError>;
}

#[async_trait]
impl ImageProvider for PollinationsClient {
    fn model(&self) -> &str {
        PollinationsClient::model(self)
    }

    async fn fetch(&self, request: &GenerationRequest) -> Result<ProviderImage, ProviderError> {
        let image = self
            .generate(
                &request.prompt,
                request.dimensions.width,
                request.dimensions.height,
                request.seed,
            )
            .await?;

        Ok(ProviderImage {
            bytes: image.bytes,
            elapsed_ms: u64::try_from(image.elapsed.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

// ---------------------------------------------------------------------------
// ChatTransport
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a new message, returning its id.
    async fn send(&self, chat_id: i64, screen: &Screen) -> Result<i32>;

    /// Replace text and buttons of an existing message.
    async fn edit(&self, chat_id: i64, message_id: i32, screen: &Screen) -> Result<()>;

    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<()>;

    async fn send_photo(&self, chat_id: i64, image: Vec<u8>) -> Result<()>;
}
