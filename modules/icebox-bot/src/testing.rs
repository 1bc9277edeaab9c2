// Test mocks for the conversation flow.
//
// Three mocks matching the three trait boundaries:
// - MockAccounting (AccountingBackend): in-memory accounts, scripted quota and receipts
// - MockProvider (ImageProvider): scripted image, status or timeout
// - RecordingTransport (ChatTransport): records every outbound action
//
// Plus helpers for identities, accounts, receipts and a fixed clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use icebox_common::{
    BackendError, ChatIdentity, DeductionReceipt, GenerationRecord, GenerationRequest,
    ProviderError, QuotaSnapshot, Tier, UserAccount,
};

use crate::screens::Screen;
use crate::traits::{AccountingBackend, ChatTransport, ImageProvider, ProviderImage};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// 2026-10-19 10:00:00 UTC. Next reset displays as `2026-10-20 07:00 WIB`.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap()
}

pub fn identity(chat_id: i64) -> ChatIdentity {
    ChatIdentity {
        chat_id,
        username: Some("ana".to_string()),
        first_name: Some("Ana".to_string()),
        last_name: None,
        language_code: Some("id".to_string()),
        is_bot: false,
    }
}

/// Stable account id per chat so tests can assert on it.
pub fn account_id(chat_id: i64) -> Uuid {
    Uuid::from_u128(chat_id as u128)
}

pub fn free_account(chat_id: i64) -> UserAccount {
    UserAccount {
        id: account_id(chat_id),
        chat_id,
        username: Some("ana".to_string()),
        first_name: Some("Ana".to_string()),
        last_name: None,
        language_code: Some("id".to_string()),
        tier: Tier::Free,
        status: "active".to_string(),
        daily_images_generated: 0,
        total_images_generated: 0,
        token_balance: 0,
    }
}

pub fn paid_account(chat_id: i64, token_balance: i64) -> UserAccount {
    UserAccount {
        tier: Tier::Paid,
        token_balance,
        ..free_account(chat_id)
    }
}

pub fn free_receipt(daily_remaining: Option<i64>) -> DeductionReceipt {
    DeductionReceipt {
        tier_used: Tier::Free,
        daily_remaining,
        tokens_remaining: None,
    }
}

pub fn paid_receipt(tokens_remaining: Option<i64>) -> DeductionReceipt {
    DeductionReceipt {
        tier_used: Tier::Paid,
        daily_remaining: None,
        tokens_remaining,
    }
}

fn unavailable(what: &str) -> BackendError {
    BackendError::Api {
        status: 503,
        message: format!("{what} unavailable"),
    }
}

// ---------------------------------------------------------------------------
// MockAccounting
// ---------------------------------------------------------------------------

/// In-memory accounting backend. Upserting an unknown chat registers a free
/// account. Builder pattern: `.with_account()`, `.with_quota()`,
/// `.with_receipt()`, `.failing_*()`.
pub struct MockAccounting {
    accounts: Mutex<HashMap<i64, UserAccount>>,
    quota: QuotaSnapshot,
    receipt: DeductionReceipt,
    fail_upsert: bool,
    fail_lookup: bool,
    fail_quota: bool,
    fail_recheck: bool,
    fail_deduct: bool,
    upserts: Mutex<Vec<ChatIdentity>>,
    deductions: Mutex<Vec<GenerationRecord>>,
    quota_checks: AtomicUsize,
}

impl Default for MockAccounting {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAccounting {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            quota: QuotaSnapshot::admitted(5, 0),
            receipt: free_receipt(Some(4)),
            fail_upsert: false,
            fail_lookup: false,
            fail_quota: false,
            fail_recheck: false,
            fail_deduct: false,
            upserts: Mutex::new(Vec::new()),
            deductions: Mutex::new(Vec::new()),
            quota_checks: AtomicUsize::new(0),
        }
    }

    pub fn with_account(self, account: UserAccount) -> Self {
        self.accounts.lock().unwrap().insert(account.chat_id, account);
        self
    }

    pub fn with_quota(mut self, quota: QuotaSnapshot) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_receipt(mut self, receipt: DeductionReceipt) -> Self {
        self.receipt = receipt;
        self
    }

    pub fn failing_upsert(mut self) -> Self {
        self.fail_upsert = true;
        self
    }

    pub fn failing_lookup(mut self) -> Self {
        self.fail_lookup = true;
        self
    }

    pub fn failing_quota(mut self) -> Self {
        self.fail_quota = true;
        self
    }

    /// The first quota check answers normally; every later one fails.
    pub fn failing_recheck(mut self) -> Self {
        self.fail_recheck = true;
        self
    }

    pub fn failing_deduct(mut self) -> Self {
        self.fail_deduct = true;
        self
    }

    pub fn upserts(&self) -> Vec<ChatIdentity> {
        self.upserts.lock().unwrap().clone()
    }

    /// Every deduction attempt, including ones that failed.
    pub fn deductions(&self) -> Vec<GenerationRecord> {
        self.deductions.lock().unwrap().clone()
    }

    pub fn quota_checks(&self) -> usize {
        self.quota_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountingBackend for MockAccounting {
    async fn upsert_identity(&self, identity: &ChatIdentity) -> Result<(), BackendError> {
        self.upserts.lock().unwrap().push(identity.clone());
        if self.fail_upsert {
            return Err(unavailable("upsert_telegram_user"));
        }
        self.accounts
            .lock()
            .unwrap()
            .entry(identity.chat_id)
            .or_insert_with(|| UserAccount {
                username: identity.username.clone(),
                first_name: identity.first_name.clone(),
                last_name: identity.last_name.clone(),
                language_code: identity.language_code.clone(),
                ..free_account(identity.chat_id)
            });
        Ok(())
    }

    async fn find_account(&self, chat_id: i64) -> Result<Option<UserAccount>, BackendError> {
        if self.fail_lookup {
            return Err(unavailable("telegram_users"));
        }
        Ok(self.accounts.lock().unwrap().get(&chat_id).cloned())
    }

    async fn check_quota(&self, _account_id: Uuid) -> Result<QuotaSnapshot, BackendError> {
        let earlier_checks = self.quota_checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_quota || (self.fail_recheck && earlier_checks > 0) {
            return Err(unavailable("can_generate_image"));
        }
        Ok(self.quota.clone())
    }

    async fn log_and_deduct(
        &self,
        record: &GenerationRecord,
    ) -> Result<DeductionReceipt, BackendError> {
        self.deductions.lock().unwrap().push(record.clone());
        if self.fail_deduct {
            return Err(unavailable("process_image_generation"));
        }
        Ok(self.receipt.clone())
    }
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

enum ProviderScript {
    Image(Vec<u8>),
    Status(u16),
    Timeout,
}

/// Scripted image provider. Records every request it receives.
pub struct MockProvider {
    script: ProviderScript,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockProvider {
    fn scripted(script: ProviderScript) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn returning_image(bytes: Vec<u8>) -> Self {
        Self::scripted(ProviderScript::Image(bytes))
    }

    pub fn returning_status(status: u16) -> Self {
        Self::scripted(ProviderScript::Status(status))
    }

    pub fn timing_out() -> Self {
        Self::scripted(ProviderScript::Timeout)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageProvider for MockProvider {
    fn model(&self) -> &str {
        "zimage"
    }

    async fn fetch(&self, request: &GenerationRequest) -> Result<ProviderImage, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.script {
            ProviderScript::Image(bytes) => Ok(ProviderImage {
                bytes: bytes.clone(),
                elapsed_ms: 1500,
            }),
            ProviderScript::Status(status) => Err(ProviderError::Status {
                status: *status,
                message: "provider failure".to_string(),
            }),
            ProviderScript::Timeout => Err(ProviderError::Timeout(Duration::from_secs(120))),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingTransport
// ---------------------------------------------------------------------------

/// One outbound chat action.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Message {
        chat_id: i64,
        message_id: i32,
        screen: Screen,
    },
    Edit {
        chat_id: i64,
        message_id: i32,
        screen: Screen,
    },
    Delete {
        chat_id: i64,
        message_id: i32,
    },
    Photo {
        chat_id: i64,
        bytes: Vec<u8>,
    },
}

impl Sent {
    pub fn screen(&self) -> Option<&Screen> {
        match self {
            Sent::Message { screen, .. } | Sent::Edit { screen, .. } => Some(screen),
            _ => None,
        }
    }
}

/// Records every outbound action. Message ids count up from 100.
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicUsize,
    fail_edits: bool,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(100),
            fail_edits: false,
        }
    }

    /// Every edit fails, as when the original message is gone.
    pub fn failing_edits(mut self) -> Self {
        self.fail_edits = true;
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Screens in the order they were sent or edited in.
    pub fn screens(&self) -> Vec<Screen> {
        self.sent().iter().filter_map(|s| s.screen().cloned()).collect()
    }

    pub fn last_screen(&self) -> Option<Screen> {
        self.screens().pop()
    }

    pub fn photos(&self) -> Vec<Vec<u8>> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Photo { bytes, .. } => Some(bytes),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send(&self, chat_id: i64, screen: &Screen) -> Result<i32> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) as i32;
        self.sent.lock().unwrap().push(Sent::Message {
            chat_id,
            message_id,
            screen: screen.clone(),
        });
        Ok(message_id)
    }

    async fn edit(&self, chat_id: i64, message_id: i32, screen: &Screen) -> Result<()> {
        if self.fail_edits {
            bail!("message {message_id} can't be edited");
        }
        self.sent.lock().unwrap().push(Sent::Edit {
            chat_id,
            message_id,
            screen: screen.clone(),
        });
        Ok(())
    }

    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Delete {
            chat_id,
            message_id,
        });
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, image: Vec<u8>) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Photo {
            chat_id,
            bytes: image,
        });
        Ok(())
    }
}
