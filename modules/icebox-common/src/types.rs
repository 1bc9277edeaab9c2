use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use supabase_client::{
    GenerationLogRow, ProcessGenerationParams, QuotaRow, TelegramUserRow, UpsertUserParams,
};
use uuid::Uuid;

use crate::error::{BackendError, SelectionError};

// ---------------------------------------------------------------------------
// Identity and account
// ---------------------------------------------------------------------------

/// Account classification as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Daily allowance that resets at 00:00 UTC.
    Free,
    /// Persistent token balance.
    Paid,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Free => write!(f, "free"),
            Tier::Paid => write!(f, "paid"),
        }
    }
}

impl FromStr for Tier {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "paid" => Ok(Tier::Paid),
            other => Err(BackendError::Schema(format!("unknown tier {other:?}"))),
        }
    }
}

/// Profile fields the chat transport reports for the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatIdentity {
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub is_bot: bool,
}

impl ChatIdentity {
    /// `@username` when set, otherwise the first name, otherwise "User".
    pub fn display_name(&self) -> String {
        match (&self.username, &self.first_name) {
            (Some(u), _) if !u.is_empty() => format!("@{u}"),
            (_, Some(f)) if !f.is_empty() => f.clone(),
            _ => "User".to_string(),
        }
    }
}

impl From<&ChatIdentity> for UpsertUserParams {
    fn from(identity: &ChatIdentity) -> Self {
        Self {
            p_chat_id: identity.chat_id,
            p_username: identity.username.clone(),
            p_first_name: identity.first_name.clone(),
            p_last_name: identity.last_name.clone(),
            p_language_code: identity.language_code.clone(),
            p_is_bot: identity.is_bot,
        }
    }
}

/// Read copy of the backend's account record. May be stale the moment it is read.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAccount {
    pub id: Uuid,
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub tier: Tier,
    pub status: String,
    pub daily_images_generated: i64,
    pub total_images_generated: i64,
    pub token_balance: i64,
}

impl TryFrom<TelegramUserRow> for UserAccount {
    type Error = BackendError;

    fn try_from(row: TelegramUserRow) -> Result<Self, Self::Error> {
        let tier = match row.tier.as_deref() {
            Some(t) => t.parse()?,
            None => Tier::Free,
        };

        Ok(Self {
            id: row.id,
            chat_id: row.chat_id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            language_code: row.language_code,
            tier,
            status: row.status.unwrap_or_else(|| "active".to_string()),
            daily_images_generated: row.daily_images_generated.unwrap_or(0),
            total_images_generated: row.total_images_generated.unwrap_or(0),
            token_balance: row.token_balance.unwrap_or(0),
        })
    }
}

// ---------------------------------------------------------------------------
// Quota
// ---------------------------------------------------------------------------

/// Point-in-time admission decision. Advisory when displayed, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub can_generate: bool,
    /// Present iff `can_generate` is false.
    pub reason: Option<String>,
    pub daily_remaining: i64,
    pub tokens_remaining: i64,
}

impl QuotaSnapshot {
    pub fn admitted(daily_remaining: i64, tokens_remaining: i64) -> Self {
        Self {
            can_generate: true,
            reason: None,
            daily_remaining,
            tokens_remaining,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            can_generate: false,
            reason: Some(reason.into()),
            daily_remaining: 0,
            tokens_remaining: 0,
        }
    }
}

impl From<QuotaRow> for QuotaSnapshot {
    fn from(row: QuotaRow) -> Self {
        let reason = if row.can_generate {
            None
        } else {
            Some(
                row.reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| "Generation is not available right now".to_string()),
            )
        };

        Self {
            can_generate: row.can_generate,
            reason,
            daily_remaining: row.daily_remaining.unwrap_or(0),
            tokens_remaining: row.tokens_remaining.unwrap_or(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Output size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

const SIZE_PAYLOAD_PREFIX: &str = "size_";
const MAX_SIDE: u32 = 4096;

impl Dimensions {
    /// Used whenever a size payload cannot be understood.
    pub const DEFAULT: Dimensions = Dimensions::new(1024, 1280);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse a `size_<W>x<H>` callback payload.
    pub fn from_payload(payload: &str) -> Result<Self, SelectionError> {
        let malformed = || SelectionError::Malformed(payload.to_string());

        let (w, h) = payload
            .strip_prefix(SIZE_PAYLOAD_PREFIX)
            .and_then(|s| s.split_once('x'))
            .ok_or_else(malformed)?;
        let width: u32 = w.parse().map_err(|_| malformed())?;
        let height: u32 = h.parse().map_err(|_| malformed())?;

        if width == 0 || height == 0 || width > MAX_SIDE || height > MAX_SIDE {
            return Err(malformed());
        }
        Ok(Self { width, height })
    }

    /// `from_payload`, falling back to [`Dimensions::DEFAULT`].
    pub fn from_payload_or_default(payload: &str) -> Self {
        Self::from_payload(payload).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Falling back to default size");
            Self::DEFAULT
        })
    }

    pub fn payload(&self) -> String {
        format!("{SIZE_PAYLOAD_PREFIX}{self}")
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Seed modulus: the provider only needs variation between requests.
pub const SEED_MODULUS: i64 = 100_000;

/// Everything the provider needs for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub dimensions: Dimensions,
    pub seed: u64,
}

impl GenerationRequest {
    /// Build a request whose seed is derived from `now`.
    pub fn new(prompt: impl Into<String>, dimensions: Dimensions, now: DateTime<Utc>) -> Self {
        Self {
            prompt: prompt.into(),
            dimensions,
            seed: derive_seed(now),
        }
    }
}

/// Milliseconds since the epoch, reduced modulo [`SEED_MODULUS`]. Not for security.
pub fn derive_seed(now: DateTime<Utc>) -> u64 {
    now.timestamp_millis().rem_euclid(SEED_MODULUS) as u64
}

/// What gets logged and charged after a successful provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRecord {
    pub account_id: Uuid,
    pub chat_id: i64,
    pub prompt: String,
    pub model: String,
    pub size: String,
    pub seed: u64,
    pub elapsed_ms: u64,
}

impl From<&GenerationRecord> for ProcessGenerationParams {
    fn from(record: &GenerationRecord) -> Self {
        Self {
            p_user_id: record.account_id,
            p_chat_id: record.chat_id,
            p_prompt: record.prompt.clone(),
            p_model_used: record.model.clone(),
            p_image_size: record.size.clone(),
            p_seed: record.seed,
            p_generation_time_ms: record.elapsed_ms,
        }
    }
}

/// Backend answer to a deduction: which allowance paid for it and what is left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeductionReceipt {
    pub tier_used: Tier,
    pub daily_remaining: Option<i64>,
    pub tokens_remaining: Option<i64>,
}

impl TryFrom<GenerationLogRow> for DeductionReceipt {
    type Error = BackendError;

    fn try_from(row: GenerationLogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            tier_used: row.tier_used.parse()?,
            daily_remaining: row.daily_remaining,
            tokens_remaining: row.tokens_remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_size_payloads() {
        assert_eq!(
            Dimensions::from_payload("size_1280x720"),
            Ok(Dimensions::new(1280, 720))
        );
        assert_eq!(Dimensions::new(1024, 1024).payload(), "size_1024x1024");
    }

    #[test]
    fn malformed_payloads_fall_back_to_default() {
        for payload in ["size_", "size_axb", "size_1024", "generate_mode", "size_0x10", "size_9999x9999", ""] {
            assert!(Dimensions::from_payload(payload).is_err(), "{payload} should not parse");
            assert_eq!(Dimensions::from_payload_or_default(payload), Dimensions::new(1024, 1280));
        }
    }

    #[test]
    fn seed_is_millis_mod_100000() {
        let now = Utc.timestamp_millis_opt(1_760_000_123_456).unwrap();
        assert_eq!(derive_seed(now), 23_456);
        let req = GenerationRequest::new("fox", Dimensions::DEFAULT, now);
        assert_eq!(req.seed, 23_456);
        assert!(derive_seed(Utc::now()) < 100_000);
    }

    #[test]
    fn display_name_prefers_username() {
        let mut identity = ChatIdentity {
            chat_id: 1,
            username: Some("ana".into()),
            first_name: Some("Ana".into()),
            last_name: None,
            language_code: None,
            is_bot: false,
        };
        assert_eq!(identity.display_name(), "@ana");
        identity.username = None;
        assert_eq!(identity.display_name(), "Ana");
        identity.first_name = None;
        assert_eq!(identity.display_name(), "User");
    }

    #[test]
    fn denied_quota_always_has_reason() {
        let snapshot = QuotaSnapshot::from(QuotaRow {
            can_generate: false,
            reason: None,
            daily_remaining: None,
            tokens_remaining: None,
        });
        assert!(snapshot.reason.is_some());

        let admitted = QuotaSnapshot::from(QuotaRow {
            can_generate: true,
            reason: Some("stale".into()),
            daily_remaining: Some(4),
            tokens_remaining: None,
        });
        assert_eq!(admitted, QuotaSnapshot::admitted(4, 0));
    }

    #[test]
    fn unknown_tier_is_a_schema_error() {
        let row = GenerationLogRow {
            tier_used: "platinum".into(),
            daily_remaining: None,
            tokens_remaining: None,
        };
        assert!(matches!(
            DeductionReceipt::try_from(row),
            Err(BackendError::Schema(_))
        ));
    }
}
