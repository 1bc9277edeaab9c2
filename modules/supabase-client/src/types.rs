use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- RPC parameters ---

/// Arguments for `upsert_telegram_user`.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertUserParams {
    pub p_chat_id: i64,
    pub p_username: Option<String>,
    pub p_first_name: Option<String>,
    pub p_last_name: Option<String>,
    pub p_language_code: Option<String>,
    pub p_is_bot: bool,
}

/// Arguments for `can_generate_image`.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaCheckParams {
    pub p_user_id: Uuid,
}

/// Arguments for `process_image_generation`, which records the generation and
/// deducts the allowance in one call.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessGenerationParams {
    pub p_user_id: Uuid,
    pub p_chat_id: i64,
    pub p_prompt: String,
    pub p_model_used: String,
    pub p_image_size: String,
    pub p_seed: u64,
    pub p_generation_time_ms: u64,
}

// --- Rows ---

/// A row of the `telegram_users` table. Columns the bot does not read are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUserRow {
    pub id: Uuid,
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub tier: Option<String>,
    pub status: Option<String>,
    pub daily_images_generated: Option<i64>,
    pub total_images_generated: Option<i64>,
    pub token_balance: Option<i64>,
}

/// First row returned by `can_generate_image`.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaRow {
    pub can_generate: bool,
    pub reason: Option<String>,
    pub daily_remaining: Option<i64>,
    pub tokens_remaining: Option<i64>,
}

/// First row returned by `process_image_generation`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationLogRow {
    pub tier_used: String,
    pub daily_remaining: Option<i64>,
    pub tokens_remaining: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_row_ignores_unknown_columns_and_nulls() {
        let row: TelegramUserRow = serde_json::from_value(json!({
            "id": "6f1c6d2e-58a4-4a49-9b4c-2b7c1f0e9a11",
            "chat_id": 42,
            "username": null,
            "first_name": "Ana",
            "tier": "free",
            "created_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(row.chat_id, 42);
        assert_eq!(row.first_name.as_deref(), Some("Ana"));
        assert!(row.username.is_none());
        assert!(row.token_balance.is_none());
    }

    #[test]
    fn quota_row_requires_can_generate() {
        let missing = serde_json::from_value::<QuotaRow>(json!({ "daily_remaining": 3 }));
        assert!(missing.is_err());
    }

    #[test]
    fn process_params_use_rpc_argument_names() {
        let params = ProcessGenerationParams {
            p_user_id: Uuid::nil(),
            p_chat_id: 7,
            p_prompt: "fox".into(),
            p_model_used: "zimage".into(),
            p_image_size: "1024x1024".into(),
            p_seed: 123,
            p_generation_time_ms: 900,
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["p_image_size"], "1024x1024");
        assert_eq!(value["p_generation_time_ms"], 900);
        assert_eq!(value["p_user_id"], Uuid::nil().to_string());
    }
}
