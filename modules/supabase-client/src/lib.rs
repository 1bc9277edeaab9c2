pub mod error;
pub mod types;

pub use error::{Result, SupabaseError};
pub use types::{
    GenerationLogRow, ProcessGenerationParams, QuotaCheckParams, QuotaRow, TelegramUserRow,
    UpsertUserParams,
};

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

const UPSERT_USER: &str = "upsert_telegram_user";
const CAN_GENERATE: &str = "can_generate_image";
const PROCESS_GENERATION: &str = "process_image_generation";

pub struct SupabaseClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SupabaseError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Register or refresh a Telegram identity. Idempotent on the backend side.
    pub async fn upsert_telegram_user(&self, params: &UpsertUserParams) -> Result<()> {
        self.rpc_raw(UPSERT_USER, params).await?;
        Ok(())
    }

    /// Admission check. Read-only on the backend side.
    pub async fn can_generate_image(&self, user_id: Uuid) -> Result<QuotaRow> {
        self.rpc_first(CAN_GENERATE, &QuotaCheckParams { p_user_id: user_id })
            .await
    }

    /// Record a finished generation and deduct its cost in one call.
    pub async fn process_image_generation(
        &self,
        params: &ProcessGenerationParams,
    ) -> Result<GenerationLogRow> {
        self.rpc_first(PROCESS_GENERATION, params).await
    }

    /// Look up the `telegram_users` row for a chat. `None` when not registered.
    pub async fn telegram_user_by_chat_id(&self, chat_id: i64) -> Result<Option<TelegramUserRow>> {
        let url = format!("{}/rest/v1/telegram_users", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(&[("chat_id", format!("eq.{chat_id}")), ("select", "*".to_string())])
            .send()
            .await?;

        let body = check_status(resp).await?;
        let rows: Vec<TelegramUserRow> = serde_json::from_str(&body)?;
        Ok(rows.into_iter().next())
    }

    /// Call a set-returning procedure and keep its first row.
    async fn rpc_first<P: Serialize, T: DeserializeOwned>(
        &self,
        procedure: &str,
        params: &P,
    ) -> Result<T> {
        let body = self.rpc_raw(procedure, params).await?;
        let rows: Vec<T> = serde_json::from_str(&body)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| SupabaseError::EmptyResponse(procedure.to_string()))
    }

    async fn rpc_raw<P: Serialize>(&self, procedure: &str, params: &P) -> Result<String> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, procedure);
        tracing::debug!(procedure, "Supabase RPC");

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(params)
            .send()
            .await?;

        check_status(resp).await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(SupabaseError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp.text().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{
        extract::Query,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;

    const KEY: &str = "service-key";

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(KEY)
            && headers.get("authorization").and_then(|v| v.to_str().ok())
                == Some("Bearer service-key")
    }

    fn client(base: &str) -> SupabaseClient {
        SupabaseClient::new(base, KEY, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn quota_check_takes_first_row() {
        let router = Router::new().route(
            "/rest/v1/rpc/can_generate_image",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                if !authorized(&headers) {
                    return (StatusCode::UNAUTHORIZED, Json(json!({"message": "no key"})));
                }
                assert!(body["p_user_id"].is_string());
                (
                    StatusCode::OK,
                    Json(json!([{
                        "can_generate": false,
                        "reason": "Daily limit reached",
                        "daily_remaining": 0,
                        "tokens_remaining": null
                    }])),
                )
            }),
        );
        let base = serve(router).await;

        let row = client(&base).can_generate_image(Uuid::nil()).await.unwrap();
        assert!(!row.can_generate);
        assert_eq!(row.reason.as_deref(), Some("Daily limit reached"));
        assert_eq!(row.daily_remaining, Some(0));
    }

    #[tokio::test]
    async fn empty_result_set_is_an_error() {
        let router = Router::new().route(
            "/rest/v1/rpc/process_image_generation",
            post(|| async { Json(json!([])) }),
        );
        let base = serve(router).await;

        let params = ProcessGenerationParams {
            p_user_id: Uuid::nil(),
            p_chat_id: 1,
            p_prompt: "p".into(),
            p_model_used: "zimage".into(),
            p_image_size: "1024x1024".into(),
            p_seed: 1,
            p_generation_time_ms: 1,
        };
        let err = client(&base).process_image_generation(&params).await.unwrap_err();
        assert!(matches!(err, SupabaseError::EmptyResponse(ref p) if p == PROCESS_GENERATION));
    }

    #[tokio::test]
    async fn api_errors_carry_status_and_body() {
        let router = Router::new().route(
            "/rest/v1/rpc/upsert_telegram_user",
            post(|| async { (StatusCode::BAD_REQUEST, "bad args") }),
        );
        let base = serve(router).await;

        let params = UpsertUserParams {
            p_chat_id: 1,
            p_username: None,
            p_first_name: None,
            p_last_name: None,
            p_language_code: None,
            p_is_bot: false,
        };
        match client(&base).upsert_telegram_user(&params).await {
            Err(SupabaseError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad args");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn user_lookup_filters_by_chat_id() {
        let router = Router::new().route(
            "/rest/v1/telegram_users",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                if q.get("chat_id").map(String::as_str) == Some("eq.42") {
                    Json(json!([{
                        "id": "6f1c6d2e-58a4-4a49-9b4c-2b7c1f0e9a11",
                        "chat_id": 42,
                        "first_name": "Ana",
                        "tier": "paid",
                        "token_balance": 17
                    }]))
                } else {
                    Json(json!([]))
                }
            }),
        );
        let base = serve(router).await;
        let c = client(&base);

        let found = c.telegram_user_by_chat_id(42).await.unwrap().unwrap();
        assert_eq!(found.token_balance, Some(17));
        assert!(c.telegram_user_by_chat_id(7).await.unwrap().is_none());
    }
}
