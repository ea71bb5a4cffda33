//! Outbound motivational calls through the Retell voice API.
//!
//! The API key lives in the OS keyring under the `sweatstake` service
//! (entry `voice_api_key`); the `SWEATSTAKE_VOICE_API_KEY` environment
//! variable overrides it for headless hosts.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CallError;
use crate::gateway::keyring_store;

const DEFAULT_BASE_URL: &str = "https://api.retellai.com/v2";
const DEFAULT_FROM_NUMBER: &str = "+17692481842";
const API_KEY_ENTRY: &str = "voice_api_key";
const API_KEY_ENV: &str = "SWEATSTAKE_VOICE_API_KEY";

/// Voice provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_from_number")]
    pub from_number: String,
    /// Agent to run the call script; the provider default applies if unset.
    #[serde(default)]
    pub agent_id: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_from_number() -> String {
    DEFAULT_FROM_NUMBER.to_string()
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            from_number: default_from_number(),
            agent_id: None,
        }
    }
}

/// Everything the call script gets to work with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub user_name: String,
    pub gym_name: String,
    pub bet_amount: i64,
    pub streak_days: u32,
    pub minutes_remaining: i64,
}

impl CallContext {
    /// Free-text context handed to the voice agent alongside the
    /// structured variables.
    pub fn rationale(&self) -> String {
        indoc::formatdoc! {"
            {name} committed to a daily gym session with {bet} on the line
            and has not checked in at {gym} yet today. There are about
            {minutes} minutes left before the penalty lands and their
            {streak}-day streak resets. Be warm, be brief, and get them
            moving.",
            name = self.user_name,
            bet = self.bet_amount,
            gym = self.gym_name,
            minutes = self.minutes_remaining,
            streak = self.streak_days,
        }
    }
}

/// Provider acknowledgement for a placed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReceipt {
    pub call_id: String,
    #[serde(rename = "call_status")]
    pub status: String,
}

/// Retell API client.
pub struct RetellClient {
    http: Client,
    config: VoiceConfig,
    api_key: String,
}

impl RetellClient {
    /// Build a client from stored credentials.
    ///
    /// Returns `NotConfigured` when neither the environment override nor
    /// the keyring holds a key.
    pub fn from_stored_key(config: VoiceConfig) -> Result<Self, CallError> {
        let api_key = match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => key,
            _ => keyring_store::get(API_KEY_ENTRY)
                .map_err(|e| CallError::Credential(e.to_string()))?
                .ok_or(CallError::NotConfigured)?,
        };
        Ok(Self::with_api_key(config, api_key))
    }

    pub fn with_api_key(config: VoiceConfig, api_key: String) -> Self {
        Self {
            http: Client::new(),
            config,
            api_key,
        }
    }

    /// Persist a user-provided key to the OS keyring.
    pub fn store_api_key(key: &str) -> Result<(), CallError> {
        keyring_store::set(API_KEY_ENTRY, key).map_err(|e| CallError::Credential(e.to_string()))
    }

    /// Remove the stored key.
    pub fn forget_api_key() -> Result<(), CallError> {
        keyring_store::delete(API_KEY_ENTRY).map_err(|e| CallError::Credential(e.to_string()))
    }

    /// Place one outbound call.
    pub async fn place_call(
        &self,
        to_number: &str,
        context: &CallContext,
    ) -> Result<CallReceipt, CallError> {
        let mut body = json!({
            "from_number": self.config.from_number,
            "to_number": to_number,
            "retell_llm_dynamic_variables": {
                "user_name": context.user_name,
                "gym_name": context.gym_name,
                "bet_amount": context.bet_amount.to_string(),
                "streak_lost": context.streak_days.to_string(),
                "motivational_context": context.rationale(),
            }
        });
        if let Some(agent) = &self.config.agent_id {
            body["override_agent_id"] = json!(agent);
        }

        let resp = self
            .http
            .post(format!("{}/create-phone-call", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(CallError::Provider {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json::<CallReceipt>().await?)
    }

    /// Cheap credentials probe: lists agents and checks the status code.
    pub async fn test_connection(&self) -> Result<(), CallError> {
        let resp = self
            .http
            .get(format!("{}/list-agents", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(CallError::Provider {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> CallContext {
        CallContext {
            user_name: "Sam".to_string(),
            gym_name: "Iron Temple".to_string(),
            bet_amount: 50,
            streak_days: 6,
            minutes_remaining: 30,
        }
    }

    fn client_for(server: &mockito::ServerGuard) -> RetellClient {
        RetellClient::with_api_key(
            VoiceConfig {
                base_url: server.url(),
                from_number: "+15550100".to_string(),
                agent_id: Some("agent_42".to_string()),
            },
            "test-key".to_string(),
        )
    }

    #[test]
    fn rationale_mentions_the_stakes() {
        let text = context().rationale();
        assert!(text.contains("Sam"));
        assert!(text.contains("Iron Temple"));
        assert!(text.contains("50"));
        assert!(text.contains("30 minutes"));
        assert!(text.contains("6-day streak"));
    }

    #[tokio::test]
    async fn place_call_posts_and_parses_the_receipt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/create-phone-call")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(json!({
                "from_number": "+15550100",
                "to_number": "+15550123",
                "override_agent_id": "agent_42",
                "retell_llm_dynamic_variables": {
                    "user_name": "Sam",
                    "bet_amount": "50",
                    "streak_lost": "6",
                }
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"call_id":"call_abc123","call_status":"registered"}"#)
            .create_async()
            .await;

        let receipt = client_for(&server)
            .place_call("+15550123", &context())
            .await
            .unwrap();
        assert_eq!(receipt.call_id, "call_abc123");
        assert_eq!(receipt.status, "registered");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn provider_rejection_surfaces_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/create-phone-call")
            .with_status(402)
            .with_body("insufficient concurrency")
            .create_async()
            .await;

        let err = client_for(&server)
            .place_call("+15550123", &context())
            .await
            .unwrap_err();
        match err {
            CallError::Provider { status, message } => {
                assert_eq!(status, 402);
                assert!(message.contains("insufficient concurrency"));
            }
            other => panic!("expected provider error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_connection_checks_the_agents_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/list-agents")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        client_for(&server).test_connection().await.unwrap();
        mock.assert_async().await;

        server
            .mock("GET", "/list-agents")
            .with_status(401)
            .with_body("invalid key")
            .create_async()
            .await;
        let err = client_for(&server).test_connection().await.unwrap_err();
        assert!(matches!(err, CallError::Provider { status: 401, .. }));
    }
}
