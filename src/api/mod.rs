use log::debug;
use reqwest::{ Client as HttpClient, StatusCode };
use serde::de::DeserializeOwned;
use serde::{ Deserialize, Serialize };
use thiserror::Error;

use crate::models::resources::{ Chatbot, Constraint, Fact, HistoricalExample, Organization };
use crate::models::session::Session;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")] Request(#[from] reqwest::Error),
    #[error("API returned {status}: {detail}")] Status {
        status: StatusCode,
        detail: String,
    },
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

#[derive(Deserialize)]
struct SystemPromptBody {
    system_prompt: Option<String>,
}

#[derive(Serialize)]
struct SystemPromptUpdate<'a> {
    system_prompt: &'a str,
}

/// Bearer-authenticated client for the conventional `/api/...` namespace.
/// Plain request/response; all streaming concerns live in `feed` and `chat`.
pub struct ApiClient {
    http: HttpClient,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn handle<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let detail = resp
                .json::<ErrorBody>().await
                .ok()
                .and_then(|b| b.detail)
                .unwrap_or_else(|| "Request failed".to_string());
            return Err(ApiError::Status { status, detail });
        }
        Ok(resp.json::<T>().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!("GET {}", path);
        let resp = self.http.get(self.url(path)).bearer_auth(&self.token).send().await?;
        Self::handle(resp).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B
    ) -> Result<T, ApiError> {
        debug!("POST {}", path);
        let resp = self.http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send().await?;
        Self::handle(resp).await
    }

    async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B
    ) -> Result<T, ApiError> {
        debug!("PUT {}", path);
        let resp = self.http
            .put(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send().await?;
        Self::handle(resp).await
    }

    async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!("DELETE {}", path);
        let resp = self.http.delete(self.url(path)).bearer_auth(&self.token).send().await?;
        Self::handle(resp).await
    }

    // --- Organizations ---

    pub async fn my_organizations(&self) -> Result<Vec<Organization>, ApiError> {
        self.get_json("/api/users/me/orgs").await
    }

    // --- Chatbots ---

    pub async fn chatbots(&self) -> Result<Vec<Chatbot>, ApiError> {
        self.get_json("/api/chatbots").await
    }

    pub async fn chatbot(&self, chatbot_id: &str) -> Result<Chatbot, ApiError> {
        self.get_json(&format!("/api/chatbots/{}", chatbot_id)).await
    }

    // --- Sessions ---

    pub async fn sessions(&self, chatbot_id: &str) -> Result<Vec<Session>, ApiError> {
        self.get_json(&format!("/api/chatbots/{}/sessions", chatbot_id)).await
    }

    // --- Facts ---

    pub async fn facts(&self, chatbot_id: &str) -> Result<Vec<Fact>, ApiError> {
        self.get_json(&format!("/api/chatbots/{}/facts", chatbot_id)).await
    }

    pub async fn add_fact(&self, chatbot_id: &str, fact: &Fact) -> Result<Fact, ApiError> {
        self.post_json(&format!("/api/chatbots/{}/facts", chatbot_id), fact).await
    }

    pub async fn delete_fact(
        &self,
        chatbot_id: &str,
        fact_id: &str
    ) -> Result<serde_json::Value, ApiError> {
        self.delete_json(&format!("/api/chatbots/{}/facts/{}", chatbot_id, fact_id)).await
    }

    // --- Constraints ---

    pub async fn constraints(&self, chatbot_id: &str) -> Result<Vec<Constraint>, ApiError> {
        self.get_json(&format!("/api/chatbots/{}/constraints", chatbot_id)).await
    }

    pub async fn add_constraint(
        &self,
        chatbot_id: &str,
        constraint: &Constraint
    ) -> Result<Constraint, ApiError> {
        self.post_json(&format!("/api/chatbots/{}/constraints", chatbot_id), constraint).await
    }

    // --- History ---

    pub async fn history(&self, chatbot_id: &str) -> Result<Vec<HistoricalExample>, ApiError> {
        self.get_json(&format!("/api/chatbots/{}/history", chatbot_id)).await
    }

    pub async fn add_history(
        &self,
        chatbot_id: &str,
        example: &HistoricalExample
    ) -> Result<HistoricalExample, ApiError> {
        self.post_json(&format!("/api/chatbots/{}/history", chatbot_id), example).await
    }

    // --- System prompt ---

    pub async fn system_prompt(&self, chatbot_id: &str) -> Result<String, ApiError> {
        let body: SystemPromptBody = self.get_json(
            &format!("/api/chatbots/{}/system-prompt", chatbot_id)
        ).await?;
        Ok(body.system_prompt.unwrap_or_default())
    }

    pub async fn set_system_prompt(
        &self,
        chatbot_id: &str,
        prompt: &str
    ) -> Result<serde_json::Value, ApiError> {
        self.put_json(
            &format!("/api/chatbots/{}/system-prompt", chatbot_id),
            &(SystemPromptUpdate { system_prompt: prompt })
        ).await
    }
}
