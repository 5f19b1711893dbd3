//! HTTP 后端：reqwest + JSON
//!
//! 非 2xx 一律映射为 `GameError::Request`，消息优先取响应体的 detail/message，
//! 否则使用各契约的默认文案；连接失败与超时映射为 `GameError::Transport`。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{AuthRequest, AuthResponse, ErrorBody};
use super::GameBackend;
use crate::core::error::GameError;
use crate::core::session::UserId;
use crate::narrator::{Line, SubmitKeyRequest, SubmitKeyResponse};
use crate::navigator::{LevelId, LevelSummary, ProgressSnapshot};

const LEVELS_FAILED: &str = "Failed to load levels";
const DIALOGUE_FAILED: &str = "Failed to load dialogue";
const SUBMIT_FAILED: &str = "Failed to submit key";
const PROGRESS_FAILED: &str = "Failed to load progress";
const LOGIN_FAILED: &str = "Failed to log in";
const REGISTER_FAILED: &str = "Failed to register";

/// 基于 reqwest 的后端
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// 构建带超时的客户端；TLS 后端初始化失败时返回 Transport 错误
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, GameError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// 解析响应：2xx 反序列化为 T，否则读取错误体
async fn decode<T: DeserializeOwned>(resp: Response, fallback: &str) -> Result<T, GameError> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.map_err(GameError::from);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.text())
        .unwrap_or_else(|| fallback.to_string());
    debug!(status = status.as_u16(), message = %message, "Backend returned error status");
    Err(GameError::request(Some(status.as_u16()), message))
}

#[async_trait]
impl GameBackend for HttpBackend {
    async fn list_levels(&self) -> Result<Vec<LevelSummary>, GameError> {
        let resp = self.client.get(self.url("/levels")).send().await?;
        decode(resp, LEVELS_FAILED).await
    }

    async fn get_dialogue(&self, level_id: LevelId) -> Result<Vec<Line>, GameError> {
        let resp = self
            .client
            .get(self.url(&format!("/levels/{}/dialogue", level_id)))
            .send()
            .await?;
        decode(resp, DIALOGUE_FAILED).await
    }

    async fn submit_key(
        &self,
        level_id: LevelId,
        request: &SubmitKeyRequest,
    ) -> Result<SubmitKeyResponse, GameError> {
        let resp = self
            .client
            .post(self.url(&format!("/levels/{}/submit-key", level_id)))
            .json(request)
            .send()
            .await?;
        decode(resp, SUBMIT_FAILED).await
    }

    async fn get_progress(&self, user_id: UserId) -> Result<ProgressSnapshot, GameError> {
        let resp = self
            .client
            .get(self.url(&format!("/users/{}/progress", user_id)))
            .send()
            .await?;
        decode(resp, PROGRESS_FAILED).await
    }

    async fn login(&self, request: &AuthRequest) -> Result<AuthResponse, GameError> {
        let resp = self.client.post(self.url("/login")).json(request).send().await?;
        decode(resp, LOGIN_FAILED).await
    }

    async fn register(&self, request: &AuthRequest) -> Result<AuthResponse, GameError> {
        let resp = self
            .client
            .post(self.url("/register"))
            .json(request)
            .send()
            .await?;
        decode(resp, REGISTER_FAILED).await
    }
}
