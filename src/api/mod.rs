//! 后端契约
//!
//! 核心只通过 GameBackend 访问外部服务：关卡列表、关卡对话、提交钥匙、玩家进度，
//! 外加登录/注册（仅供可执行程序构建会话上下文）。
//! 实现：`HttpBackend`（reqwest）与 `MockBackend`（进程内，可编排失败与延迟）。

pub mod http;
pub mod mock;
pub mod types;

use async_trait::async_trait;

use crate::core::error::GameError;
use crate::core::session::UserId;
use crate::narrator::{Line, SubmitKeyRequest, SubmitKeyResponse};
use crate::navigator::{LevelId, LevelSummary, ProgressSnapshot};

pub use http::HttpBackend;
pub use mock::{MockBackend, MockCall};
pub use types::{AuthRequest, AuthResponse, ErrorBody};

/// 游戏后端 trait
#[async_trait]
pub trait GameBackend: Send + Sync {
    /// 有序关卡列表
    async fn list_levels(&self) -> Result<Vec<LevelSummary>, GameError>;

    /// 关卡对话（可能为空）
    async fn get_dialogue(&self, level_id: LevelId) -> Result<Vec<Line>, GameError>;

    /// 提交钥匙
    async fn submit_key(
        &self,
        level_id: LevelId,
        request: &SubmitKeyRequest,
    ) -> Result<SubmitKeyResponse, GameError>;

    /// 玩家进度
    async fn get_progress(&self, user_id: UserId) -> Result<ProgressSnapshot, GameError>;

    async fn login(&self, request: &AuthRequest) -> Result<AuthResponse, GameError>;

    async fn register(&self, request: &AuthRequest) -> Result<AuthResponse, GameError>;
}
