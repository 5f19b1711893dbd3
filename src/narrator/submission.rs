//! 钥匙提交：请求/响应契约、提交尝试与奖励结果

use serde::{Deserialize, Serialize};

use crate::core::session::UserId;
use crate::navigator::LevelId;

/// 空输入时的校验提示
pub const EMPTY_KEY_MESSAGE: &str = "Enter the key word first.";
/// 响应未带 message 时的拒绝提示
pub const DEFAULT_REJECT_MESSAGE: &str = "Incorrect key";

/// 提交请求体（路径上携带关卡 ID）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitKeyRequest {
    pub user_id: UserId,
    pub key: String,
}

/// 提交响应
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitKeyResponse {
    pub correct: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub new_credits: Option<i64>,
    #[serde(default)]
    pub reward_credits_awarded: Option<i64>,
    #[serde(default)]
    pub next_level_id: Option<LevelId>,
}

/// 一次关卡访问中的提交尝试
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionAttempt {
    pub entered_key: String,
    pub submitting: bool,
    pub last_result: Option<SubmitKeyResponse>,
    pub error: Option<String>,
}

impl SubmissionAttempt {
    /// 去掉首尾空白后的钥匙；为空时返回 None
    pub fn trimmed_key(&self) -> Option<&str> {
        let key = self.entered_key.trim();
        (!key.is_empty()).then_some(key)
    }
}

/// 提交成功后的奖励结果（`Done` 阶段展示）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewardOutcome {
    /// 已完成过的关卡再次提交时为 0
    pub reward_credits_awarded: i64,
    pub new_credits: Option<i64>,
    pub next_level_id: Option<LevelId>,
}

impl RewardOutcome {
    pub fn from_response(resp: &SubmitKeyResponse) -> Self {
        Self {
            reward_credits_awarded: resp.reward_credits_awarded.unwrap_or(0),
            new_credits: resp.new_credits,
            next_level_id: resp.next_level_id,
        }
    }

    pub fn summary(&self) -> String {
        if self.reward_credits_awarded > 0 {
            format!("You earned +{} credits.", self.reward_credits_awarded)
        } else {
            "Level already completed - no extra reward.".to_string()
        }
    }

    pub fn continue_label(&self) -> &'static str {
        if self.next_level_id.is_some() {
            "Next Level →"
        } else {
            "Finish"
        }
    }
}
