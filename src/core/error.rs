//! 错误类型
//!
//! 三类错误都在发起调用的组件内部就地处理：写入用户可见的消息字段，
//! 提交钥匙时额外触发抖动反馈；不会向上冒泡导致会话崩溃，也没有自动重试。

use thiserror::Error;

/// 后端契约调用与输入校验可能出现的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    /// 发起网络请求前即被拦下（如空钥匙）
    #[error("{0}")]
    Validation(String),

    /// 非 2xx 或响应体无法解析；message 优先取响应中的 detail
    #[error("{message}")]
    Request {
        status: Option<u16>,
        message: String,
    },

    /// 网络层失败（连接、超时等）
    #[error("{0}")]
    Transport(String),
}

impl GameError {
    pub fn request(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Request {
            status,
            message: message.into(),
        }
    }

    /// 展示给玩家的文本
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Request { .. } => "request",
            Self::Transport(_) => "transport",
        }
    }
}

impl From<reqwest::Error> for GameError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::request(e.status().map(|s| s.as_u16()), format!("Malformed response: {}", e))
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_displays_message_only() {
        let err = GameError::request(Some(404), "Level not found");
        assert_eq!(err.user_message(), "Level not found");
        assert_eq!(err.kind(), "request");
    }

    #[test]
    fn test_validation_error_message() {
        let err = GameError::Validation("Enter the key word first.".into());
        assert_eq!(err.to_string(), "Enter the key word first.");
        assert_eq!(err.kind(), "validation");
    }
}
