//! 登录/注册与错误响应体

use serde::{Deserialize, Serialize};

use crate::core::session::{SessionContext, UserId};

/// 登录/注册请求
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub email: String,
    pub username: String,
}

/// 登录/注册响应
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub id: UserId,
    #[serde(default)]
    pub credits: i64,
}

impl AuthResponse {
    pub fn into_session(self, request: &AuthRequest) -> SessionContext {
        SessionContext::new(self.id, &request.username, &request.email, self.credits)
    }
}

/// 非 2xx 响应体；后端一般放在 detail，偶尔是 message
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// 可展示的错误文本；detail 不是字符串时（如校验错误列表）按 JSON 文本返回
    pub fn text(&self) -> Option<String> {
        match &self.detail {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(serde_json::Value::Null) | None => {
                self.message.clone().filter(|m| !m.is_empty())
            }
            Some(other) => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_prefers_detail() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"detail": "Invalid credentials", "message": "x"}"#).unwrap();
        assert_eq!(body.text().as_deref(), Some("Invalid credentials"));

        let body: ErrorBody = serde_json::from_str(r#"{"message": "Level not found"}"#).unwrap();
        assert_eq!(body.text().as_deref(), Some("Level not found"));

        let body: ErrorBody = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(body.text(), None);
    }

    #[test]
    fn test_auth_into_session() {
        let req = AuthRequest {
            email: "ra@example.com".into(),
            username: "ra".into(),
        };
        let session = AuthResponse { id: 9, credits: 40 }.into_session(&req);
        assert_eq!(session.user_id(), 9);
        assert_eq!(session.credits(), 40);
        assert_eq!(session.username(), "ra");
    }
}
