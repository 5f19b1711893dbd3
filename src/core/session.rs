//! 会话上下文：当前玩家身份与积分
//!
//! 由外部登录流程提供；两台状态机都可读取，唯一的写入者是 Narrator 的钥匙提交成功路径。

use serde::{Deserialize, Serialize};

/// 用户 ID（后端分配）
pub type UserId = i64;

/// 会话上下文
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    user_id: UserId,
    username: String,
    email: String,
    credits: i64,
}

impl SessionContext {
    pub fn new(
        user_id: UserId,
        username: impl Into<String>,
        email: impl Into<String>,
        credits: i64,
    ) -> Self {
        Self {
            user_id,
            username: username.into(),
            email: email.into(),
            credits,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn credits(&self) -> i64 {
        self.credits
    }

    /// 头像用的首字母（大写）
    pub fn initial(&self) -> char {
        self.username
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('?')
    }

    pub(crate) fn set_credits(&mut self, credits: i64) {
        if self.credits != credits {
            tracing::info!(user_id = self.user_id, from = self.credits, to = credits, "credits updated");
        }
        self.credits = credits;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_uppercases_first_char() {
        let session = SessionContext::new(7, "nefertari", "n@example.com", 0);
        assert_eq!(session.initial(), 'N');
        assert_eq!(SessionContext::new(1, "", "", 0).initial(), '?');
    }

    #[test]
    fn test_set_credits() {
        let mut session = SessionContext::new(1, "ra", "ra@example.com", 25);
        session.set_credits(150);
        assert_eq!(session.credits(), 150);
    }
}
