//! 进程内后端
//!
//! 实现与 HTTP 服务相同的语义：钥匙比较忽略大小写与首尾空白，奖励每关只发一次，
//! `next_unlocked_level_number` = 已完成的最大关卡序号 + 1。
//! 测试可注入失败、延迟，并检查调用记录；离线演示使用 `campaign()`。

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::types::{AuthRequest, AuthResponse};
use super::GameBackend;
use crate::core::error::GameError;
use crate::core::session::UserId;
use crate::narrator::{Line, SubmitKeyRequest, SubmitKeyResponse, DEFAULT_REJECT_MESSAGE};
use crate::navigator::{LevelId, LevelProgress, LevelSummary, ProgressSnapshot};

/// 离线演示的默认账号
pub const DEMO_EMAIL: &str = "traveler@example.com";
pub const DEMO_USERNAME: &str = "traveler";

/// 被记录的调用
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCall {
    ListLevels,
    GetDialogue(LevelId),
    SubmitKey { level_id: LevelId, key: String },
    GetProgress(UserId),
    Login(String),
    Register(String),
}

#[derive(Clone, Debug)]
struct MockLevel {
    summary: LevelSummary,
    key: String,
    reward: i64,
    dialogue: Vec<Line>,
}

#[derive(Clone, Debug)]
struct MockUser {
    id: UserId,
    email: String,
    username: String,
    credits: i64,
    completed: BTreeSet<LevelId>,
}

#[derive(Debug, Default)]
struct MockState {
    levels: Vec<MockLevel>,
    users: Vec<MockUser>,
    calls: Vec<MockCall>,
    fail_levels: bool,
    fail_dialogue: bool,
    fail_progress: bool,
    submit_errors: VecDeque<GameError>,
    submit_delay: Option<Duration>,
    dialogue_delay: Option<Duration>,
}

impl MockState {
    fn level(&self, id: LevelId) -> Result<&MockLevel, GameError> {
        self.levels
            .iter()
            .find(|l| l.summary.id == id)
            .ok_or_else(|| GameError::request(Some(404), "Level not found"))
    }

    fn user_mut(&mut self, id: UserId) -> Result<&mut MockUser, GameError> {
        self.users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| GameError::request(Some(404), "User not found"))
    }

    fn next_level_id(&self, after_number: u32) -> Option<LevelId> {
        self.levels
            .iter()
            .filter(|l| l.summary.level_number > after_number)
            .min_by_key(|l| l.summary.level_number)
            .map(|l| l.summary.id)
    }

    fn submit(&mut self, level_id: LevelId, req: &SubmitKeyRequest) -> Result<SubmitKeyResponse, GameError> {
        let level = self.level(level_id)?.clone();
        let next_level_id = self.next_level_id(level.summary.level_number);
        let user = self.user_mut(req.user_id)?;

        if !req.key.trim().eq_ignore_ascii_case(level.key.trim()) {
            return Ok(SubmitKeyResponse {
                correct: false,
                message: Some(DEFAULT_REJECT_MESSAGE.to_string()),
                new_credits: Some(user.credits),
                ..Default::default()
            });
        }

        let reward = if user.completed.insert(level_id) {
            user.credits += level.reward;
            level.reward
        } else {
            0
        };
        Ok(SubmitKeyResponse {
            correct: true,
            message: Some("Key accepted".to_string()),
            new_credits: Some(user.credits),
            reward_credits_awarded: Some(reward),
            next_level_id,
        })
    }

    fn progress(&mut self, user_id: UserId) -> Result<ProgressSnapshot, GameError> {
        let completed = self.user_mut(user_id)?.completed.clone();
        let mut levels: Vec<&MockLevel> = self.levels.iter().collect();
        levels.sort_by_key(|l| l.summary.level_number);
        let highest = levels
            .iter()
            .filter(|l| completed.contains(&l.summary.id))
            .map(|l| l.summary.level_number)
            .max()
            .unwrap_or(0);
        Ok(ProgressSnapshot {
            levels: levels
                .iter()
                .map(|l| LevelProgress {
                    id: l.summary.id,
                    completed: completed.contains(&l.summary.id),
                })
                .collect(),
            next_unlocked_level_number: Some(highest + 1),
        })
    }
}

/// 进程内后端
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 五关演示战役，附带一个默认账号
    pub fn campaign() -> Self {
        let mut state = MockState::default();
        for (number, title, description, key, reward, npc, lines) in campaign_levels() {
            let id = number as LevelId;
            let dialogue = lines
                .iter()
                .map(|(speaker, text, gives_key)| {
                    let line = if *speaker == "player" {
                        Line::player(*text)
                    } else {
                        Line::npc(*text)
                    };
                    let line = line.with_character(npc.0, npc.1);
                    if *gives_key {
                        line.revealing_key()
                    } else {
                        line
                    }
                })
                .collect();
            state.levels.push(MockLevel {
                summary: LevelSummary {
                    id,
                    level_number: number,
                    title: title.to_string(),
                    description: description.to_string(),
                },
                key: key.to_string(),
                reward,
                dialogue,
            });
        }
        state.users.push(MockUser {
            id: 1,
            email: DEMO_EMAIL.to_string(),
            username: DEMO_USERNAME.to_string(),
            credits: 0,
            completed: BTreeSet::new(),
        });
        Self {
            state: Mutex::new(state),
        }
    }

    pub async fn add_level(
        &self,
        level_number: u32,
        title: &str,
        key: &str,
        reward: i64,
        dialogue: Vec<Line>,
    ) -> LevelId {
        let mut state = self.state.lock().await;
        let id = state.levels.iter().map(|l| l.summary.id).max().unwrap_or(0) + 1;
        state.levels.push(MockLevel {
            summary: LevelSummary {
                id,
                level_number,
                title: title.to_string(),
                description: String::new(),
            },
            key: key.to_string(),
            reward,
            dialogue,
        });
        id
    }

    pub async fn add_user(&self, email: &str, username: &str, credits: i64) -> UserId {
        let mut state = self.state.lock().await;
        let id = state.users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        state.users.push(MockUser {
            id,
            email: email.to_string(),
            username: username.to_string(),
            credits,
            completed: BTreeSet::new(),
        });
        id
    }

    pub async fn fail_levels(&self, fail: bool) {
        self.state.lock().await.fail_levels = fail;
    }

    pub async fn fail_dialogue(&self, fail: bool) {
        self.state.lock().await.fail_dialogue = fail;
    }

    pub async fn fail_progress(&self, fail: bool) {
        self.state.lock().await.fail_progress = fail;
    }

    /// 下一次提交直接返回该错误（可排队多个）
    pub async fn push_submit_error(&self, err: GameError) {
        self.state.lock().await.submit_errors.push_back(err);
    }

    pub async fn set_submit_delay(&self, delay: Duration) {
        self.state.lock().await.submit_delay = Some(delay);
    }

    pub async fn set_dialogue_delay(&self, delay: Duration) {
        self.state.lock().await.dialogue_delay = Some(delay);
    }

    pub async fn calls(&self) -> Vec<MockCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn submit_count(&self) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| matches!(c, MockCall::SubmitKey { .. }))
            .count()
    }
}

#[async_trait]
impl GameBackend for MockBackend {
    async fn list_levels(&self) -> Result<Vec<LevelSummary>, GameError> {
        let mut state = self.state.lock().await;
        state.calls.push(MockCall::ListLevels);
        if state.fail_levels {
            return Err(GameError::request(Some(500), "Failed to load levels"));
        }
        let mut levels: Vec<LevelSummary> = state.levels.iter().map(|l| l.summary.clone()).collect();
        levels.sort_by_key(|l| l.level_number);
        Ok(levels)
    }

    async fn get_dialogue(&self, level_id: LevelId) -> Result<Vec<Line>, GameError> {
        let delay = {
            let mut state = self.state.lock().await;
            state.calls.push(MockCall::GetDialogue(level_id));
            state.dialogue_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().await;
        if state.fail_dialogue {
            return Err(GameError::Transport("connection reset".to_string()));
        }
        Ok(state.level(level_id)?.dialogue.clone())
    }

    async fn submit_key(
        &self,
        level_id: LevelId,
        request: &SubmitKeyRequest,
    ) -> Result<SubmitKeyResponse, GameError> {
        let (delay, injected) = {
            let mut state = self.state.lock().await;
            state.calls.push(MockCall::SubmitKey {
                level_id,
                key: request.key.clone(),
            });
            (state.submit_delay, state.submit_errors.pop_front())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = injected {
            debug!(level_id, error = %err, "Injected submit failure");
            return Err(err);
        }
        self.state.lock().await.submit(level_id, request)
    }

    async fn get_progress(&self, user_id: UserId) -> Result<ProgressSnapshot, GameError> {
        let mut state = self.state.lock().await;
        state.calls.push(MockCall::GetProgress(user_id));
        if state.fail_progress {
            return Err(GameError::request(Some(500), "Failed to load progress"));
        }
        state.progress(user_id)
    }

    async fn login(&self, request: &AuthRequest) -> Result<AuthResponse, GameError> {
        let mut state = self.state.lock().await;
        state.calls.push(MockCall::Login(request.username.clone()));
        state
            .users
            .iter()
            .find(|u| u.email == request.email && u.username == request.username)
            .map(|u| AuthResponse {
                id: u.id,
                credits: u.credits,
            })
            .ok_or_else(|| GameError::request(Some(401), "Invalid credentials"))
    }

    async fn register(&self, request: &AuthRequest) -> Result<AuthResponse, GameError> {
        {
            let mut state = self.state.lock().await;
            state.calls.push(MockCall::Register(request.username.clone()));
            if state
                .users
                .iter()
                .any(|u| u.email == request.email || u.username == request.username)
            {
                return Err(GameError::request(Some(400), "User already exists"));
            }
        }
        let id = self.add_user(&request.email, &request.username, 0).await;
        Ok(AuthResponse { id, credits: 0 })
    }
}

type ScriptLine = (&'static str, &'static str, bool);
type CampaignLevel = (
    u32,
    &'static str,
    &'static str,
    &'static str,
    i64,
    (&'static str, &'static str),
    [ScriptLine; 6],
);

fn campaign_levels() -> [CampaignLevel; 5] {
    [
        (
            1,
            "The Pyramids of Giza",
            "Enter the ancient pyramids and solve the riddle of the Sphinx to find your first sacred key.",
            "HUMAN",
            25,
            ("Sphinx Guardian", "Riddle Keeper of Giza"),
            [
                ("npc", "Traveler, you stand before the pyramids. Speak your purpose.", false),
                ("player", "I am stranded in time. I need the first sacred key.", false),
                ("npc", "Then earn it. My riddle guards the path.", false),
                ("npc", "What walks on four legs in the morning, two at noon, and three in the evening?", false),
                ("player", "A HUMAN: crawling, walking, then using a staff.", false),
                ("npc", "Correct. Remember the answer. It is the key word.", true),
            ],
        ),
        (
            2,
            "The Nile River",
            "Navigate the mighty Nile and uncover the secrets hidden in the river's ancient temples.",
            "NILE",
            25,
            ("River Priestess", "Keeper of the Flow"),
            [
                ("npc", "The river decides who may pass.", false),
                ("player", "I seek the second key.", false),
                ("npc", "Then listen. The key is the name of the lifeline itself.", false),
                ("npc", "It feeds the fields, it carries the boats, it shapes the kingdom.", false),
                ("player", "You mean the NILE.", false),
                ("npc", "Hold that word. You will need to enter it to claim the key.", true),
            ],
        ),
        (
            3,
            "The Valley of Kings",
            "Explore the tombs of pharaohs and decipher hieroglyphs to reveal the path forward.",
            "PHARAOH",
            30,
            ("Tomb Scribe", "Reader of Stone"),
            [
                ("npc", "These walls speak in silence.", false),
                ("player", "I need the third key. What is your hint?", false),
                ("npc", "The ruler of rulers. Say the title carried through dynasties.", false),
                ("npc", "Not a name. A rank.", false),
                ("player", "PHARAOH.", false),
                ("npc", "Yes. Enter that title to unlock your key.", true),
            ],
        ),
        (
            4,
            "The Temple of Karnak",
            "Traverse the grand temple complex and solve the puzzle of the sacred obelisks.",
            "KARNAK",
            30,
            ("Obelisk Sentinel", "Guardian of the Temple"),
            [
                ("npc", "The stones remember every footstep.", false),
                ("player", "I want the fourth key.", false),
                ("npc", "Then name this sacred place of pillars and sun.", false),
                ("npc", "It begins with the temple you stand within.", false),
                ("player", "KARNAK.", false),
                ("npc", "Good. Prove it by entering the word.", true),
            ],
        ),
        (
            5,
            "The Final Chamber",
            "Face the ultimate challenge in the hidden chamber to repair your time machine.",
            "CHRONOS",
            50,
            ("Time Warden", "Keeper of the Final Seal"),
            [
                ("npc", "Five keys. One escape.", false),
                ("player", "This is the last chamber. I need the final key.", false),
                ("npc", "Then speak the name of time itself, not hours, but the ancient force.", false),
                ("npc", "A word older than empires.", false),
                ("player", "CHRONOS.", false),
                ("npc", "Enter it, and the time machine will awaken.", true),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submit(user_id: UserId, key: &str) -> SubmitKeyRequest {
        SubmitKeyRequest {
            user_id,
            key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_campaign_levels_and_dialogue() {
        let backend = MockBackend::campaign();
        let levels = backend.list_levels().await.unwrap();
        assert_eq!(levels.len(), 5);
        assert_eq!(levels[0].title, "The Pyramids of Giza");
        assert_eq!(levels[4].level_number, 5);

        let lines = backend.get_dialogue(levels[0].id).await.unwrap();
        assert_eq!(lines.len(), 6);
        assert!(lines[1].is_player());
        assert!(lines[5].gives_key);
        assert_eq!(lines[0].character_name.as_deref(), Some("Sphinx Guardian"));
    }

    #[tokio::test]
    async fn test_reward_granted_once() {
        let backend = MockBackend::campaign();
        let first = backend.submit_key(1, &submit(1, "  human ")).await.unwrap();
        assert!(first.correct);
        assert_eq!(first.reward_credits_awarded, Some(25));
        assert_eq!(first.new_credits, Some(25));
        assert_eq!(first.next_level_id, Some(2));

        let again = backend.submit_key(1, &submit(1, "HUMAN")).await.unwrap();
        assert!(again.correct);
        assert_eq!(again.reward_credits_awarded, Some(0));
        assert_eq!(again.new_credits, Some(25));
    }

    #[tokio::test]
    async fn test_wrong_key_and_last_level() {
        let backend = MockBackend::campaign();
        let wrong = backend.submit_key(3, &submit(1, "PHAR")).await.unwrap();
        assert!(!wrong.correct);
        assert_eq!(wrong.message.as_deref(), Some(DEFAULT_REJECT_MESSAGE));

        let last = backend.submit_key(5, &submit(1, "chronos")).await.unwrap();
        assert!(last.correct);
        assert_eq!(last.next_level_id, None);
    }

    #[tokio::test]
    async fn test_progress_unlocks_next() {
        let backend = MockBackend::campaign();
        let fresh = backend.get_progress(1).await.unwrap();
        assert_eq!(fresh.next_unlocked_level_number, Some(1));
        assert!(fresh.levels.iter().all(|l| !l.completed));

        backend.submit_key(1, &submit(1, "HUMAN")).await.unwrap();
        backend.submit_key(2, &submit(1, "NILE")).await.unwrap();
        let progress = backend.get_progress(1).await.unwrap();
        assert_eq!(progress.next_unlocked_level_number, Some(3));
        assert_eq!(progress.completed_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let backend = MockBackend::campaign();
        backend.fail_progress(true).await;
        assert!(backend.get_progress(1).await.is_err());

        backend.fail_dialogue(true).await;
        assert_eq!(backend.get_dialogue(1).await.unwrap_err().kind(), "transport");

        backend
            .push_submit_error(GameError::Transport("offline".into()))
            .await;
        assert!(backend.submit_key(1, &submit(1, "HUMAN")).await.is_err());
        // 只生效一次
        assert!(backend.submit_key(1, &submit(1, "HUMAN")).await.unwrap().correct);
        assert_eq!(backend.submit_count().await, 2);
    }

    #[tokio::test]
    async fn test_login_and_register() {
        let backend = MockBackend::campaign();
        let demo = AuthRequest {
            email: DEMO_EMAIL.into(),
            username: DEMO_USERNAME.into(),
        };
        assert_eq!(backend.login(&demo).await.unwrap().id, 1);
        assert!(backend.register(&demo).await.is_err());

        let new = AuthRequest {
            email: "ka@example.com".into(),
            username: "ka".into(),
        };
        let created = backend.register(&new).await.unwrap();
        assert_eq!(created.id, 2);
        assert_eq!(created.credits, 0);
        assert_eq!(
            backend.calls().await.last(),
            Some(&MockCall::Register("ka".into()))
        );
    }
}
