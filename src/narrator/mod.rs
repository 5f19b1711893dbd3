//! Narrator：单关叙事状态机（对话 → 输入钥匙 → 奖励）
//!
//! 阶段严格前进：`Chat` → `KeyEntry` → `Done`，唯一的回退是从 `KeyEntry`「回顾对话」回到 `Chat`
//! （光标不变，「下一步」直接可用）。每个状态只携带自己需要的数据，
//! 打字中/可继续/提交中这类标志不可能出现矛盾组合。
//!
//! 定时器：打字揭示（默认 1500ms）与抖动脉冲（下一帧开启，默认 520ms 后关闭）。
//! 离开所属状态、切换关卡或卸载时统一取消；迟到的触发事件按 TimerId 比对后丢弃。

pub mod script;
pub mod submission;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::core::error::GameError;
use crate::core::session::SessionContext;
use crate::core::timer::{Scheduler, TimerFired, TimerHandle, TimerKind};
use crate::navigator::{Level, LevelId};

pub use script::{DialogueScript, Line, NpcMeta, Speaker};
pub use submission::{
    RewardOutcome, SubmissionAttempt, SubmitKeyRequest, SubmitKeyResponse, DEFAULT_REJECT_MESSAGE,
    EMPTY_KEY_MESSAGE,
};

/// 打字揭示延迟默认值
pub const DEFAULT_REVEAL_MS: u64 = 1500;
/// 抖动脉冲时长默认值
pub const DEFAULT_SHAKE_MS: u64 = 520;

/// 打字中显示的占位文本
pub const TYPING_PLACEHOLDER: &str = "...";

/// Narrator 用到的时长
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NarratorTiming {
    pub reveal: Duration,
    pub shake: Duration,
}

impl Default for NarratorTiming {
    fn default() -> Self {
        Self {
            reveal: Duration::from_millis(DEFAULT_REVEAL_MS),
            shake: Duration::from_millis(DEFAULT_SHAKE_MS),
        }
    }
}

/// 关卡访问 ID：每次进入（或切换）关卡分配一个，异步响应凭它认领
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct VisitId(u64);

static NEXT_VISIT_ID: AtomicU64 = AtomicU64::new(0);

impl VisitId {
    fn next() -> Self {
        Self(NEXT_VISIT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// 顶层阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Chat,
    KeyEntry,
    Done,
}

#[derive(Debug)]
enum Typing {
    Revealing(TimerHandle),
    Revealed,
}

/// 抖动脉冲：Arming 为「先关」，下一帧转为 Active「再开」，到时自动回到 Idle
#[derive(Debug, Default)]
enum Shake {
    #[default]
    Idle,
    Arming(TimerHandle),
    Active(TimerHandle),
}

impl Shake {
    fn release(&mut self, sched: &mut dyn Scheduler) {
        match std::mem::take(self) {
            Shake::Arming(h) | Shake::Active(h) => sched.cancel(h),
            Shake::Idle => {}
        }
    }

    /// 强制关闭后重新布置，保证上一次脉冲未结束时也能再次触发
    fn trigger(&mut self, sched: &mut dyn Scheduler) {
        self.release(sched);
        *self = Shake::Arming(sched.schedule(Duration::ZERO, TimerKind::ShakeStart));
    }
}

#[derive(Debug)]
enum NarratorState {
    /// 等待对话脚本
    Loading,
    /// 脚本为空或拉取失败
    NoDialogue,
    Chat {
        cursor: usize,
        typing: Typing,
        /// 回顾对话时暂存的输入状态
        parked: Option<SubmissionAttempt>,
    },
    KeyEntry {
        attempt: SubmissionAttempt,
        shake: Shake,
    },
    Done {
        outcome: RewardOutcome,
        last_result: SubmitKeyResponse,
    },
    /// 已卸载，不再接受任何事件
    Closed,
}

/// 需要宿主发起的对话拉取
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DialogueRequest {
    pub visit: VisitId,
    pub level_id: LevelId,
}

/// 需要宿主发起的钥匙提交
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitCall {
    pub visit: VisitId,
    pub level_id: LevelId,
    pub request: SubmitKeyRequest,
}

/// 单关叙事状态机
#[derive(Debug)]
pub struct Narrator {
    visit: VisitId,
    level: Level,
    script: DialogueScript,
    state: NarratorState,
    timing: NarratorTiming,
    typing_cycles: usize,
    shake_pulses: usize,
}

impl Narrator {
    /// 进入关卡：处于 Loading，调用方随后按 `dialogue_request()` 拉取脚本
    pub fn new(level: Level, timing: NarratorTiming) -> Self {
        tracing::info!(level_id = level.id, title = %level.title, "entering level");
        Self {
            visit: VisitId::next(),
            level,
            script: DialogueScript::default(),
            state: NarratorState::Loading,
            timing,
            typing_cycles: 0,
            shake_pulses: 0,
        }
    }

    pub fn dialogue_request(&self) -> DialogueRequest {
        DialogueRequest {
            visit: self.visit,
            level_id: self.level.id,
        }
    }

    /// 切换到另一关：取消全部定时器，清空光标与输入，重新拉取脚本
    pub fn retarget(&mut self, level: Level, sched: &mut dyn Scheduler) -> DialogueRequest {
        self.teardown(sched);
        tracing::info!(from = self.level.id, to = level.id, "switching level");
        self.visit = VisitId::next();
        self.level = level;
        self.script = DialogueScript::default();
        self.state = NarratorState::Loading;
        self.typing_cycles = 0;
        self.shake_pulses = 0;
        self.dialogue_request()
    }

    /// 卸载：取消打字与抖动定时器
    pub fn teardown(&mut self, sched: &mut dyn Scheduler) {
        match std::mem::replace(&mut self.state, NarratorState::Closed) {
            NarratorState::Chat {
                typing: Typing::Revealing(h),
                ..
            } => sched.cancel(h),
            NarratorState::KeyEntry { mut shake, .. } => shake.release(sched),
            _ => {}
        }
    }

    /// 脚本到达（或拉取失败）
    pub fn on_script(
        &mut self,
        visit: VisitId,
        result: Result<Vec<Line>, GameError>,
        sched: &mut dyn Scheduler,
    ) -> bool {
        if visit != self.visit || !matches!(self.state, NarratorState::Loading) {
            tracing::debug!(?visit, "ignoring dialogue for another visit");
            return false;
        }
        match result {
            Ok(lines) if !lines.is_empty() => {
                tracing::debug!(level_id = self.level.id, lines = lines.len(), "dialogue loaded");
                self.script = DialogueScript::new(lines);
                self.start_typing(0, None, sched);
            }
            Ok(_) => {
                tracing::info!(level_id = self.level.id, "level has no dialogue");
                self.state = NarratorState::NoDialogue;
            }
            Err(e) => {
                tracing::warn!(level_id = self.level.id, error = %e, "failed to load dialogue");
                self.state = NarratorState::NoDialogue;
            }
        }
        true
    }

    fn start_typing(
        &mut self,
        cursor: usize,
        parked: Option<SubmissionAttempt>,
        sched: &mut dyn Scheduler,
    ) {
        let timer = sched.schedule(self.timing.reveal, TimerKind::TypingReveal);
        self.typing_cycles += 1;
        self.state = NarratorState::Chat {
            cursor,
            typing: Typing::Revealing(timer),
            parked,
        };
    }

    /// 分发定时器事件；不属于当前状态的事件被丢弃
    pub fn on_timer(&mut self, fired: &TimerFired, sched: &mut dyn Scheduler) -> bool {
        let owned = match (&self.state, fired.kind) {
            (
                NarratorState::Chat {
                    typing: Typing::Revealing(h),
                    ..
                },
                TimerKind::TypingReveal,
            ) => h.matches(fired),
            (
                NarratorState::KeyEntry {
                    shake: Shake::Arming(h),
                    ..
                },
                TimerKind::ShakeStart,
            ) => h.matches(fired),
            (
                NarratorState::KeyEntry {
                    shake: Shake::Active(h),
                    ..
                },
                TimerKind::ShakeReset,
            ) => h.matches(fired),
            _ => false,
        };
        if !owned {
            tracing::debug!(id = ?fired.id, kind = ?fired.kind, "ignoring stale narrator timer");
            return false;
        }

        match &mut self.state {
            NarratorState::Chat { typing, .. } => *typing = Typing::Revealed,
            NarratorState::KeyEntry { shake, .. } => {
                *shake = match fired.kind {
                    TimerKind::ShakeStart => {
                        Shake::Active(sched.schedule(self.timing.shake, TimerKind::ShakeReset))
                    }
                    _ => Shake::Idle,
                };
            }
            _ => {}
        }
        true
    }

    /// 「下一步」：仅在当前行揭示后可用；最后一行之后进入 KeyEntry
    pub fn handle_next(&mut self, sched: &mut dyn Scheduler) -> bool {
        let NarratorState::Chat {
            cursor,
            typing: Typing::Revealed,
            parked,
        } = &mut self.state
        else {
            return false;
        };
        let cursor = *cursor;
        let parked = parked.take();

        if self.script.is_last(cursor) {
            tracing::debug!(level_id = self.level.id, "dialogue finished, awaiting key");
            self.state = NarratorState::KeyEntry {
                attempt: parked.unwrap_or_default(),
                shake: Shake::Idle,
            };
        } else {
            self.start_typing(cursor + 1, parked, sched);
        }
        true
    }

    /// 从 KeyEntry 回顾对话；提交中不可回退
    pub fn review_chat(&mut self, sched: &mut dyn Scheduler) -> bool {
        match &self.state {
            NarratorState::KeyEntry { attempt, .. } if !attempt.submitting => {}
            _ => return false,
        }
        if let NarratorState::KeyEntry { attempt, mut shake } =
            std::mem::replace(&mut self.state, NarratorState::Closed)
        {
            shake.release(sched);
            self.state = NarratorState::Chat {
                cursor: self.script.len().saturating_sub(1),
                typing: Typing::Revealed,
                parked: Some(attempt),
            };
        }
        true
    }

    fn attempt_mut(&mut self) -> Option<&mut SubmissionAttempt> {
        match &mut self.state {
            NarratorState::KeyEntry { attempt, .. } => Some(attempt),
            _ => None,
        }
    }

    pub fn set_key(&mut self, key: impl Into<String>) {
        if let Some(attempt) = self.attempt_mut() {
            attempt.entered_key = key.into();
        }
    }

    pub fn push_key_char(&mut self, c: char) {
        if let Some(attempt) = self.attempt_mut() {
            attempt.entered_key.push(c);
        }
    }

    pub fn pop_key_char(&mut self) {
        if let Some(attempt) = self.attempt_mut() {
            attempt.entered_key.pop();
        }
    }

    /// 提交钥匙。空输入就地报错并抖动，不发请求；已有提交在途时为 no-op。
    /// 返回 Some 时由宿主发起网络调用，结果经 `on_submit_result` 回送。
    pub fn submit_key(
        &mut self,
        session: &SessionContext,
        sched: &mut dyn Scheduler,
    ) -> Option<SubmitCall> {
        let NarratorState::KeyEntry { attempt, shake } = &mut self.state else {
            return None;
        };
        if attempt.submitting {
            return None;
        }
        attempt.error = None;

        let Some(key) = attempt.trimmed_key().map(str::to_string) else {
            let err = GameError::Validation(EMPTY_KEY_MESSAGE.to_string());
            tracing::debug!(level_id = self.level.id, kind = err.kind(), "key rejected locally");
            attempt.error = Some(err.user_message());
            shake.trigger(sched);
            self.shake_pulses += 1;
            return None;
        };

        attempt.submitting = true;
        tracing::debug!(level_id = self.level.id, "submitting key");
        Some(SubmitCall {
            visit: self.visit,
            level_id: self.level.id,
            request: SubmitKeyRequest {
                user_id: session.user_id(),
                key,
            },
        })
    }

    /// 提交结果到达。无论成功、拒绝还是异常，submitting 都会复位
    pub fn on_submit_result(
        &mut self,
        visit: VisitId,
        result: Result<SubmitKeyResponse, GameError>,
        session: &mut SessionContext,
        sched: &mut dyn Scheduler,
    ) -> bool {
        if visit != self.visit {
            tracing::debug!(?visit, "ignoring submission result for another visit");
            return false;
        }
        let NarratorState::KeyEntry { attempt, shake } = &mut self.state else {
            return false;
        };
        if !attempt.submitting {
            return false;
        }
        attempt.submitting = false;

        match result {
            Ok(resp) if resp.correct => {
                if let Some(credits) = resp.new_credits {
                    session.set_credits(credits);
                }
                shake.release(sched);
                let outcome = RewardOutcome::from_response(&resp);
                tracing::info!(
                    level_id = self.level.id,
                    reward = outcome.reward_credits_awarded,
                    next_level_id = ?outcome.next_level_id,
                    "key accepted"
                );
                self.state = NarratorState::Done {
                    outcome,
                    last_result: resp,
                };
            }
            Ok(resp) => {
                let message = resp
                    .message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_REJECT_MESSAGE.to_string());
                tracing::warn!(level_id = self.level.id, %message, "key rejected");
                attempt.error = Some(message);
                attempt.last_result = Some(resp);
                shake.trigger(sched);
                self.shake_pulses += 1;
            }
            Err(e) => {
                tracing::warn!(level_id = self.level.id, kind = e.kind(), error = %e, "key submission failed");
                attempt.error = Some(e.user_message());
                shake.trigger(sched);
                self.shake_pulses += 1;
            }
        }
        true
    }

    pub fn visit(&self) -> VisitId {
        self.visit
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn script(&self) -> &DialogueScript {
        &self.script
    }

    pub fn npc(&self) -> &NpcMeta {
        self.script.npc()
    }

    /// Loading / NoDialogue 视为 Chat 阶段的前置子状态
    pub fn stage(&self) -> Stage {
        match self.state {
            NarratorState::KeyEntry { .. } => Stage::KeyEntry,
            NarratorState::Done { .. } => Stage::Done,
            _ => Stage::Chat,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, NarratorState::Loading)
    }

    pub fn has_no_dialogue(&self) -> bool {
        matches!(self.state, NarratorState::NoDialogue)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, NarratorState::Closed)
    }

    pub fn cursor(&self) -> Option<usize> {
        match self.state {
            NarratorState::Chat { cursor, .. } => Some(cursor),
            _ => None,
        }
    }

    pub fn current_line(&self) -> Option<&Line> {
        self.cursor().and_then(|c| self.script.get(c))
    }

    pub fn is_typing(&self) -> bool {
        matches!(
            self.state,
            NarratorState::Chat {
                typing: Typing::Revealing(_),
                ..
            }
        )
    }

    pub fn show_next_button(&self) -> bool {
        matches!(
            self.state,
            NarratorState::Chat {
                typing: Typing::Revealed,
                ..
            }
        )
    }

    /// 当前行显示的文本：打字中为占位符
    pub fn display_text(&self) -> Option<&str> {
        let line = self.current_line()?;
        Some(if self.is_typing() {
            TYPING_PLACEHOLDER
        } else {
            line.text.as_str()
        })
    }

    /// 「下一步」按钮文案
    pub fn next_label(&self) -> Option<&'static str> {
        match self.state {
            NarratorState::Chat {
                cursor,
                typing: Typing::Revealed,
                ..
            } => Some(if self.script.is_last(cursor) {
                "Enter Key →"
            } else {
                "Continue →"
            }),
            _ => None,
        }
    }

    pub fn attempt(&self) -> Option<&SubmissionAttempt> {
        match &self.state {
            NarratorState::KeyEntry { attempt, .. } => Some(attempt),
            NarratorState::Chat { parked, .. } => parked.as_ref(),
            _ => None,
        }
    }

    pub fn entered_key(&self) -> Option<&str> {
        self.attempt().map(|a| a.entered_key.as_str())
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            NarratorState::KeyEntry { attempt, .. } => attempt.error.as_deref(),
            _ => None,
        }
    }

    pub fn submitting(&self) -> bool {
        matches!(&self.state, NarratorState::KeyEntry { attempt, .. } if attempt.submitting)
    }

    pub fn is_shaking(&self) -> bool {
        matches!(
            self.state,
            NarratorState::KeyEntry {
                shake: Shake::Active(_),
                ..
            }
        )
    }

    /// 本次访问累计触发的抖动次数
    pub fn shake_pulses(&self) -> usize {
        self.shake_pulses
    }

    /// 本次访问累计开始的打字周期数
    pub fn typing_cycles(&self) -> usize {
        self.typing_cycles
    }

    pub fn outcome(&self) -> Option<&RewardOutcome> {
        match &self.state {
            NarratorState::Done { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    pub fn last_result(&self) -> Option<&SubmitKeyResponse> {
        match &self.state {
            NarratorState::Done { last_result, .. } => Some(last_result),
            NarratorState::KeyEntry { attempt, .. } => attempt.last_result.as_ref(),
            _ => None,
        }
    }
}
