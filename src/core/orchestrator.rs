//! 游戏编排器：主控循环
//!
//! 一个后台任务独占 Navigator、Narrator、会话上下文、后端句柄与定时器调度器；
//! 从三个通道（用户命令、定时器到期、后端响应）取事件，逐个处理到底再取下一个，
//! 每处理完一个事件就把投影后的 UiState 发到 watch 通道。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::GameBackend;
use crate::config::AppConfig;
use crate::core::error::GameError;
use crate::core::session::SessionContext;
use crate::core::state::UiState;
use crate::core::timer::{Scheduler, TimerFired, TimerKind, TokioScheduler};
use crate::narrator::{
    DialogueRequest, Line, Narrator, NarratorTiming, SubmitCall, SubmitKeyResponse, VisitId,
};
use crate::navigator::{
    build_deck, Direction, Level, LevelId, LevelSelected, LevelSummary, Navigator,
    ProgressSnapshot, SelectRejected,
};

/// 从 UI 发往编排器的用户命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 翻开封面
    OpenBook,
    FlipNext,
    FlipPrev,
    /// 进入右页的关卡
    EnterLevel,
    /// 按 ID 进入关卡
    SelectLevel(LevelId),
    /// 对话「下一步」
    Next,
    /// 从钥匙输入回顾对话
    ReviewChat,
    KeyInput(char),
    KeyBackspace,
    SetKey(String),
    SubmitKey,
    /// 离开关卡回到书页
    BackToBook,
    /// 完成后继续（下一关或回到书页）
    Continue,
    /// 重新拉取关卡列表与进度
    Refresh,
    /// 退出应用
    Quit,
}

/// 后端响应，回送到主循环
#[derive(Debug)]
enum BackendEvent {
    Levels(Result<Vec<LevelSummary>, GameError>),
    Progress {
        result: Result<ProgressSnapshot, GameError>,
        then_enter: Option<LevelId>,
    },
    Dialogue {
        visit: VisitId,
        result: Result<Vec<Line>, GameError>,
    },
    Submitted {
        visit: VisitId,
        result: Result<SubmitKeyResponse, GameError>,
    },
}

/// 编排器参数
#[derive(Debug, Clone)]
pub struct GameOptions {
    pub flip: Duration,
    pub narrator: NarratorTiming,
    pub images: HashMap<u32, String>,
}

impl GameOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            flip: cfg.timing.flip(),
            narrator: cfg.timing.narrator(),
            images: cfg.assets.image_map(),
        }
    }
}

impl Default for GameOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// 主循环持有的全部状态
struct Game {
    navigator: Navigator,
    narrator: Option<Narrator>,
    session: SessionContext,
    backend: Arc<dyn GameBackend>,
    sched: TokioScheduler,
    events: mpsc::UnboundedSender<BackendEvent>,
    options: GameOptions,
    notice: Option<String>,
    /// 离开关卡时仍在途的提交；服务端结果到达后仍需同步积分
    orphaned_submits: HashSet<VisitId>,
}

impl Game {
    fn snapshot(&self) -> UiState {
        UiState::project(
            &self.navigator,
            self.narrator.as_ref(),
            &self.session,
            self.notice.clone(),
        )
    }

    fn in_level(&self) -> bool {
        self.narrator.as_ref().is_some_and(|n| !n.is_closed())
    }

    fn fetch_levels(&self) {
        let backend = self.backend.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = backend.list_levels().await;
            let _ = tx.send(BackendEvent::Levels(result));
        });
    }

    fn fetch_progress(&self, then_enter: Option<LevelId>) {
        let backend = self.backend.clone();
        let tx = self.events.clone();
        let user_id = self.session.user_id();
        tokio::spawn(async move {
            let result = backend.get_progress(user_id).await;
            let _ = tx.send(BackendEvent::Progress { result, then_enter });
        });
    }

    fn fetch_dialogue(&self, req: DialogueRequest) {
        let backend = self.backend.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = backend.get_dialogue(req.level_id).await;
            let _ = tx.send(BackendEvent::Dialogue {
                visit: req.visit,
                result,
            });
        });
    }

    fn send_submission(&self, call: SubmitCall) {
        let backend = self.backend.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = backend.submit_key(call.level_id, &call.request).await;
            let _ = tx.send(BackendEvent::Submitted {
                visit: call.visit,
                result,
            });
        });
    }

    /// 进入关卡：已有 Narrator 时切换目标，否则新建；随后拉取对话
    fn enter_level(&mut self, level: Level) {
        self.notice = None;
        let req = match self.narrator.as_mut().filter(|n| !n.is_closed()) {
            Some(narrator) => narrator.retarget(level, &mut self.sched),
            None => {
                let narrator = Narrator::new(level, self.options.narrator);
                let req = narrator.dialogue_request();
                self.narrator = Some(narrator);
                req
            }
        };
        self.fetch_dialogue(req);
    }

    fn select(&mut self, result: Result<LevelSelected, SelectRejected>) {
        match result {
            Ok(selected) => self.enter_level(selected.level),
            Err(SelectRejected::Locked) => {
                self.notice = Some("This level is still locked.".to_string());
            }
            Err(reason) => tracing::debug!(?reason, "level selection ignored"),
        }
    }

    /// 卸载 Narrator 回到书页
    fn leave_level(&mut self) -> Option<LevelId> {
        let narrator = self.narrator.as_mut()?;
        let next = narrator.outcome().and_then(|o| o.next_level_id);
        if narrator.submitting() {
            tracing::debug!(visit = ?narrator.visit(), "leaving level with submission in flight");
            self.orphaned_submits.insert(narrator.visit());
        }
        narrator.teardown(&mut self.sched);
        self.narrator = None;
        next
    }

    /// 处理一个用户命令；返回 false 表示退出
    fn handle_command(&mut self, cmd: Command) -> bool {
        tracing::debug!(?cmd, "command");
        if self.in_level() {
            self.level_command(cmd)
        } else {
            self.book_command(cmd)
        }
    }

    fn book_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::OpenBook => self.navigator.open(),
            Command::FlipNext => {
                self.notice = None;
                self.navigator.request_flip(Direction::Next, &mut self.sched);
            }
            Command::FlipPrev => {
                self.notice = None;
                self.navigator.request_flip(Direction::Prev, &mut self.sched);
            }
            Command::EnterLevel => {
                let result = self.navigator.select_current();
                self.select(result);
            }
            Command::SelectLevel(id) => {
                let result = self.navigator.select_level(id);
                self.select(result);
            }
            Command::Refresh => {
                self.fetch_levels();
                self.fetch_progress(None);
            }
            Command::Quit => return false,
            other => tracing::debug!(cmd = ?other, "command not valid on book screen"),
        }
        true
    }

    fn level_command(&mut self, cmd: Command) -> bool {
        let Some(narrator) = self.narrator.as_mut() else {
            return true;
        };
        match cmd {
            Command::Next => {
                narrator.handle_next(&mut self.sched);
            }
            Command::ReviewChat => {
                narrator.review_chat(&mut self.sched);
            }
            Command::KeyInput(c) => narrator.push_key_char(c),
            Command::KeyBackspace => narrator.pop_key_char(),
            Command::SetKey(key) => narrator.set_key(key),
            Command::SubmitKey => {
                if let Some(call) = narrator.submit_key(&self.session, &mut self.sched) {
                    self.send_submission(call);
                }
            }
            Command::BackToBook => {
                self.leave_level();
                self.fetch_progress(None);
            }
            Command::Continue => {
                if narrator.outcome().is_none() {
                    return true;
                }
                let next = self.leave_level();
                tracing::info!(next_level_id = ?next, "level complete, returning to book");
                self.fetch_progress(next);
            }
            Command::Quit => return false,
            other => tracing::debug!(cmd = ?other, "command not valid on level screen"),
        }
        true
    }

    fn handle_timer(&mut self, fired: TimerFired) {
        self.sched.retire(fired.id);
        match fired.kind {
            TimerKind::FlipComplete => {
                self.navigator.on_timer(&fired);
            }
            TimerKind::TypingReveal | TimerKind::ShakeStart | TimerKind::ShakeReset => {
                if let Some(narrator) = self.narrator.as_mut() {
                    narrator.on_timer(&fired, &mut self.sched);
                }
            }
        }
    }

    fn handle_backend(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Levels(Ok(summaries)) => {
                let deck = build_deck(summaries, &self.options.images);
                self.navigator.set_levels(deck, &mut self.sched);
            }
            BackendEvent::Levels(Err(e)) => {
                tracing::warn!(error = %e, "failed to load levels, keeping previous deck");
            }
            BackendEvent::Progress { result, then_enter } => {
                match result {
                    Ok(snapshot) => self.navigator.apply_progress(snapshot),
                    Err(e) => tracing::warn!(error = %e, "failed to load progress, keeping previous snapshot"),
                }
                // 服务端已给出下一关，且玩家仍停留在书页时直接进入
                if let Some(id) = then_enter {
                    if self.in_level() {
                        return;
                    }
                    match self.navigator.find(id).cloned() {
                        Some(level) => self.enter_level(level),
                        None => tracing::debug!(level_id = id, "next level not in deck"),
                    }
                }
            }
            BackendEvent::Dialogue { visit, result } => {
                if let Some(narrator) = self.narrator.as_mut() {
                    narrator.on_script(visit, result, &mut self.sched);
                }
            }
            BackendEvent::Submitted { visit, result } => {
                if self.orphaned_submits.remove(&visit) {
                    self.on_orphaned_submit(result);
                } else if let Some(narrator) = self.narrator.as_mut() {
                    narrator.on_submit_result(visit, result, &mut self.session, &mut self.sched);
                }
            }
        }
    }

    /// 关卡已卸载后到达的提交结果：服务端已记账，只同步积分与进度
    fn on_orphaned_submit(&mut self, result: Result<SubmitKeyResponse, GameError>) {
        match result {
            Ok(resp) if resp.correct => {
                if let Some(credits) = resp.new_credits {
                    self.session.set_credits(credits);
                }
                tracing::info!(credits = self.session.credits(), "late key acceptance applied");
                self.fetch_progress(None);
            }
            Ok(_) => tracing::debug!("late key rejection dropped"),
            Err(e) => tracing::debug!(error = %e, "late submission failure dropped"),
        }
    }

    /// 退出：卸载两台状态机，取消所有定时器
    fn teardown(&mut self) {
        self.leave_level();
        self.navigator.teardown(&mut self.sched);
        self.sched.shutdown();
        tracing::info!("game torn down");
    }
}

/// 创建游戏运行时：返回命令发送端、状态接收端与主循环句柄。
/// 后台任务先拉取关卡与进度，然后消费命令、定时器与后端响应并更新状态。
pub fn create_game(
    backend: Arc<dyn GameBackend>,
    session: SessionContext,
    options: GameOptions,
) -> (
    mpsc::UnboundedSender<Command>,
    watch::Receiver<UiState>,
    JoinHandle<()>,
) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (sched, mut timer_rx) = TokioScheduler::new();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<BackendEvent>();

    let mut game = Game {
        navigator: Navigator::new(options.flip),
        narrator: None,
        session,
        backend,
        sched,
        events: event_tx,
        options,
        notice: None,
        orphaned_submits: HashSet::new(),
    };
    let (state_tx, state_rx) = watch::channel(game.snapshot());

    let handle = tokio::spawn(async move {
        game.fetch_levels();
        game.fetch_progress(None);

        loop {
            tokio::select! {
                maybe_cmd = cmd_rx.recv() => {
                    let Some(cmd) = maybe_cmd else {
                        tracing::debug!("command channel closed");
                        break;
                    };
                    if !game.handle_command(cmd) {
                        break;
                    }
                }
                Some(fired) = timer_rx.recv() => game.handle_timer(fired),
                Some(event) = event_rx.recv() => game.handle_backend(event),
                else => {
                    tracing::error!("all game channels closed unexpectedly");
                    break;
                }
            }
            let _ = state_tx.send(game.snapshot());
        }

        game.teardown();
        let mut last = game.snapshot();
        last.quitting = true;
        let _ = state_tx.send(last);
    });

    (cmd_tx, state_rx, handle)
}
