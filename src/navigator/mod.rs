//! Navigator：翻书选关状态机
//!
//! 状态：`Closed`（封面）→ `Idle`（静态双页）→ `Flipping`（翻页动画中）→ 回到 `Idle`。
//! 翻页事务只在 `Flipping` 中存在，与状态一同创建、一同销毁，因此同一时刻至多一个。
//! 右页是 `current_page`，左页是 `current_page - 1`（为 -1 时显示序章占位页）。

pub mod level;
pub mod progress;

use std::time::Duration;

use serde::Serialize;

use crate::core::timer::{Scheduler, TimerFired, TimerHandle, TimerKind};

pub use level::{build_deck, Level, LevelId, LevelSummary};
pub use progress::{LevelProgress, ProgressSnapshot};

use progress::DerivedProgress;

/// 翻页动画时长默认值
pub const DEFAULT_FLIP_MS: u64 = 800;

/// 每侧最多叠放的装饰页数
const MAX_STACKED_PAGES: usize = 2;

/// 翻页方向
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Prev,
}

/// 翻页事务：动画中两面分别显示的关卡下标
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlipTransaction {
    pub direction: Direction,
    pub front: usize,
    pub back: usize,
}

/// 书本状态
#[derive(Debug)]
enum BookState {
    Closed,
    Idle,
    Flipping {
        flip: FlipTransaction,
        timer: TimerHandle,
    },
}

/// 选关被拒绝的原因
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectRejected {
    /// 书未打开或正在翻页
    NotIdle,
    /// 牌组中没有该关卡
    Unknown,
    Locked,
}

/// 选关事件：宿主据此把控制权交给 Narrator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelSelected {
    pub level: Level,
}

/// 左页内容
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeftFace {
    Prologue,
    Level(usize),
}

/// 当前双页布局（渲染层按此绘制）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Spread {
    pub left: LeftFace,
    pub right: Option<usize>,
    pub stacked_left: usize,
    pub stacked_right: usize,
    pub flip: Option<FlipTransaction>,
}

/// 翻书状态机
#[derive(Debug)]
pub struct Navigator {
    levels: Vec<Level>,
    current_page: usize,
    state: BookState,
    progress: Option<DerivedProgress>,
    flip_duration: Duration,
}

impl Navigator {
    pub fn new(flip_duration: Duration) -> Self {
        Self {
            levels: Vec::new(),
            current_page: 0,
            state: BookState::Closed,
            progress: None,
            flip_duration,
        }
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level(&self, index: usize) -> Option<&Level> {
        self.levels.get(index)
    }

    pub fn find(&self, id: LevelId) -> Option<&Level> {
        self.levels.iter().find(|l| l.id == id)
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// 左页下标，可能为 -1
    pub fn left_index(&self) -> isize {
        self.current_page as isize - 1
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, BookState::Closed)
    }

    pub fn is_flipping(&self) -> bool {
        matches!(self.state, BookState::Flipping { .. })
    }

    pub fn flip(&self) -> Option<FlipTransaction> {
        match &self.state {
            BookState::Flipping { flip, .. } => Some(*flip),
            _ => None,
        }
    }

    pub fn progress(&self) -> Option<&ProgressSnapshot> {
        self.progress.as_ref().map(|p| &p.snapshot)
    }

    /// 整体替换牌组；翻页中会先取消翻页，页码夹回有效范围
    pub fn set_levels(&mut self, mut levels: Vec<Level>, sched: &mut dyn Scheduler) {
        levels.sort_by_key(|l| l.order_index);
        if let BookState::Flipping { .. } = self.state {
            self.abort_flip(sched);
        }
        self.levels = levels;
        self.current_page = self.current_page.min(self.levels.len().saturating_sub(1));
        tracing::info!(count = self.levels.len(), "deck loaded");
    }

    /// 用新快照替换进度，派生集合随之重算
    pub fn apply_progress(&mut self, snapshot: ProgressSnapshot) {
        tracing::debug!(
            next_unlocked = ?snapshot.next_unlocked_level_number,
            "progress applied"
        );
        self.progress = Some(snapshot.into());
    }

    /// 打开书；已打开时为 no-op
    pub fn open(&mut self) {
        if let BookState::Closed = self.state {
            self.state = BookState::Idle;
            tracing::debug!("book opened");
        }
    }

    /// 请求翻页；仅在 `Idle` 且目标页存在时接受，返回是否接受
    pub fn request_flip(&mut self, direction: Direction, sched: &mut dyn Scheduler) -> bool {
        if !matches!(self.state, BookState::Idle) {
            return false;
        }
        let page = self.current_page;
        let flip = match direction {
            Direction::Next if page + 1 < self.levels.len() => FlipTransaction {
                direction,
                front: page,
                back: page + 1,
            },
            Direction::Prev if page > 0 => FlipTransaction {
                direction,
                front: page - 1,
                back: page,
            },
            _ => return false,
        };
        let timer = sched.schedule(self.flip_duration, TimerKind::FlipComplete);
        self.state = BookState::Flipping { flip, timer };
        true
    }

    /// 翻页定时器到期：提交页码并回到 `Idle`。返回是否确实提交了
    pub fn on_timer(&mut self, fired: &TimerFired) -> bool {
        let flip = match &self.state {
            BookState::Flipping { flip, timer } if timer.matches(fired) => *flip,
            _ => {
                tracing::debug!(id = ?fired.id, "ignoring stale flip timer");
                return false;
            }
        };
        self.current_page = match flip.direction {
            Direction::Next => self.current_page + 1,
            Direction::Prev => self.current_page - 1,
        };
        self.state = BookState::Idle;
        tracing::debug!(page = self.current_page, "flip committed");
        true
    }

    /// 卸载：取消未完成的翻页，页码保持不变
    pub fn teardown(&mut self, sched: &mut dyn Scheduler) {
        if let BookState::Flipping { .. } = self.state {
            self.abort_flip(sched);
        }
    }

    fn abort_flip(&mut self, sched: &mut dyn Scheduler) {
        if let BookState::Flipping { timer, .. } =
            std::mem::replace(&mut self.state, BookState::Idle)
        {
            sched.cancel(timer);
        }
    }

    /// 无进度数据时放行（初次加载期间），否则看序号是否在解锁集合中
    pub fn is_unlocked(&self, level: &Level) -> bool {
        match &self.progress {
            None => true,
            Some(p) => p.is_unlocked(level.order_index),
        }
    }

    pub fn is_completed(&self, level: &Level) -> bool {
        self.progress
            .as_ref()
            .is_some_and(|p| p.completed.contains(&level.id))
    }

    /// 选关：仅 `Idle` 时有效，未解锁则拒绝
    pub fn select_level(&self, id: LevelId) -> Result<LevelSelected, SelectRejected> {
        if !matches!(self.state, BookState::Idle) {
            return Err(SelectRejected::NotIdle);
        }
        let level = self.find(id).ok_or(SelectRejected::Unknown)?;
        if !self.is_unlocked(level) {
            tracing::info!(level_id = id, "level is locked");
            return Err(SelectRejected::Locked);
        }
        tracing::info!(level_id = id, title = %level.title, "level selected");
        Ok(LevelSelected {
            level: level.clone(),
        })
    }

    /// 选择当前右页的关卡
    pub fn select_current(&self) -> Result<LevelSelected, SelectRejected> {
        let id = self
            .levels
            .get(self.current_page)
            .map(|l| l.id)
            .ok_or(SelectRejected::Unknown)?;
        self.select_level(id)
    }

    pub fn can_flip(&self, direction: Direction) -> bool {
        matches!(self.state, BookState::Idle)
            && match direction {
                Direction::Next => self.current_page + 1 < self.levels.len(),
                Direction::Prev => self.current_page > 0,
            }
    }

    /// 当前双页布局
    pub fn spread(&self) -> Spread {
        let left = match self.current_page.checked_sub(1) {
            Some(i) if i < self.levels.len() => LeftFace::Level(i),
            _ => LeftFace::Prologue,
        };
        let right = (self.current_page < self.levels.len()).then_some(self.current_page);
        let stacked_right = self
            .levels
            .len()
            .saturating_sub(self.current_page + 1)
            .min(MAX_STACKED_PAGES);
        let stacked_left = self.current_page.saturating_sub(1).min(MAX_STACKED_PAGES);
        Spread {
            left,
            right,
            stacked_left,
            stacked_right,
            flip: self.flip(),
        }
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_FLIP_MS))
    }
}
