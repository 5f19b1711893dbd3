//! UiState 投影
//!
//! 渲染层只持有轻量的 UiState；Navigator/Narrator 的完整状态由编排器维护，
//! 每次事件处理完后投影为一份自有快照经 watch 通道发布。

use serde::Serialize;

use crate::core::session::SessionContext;
use crate::narrator::{Narrator, Stage};
use crate::navigator::{Direction, LeftFace, Level, LevelId, Navigator};

/// 当前屏幕
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Screen {
    #[default]
    Book,
    Level,
}

/// 右页徽章
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Badge {
    KeyCollected,
    Unlocked,
    Locked,
}

impl Badge {
    pub fn label(&self) -> &'static str {
        match self {
            Self::KeyCollected => "Key Collected",
            Self::Unlocked => "Unlocked",
            Self::Locked => "Locked",
        }
    }
}

/// 单页内容
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageView {
    pub index: usize,
    pub level_id: LevelId,
    pub order_index: u32,
    pub title: String,
    pub description: String,
    pub image_ref: Option<String>,
    pub badge: Badge,
}

/// 翻页动画中的两面
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FlipView {
    pub direction: Direction,
    pub front: PageView,
    pub back: PageView,
}

/// 书本视图
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BookView {
    pub open: bool,
    /// None 表示序章占位页
    pub left: Option<PageView>,
    pub right: Option<PageView>,
    pub stacked_left: usize,
    pub stacked_right: usize,
    pub flip: Option<FlipView>,
    pub can_prev: bool,
    pub can_next: bool,
    pub can_enter: bool,
    pub page: usize,
    pub total: usize,
}

/// 关卡阶段视图
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum StageView {
    Loading,
    NoDialogue,
    Chat {
        cursor: usize,
        total: usize,
        speaker: String,
        is_player: bool,
        text: String,
        typing: bool,
        next_label: Option<String>,
        gives_key: bool,
    },
    KeyEntry {
        entered_key: String,
        submitting: bool,
        submit_label: String,
        error: Option<String>,
        shaking: bool,
    },
    Done {
        summary: String,
        continue_label: String,
        new_credits: Option<i64>,
    },
}

/// 关卡视图
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LevelView {
    pub level_id: LevelId,
    pub title: String,
    pub description: String,
    pub image_ref: Option<String>,
    pub npc_name: String,
    pub npc_title: String,
    pub stage: StageView,
}

/// UI 看到的「投影」状态
#[derive(Clone, Debug, Serialize)]
pub struct UiState {
    pub screen: Screen,
    pub username: String,
    pub initial: char,
    pub credits: i64,
    pub book: BookView,
    pub level: Option<LevelView>,
    /// 最近一条提示（如「关卡未解锁」）
    pub notice: Option<String>,
    pub quitting: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            screen: Screen::Book,
            username: String::new(),
            initial: '?',
            credits: 0,
            book: BookView::default(),
            level: None,
            notice: None,
            quitting: false,
        }
    }
}

impl UiState {
    /// 合并两台状态机与会话上下文
    pub fn project(
        navigator: &Navigator,
        narrator: Option<&Narrator>,
        session: &SessionContext,
        notice: Option<String>,
    ) -> Self {
        let level = narrator.filter(|n| !n.is_closed()).map(project_level);
        Self {
            screen: if level.is_some() {
                Screen::Level
            } else {
                Screen::Book
            },
            username: session.username().to_string(),
            initial: session.initial(),
            credits: session.credits(),
            book: project_book(navigator),
            level,
            notice,
            quitting: false,
        }
    }
}

fn page_view(navigator: &Navigator, index: usize) -> Option<PageView> {
    let level: &Level = navigator.level(index)?;
    let badge = if navigator.is_completed(level) {
        Badge::KeyCollected
    } else if navigator.is_unlocked(level) {
        Badge::Unlocked
    } else {
        Badge::Locked
    };
    Some(PageView {
        index,
        level_id: level.id,
        order_index: level.order_index,
        title: level.title.clone(),
        description: level.description.clone(),
        image_ref: level.image_ref.clone(),
        badge,
    })
}

pub fn project_book(navigator: &Navigator) -> BookView {
    let spread = navigator.spread();
    let left = match spread.left {
        LeftFace::Prologue => None,
        LeftFace::Level(i) => page_view(navigator, i),
    };
    let right = spread.right.and_then(|i| page_view(navigator, i));
    let flip = spread.flip.and_then(|f| {
        Some(FlipView {
            direction: f.direction,
            front: page_view(navigator, f.front)?,
            back: page_view(navigator, f.back)?,
        })
    });
    let can_enter = navigator.is_open()
        && !navigator.is_flipping()
        && right.as_ref().is_some_and(|p| p.badge != Badge::Locked);
    BookView {
        open: navigator.is_open(),
        left,
        right,
        stacked_left: spread.stacked_left,
        stacked_right: spread.stacked_right,
        flip,
        can_prev: navigator.can_flip(Direction::Prev),
        can_next: navigator.can_flip(Direction::Next),
        can_enter,
        page: navigator.current_page(),
        total: navigator.levels().len(),
    }
}

pub fn project_level(narrator: &Narrator) -> LevelView {
    let stage = if narrator.is_loading() {
        StageView::Loading
    } else if narrator.has_no_dialogue() {
        StageView::NoDialogue
    } else {
        match narrator.stage() {
            Stage::Chat => chat_view(narrator),
            Stage::KeyEntry => StageView::KeyEntry {
                entered_key: narrator.entered_key().unwrap_or_default().to_string(),
                submitting: narrator.submitting(),
                submit_label: if narrator.submitting() {
                    "Checking...".to_string()
                } else {
                    "Submit Key".to_string()
                },
                error: narrator.error().map(str::to_string),
                shaking: narrator.is_shaking(),
            },
            Stage::Done => match narrator.outcome() {
                Some(outcome) => StageView::Done {
                    summary: outcome.summary(),
                    continue_label: outcome.continue_label().to_string(),
                    new_credits: outcome.new_credits,
                },
                None => StageView::Loading,
            },
        }
    };
    let level = narrator.level();
    LevelView {
        level_id: level.id,
        title: level.title.clone(),
        description: level.description.clone(),
        image_ref: level.image_ref.clone(),
        npc_name: narrator.npc().name.clone(),
        npc_title: narrator.npc().title.clone(),
        stage,
    }
}

fn chat_view(narrator: &Narrator) -> StageView {
    let (Some(cursor), Some(line)) = (narrator.cursor(), narrator.current_line()) else {
        return StageView::Loading;
    };
    StageView::Chat {
        cursor,
        total: narrator.script().len(),
        speaker: narrator.script().speaker_label(line),
        is_player: line.is_player(),
        text: narrator.display_text().unwrap_or_default().to_string(),
        typing: narrator.is_typing(),
        next_label: narrator.next_label().map(str::to_string),
        gives_key: line.gives_key && !narrator.is_typing(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timer::{ManualScheduler, Scheduler};
    use crate::narrator::{Line, NarratorTiming};
    use crate::navigator::{LevelProgress, ProgressSnapshot};

    fn level(id: LevelId) -> Level {
        Level {
            id,
            order_index: id as u32,
            title: format!("Level {}", id),
            description: String::new(),
            image_ref: None,
        }
    }

    fn navigator(n: i64, sched: &mut ManualScheduler) -> Navigator {
        let mut nav = Navigator::default();
        nav.set_levels((1..=n).map(level).collect(), sched);
        nav.open();
        nav
    }

    #[test]
    fn test_book_badges_and_enter() {
        let mut sched = ManualScheduler::new();
        let mut nav = navigator(3, &mut sched);
        nav.apply_progress(ProgressSnapshot {
            levels: vec![LevelProgress {
                id: 1,
                completed: true,
            }],
            next_unlocked_level_number: Some(2),
        });

        let book = project_book(&nav);
        assert!(book.left.is_none());
        assert_eq!(book.right.as_ref().map(|p| p.badge), Some(Badge::KeyCollected));
        assert!(book.can_enter);
        assert!(!book.can_prev);
        assert!(book.can_next);

        nav.request_flip(Direction::Next, &mut sched);
        let book = project_book(&nav);
        let flip = book.flip.as_ref().unwrap();
        assert_eq!(flip.front.index, 0);
        assert_eq!(flip.back.index, 1);
        assert!(!book.can_enter);

        sched.run_for(800, |_, fired| {
            nav.on_timer(&fired);
        });
        nav.request_flip(Direction::Next, &mut sched);
        sched.run_for(800, |_, fired| {
            nav.on_timer(&fired);
        });
        let book = project_book(&nav);
        assert_eq!(book.right.as_ref().map(|p| p.badge), Some(Badge::Locked));
        assert_eq!(Badge::Locked.label(), "Locked");
        assert!(!book.can_enter);
    }

    #[test]
    fn test_level_projection_stages() {
        let mut sched = ManualScheduler::new();
        let session = SessionContext::new(1, "ra", "ra@example.com", 0);
        let mut narrator = Narrator::new(level(1), NarratorTiming::default());
        let visit = narrator.visit();
        assert_eq!(project_level(&narrator).stage, StageView::Loading);

        narrator.on_script(
            visit,
            Ok(vec![
                Line::npc("Speak.").with_character("Sphinx Guardian", "Riddle Keeper of Giza")
            ]),
            &mut sched,
        );
        match project_level(&narrator).stage {
            StageView::Chat { text, typing, .. } => {
                assert_eq!(text, "...");
                assert!(typing);
            }
            other => panic!("unexpected stage {:?}", other),
        }

        sched.run_for(1500, |s, fired| {
            narrator.on_timer(&fired, s);
        });
        match project_level(&narrator).stage {
            StageView::Chat {
                speaker, next_label, ..
            } => {
                assert_eq!(speaker, "Sphinx Guardian");
                assert_eq!(next_label.as_deref(), Some("Enter Key →"));
            }
            other => panic!("unexpected stage {:?}", other),
        }

        narrator.handle_next(&mut sched);
        narrator.set_key("HUMAN");
        narrator.submit_key(&session, &mut sched);
        match project_level(&narrator).stage {
            StageView::KeyEntry {
                submit_label,
                submitting,
                ..
            } => {
                assert!(submitting);
                assert_eq!(submit_label, "Checking...");
            }
            other => panic!("unexpected stage {:?}", other),
        }

        let ui = UiState::project(&Navigator::default(), Some(&narrator), &session, None);
        assert_eq!(ui.screen, Screen::Level);
        narrator.teardown(&mut sched);
        let ui = UiState::project(&Navigator::default(), Some(&narrator), &session, None);
        assert_eq!(ui.screen, Screen::Book);
        assert_eq!(sched.pending(), 0);
    }
}
