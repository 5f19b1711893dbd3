//! 事件处理
//!
//! 轮询 crossterm 键盘事件；`map_key` 按当前屏幕与阶段把按键翻译成 Command。
//! Ctrl+C / Ctrl+Q 在任何界面都是退出。

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::core::{Command, Screen, StageView, UiState};

/// 键盘轮询器
pub struct EventHandler {
    tick: Duration,
}

impl EventHandler {
    pub fn new(tick: Duration) -> Self {
        Self { tick }
    }

    /// 等待至多一个 tick；只返回按下事件
    pub fn poll(&self) -> anyhow::Result<Option<KeyEvent>> {
        if event::poll(self.tick)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(Some(key));
                }
            }
        }
        Ok(None)
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

pub fn map_key(key: KeyEvent, state: &UiState) -> Option<Command> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') => Some(Command::Quit),
            _ => None,
        };
    }
    match state.screen {
        Screen::Book => map_book_key(key, state),
        Screen::Level => map_level_key(key, state),
    }
}

fn map_book_key(key: KeyEvent, state: &UiState) -> Option<Command> {
    if !state.book.open {
        return match key.code {
            KeyCode::Enter | KeyCode::Char(' ') => Some(Command::OpenBook),
            KeyCode::Char('q') | KeyCode::Esc => Some(Command::Quit),
            _ => None,
        };
    }
    match key.code {
        KeyCode::Right | KeyCode::Char('l') | KeyCode::Char('n') => Some(Command::FlipNext),
        KeyCode::Left | KeyCode::Char('h') | KeyCode::Char('p') => Some(Command::FlipPrev),
        KeyCode::Enter => Some(Command::EnterLevel),
        KeyCode::Char('r') => Some(Command::Refresh),
        KeyCode::Char('q') | KeyCode::Esc => Some(Command::Quit),
        _ => None,
    }
}

fn map_level_key(key: KeyEvent, state: &UiState) -> Option<Command> {
    let stage = state.level.as_ref().map(|l| &l.stage)?;
    if key.code == KeyCode::Esc {
        return Some(Command::BackToBook);
    }
    match stage {
        StageView::Loading => None,
        StageView::NoDialogue => match key.code {
            KeyCode::Enter => Some(Command::BackToBook),
            _ => None,
        },
        StageView::Chat { .. } => match key.code {
            KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Right => Some(Command::Next),
            _ => None,
        },
        StageView::KeyEntry { .. } => match key.code {
            KeyCode::Enter => Some(Command::SubmitKey),
            KeyCode::Backspace => Some(Command::KeyBackspace),
            KeyCode::Tab | KeyCode::Up => Some(Command::ReviewChat),
            KeyCode::Char(c) => Some(Command::KeyInput(c)),
            _ => None,
        },
        StageView::Done { .. } => match key.code {
            KeyCode::Enter | KeyCode::Char(' ') => Some(Command::Continue),
            _ => None,
        },
    }
}
