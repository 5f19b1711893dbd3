//! 界面渲染
//!
//! 书页屏：顶栏（玩家、积分），左右两页（左页为序章或上一关，右页为当前关与徽章），
//! 两侧叠放页用竖线表示，翻页中在中缝显示翻页方向。
//! 关卡屏：顶栏（关卡与 NPC），主体按阶段绘制对话框、钥匙输入框或奖励面板，底部为快捷键提示。

use ratatui::{
    layout::{Alignment, Constraint, Direction as LayoutDirection, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::core::{Badge, BookView, LevelView, PageView, Screen, StageView, UiState};
use crate::navigator::Direction;

const PROLOGUE: &str = "Stranded at the edge of time, you open an old chronicle. Each page holds a sacred key.";

/// 绘制一帧
pub fn draw(f: &mut Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, chunks[0], state);
    match (state.screen, state.level.as_ref()) {
        (Screen::Level, Some(level)) => draw_level(f, chunks[1], level),
        _ => draw_book(f, chunks[1], &state.book),
    }
    draw_footer(f, chunks[2], state);
}

fn draw_header(f: &mut Frame, area: Rect, state: &UiState) {
    let mut spans = vec![
        Span::styled(
            format!(" [{}] {} ", state.initial, state.username),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("│ "),
        Span::styled(
            format!("{} credits", state.credits),
            Style::default().fg(Color::Yellow),
        ),
    ];
    if let Some(notice) = &state.notice {
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(notice.clone(), Style::default().fg(Color::Red)));
    }
    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .title(" Chronicle ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(header, area);
}

fn badge_style(badge: Badge) -> Style {
    match badge {
        Badge::KeyCollected => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        Badge::Unlocked => Style::default().fg(Color::Yellow),
        Badge::Locked => Style::default().fg(Color::DarkGray),
    }
}

fn page_text(page: &PageView, with_badge: bool) -> Text<'static> {
    let mut lines = vec![
        Line::from(Span::styled(
            format!("Level {}", page.order_index),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(Span::styled(
            page.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(page.description.clone()),
    ];
    if let Some(image) = &page.image_ref {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("[{}]", image),
            Style::default().fg(Color::DarkGray),
        )));
    }
    if with_badge {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            page.badge.label(),
            badge_style(page.badge),
        )));
    }
    Text::from(lines)
}

fn draw_book(f: &mut Frame, area: Rect, book: &BookView) {
    if !book.open {
        let cover = Paragraph::new(Text::from(vec![
            Line::from(""),
            Line::from(Span::styled(
                "THE CHRONICLE",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from("Press Enter to open the book"),
        ]))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(cover, area);
        return;
    }

    let cols = Layout::default()
        .direction(LayoutDirection::Horizontal)
        .constraints([
            Constraint::Length(book.stacked_left as u16),
            Constraint::Percentage(50),
            Constraint::Length(3),
            Constraint::Percentage(50),
            Constraint::Length(book.stacked_right as u16),
        ])
        .split(area);

    let stack = |n: usize| Paragraph::new("▏".repeat(n)).style(Style::default().fg(Color::DarkGray));
    f.render_widget(stack(book.stacked_left), cols[0]);
    f.render_widget(stack(book.stacked_right), cols[4]);

    let left = match &book.left {
        Some(page) => page_text(page, false),
        None => Text::from(vec![
            Line::from(Span::styled(
                "Prologue",
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(PROLOGUE),
        ]),
    };
    f.render_widget(
        Paragraph::new(left)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL)),
        cols[1],
    );

    let spine = match &book.flip {
        Some(flip) if flip.direction == Direction::Next => "▶",
        Some(_) => "◀",
        None => "│",
    };
    f.render_widget(
        Paragraph::new(spine).alignment(Alignment::Center),
        cols[2],
    );

    let right = match (&book.flip, &book.right) {
        (Some(flip), _) => Text::from(vec![
            Line::from(Span::styled(
                "Turning page…",
                Style::default().fg(Color::DarkGray),
            )),
            Line::from(""),
            Line::from(format!("{} → {}", flip.front.title, flip.back.title)),
        ]),
        (None, Some(page)) => page_text(page, true),
        (None, None) => Text::from("No levels yet. Press r to refresh."),
    };
    let title = format!(" {}/{} ", (book.page + 1).min(book.total), book.total);
    f.render_widget(
        Paragraph::new(right)
            .wrap(Wrap { trim: true })
            .block(Block::default().title(title).borders(Borders::ALL)),
        cols[3],
    );
}

fn draw_level(f: &mut Frame, area: Rect, level: &LevelView) {
    let title = if level.npc_title.is_empty() {
        format!(" {} │ {} ", level.title, level.npc_name)
    } else {
        format!(" {} │ {}, {} ", level.title, level.npc_name, level.npc_title)
    };
    let mut block = Block::default().title(title).borders(Borders::ALL);

    let body: Text = match &level.stage {
        StageView::Loading => Text::from("Loading dialogue…"),
        StageView::NoDialogue => Text::from(vec![
            Line::from("No dialogue available for this level."),
            Line::from(""),
            Line::from("Press Enter to return to the book."),
        ]),
        StageView::Chat {
            cursor,
            total,
            speaker,
            is_player,
            text,
            next_label,
            gives_key,
            ..
        } => {
            let color = if *is_player { Color::Cyan } else { Color::Green };
            let mut lines = vec![
                Line::from(Span::styled(
                    format!("{}/{}", cursor + 1, total),
                    Style::default().fg(Color::DarkGray),
                )),
                Line::from(Span::styled(
                    speaker.clone(),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                )),
                Line::from(text.clone()),
            ];
            if *gives_key {
                lines.push(Line::from(Span::styled(
                    "✦ The key word has been revealed.",
                    Style::default().fg(Color::Yellow),
                )));
            }
            if let Some(label) = next_label {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    format!("[ {} ]", label),
                    Style::default().add_modifier(Modifier::BOLD),
                )));
            }
            Text::from(lines)
        }
        StageView::KeyEntry {
            entered_key,
            submit_label,
            error,
            shaking,
            submitting,
        } => {
            if *shaking {
                block = block.border_style(Style::default().fg(Color::Red));
            }
            let mut lines = vec![
                Line::from("Enter the key word to unlock the sacred key."),
                Line::from(""),
                Line::from(vec![
                    Span::raw("Key: "),
                    Span::styled(
                        format!("{}▌", entered_key),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                ]),
                Line::from(""),
                Line::from(Span::styled(
                    format!("[ {} ]", submit_label),
                    if *submitting {
                        Style::default().fg(Color::DarkGray)
                    } else {
                        Style::default().add_modifier(Modifier::BOLD)
                    },
                )),
            ];
            if let Some(err) = error {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    err.clone(),
                    Style::default().fg(Color::Red),
                )));
            }
            Text::from(lines)
        }
        StageView::Done {
            summary,
            continue_label,
            new_credits,
        } => {
            let mut lines = vec![
                Line::from(Span::styled(
                    "Key Collected",
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(summary.clone()),
            ];
            if let Some(credits) = new_credits {
                lines.push(Line::from(format!("Balance: {} credits", credits)));
            }
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!("[ {} ]", continue_label),
                Style::default().add_modifier(Modifier::BOLD),
            )));
            Text::from(lines)
        }
    };

    f.render_widget(
        Paragraph::new(body).wrap(Wrap { trim: false }).block(block),
        area,
    );
}

fn hint(state: &UiState) -> &'static str {
    match (state.screen, state.level.as_ref().map(|l| &l.stage)) {
        (Screen::Level, Some(StageView::Chat { .. })) => " Enter next │ Esc back to book │ Ctrl+C quit ",
        (Screen::Level, Some(StageView::KeyEntry { .. })) => {
            " Type key │ Enter submit │ Tab review dialogue │ Esc back "
        }
        (Screen::Level, Some(StageView::Done { .. })) => " Enter continue │ Esc back to book ",
        (Screen::Level, _) => " Esc back to book ",
        _ if !state.book.open => " Enter open │ q quit ",
        _ => " ←/→ flip │ Enter play │ r refresh │ q quit ",
    }
}

fn draw_footer(f: &mut Frame, area: Rect, state: &UiState) {
    let footer = Paragraph::new(Span::styled(hint(state), Style::default().fg(Color::DarkGray)))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}
