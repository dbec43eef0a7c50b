use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Cell, Clear, Gauge, Padding, Paragraph, Row, Table, Wrap,
};

use super::super::format::{
    display_title, episode_ref, kind_label, position_text, progress_text, truncate,
};
use super::{Dashboard, Suggestion, TuiAction};

const ACCENT: Color = Color::Rgb(236, 118, 92);
const MUTED: Color = Color::Rgb(180, 186, 198);
const TEXT: Color = Color::Rgb(232, 232, 236);

pub(super) fn draw_tui(frame: &mut Frame, dashboard: &mut Dashboard) {
    let bg = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(bg, frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "WATCHTRACK",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::raw("   "),
        Span::styled(
            format!("{} to continue", dashboard.entries.len()),
            Style::default().fg(MUTED),
        ),
        Span::raw("   "),
        Span::styled(
            format!("profile {}", dashboard.profile),
            Style::default().fg(MUTED),
        ),
        Span::raw("   "),
        Span::styled(dashboard.action.label(), Style::default().fg(Color::Yellow)),
    ]))
    .alignment(Alignment::Center)
    .block(panel_block("Continue Watching"));
    frame.render_widget(header, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[1]);
    let details = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(3)])
        .split(body[1]);

    let rows: Vec<Row> = dashboard
        .entries
        .iter()
        .map(|entry| {
            Row::new(vec![
                Cell::from(display_title(&entry.event)),
                Cell::from(kind_label(entry.key.kind)),
                Cell::from(position_text(entry)),
                Cell::from(progress_text(entry.event.progress_percent())),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(52),
            Constraint::Length(8),
            Constraint::Length(10),
            Constraint::Length(10),
        ],
    )
    .header(
        Row::new(vec!["Title", "Type", "Position", "Progress"])
            .style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
    )
    .block(panel_block("History"))
    .row_highlight_style(
        Style::default()
            .bg(ACCENT)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("▸ ");
    frame.render_stateful_widget(table, body[0], &mut dashboard.table_state);

    let selection = Paragraph::new(selection_text(dashboard))
        .style(Style::default().fg(TEXT))
        .wrap(Wrap { trim: false })
        .block(panel_block("Selected"));
    frame.render_widget(selection, details[0]);

    if let Some(entry) = dashboard.selected_entry() {
        let percent = entry.event.progress_percent().min(100);
        let gauge = Gauge::default()
            .block(panel_block("Progress"))
            .gauge_style(
                Style::default()
                    .fg(ACCENT)
                    .bg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            )
            .label(format!("{percent}%"))
            .ratio(f64::from(percent) / 100.0);
        frame.render_widget(gauge, details[1]);
    }

    let controls = Paragraph::new(action_selector_line(dashboard.action))
        .alignment(Alignment::Center)
        .block(panel_block("Controls"));
    frame.render_widget(controls, chunks[2]);

    let status = Paragraph::new(dashboard.status.clone())
        .style(status_style(&dashboard.status))
        .block(panel_block("Status"));
    frame.render_widget(status, chunks[3]);

    if let Some(forget) = &dashboard.pending_forget {
        let text = format!(
            "Forget all history for\n\n{}\n\n[y / Enter] Forget   [n / Esc] Cancel",
            truncate(&forget.title, 56)
        );
        render_popup(frame, "Confirm Forget", &text);
    } else if let Some(notice) = &dashboard.pending_notice {
        render_popup(frame, "Nothing To Play", notice);
    }
}

fn selection_text(dashboard: &Dashboard) -> String {
    let Some(entry) = dashboard.selected_entry() else {
        return "Nothing to continue yet.\n\nStart something with `watchtrack play`.".to_string();
    };

    let mut text = format!(
        "Title\n{}\n\nKey\n{}\n\nPosition\n{}",
        truncate(&display_title(&entry.event), 40),
        entry.key,
        position_text(entry),
    );
    if let Some(season) = dashboard.season_for(entry) {
        text.push_str(&format!("\n\nSeason\n{season}  ([ / ] to change)"));
    }

    let next = match dashboard.suggestion() {
        Suggestion::NotSeries => None,
        Suggestion::Loading => Some("Loading episodes...".to_string()),
        Suggestion::Unavailable(reason) => Some(format!("Unavailable: {reason}")),
        Suggestion::Ready(None) => Some("Season has no episodes.".to_string()),
        Suggestion::Ready(Some(candidate)) => Some(format!(
            "{} {}\n({})",
            episode_ref(&candidate.episode).label(),
            truncate(&candidate.episode.name, 36),
            candidate.reason.describe()
        )),
    };
    if let Some(next) = next {
        text.push_str("\n\nUp Next\n");
        text.push_str(&next);
    }
    text
}

fn panel_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Rgb(120, 124, 138)))
        .title(title)
}

fn pill_style(action: TuiAction, current: TuiAction) -> Style {
    if action == current {
        Style::default()
            .bg(ACCENT)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().bg(Color::Rgb(70, 74, 86)).fg(TEXT)
    }
}

fn action_selector_line(current: TuiAction) -> Line<'static> {
    let mut spans = Vec::new();
    for action in [TuiAction::Play, TuiAction::Watched, TuiAction::Watchlist] {
        spans.push(Span::styled(
            format!(" {} ", action.label()),
            pill_style(action, current),
        ));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(
        "  ↑/↓ move  ←/→ action  [/] season  Enter run  d forget  r refresh  q quit",
        Style::default().fg(MUTED),
    ));
    Line::from(spans)
}

fn status_style(status: &str) -> Style {
    if status.starts_with("ERROR:") {
        Style::default()
            .fg(Color::Rgb(255, 120, 110))
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Rgb(150, 210, 170))
    }
}

fn render_popup(frame: &mut Frame, title: &'static str, text: &str) {
    let area = popup_area(frame.area(), text);
    frame.render_widget(Clear, area);
    let popup = Paragraph::new(text.to_string())
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Double)
                .border_style(Style::default().fg(ACCENT))
                .title(title)
                .padding(Padding::new(2, 2, 1, 1)),
        );
    frame.render_widget(popup, area);
}

fn popup_area(area: Rect, text: &str) -> Rect {
    let widest = text
        .lines()
        .map(|line| line.chars().count() as u16)
        .max()
        .unwrap_or(0);
    let lines = text.lines().count() as u16;
    let width = widest
        .saturating_add(8)
        .clamp(40.min(area.width), 70.min(area.width));
    let height = lines
        .saturating_add(4)
        .clamp(8.min(area.height), 16.min(area.height));
    Rect::new(
        area.x + area.width.saturating_sub(width) / 2,
        area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    )
}
