mod actions;
mod render;
mod terminal;

use std::collections::HashMap;
use std::io;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::TableState;

use super::AppContext;
use super::catalog::{CatalogEpisode, CatalogError};
use super::format::{display_title, truncate};
use super::media::{MediaKind, SubjectKey, WatchEvent};
use super::reconcile::{NextEpisodeCandidate, ResumeEntry, select_next_episode};

use self::actions::{
    ActionOutcome, drain_season_results, ensure_selected_season_list, refresh_entries, run_selected_action,
    status_error, status_info,
};
use self::render::draw_tui;
use self::terminal::TerminalGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TuiAction {
    Play,
    Watched,
    Watchlist,
}

impl TuiAction {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Play => "PLAY",
            Self::Watched => "MARK WATCHED",
            Self::Watchlist => "WATCHLIST",
        }
    }

    pub(crate) fn move_left(self) -> Self {
        match self {
            Self::Play | Self::Watched => Self::Play,
            Self::Watchlist => Self::Watched,
        }
    }

    pub(crate) fn move_right(self) -> Self {
        match self {
            Self::Play => Self::Watched,
            Self::Watched | Self::Watchlist => Self::Watchlist,
        }
    }
}

/// Series id and season number.
pub(super) type SeasonKey = (u32, u32);

#[derive(Debug, Clone)]
pub(super) struct PendingForget {
    pub(super) key: SubjectKey,
    pub(super) title: String,
}

#[derive(Debug)]
pub(super) struct SeasonFetchResult {
    pub(super) key: SeasonKey,
    pub(super) outcome: Result<Vec<CatalogEpisode>, CatalogError>,
}

#[derive(Debug, Clone)]
pub(super) enum SeasonListState {
    Loading,
    Ready(Vec<CatalogEpisode>),
    Failed(String),
}

pub(super) struct Dashboard {
    pub(super) profile: String,
    pub(super) history: Vec<WatchEvent>,
    pub(super) entries: Vec<ResumeEntry>,
    pub(super) table_state: TableState,
    pub(super) action: TuiAction,
    pub(super) status: String,
    pub(super) season_overrides: HashMap<u32, u32>,
    pub(super) season_lists: HashMap<SeasonKey, SeasonListState>,
    pub(super) pending_forget: Option<PendingForget>,
    pub(super) pending_notice: Option<String>,
}

pub(super) enum Suggestion<'a> {
    NotSeries,
    Loading,
    Unavailable(&'a str),
    Ready(Option<NextEpisodeCandidate>),
}

impl Dashboard {
    fn new(profile: String) -> Self {
        Self {
            profile,
            history: Vec::new(),
            entries: Vec::new(),
            table_state: TableState::default(),
            action: TuiAction::Play,
            status: String::new(),
            season_overrides: HashMap::new(),
            season_lists: HashMap::new(),
            pending_forget: None,
            pending_notice: None,
        }
    }

    pub(super) fn selected_entry(&self) -> Option<&ResumeEntry> {
        self.table_state
            .selected()
            .and_then(|idx| self.entries.get(idx))
    }

    /// Season picked with `[`/`]`, else the one the entry is positioned in.
    pub(super) fn season_for(&self, entry: &ResumeEntry) -> Option<u32> {
        if entry.key.kind != MediaKind::Series {
            return None;
        }
        self.season_overrides
            .get(&entry.key.subject_id)
            .copied()
            .or_else(|| entry.event.episode().map(|episode| episode.season))
    }

    pub(super) fn selected_season_key(&self) -> Option<SeasonKey> {
        let entry = self.selected_entry()?;
        let season = self.season_for(entry)?;
        Some((entry.key.subject_id, season))
    }

    pub(super) fn suggestion(&self) -> Suggestion<'_> {
        let Some((series_id, season)) = self.selected_season_key() else {
            return Suggestion::NotSeries;
        };
        match self.season_lists.get(&(series_id, season)) {
            None | Some(SeasonListState::Loading) => Suggestion::Loading,
            Some(SeasonListState::Failed(reason)) => Suggestion::Unavailable(reason),
            Some(SeasonListState::Ready(episodes)) => {
                match select_next_episode(episodes, &self.history, series_id, season) {
                    Ok(candidate) => Suggestion::Ready(candidate),
                    Err(_) => Suggestion::Unavailable("season data is inconsistent"),
                }
            }
        }
    }

    fn shift_season(&mut self, forward: bool) -> Option<u32> {
        let entry = self.selected_entry()?;
        let current = self.season_for(entry)?;
        let series_id = entry.key.subject_id;
        let next = if forward {
            current.saturating_add(1)
        } else {
            current.saturating_sub(1)
        };
        self.season_overrides.insert(series_id, next);
        Some(next)
    }
}

pub(crate) fn run_tui(ctx: &mut AppContext) -> Result<()> {
    let profile = ctx.profile()?.to_string();
    let catalog = ctx.catalog().ok();

    let mut dashboard = Dashboard::new(profile);
    refresh_entries(ctx, &mut dashboard, None)?;
    dashboard.status = match (&catalog, dashboard.entries.is_empty()) {
        (None, _) => status_error("No catalog credentials; next-episode suggestions are off."),
        (Some(_), true) => status_info("Nothing to continue yet. Use `watchtrack play` first."),
        (Some(_), false) => status_info("Ready."),
    };

    let mut guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
        .context("failed to initialize terminal backend")?;
    terminal.clear()?;

    let (season_tx, season_rx) = mpsc::channel::<SeasonFetchResult>();

    loop {
        if let Some(err) = drain_season_results(&season_rx, &mut dashboard.season_lists) {
            terminal.show_cursor()?;
            guard.restore()?;
            return Err(ctx.catalog_failure(err));
        }
        if let Some(catalog) = &catalog {
            ensure_selected_season_list(&mut dashboard, catalog, &season_tx);
        }
        terminal.draw(|frame| draw_tui(frame, &mut dashboard))?;

        if !event::poll(Duration::from_millis(200))? {
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if dashboard.pending_notice.is_some() {
            dashboard.pending_notice = None;
            continue;
        }

        if let Some(forget) = dashboard.pending_forget.clone() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    dashboard.pending_forget = None;
                    match ctx.db.delete_subject(&dashboard.profile, forget.key) {
                        Ok(true) => {
                            dashboard.status =
                                status_info(&format!("Forgot history for {}", forget.title));
                        }
                        Ok(false) => {
                            dashboard.status = status_error("Forget failed: entry no longer exists.");
                        }
                        Err(err) => dashboard.status = status_error(&format!("Forget failed: {err}")),
                    }
                    refresh_entries(ctx, &mut dashboard, None)?;
                }
                KeyCode::Esc | KeyCode::Char('n') => {
                    dashboard.pending_forget = None;
                    dashboard.status = status_info("Forget canceled.");
                }
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Char('r') => {
                let keep = dashboard.selected_entry().map(|entry| entry.key);
                refresh_entries(ctx, &mut dashboard, keep)?;
                dashboard.season_lists.clear();
                dashboard.status = status_info("Refreshed.");
            }
            KeyCode::Up => {
                if let Some(selected) = dashboard.table_state.selected() {
                    dashboard.table_state.select(Some(selected.saturating_sub(1)));
                }
            }
            KeyCode::Down => {
                if let Some(selected) = dashboard.table_state.selected()
                    && !dashboard.entries.is_empty()
                {
                    let next = (selected + 1).min(dashboard.entries.len().saturating_sub(1));
                    dashboard.table_state.select(Some(next));
                }
            }
            KeyCode::Left => dashboard.action = dashboard.action.move_left(),
            KeyCode::Right => dashboard.action = dashboard.action.move_right(),
            KeyCode::Char('[') | KeyCode::Char(']') => {
                let forward = key.code == KeyCode::Char(']');
                dashboard.status = match dashboard.shift_season(forward) {
                    Some(season) => status_info(&format!("Season {season} selected.")),
                    None => status_error("Seasons only apply to series."),
                };
            }
            KeyCode::Char('d') => {
                let Some(entry) = dashboard.selected_entry() else {
                    dashboard.status = status_error("Forget failed: no entry selected.");
                    continue;
                };
                dashboard.pending_forget = Some(PendingForget {
                    key: entry.key,
                    title: display_title(&entry.event),
                });
                dashboard.status =
                    status_info("Confirm forget: y/Enter to delete history, n/Esc to cancel.");
            }
            KeyCode::Enter => {
                let Some(entry) = dashboard.selected_entry().cloned() else {
                    continue;
                };
                match run_selected_action(ctx, &dashboard, &entry) {
                    Ok(ActionOutcome::Done(message)) => dashboard.status = status_info(&message),
                    Ok(ActionOutcome::NoEpisode) => {
                        dashboard.pending_notice = Some(format!(
                            "No episode available.\n\n{}\n\nPress any key to continue.",
                            truncate(&display_title(&entry.event), 50)
                        ));
                        dashboard.status = status_info("No episode available.");
                    }
                    Err(err) => {
                        dashboard.status = status_error(&format!(
                            "{} failed for {}: {err}",
                            dashboard.action.label(),
                            display_title(&entry.event)
                        ));
                    }
                }
                refresh_entries(ctx, &mut dashboard, Some(entry.key))?;
            }
            _ => {}
        }
    }

    terminal.show_cursor()?;
    guard.restore()?;
    Ok(())
}
