use std::collections::HashMap;
use std::sync::mpsc;

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::db::WatchlistToggle;

use super::super::AppContext;
use super::super::catalog::{CatalogError, CatalogSource, TmdbCatalog};
use super::super::format::{display_title, episode_ref};
use super::super::media::{EpisodeRef, MediaKind, SubjectKey};
use super::super::reconcile::{ResumeEntry, build_continue_watching};
use super::super::{build_event, start_playback};
use super::{Dashboard, SeasonFetchResult, SeasonKey, SeasonListState, Suggestion, TuiAction};

pub(super) fn refresh_entries(
    ctx: &AppContext,
    dashboard: &mut Dashboard,
    preferred: Option<SubjectKey>,
) -> Result<()> {
    dashboard.history = ctx.db.watch_history(&dashboard.profile)?;
    dashboard.entries = build_continue_watching(&dashboard.history);
    let entries = &dashboard.entries;
    let table_state = &mut dashboard.table_state;
    if entries.is_empty() {
        table_state.select(None);
        return Ok(());
    }

    if let Some(key) = preferred
        && let Some(idx) = entries.iter().position(|entry| entry.key == key)
    {
        table_state.select(Some(idx));
        return Ok(());
    }

    match table_state.selected() {
        Some(selected) => table_state.select(Some(selected.min(entries.len() - 1))),
        None => table_state.select(Some(0)),
    }
    Ok(())
}

pub(super) fn status_info(msg: &str) -> String {
    format!("INFO: {msg}")
}

pub(super) fn status_error(msg: &str) -> String {
    format!("ERROR: {msg}")
}

/// What Enter did to the selected entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum ActionOutcome {
    Done(String),
    /// The selected season has no episode to act on.
    NoEpisode,
}

/// The episode Enter acts on for a series: the current suggestion.
fn suggested_episode(dashboard: &Dashboard) -> Result<Option<EpisodeRef>> {
    match dashboard.suggestion() {
        Suggestion::Ready(candidate) => {
            Ok(candidate.map(|candidate| episode_ref(&candidate.episode)))
        }
        Suggestion::Loading => Err(anyhow!("episode list is still loading")),
        Suggestion::Unavailable(reason) => Err(anyhow!("episode list unavailable: {reason}")),
        Suggestion::NotSeries => Err(anyhow!("not a series")),
    }
}

pub(super) fn run_selected_action(
    ctx: &AppContext,
    dashboard: &Dashboard,
    entry: &ResumeEntry,
) -> Result<ActionOutcome> {
    let title = display_title(&entry.event);
    let position = match entry.key.kind {
        MediaKind::Movie => None,
        MediaKind::Series if dashboard.action == TuiAction::Watchlist => None,
        MediaKind::Series => match suggested_episode(dashboard)? {
            Some(episode) => Some(episode),
            None => return Ok(ActionOutcome::NoEpisode),
        },
    };
    let shown = match position {
        Some(episode) => format!("{title} {}", episode.label()),
        None => title.clone(),
    };

    match dashboard.action {
        TuiAction::Play => {
            let url = start_playback(ctx, entry.key, position, true)?;
            debug!(url, "played from dashboard");
            Ok(ActionOutcome::Done(format!("Playing {shown}")))
        }
        TuiAction::Watched => {
            let event = build_event(
                ctx,
                entry.key,
                position,
                100,
                Some(entry.event.title().to_string()),
                Some(entry.event.poster_path().to_string()),
            )?;
            ctx.db.record_watch(&dashboard.profile, &event)?;
            Ok(ActionOutcome::Done(format!("Marked as watched: {shown}")))
        }
        TuiAction::Watchlist => {
            let toggle = ctx.db.toggle_watchlist(
                &dashboard.profile,
                entry.key,
                entry.event.title(),
                entry.event.poster_path(),
            )?;
            Ok(ActionOutcome::Done(match toggle {
                WatchlistToggle::Added => format!("Added to watchlist: {shown}"),
                WatchlistToggle::Removed => format!("Removed from watchlist: {shown}"),
            }))
        }
    }
}

pub(super) fn ensure_selected_season_list(
    dashboard: &mut Dashboard,
    catalog: &TmdbCatalog,
    tx: &mpsc::Sender<SeasonFetchResult>,
) {
    let Some(key) = dashboard.selected_season_key() else {
        return;
    };
    if dashboard.season_lists.contains_key(&key) {
        return;
    }

    dashboard.season_lists.insert(key, SeasonListState::Loading);
    let catalog = catalog.clone();
    let tx = tx.clone();
    std::thread::spawn(move || {
        let (series_id, season) = key;
        let outcome = catalog.season_episodes(series_id, season);
        let _ = tx.send(SeasonFetchResult { key, outcome });
    });
}

/// Stores finished fetches. Returns the error when the catalog rejected the
/// credentials, since that ends the session.
pub(super) fn drain_season_results(
    rx: &mpsc::Receiver<SeasonFetchResult>,
    season_lists: &mut HashMap<SeasonKey, SeasonListState>,
) -> Option<CatalogError> {
    while let Ok(result) = rx.try_recv() {
        let state = match result.outcome {
            Ok(episodes) => SeasonListState::Ready(episodes),
            Err(CatalogError::Unauthorized) => return Some(CatalogError::Unauthorized),
            Err(CatalogError::NotFound { .. }) => SeasonListState::Ready(Vec::new()),
            Err(err) => SeasonListState::Failed(err.to_string()),
        };
        season_lists.insert(result.key, state);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::session::{Session, SessionStore};

    use super::super::super::catalog::CatalogEpisode;
    use super::super::super::media::{SeriesProgress, WatchEvent};
    use super::super::super::reconcile::series_key;

    fn dashboard_ctx() -> (tempfile::TempDir, AppContext) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::open_in_memory().expect("db");
        let sessions = SessionStore::new(dir.path().join("session.json"));
        let mut ctx = AppContext::init(db, Config::default(), sessions).expect("context");
        ctx.login(Session::new("ana", "ana@example.test", None).expect("session"))
            .expect("login");
        (dir, ctx)
    }

    fn watched(season: u32, episode: u32) -> WatchEvent {
        WatchEvent::Series(SeriesProgress {
            subject_id: 10,
            title: "Show".to_string(),
            poster_path: String::new(),
            season_number: season,
            episode_number: episode,
            progress_percent: 100,
        })
    }

    fn episode(season: u32, number: u32) -> CatalogEpisode {
        CatalogEpisode {
            id: u64::from(number),
            season_number: season,
            episode_number: number,
            name: format!("Episode {number}"),
            overview: None,
            still_path: None,
            air_date: None,
        }
    }

    #[test]
    fn empty_season_reports_no_episode_without_recording() {
        let (_dir, ctx) = dashboard_ctx();
        ctx.db.record_watch("ana", &watched(1, 2)).expect("write");
        let mut dashboard = Dashboard::new("ana".to_string());
        refresh_entries(&ctx, &mut dashboard, None).expect("refresh");
        dashboard.season_lists.insert((10, 1), SeasonListState::Ready(Vec::new()));
        let entry = dashboard.selected_entry().cloned().expect("entry");

        for action in [TuiAction::Play, TuiAction::Watched] {
            dashboard.action = action;
            let outcome = run_selected_action(&ctx, &dashboard, &entry).expect("outcome");
            assert_eq!(outcome, ActionOutcome::NoEpisode);
        }
        assert_eq!(ctx.db.watch_history("ana").expect("history").len(), 1);
    }

    #[test]
    fn mark_watched_uses_the_suggested_episode() {
        let (_dir, ctx) = dashboard_ctx();
        ctx.db.record_watch("ana", &watched(1, 1)).expect("write");
        let mut dashboard = Dashboard::new("ana".to_string());
        refresh_entries(&ctx, &mut dashboard, None).expect("refresh");
        dashboard
            .season_lists
            .insert((10, 1), SeasonListState::Ready(vec![episode(1, 1), episode(1, 2)]));
        dashboard.action = TuiAction::Watched;
        let entry = dashboard.selected_entry().cloned().expect("entry");
        assert_eq!(entry.key, series_key(10));

        let outcome = run_selected_action(&ctx, &dashboard, &entry).expect("outcome");
        assert_eq!(
            outcome,
            ActionOutcome::Done("Marked as watched: Show T1:E2".to_string())
        );
    }

    #[test]
    fn loading_season_is_an_error_not_a_missing_episode() {
        let (_dir, ctx) = dashboard_ctx();
        ctx.db.record_watch("ana", &watched(1, 1)).expect("write");
        let mut dashboard = Dashboard::new("ana".to_string());
        refresh_entries(&ctx, &mut dashboard, None).expect("refresh");
        dashboard.season_lists.insert((10, 1), SeasonListState::Loading);
        let entry = dashboard.selected_entry().cloned().expect("entry");

        assert!(run_selected_action(&ctx, &dashboard, &entry).is_err());
    }
}
