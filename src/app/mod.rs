pub(crate) mod catalog;
mod format;
pub(crate) mod media;
mod player;
pub(crate) mod reconcile;
mod tui;


use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::db::{Database, WatchlistToggle};
use crate::paths::{database_file_path, session_file_path};
use crate::session::{Session, SessionStore};

use self::catalog::{CatalogEpisode, CatalogError, CatalogSource, SeriesDetails, TmdbCatalog};
use self::format::{
    display_title, episode_heading, episode_ref, format_timestamp_display, kind_label,
    position_text, progress_text, truncate,
};
use self::media::{
    EpisodeRef, MediaKind, MovieProgress, SeriesProgress, SubjectKey, WatchEvent, ingest_history,
    parse_history_export,
};
use self::player::{PlayTarget, embed_url, open_in_player};
use self::reconcile::{
    EpisodeStatus, NextEpisodeCandidate, ResumeEntry, build_continue_watching, episode_status,
    resume_season, select_next_episode, series_key, watched_episodes,
};

const STILL_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w300";

/// Everything a command needs, built once per invocation.
pub(crate) struct AppContext {
    pub(crate) db: Database,
    pub(crate) config: Config,
    sessions: SessionStore,
    session: Option<Session>,
}

impl AppContext {
    /// Opens the store and restores any persisted session.
    pub(crate) fn init(db: Database, config: Config, sessions: SessionStore) -> Result<Self> {
        let session = sessions.load()?;
        Ok(Self {
            db,
            config,
            sessions,
            session,
        })
    }

    pub(crate) fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub(crate) fn session_path(&self) -> &Path {
        self.sessions.path()
    }

    pub(crate) fn profile(&self) -> Result<&str> {
        self.session
            .as_ref()
            .map(Session::profile)
            .ok_or_else(|| anyhow!("not logged in. Run `watchtrack login` first."))
    }

    pub(crate) fn login(&mut self, session: Session) -> Result<()> {
        self.sessions.persist(&session)?;
        self.session = Some(session);
        Ok(())
    }

    /// Drops the in-memory session and its persisted copy.
    pub(crate) fn logout(&mut self) -> Result<bool> {
        self.session = None;
        Ok(self.sessions.clear()?)
    }

    pub(crate) fn catalog(&self) -> Result<TmdbCatalog> {
        let token = self.session.as_ref().and_then(Session::token);
        Ok(TmdbCatalog::new(&self.config.catalog, token)?)
    }

    /// A rejected token ends the session, like a 401 from the backend did.
    pub(crate) fn catalog_failure(&mut self, err: CatalogError) -> anyhow::Error {
        if matches!(err, CatalogError::Unauthorized) && self.session.is_some() {
            warn!("catalog rejected credentials, clearing session");
            if let Err(clear_err) = self.logout() {
                warn!(error = %clear_err, "failed to clear session");
            }
            return anyhow!("{err}. Session cleared; log in again.");
        }
        anyhow::Error::new(err)
    }

    pub(crate) fn history(&self) -> Result<Vec<WatchEvent>> {
        let profile = self.profile()?;
        self.db.watch_history(profile)
    }
}

pub(crate) fn run(cli: Cli) -> Result<()> {
    let mut ctx = open_context()?;

    match cli.command {
        Some(Command::Continue) => run_continue(&ctx)?,
        Some(Command::Next { series_id, season }) => run_next(&mut ctx, series_id, season)?,
        Some(Command::Episodes { series_id, season }) => {
            run_episodes(&mut ctx, series_id, season)?
        }
        Some(Command::Record {
            subject_id,
            kind,
            season,
            episode,
            progress,
            title,
            poster,
        }) => {
            let position = season.zip(episode).map(|(s, e)| EpisodeRef::new(s, e));
            let event = build_event(
                &ctx,
                SubjectKey {
                    subject_id,
                    kind: kind.into(),
                },
                position,
                progress,
                title,
                poster,
            )?;
            ctx.db.record_watch(ctx.profile()?, &event)?;
            println!(
                "Recorded {} for {}.",
                progress_text(progress),
                describe_event(&event)
            );
        }
        Some(Command::Watched {
            series_id,
            season,
            episode,
        }) => run_watched(&mut ctx, series_id, EpisodeRef::new(season, episode))?,
        Some(Command::Play {
            subject_id,
            kind,
            season,
            episode,
            print,
        }) => run_play(
            &mut ctx,
            SubjectKey {
                subject_id,
                kind: kind.into(),
            },
            season.zip(episode).map(|(s, e)| EpisodeRef::new(s, e)),
            print,
        )?,
        Some(Command::Search { query }) => run_search(&mut ctx, &query.join(" "))?,
        Some(Command::Watchlist {
            toggle,
            kind,
            title,
        }) => match toggle {
            Some(subject_id) => run_watchlist_toggle(
                &ctx,
                SubjectKey {
                    subject_id,
                    kind: kind.into(),
                },
                title,
            )?,
            None => run_watchlist(&ctx)?,
        },
        Some(Command::Import { path }) => run_import(&ctx, &path)?,
        Some(Command::Forget { subject_id, kind }) => {
            let key = SubjectKey {
                subject_id,
                kind: kind.into(),
            };
            if ctx.db.delete_subject(ctx.profile()?, key)? {
                println!("Deleted history for {key}.");
            } else {
                println!("No history for {key}.");
            }
        }
        Some(Command::Login {
            username,
            email,
            token,
        }) => {
            let session = Session::new(&username, &email, token)?;
            ctx.login(session)?;
            println!("Logged in as {username}.");
        }
        Some(Command::Logout) => {
            if ctx.logout()? {
                println!("Logged out.");
            } else {
                println!("No active session.");
            }
        }
        Some(Command::Whoami) => match ctx.session() {
            Some(session) => {
                println!("{} <{}>", session.user.username, session.user.email);
                if session.token().is_some() {
                    println!("Catalog token: set");
                }
                println!("Session file: {}", ctx.session_path().display());
            }
            None => println!("Not logged in."),
        },
        Some(Command::Tui) | None => tui::run_tui(&mut ctx)?,
    }

    Ok(())
}

fn open_context() -> Result<AppContext> {
    let db = open_db()?;
    let config = Config::load()?;
    let sessions = SessionStore::new(session_file_path()?);
    AppContext::init(db, config, sessions)
}

fn open_db() -> Result<Database> {
    let db_path = database_file_path()?;
    let db = Database::open(&db_path)?;
    db.migrate()?;
    Ok(db)
}

fn describe_event(event: &WatchEvent) -> String {
    match event.episode() {
        Some(episode) => format!("{} {}", display_title(event), episode.label()),
        None => display_title(event),
    }
}

fn run_continue(ctx: &AppContext) -> Result<()> {
    let history = ctx.history()?;
    let entries = build_continue_watching(&history);
    if entries.is_empty() {
        println!("Nothing to continue yet. Play something with `watchtrack play` first.");
        return Ok(());
    }

    println!(
        "{:<14} {:<40} {:<8} {:<10} {:<10}",
        "KEY", "TITLE", "TYPE", "POSITION", "PROGRESS"
    );
    for entry in &entries {
        println!(
            "{:<14} {:<40} {:<8} {:<10} {:<10}",
            entry.key.to_string(),
            truncate(&display_title(&entry.event), 40),
            kind_label(entry.key.kind),
            position_text(entry),
            progress_text(entry.event.progress_percent()),
        );
    }
    Ok(())
}

/// Series metadata plus the suggestion for the season that ends up selected.
#[derive(Debug, Clone)]
pub(crate) struct NextResolution {
    pub(crate) series: SeriesDetails,
    pub(crate) season: Option<u32>,
    pub(crate) episodes: Vec<CatalogEpisode>,
    pub(crate) candidate: Option<NextEpisodeCandidate>,
}

/// Without an explicit season, opens the season the history left off in.
pub(crate) fn resolve_next(
    catalog: &dyn CatalogSource,
    history: &[WatchEvent],
    series_id: u32,
    season: Option<u32>,
) -> Result<NextResolution, CatalogError> {
    let series = catalog.series_details(series_id)?;
    let season = season.or_else(|| resume_season(history, series_id, &series.seasons));
    let Some(season_number) = season else {
        return Ok(NextResolution {
            series,
            season: None,
            episodes: Vec::new(),
            candidate: None,
        });
    };

    let episodes = catalog.season_episodes(series_id, season_number)?;
    let candidate = select_next_episode(&episodes, history, series_id, season_number)?;
    if let Some(candidate) = &candidate {
        debug!(
            series_id,
            season = season_number,
            episode_id = candidate.episode.id,
            reason = ?candidate.reason,
            "resolved next episode"
        );
    }
    Ok(NextResolution {
        series,
        season,
        episodes,
        candidate,
    })
}

fn resolve_next_for(
    ctx: &mut AppContext,
    series_id: u32,
    season: Option<u32>,
) -> Result<(Vec<WatchEvent>, NextResolution)> {
    let history = ctx.history()?;
    let catalog = ctx.catalog()?;
    match resolve_next(&catalog, &history, series_id, season) {
        Ok(resolution) => Ok((history, resolution)),
        Err(err) => Err(ctx.catalog_failure(err)),
    }
}

fn run_next(ctx: &mut AppContext, series_id: u32, season: Option<u32>) -> Result<()> {
    let (_, resolution) = resolve_next_for(ctx, series_id, season)?;
    let Some(season) = resolution.season else {
        println!("{} has no seasons in the catalog.", resolution.series.name);
        return Ok(());
    };
    match resolution.candidate {
        Some(candidate) => {
            println!("{}", episode_heading(&resolution.series.name, &candidate.episode));
            println!("  Reason: {}", candidate.reason.describe());
            if let Some(overview) = &candidate.episode.overview {
                println!("  {}", truncate(overview, 96));
            }
            if let Some(still) = &candidate.episode.still_path {
                println!("  Still: {STILL_IMAGE_BASE}{still}");
            }
            println!(
                "  Play: watchtrack play {series_id} --season {} --episode {}",
                candidate.episode.season_number, candidate.episode.episode_number
            );
        }
        None => println!(
            "{} season {season} has no episodes.",
            resolution.series.name
        ),
    }
    Ok(())
}

fn run_episodes(ctx: &mut AppContext, series_id: u32, season: Option<u32>) -> Result<()> {
    let (history, resolution) = resolve_next_for(ctx, series_id, season)?;
    let Some(season) = resolution.season else {
        println!("{} has no seasons in the catalog.", resolution.series.name);
        return Ok(());
    };
    match resolution
        .series
        .seasons
        .iter()
        .find(|summary| summary.season_number == season)
    {
        Some(summary) => println!(
            "{} - {} ({} episodes)",
            resolution.series.name, summary.name, summary.episode_count
        ),
        None => println!("{} - season {season}", resolution.series.name),
    }
    let watched = watched_episodes(&history, series_id);
    let next = resolution
        .candidate
        .as_ref()
        .map(|candidate| episode_ref(&candidate.episode));
    for episode in &resolution.episodes {
        let position = episode_ref(episode);
        let status = episode_status(&history, series_id, position);
        let marker = if Some(position) == next { "▸" } else { " " };
        println!(
            "{marker} {:<8} {:<44} {:<9} {}",
            position.label(),
            truncate(&episode.name, 44),
            status.action_label(),
            episode.air_date.as_deref().unwrap_or("-"),
        );
    }
    let watched_here = resolution
        .episodes
        .iter()
        .filter(|episode| watched.contains(&episode_ref(episode)))
        .count();
    println!(
        "{watched_here}/{} watched in this season",
        resolution.episodes.len()
    );
    Ok(())
}

/// Display fields come from the caller, else earlier history, else the catalog.
fn build_event(
    ctx: &AppContext,
    key: SubjectKey,
    position: Option<EpisodeRef>,
    progress: u8,
    title: Option<String>,
    poster: Option<String>,
) -> Result<WatchEvent> {
    let (known_title, known_poster) = match (title, poster) {
        (Some(title), Some(poster)) => (title, poster),
        (title, poster) => {
            let (fallback_title, fallback_poster) = known_display_fields(ctx, key)?;
            (
                title.unwrap_or(fallback_title),
                poster.unwrap_or(fallback_poster),
            )
        }
    };

    match (key.kind, position) {
        (MediaKind::Movie, None) => Ok(WatchEvent::Movie(MovieProgress {
            subject_id: key.subject_id,
            title: known_title,
            poster_path: known_poster,
            progress_percent: progress,
        })),
        (MediaKind::Movie, Some(_)) => Err(anyhow!("movies have no season/episode")),
        (MediaKind::Series, Some(episode)) => Ok(WatchEvent::Series(SeriesProgress {
            subject_id: key.subject_id,
            title: known_title,
            poster_path: known_poster,
            season_number: episode.season,
            episode_number: episode.episode,
            progress_percent: progress,
        })),
        (MediaKind::Series, None) => Err(anyhow!(
            "series progress needs --season and --episode"
        )),
    }
}

fn known_display_fields(ctx: &AppContext, key: SubjectKey) -> Result<(String, String)> {
    let history = ctx.history()?;
    if let Some(event) = history
        .iter()
        .rev()
        .find(|event| event.key() == key && !event.title().trim().is_empty())
    {
        return Ok((event.title().to_string(), event.poster_path().to_string()));
    }

    if key.kind == MediaKind::Series {
        let details = ctx
            .catalog()
            .map_err(anyhow::Error::from)
            .and_then(|catalog| Ok(catalog.series_details(key.subject_id)?));
        match details {
            Ok(details) => {
                return Ok((details.name, details.poster_path.unwrap_or_default()));
            }
            Err(err) => warn!(subject = %key, error = %err, "catalog lookup for title failed"),
        }
    }
    Ok((String::new(), String::new()))
}

fn run_watched(ctx: &mut AppContext, series_id: u32, episode: EpisodeRef) -> Result<()> {
    let history = ctx.history()?;
    let key = series_key(series_id);
    if episode_status(&history, series_id, episode) == EpisodeStatus::Watched {
        println!("{key} {} is already marked as watched.", episode.label());
        return Ok(());
    }
    let event = build_event(ctx, key, Some(episode), 100, None, None)?;
    ctx.db.record_watch(ctx.profile()?, &event)?;
    println!("Marked as watched: {}", describe_event(&event));
    Ok(())
}

/// Records progress 0 for the target, then hands its URL to the player.
pub(crate) fn start_playback(
    ctx: &AppContext,
    key: SubjectKey,
    position: Option<EpisodeRef>,
    open: bool,
) -> Result<String> {
    let target = match (key.kind, position) {
        (MediaKind::Movie, _) => PlayTarget::Movie { id: key.subject_id },
        (MediaKind::Series, Some(episode)) => PlayTarget::Episode {
            series_id: key.subject_id,
            episode,
        },
        (MediaKind::Series, None) => return Err(anyhow!("no episode selected for {key}")),
    };
    let url = embed_url(&ctx.config.player.embed_base_url, target);

    let position = position.filter(|_| key.kind == MediaKind::Series);
    let event = build_event(ctx, key, position, 0, None, None)?;
    ctx.db.record_watch(ctx.profile()?, &event)?;
    info!(subject = %key, url, "playback started");

    if open {
        open_in_player(&ctx.config.player, &url)?;
    }
    Ok(url)
}

fn run_play(
    ctx: &mut AppContext,
    key: SubjectKey,
    position: Option<EpisodeRef>,
    print: bool,
) -> Result<()> {
    let position = match (key.kind, position) {
        (MediaKind::Series, None) => {
            let (_, resolution) = resolve_next_for(ctx, key.subject_id, None)?;
            let candidate = resolution
                .candidate
                .ok_or_else(|| anyhow!("no episode available to play for {key}"))?;
            println!(
                "{}",
                episode_heading(&resolution.series.name, &candidate.episode)
            );
            Some(episode_ref(&candidate.episode))
        }
        (_, position) => position,
    };

    let url = start_playback(ctx, key, position, !print)?;
    if print {
        println!("{url}");
    } else {
        println!("Opened player: {url}");
    }
    Ok(())
}

fn run_search(ctx: &mut AppContext, query: &str) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        return Err(anyhow!("search query is empty"));
    }
    let catalog = ctx.catalog()?;
    let results = match catalog.search(query) {
        Ok(results) => results,
        Err(err) => return Err(ctx.catalog_failure(err)),
    };
    if results.is_empty() {
        println!("No results for \"{query}\".");
        return Ok(());
    }
    println!(
        "{:<10} {:<8} {:<6} {:<6} {:<50}",
        "ID", "TYPE", "YEAR", "RATING", "TITLE"
    );
    for item in results {
        let rating = item
            .vote_average()
            .filter(|rating| *rating > 0.0)
            .map(|rating| format!("{rating:.1}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:<8} {:<6} {:<6} {:<50}",
            item.id(),
            kind_label(item.kind()),
            item.year().unwrap_or("-"),
            rating,
            truncate(item.display_title(), 50)
        );
        if let Some(overview) = item.overview() {
            println!("{:<32} {}", "", truncate(overview, 72));
        }
    }
    Ok(())
}

fn run_watchlist(ctx: &AppContext) -> Result<()> {
    let items = ctx.db.watchlist(ctx.profile()?)?;
    if items.is_empty() {
        println!("Watchlist is empty. Add with `watchtrack watchlist --toggle <id>`.");
        return Ok(());
    }
    println!("{:<14} {:<40} {:<28}", "KEY", "TITLE", "ADDED");
    for item in items {
        println!(
            "{:<14} {:<40} {:<28}",
            item.key.to_string(),
            truncate(&item.title, 40),
            format_timestamp_display(&item.added_at)
        );
    }
    Ok(())
}

fn run_watchlist_toggle(ctx: &AppContext, key: SubjectKey, title: Option<String>) -> Result<()> {
    let (fallback_title, poster) = known_display_fields(ctx, key)?;
    let title = title.unwrap_or(fallback_title);
    let shown = if title.is_empty() {
        key.to_string()
    } else {
        title.clone()
    };
    match ctx
        .db
        .toggle_watchlist(ctx.profile()?, key, &title, &poster)?
    {
        WatchlistToggle::Added => println!("Added to watchlist: {shown}"),
        WatchlistToggle::Removed => println!("Removed from watchlist: {shown}"),
    }
    Ok(())
}

/// Validates the whole export, then writes it in one transaction.
pub(crate) fn import_history(db: &Database, profile: &str, raw: &str) -> Result<usize> {
    let records = parse_history_export(raw).context("history export is not a JSON array")?;
    let events = ingest_history(records).context("history export rejected")?;
    db.record_watches(profile, &events)
        .context("failed to store imported history")?;
    info!(profile, count = events.len(), "imported history");
    Ok(events.len())
}

fn run_import(ctx: &AppContext, path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let count = import_history(&ctx.db, ctx.profile()?, &raw)?;
    let entries: Vec<ResumeEntry> = build_continue_watching(&ctx.history()?);
    println!(
        "Imported {count} event(s); {} title(s) to continue.",
        entries.len()
    );
    Ok(())
}
