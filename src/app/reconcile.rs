//! Derives resume state from raw watch history.
//!
//! Everything here is a pure function over already-resolved values: the
//! store and the catalog are queried by the caller. Recency is inferred from
//! `(season, episode)` ordinals because watch events carry no trustworthy
//! timestamp. When two events compare equal, the one later in the input wins.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use super::catalog::{CatalogEpisode, SeasonSummary};
use super::media::{EpisodeRef, MediaKind, SeriesProgress, SubjectKey, WatchEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum ReconcileError {
    #[error("season {season} lists episode {episode_number} more than once")]
    DuplicateEpisode { season: u32, episode_number: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResumeEntry {
    pub(crate) key: SubjectKey,
    pub(crate) event: WatchEvent,
    pub(crate) label: Option<String>,
}

impl ResumeEntry {
    fn from_event(event: &WatchEvent) -> Self {
        Self {
            key: event.key(),
            label: event.episode().map(EpisodeRef::label),
            event: event.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NextReason {
    /// No history for the series.
    Start,
    /// Last watched episode finished; this is the one after it.
    Advance,
    /// Last watched episode finished and nothing follows it in this season.
    SeasonFinale,
    /// Last watched episode is unfinished; pick it up again.
    Resume,
    /// History points at another season; start the selected one.
    SeasonSwitch,
    /// Unfinished episode is missing from the season list; start it over.
    Unlisted,
}

impl NextReason {
    pub(crate) fn describe(self) -> &'static str {
        match self {
            Self::Start => "start watching",
            Self::Advance => "next episode",
            Self::SeasonFinale => "season finale (already watched)",
            Self::Resume => "continue watching",
            Self::SeasonSwitch => "start of selected season",
            Self::Unlisted => "start of season (last episode not listed)",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NextEpisodeCandidate {
    pub(crate) episode: CatalogEpisode,
    pub(crate) reason: NextReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EpisodeStatus {
    Unwatched,
    InProgress(u8),
    Watched,
}

impl EpisodeStatus {
    pub(crate) fn action_label(self) -> &'static str {
        match self {
            Self::InProgress(percent) if percent > 0 => "Continue",
            Self::Watched => "Rewatch",
            Self::Unwatched | Self::InProgress(_) => "Watch",
        }
    }
}

/// `true` when `candidate` should replace `current` for the same subject.
fn supersedes(candidate: &WatchEvent, current: &WatchEvent) -> bool {
    candidate.episode() >= current.episode()
}

/// Collapses raw history into one entry per subject, keyed by id and kind.
/// Entries come out in order of each subject's first appearance.
pub(crate) fn build_continue_watching(events: &[WatchEvent]) -> Vec<ResumeEntry> {
    let mut index_by_key: HashMap<SubjectKey, usize> = HashMap::new();
    let mut winners: Vec<&WatchEvent> = Vec::new();

    for event in events {
        let key = event.key();
        match index_by_key.get(&key) {
            Some(&idx) => {
                if supersedes(event, winners[idx]) {
                    winners[idx] = event;
                }
            }
            None => {
                index_by_key.insert(key, winners.len());
                winners.push(event);
            }
        }
    }

    debug!(
        events = events.len(),
        entries = winners.len(),
        "built continue-watching entries"
    );
    winners.into_iter().map(ResumeEntry::from_event).collect()
}

fn series_history(
    history: &[WatchEvent],
    series_id: u32,
) -> impl Iterator<Item = &SeriesProgress> {
    history.iter().filter_map(move |event| match event {
        WatchEvent::Series(progress) if progress.subject_id == series_id => Some(progress),
        _ => None,
    })
}

fn ordinal(progress: &SeriesProgress) -> EpisodeRef {
    EpisodeRef::new(progress.season_number, progress.episode_number)
}

/// The most advanced episode across every season of the series.
pub(crate) fn last_watched_episode(
    history: &[WatchEvent],
    series_id: u32,
) -> Option<&SeriesProgress> {
    series_history(history, series_id).fold(None, |latest, current| match latest {
        Some(latest) if ordinal(current) < ordinal(latest) => Some(latest),
        _ => Some(current),
    })
}

pub(crate) fn validate_season_episodes(episodes: &[CatalogEpisode]) -> Result<(), ReconcileError> {
    let mut seen = HashSet::with_capacity(episodes.len());
    for episode in episodes {
        if !seen.insert(episode.episode_number) {
            return Err(ReconcileError::DuplicateEpisode {
                season: episode.season_number,
                episode_number: episode.episode_number,
            });
        }
    }
    Ok(())
}

/// Picks the episode to offer for `selected_season`. Returns `None` only when
/// the season has no episodes; never returns an episode outside the list.
pub(crate) fn select_next_episode(
    season_episodes: &[CatalogEpisode],
    history: &[WatchEvent],
    series_id: u32,
    selected_season: u32,
) -> Result<Option<NextEpisodeCandidate>, ReconcileError> {
    validate_season_episodes(season_episodes)?;

    let (Some(first), Some(last)) = (season_episodes.first(), season_episodes.last()) else {
        return Ok(None);
    };
    let pick = |episode: &CatalogEpisode, reason| {
        Some(NextEpisodeCandidate {
            episode: episode.clone(),
            reason,
        })
    };

    let Some(last_watched) = last_watched_episode(history, series_id) else {
        return Ok(pick(first, NextReason::Start));
    };

    if last_watched.season_number != selected_season {
        return Ok(pick(first, NextReason::SeasonSwitch));
    }

    let position = season_episodes
        .iter()
        .position(|episode| episode.episode_number == last_watched.episode_number);

    if last_watched.progress_percent >= 100 {
        return Ok(match position.and_then(|idx| season_episodes.get(idx + 1)) {
            Some(next) => pick(next, NextReason::Advance),
            None => pick(last, NextReason::SeasonFinale),
        });
    }

    Ok(match position {
        Some(idx) => pick(&season_episodes[idx], NextReason::Resume),
        None => pick(first, NextReason::Unlisted),
    })
}

/// Episodes of the series recorded at 100%.
pub(crate) fn watched_episodes(history: &[WatchEvent], series_id: u32) -> HashSet<EpisodeRef> {
    let mut latest: HashMap<EpisodeRef, u8> = HashMap::new();
    for progress in series_history(history, series_id) {
        latest.insert(ordinal(progress), progress.progress_percent);
    }
    latest
        .into_iter()
        .filter(|(_, percent)| *percent >= 100)
        .map(|(episode, _)| episode)
        .collect()
}

pub(crate) fn episode_status(
    history: &[WatchEvent],
    series_id: u32,
    episode: EpisodeRef,
) -> EpisodeStatus {
    match series_history(history, series_id)
        .filter(|progress| ordinal(progress) == episode)
        .last()
    {
        None => EpisodeStatus::Unwatched,
        Some(progress) if progress.progress_percent >= 100 => EpisodeStatus::Watched,
        Some(progress) => EpisodeStatus::InProgress(progress.progress_percent),
    }
}

/// Season 1 when the series has one, otherwise whatever is listed first.
pub(crate) fn default_season(seasons: &[SeasonSummary]) -> Option<u32> {
    seasons
        .iter()
        .find(|season| season.season_number == 1)
        .or_else(|| seasons.first())
        .map(|season| season.season_number)
}

/// Season to open for a subject: where the history left off, else the default.
pub(crate) fn resume_season(
    history: &[WatchEvent],
    series_id: u32,
    seasons: &[SeasonSummary],
) -> Option<u32> {
    last_watched_episode(history, series_id)
        .map(|progress| progress.season_number)
        .or_else(|| default_season(seasons))
}

pub(crate) fn series_key(series_id: u32) -> SubjectKey {
    SubjectKey {
        subject_id: series_id,
        kind: MediaKind::Series,
    }
}
