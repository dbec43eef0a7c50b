use chrono::{DateTime, Local};

use super::catalog::CatalogEpisode;
use super::media::{EpisodeRef, MediaKind, WatchEvent};
use super::reconcile::ResumeEntry;

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}

pub(crate) fn display_title(event: &WatchEvent) -> String {
    let title = event.title().trim();
    if title.is_empty() {
        format!("#{}", event.subject_id())
    } else {
        title.to_string()
    }
}

pub(crate) fn kind_label(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Movie => "Movie",
        MediaKind::Series => "Series",
    }
}

pub(crate) fn position_text(entry: &ResumeEntry) -> String {
    entry.label.clone().unwrap_or_else(|| "-".to_string())
}

pub(crate) fn progress_text(percent: u8) -> String {
    match percent {
        0 => "started".to_string(),
        100.. => "watched".to_string(),
        percent => format!("{percent}%"),
    }
}

pub(crate) fn episode_ref(episode: &CatalogEpisode) -> EpisodeRef {
    EpisodeRef::new(episode.season_number, episode.episode_number)
}

/// `Series - T1:E2 Episode name`, as shown above the player.
pub(crate) fn episode_heading(series_name: &str, episode: &CatalogEpisode) -> String {
    format!(
        "{series_name} - {} {}",
        episode_ref(episode).label(),
        episode.name
    )
}

pub(crate) fn format_timestamp_display(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M %:z")
                .to_string()
        })
        .unwrap_or_else(|_| raw.to_string())
}
