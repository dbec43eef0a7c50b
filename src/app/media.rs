use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum MediaKind {
    Movie,
    Series,
}

impl MediaKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
        }
    }

    /// Accepts both our own spelling and the catalog's `tv`.
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "movie" => Some(Self::Movie),
            "series" | "tv" => Some(Self::Series),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a subject in the watch history: one catalog id per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SubjectKey {
    pub(crate) subject_id: u32,
    pub(crate) kind: MediaKind,
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.subject_id, self.kind)
    }
}

/// Ordering is lexicographic: season first, then episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct EpisodeRef {
    pub(crate) season: u32,
    pub(crate) episode: u32,
}

impl EpisodeRef {
    pub(crate) fn new(season: u32, episode: u32) -> Self {
        Self { season, episode }
    }

    pub(crate) fn label(self) -> String {
        format!("T{}:E{}", self.season, self.episode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MovieProgress {
    pub(crate) subject_id: u32,
    pub(crate) title: String,
    pub(crate) poster_path: String,
    pub(crate) progress_percent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeriesProgress {
    pub(crate) subject_id: u32,
    pub(crate) title: String,
    pub(crate) poster_path: String,
    pub(crate) season_number: u32,
    pub(crate) episode_number: u32,
    pub(crate) progress_percent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WatchEvent {
    Movie(MovieProgress),
    Series(SeriesProgress),
}

impl WatchEvent {
    pub(crate) fn subject_id(&self) -> u32 {
        match self {
            Self::Movie(movie) => movie.subject_id,
            Self::Series(series) => series.subject_id,
        }
    }

    pub(crate) fn kind(&self) -> MediaKind {
        match self {
            Self::Movie(_) => MediaKind::Movie,
            Self::Series(_) => MediaKind::Series,
        }
    }

    pub(crate) fn key(&self) -> SubjectKey {
        SubjectKey {
            subject_id: self.subject_id(),
            kind: self.kind(),
        }
    }

    pub(crate) fn title(&self) -> &str {
        match self {
            Self::Movie(movie) => &movie.title,
            Self::Series(series) => &series.title,
        }
    }

    pub(crate) fn poster_path(&self) -> &str {
        match self {
            Self::Movie(movie) => &movie.poster_path,
            Self::Series(series) => &series.poster_path,
        }
    }

    pub(crate) fn progress_percent(&self) -> u8 {
        match self {
            Self::Movie(movie) => movie.progress_percent,
            Self::Series(series) => series.progress_percent,
        }
    }

    pub(crate) fn episode(&self) -> Option<EpisodeRef> {
        match self {
            Self::Movie(_) => None,
            Self::Series(series) => Some(EpisodeRef::new(
                series.season_number,
                series.episode_number,
            )),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum IngestError {
    #[error("history record {index} is missing its subject id")]
    MissingSubjectId { index: usize },
    #[error("history record {index} is missing its subject type")]
    MissingSubjectType { index: usize },
    #[error("history record {index} has unknown subject type '{raw}'")]
    UnknownSubjectType { index: usize, raw: String },
    #[error("history record {index} for series {subject_id} has no season/episode")]
    MissingEpisode { index: usize, subject_id: u32 },
    #[error("history record {index} has progress {progress} outside 0..=100")]
    ProgressOutOfRange { index: usize, progress: i64 },
}

/// One row of the backend's history export, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawHistoryRecord {
    #[serde(default)]
    pub(crate) tmdb_id: Option<u32>,
    #[serde(default)]
    pub(crate) item_type: Option<String>,
    #[serde(default)]
    pub(crate) poster_path: Option<String>,
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) progress: Option<i64>,
    #[serde(default)]
    pub(crate) season_number: Option<u32>,
    #[serde(default)]
    pub(crate) episode_number: Option<u32>,
}

pub(crate) fn parse_history_export(raw: &str) -> Result<Vec<RawHistoryRecord>, serde_json::Error> {
    serde_json::from_str(raw)
}

pub(crate) fn ingest_history_record(
    index: usize,
    record: RawHistoryRecord,
) -> Result<WatchEvent, IngestError> {
    let subject_id = record
        .tmdb_id
        .ok_or(IngestError::MissingSubjectId { index })?;
    let raw_kind = record
        .item_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(IngestError::MissingSubjectType { index })?;
    let kind = MediaKind::parse(raw_kind).ok_or_else(|| IngestError::UnknownSubjectType {
        index,
        raw: raw_kind.to_string(),
    })?;

    let progress = record.progress.unwrap_or(0);
    if !(0..=100).contains(&progress) {
        return Err(IngestError::ProgressOutOfRange { index, progress });
    }
    let progress_percent = progress as u8;
    let title = record.title.unwrap_or_default().trim().to_string();
    let poster_path = record.poster_path.unwrap_or_default();

    match kind {
        MediaKind::Movie => Ok(WatchEvent::Movie(MovieProgress {
            subject_id,
            title,
            poster_path,
            progress_percent,
        })),
        MediaKind::Series => {
            let (Some(season_number), Some(episode_number)) =
                (record.season_number, record.episode_number)
            else {
                return Err(IngestError::MissingEpisode { index, subject_id });
            };
            Ok(WatchEvent::Series(SeriesProgress {
                subject_id,
                title,
                poster_path,
                season_number,
                episode_number,
                progress_percent,
            }))
        }
    }
}

pub(crate) fn ingest_history(
    records: Vec<RawHistoryRecord>,
) -> Result<Vec<WatchEvent>, IngestError> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| ingest_history_record(index, record))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MediaItem {
    Movie {
        id: u32,
        title: String,
        overview: Option<String>,
        release_date: Option<String>,
        vote_average: Option<f64>,
    },
    Series {
        id: u32,
        name: String,
        overview: Option<String>,
        first_air_date: Option<String>,
        vote_average: Option<f64>,
    },
}

impl MediaItem {
    pub(crate) fn id(&self) -> u32 {
        match self {
            Self::Movie { id, .. } | Self::Series { id, .. } => *id,
        }
    }

    pub(crate) fn kind(&self) -> MediaKind {
        match self {
            Self::Movie { .. } => MediaKind::Movie,
            Self::Series { .. } => MediaKind::Series,
        }
    }

    pub(crate) fn display_title(&self) -> &str {
        match self {
            Self::Movie { title, .. } => title,
            Self::Series { name, .. } => name,
        }
    }

    pub(crate) fn overview(&self) -> Option<&str> {
        match self {
            Self::Movie { overview, .. } | Self::Series { overview, .. } => overview.as_deref(),
        }
    }

    pub(crate) fn vote_average(&self) -> Option<f64> {
        match self {
            Self::Movie { vote_average, .. } | Self::Series { vote_average, .. } => *vote_average,
        }
    }

    pub(crate) fn year(&self) -> Option<&str> {
        let date = match self {
            Self::Movie { release_date, .. } => release_date.as_deref(),
            Self::Series { first_air_date, .. } => first_air_date.as_deref(),
        }?;
        date.get(..4).filter(|year| !year.is_empty())
    }
}

/// Classifies a catalog result once. `media_type` wins when present; otherwise
/// a `title` field means movie and a `name` field means series. People and
/// records without an id are dropped.
pub(crate) fn media_item_from_value(value: &Value) -> Option<MediaItem> {
    let id = value.get("id")?.as_u64().and_then(|id| u32::try_from(id).ok())?;
    let text = |field: &str| {
        value
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    };

    let kind = match value.get("media_type").and_then(Value::as_str) {
        Some("person") => return None,
        Some(raw) => MediaKind::parse(raw)?,
        None if text("title").is_some() => MediaKind::Movie,
        None if text("name").is_some() => MediaKind::Series,
        None => return None,
    };
    let vote_average = value.get("vote_average").and_then(Value::as_f64);

    match kind {
        MediaKind::Movie => Some(MediaItem::Movie {
            id,
            title: text("title").or_else(|| text("name"))?,
            overview: text("overview"),
            release_date: text("release_date"),
            vote_average,
        }),
        MediaKind::Series => Some(MediaItem::Series {
            id,
            name: text("name").or_else(|| text("title"))?,
            overview: text("overview"),
            first_air_date: text("first_air_date"),
            vote_average,
        }),
    }
}
