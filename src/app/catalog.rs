use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CatalogConfig;
use crate::http::{HttpError, RetryPolicy, TextRequest, get_text_with_retries};

use super::media::{MediaItem, media_item_from_value};
use super::reconcile::ReconcileError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CatalogEpisode {
    pub(crate) id: u64,
    pub(crate) season_number: u32,
    pub(crate) episode_number: u32,
    pub(crate) name: String,
    pub(crate) overview: Option<String>,
    pub(crate) still_path: Option<String>,
    pub(crate) air_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeasonSummary {
    pub(crate) season_number: u32,
    pub(crate) name: String,
    pub(crate) episode_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeriesDetails {
    pub(crate) id: u32,
    pub(crate) name: String,
    pub(crate) poster_path: Option<String>,
    pub(crate) seasons: Vec<SeasonSummary>,
}

#[derive(Debug, Error)]
pub(crate) enum CatalogError {
    #[error("catalog rejected the credentials (HTTP 401)")]
    Unauthorized,
    #[error("catalog has no {what}")]
    NotFound { what: String },
    #[error("catalog response for {what} could not be parsed")]
    Malformed { what: String },
    #[error("no catalog credentials configured; set catalog.api_key, TMDB_API_KEY or log in with --token")]
    MissingCredentials,
    #[error("catalog data failed validation: {0}")]
    Integrity(#[from] ReconcileError),
    #[error(transparent)]
    Http(HttpError),
}

impl From<HttpError> for CatalogError {
    fn from(err: HttpError) -> Self {
        match err.status() {
            Some(401) => Self::Unauthorized,
            _ => Self::Http(err),
        }
    }
}

/// Read-only access to series, season and search metadata.
pub(crate) trait CatalogSource {
    fn series_details(&self, series_id: u32) -> Result<SeriesDetails, CatalogError>;

    /// Episodes of one season in canonical increasing order.
    fn season_episodes(
        &self,
        series_id: u32,
        season_number: u32,
    ) -> Result<Vec<CatalogEpisode>, CatalogError>;

    fn search(&self, query: &str) -> Result<Vec<MediaItem>, CatalogError>;
}

#[derive(Debug, Clone)]
enum Credentials {
    ApiKey(String),
    Bearer(String),
}

#[derive(Debug, Clone)]
pub(crate) struct TmdbCatalog {
    base_url: String,
    language: String,
    credentials: Credentials,
    policy: RetryPolicy,
}

impl TmdbCatalog {
    /// A session token takes precedence over the configured api key.
    pub(crate) fn new(config: &CatalogConfig, token: Option<&str>) -> Result<Self, CatalogError> {
        let credentials = match (token, config.api_key.as_deref()) {
            (Some(token), _) if !token.trim().is_empty() => {
                Credentials::Bearer(token.trim().to_string())
            }
            (_, Some(key)) if !key.trim().is_empty() => Credentials::ApiKey(key.trim().to_string()),
            _ => return Err(CatalogError::MissingCredentials),
        };
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            credentials,
            policy: RetryPolicy {
                connect_timeout: Duration::from_millis(config.connect_timeout_ms),
                read_timeout: Duration::from_millis(config.read_timeout_ms),
                attempts: config.attempts,
                retry_delay: Duration::from_millis(config.retry_delay_ms),
            },
        })
    }

    fn get_json(&self, path: &str, extra: &[(&str, &str)]) -> Result<Value, CatalogError> {
        let mut request = TextRequest::new(format!("{}{}", self.base_url, path));
        match &self.credentials {
            Credentials::ApiKey(key) => request = request.query("api_key", key),
            Credentials::Bearer(token) => {
                request = request.header("Authorization", &format!("Bearer {token}"));
            }
        }
        request = request.query("language", &self.language);
        for (key, value) in extra {
            request = request.query(key, value);
        }

        debug!(path, "catalog request");
        let body = get_text_with_retries(&request, &self.policy).map_err(|err| {
            if err.status() == Some(404) {
                return CatalogError::NotFound {
                    what: path.to_string(),
                };
            }
            warn!(path, error = %err, "catalog request failed");
            CatalogError::from(err)
        })?;
        serde_json::from_str(&body).map_err(|_| CatalogError::Malformed {
            what: path.to_string(),
        })
    }
}

impl CatalogSource for TmdbCatalog {
    fn series_details(&self, series_id: u32) -> Result<SeriesDetails, CatalogError> {
        let value = self.get_json(&format!("/tv/{series_id}"), &[])?;
        parse_series_details(&value).ok_or_else(|| CatalogError::Malformed {
            what: format!("series {series_id}"),
        })
    }

    fn season_episodes(
        &self,
        series_id: u32,
        season_number: u32,
    ) -> Result<Vec<CatalogEpisode>, CatalogError> {
        let value = self.get_json(&format!("/tv/{series_id}/season/{season_number}"), &[])?;
        Ok(parse_season_episodes(&value, season_number))
    }

    fn search(&self, query: &str) -> Result<Vec<MediaItem>, CatalogError> {
        let value = self.get_json("/search/multi", &[("query", query), ("page", "1")])?;
        Ok(parse_search_results(&value))
    }
}

fn as_u32(value: Option<&Value>) -> Option<u32> {
    value
        .and_then(Value::as_u64)
        .and_then(|number| u32::try_from(number).ok())
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

pub(crate) fn parse_series_details(value: &Value) -> Option<SeriesDetails> {
    let id = as_u32(value.get("id"))?;
    let name = non_empty_str(value.get("name"))?;
    let seasons = value
        .get("seasons")
        .and_then(Value::as_array)
        .map(|seasons| {
            seasons
                .iter()
                .filter_map(|season| {
                    let season_number = as_u32(season.get("season_number"))?;
                    Some(SeasonSummary {
                        season_number,
                        name: non_empty_str(season.get("name"))
                            .unwrap_or_else(|| format!("Season {season_number}")),
                        episode_count: as_u32(season.get("episode_count")).unwrap_or(0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(SeriesDetails {
        id,
        name,
        poster_path: non_empty_str(value.get("poster_path")),
        seasons,
    })
}

/// Episodes missing a number are skipped; the rest are sorted by number.
/// Duplicates are left in place for the reconciler to reject.
pub(crate) fn parse_season_episodes(value: &Value, season_number: u32) -> Vec<CatalogEpisode> {
    let Some(items) = value.get("episodes").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut episodes: Vec<CatalogEpisode> = items
        .iter()
        .filter_map(|item| {
            let episode_number = as_u32(item.get("episode_number"))?;
            Some(CatalogEpisode {
                id: item.get("id").and_then(Value::as_u64).unwrap_or(0),
                season_number: as_u32(item.get("season_number")).unwrap_or(season_number),
                episode_number,
                name: non_empty_str(item.get("name"))
                    .unwrap_or_else(|| format!("Episode {episode_number}")),
                overview: non_empty_str(item.get("overview")),
                still_path: non_empty_str(item.get("still_path")),
                air_date: non_empty_str(item.get("air_date")),
            })
        })
        .collect();
    episodes.sort_by_key(|episode| episode.episode_number);
    episodes
}

pub(crate) fn parse_search_results(value: &Value) -> Vec<MediaItem> {
    value
        .get("results")
        .and_then(Value::as_array)
        .map(|results| results.iter().filter_map(media_item_from_value).collect())
        .unwrap_or_default()
}
