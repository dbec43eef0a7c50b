use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::app::media::{MediaKind, MovieProgress, SeriesProgress, SubjectKey, WatchEvent};

/// Stored in the episode columns of movie rows so the upsert key stays NOT NULL.
const NO_EPISODE: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WatchlistItem {
    pub(crate) key: SubjectKey,
    pub(crate) title: String,
    pub(crate) poster_path: String,
    pub(crate) added_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchlistToggle {
    Added,
    Removed,
}

pub(crate) struct Database {
    conn: Connection,
}

impl Database {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.migrate()?;
        Ok(db)
    }

    pub(crate) fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS watch_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile TEXT NOT NULL,
                subject_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                season_number INTEGER NOT NULL,
                episode_number INTEGER NOT NULL,
                title TEXT NOT NULL,
                poster_path TEXT NOT NULL,
                progress INTEGER NOT NULL,
                write_seq INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (profile, subject_id, kind, season_number, episode_number)
            );
            CREATE INDEX IF NOT EXISTS idx_watch_events_profile_seq
                ON watch_events(profile, write_seq);
            CREATE TABLE IF NOT EXISTS watchlist (
                profile TEXT NOT NULL,
                subject_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                poster_path TEXT NOT NULL,
                added_at TEXT NOT NULL,
                PRIMARY KEY (profile, subject_id, kind)
            );
            "#,
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Inserts or replaces the progress for the event's subject/episode tuple.
    pub(crate) fn record_watch(&self, profile: &str, event: &WatchEvent) -> Result<()> {
        upsert_watch(&self.conn, profile, event)
    }

    /// Writes every event or none of them.
    pub(crate) fn record_watches(&self, profile: &str, events: &[WatchEvent]) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("failed to start watch history transaction")?;
        for event in events {
            upsert_watch(&tx, profile, event)?;
        }
        tx.commit()
            .context("failed to commit watch history transaction")?;
        Ok(())
    }

    /// Every event of the profile, oldest write first.
    pub(crate) fn watch_history(&self, profile: &str) -> Result<Vec<WatchEvent>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT subject_id, kind, season_number, episode_number, title, poster_path, progress
            FROM watch_events
            WHERE profile = ?1
            ORDER BY write_seq ASC, id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![profile], |row| {
            Ok(WatchRow {
                subject_id: row.get(0)?,
                kind: row.get(1)?,
                season_number: row.get(2)?,
                episode_number: row.get(3)?,
                title: row.get(4)?,
                poster_path: row.get(5)?,
                progress: row.get(6)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_event()?);
        }
        Ok(out)
    }

    pub(crate) fn delete_subject(&self, profile: &str, key: SubjectKey) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM watch_events WHERE profile = ?1 AND subject_id = ?2 AND kind = ?3",
            params![profile, key.subject_id, key.kind.as_str()],
        )?;
        if deleted > 0 {
            info!(profile, subject = %key, rows = deleted, "deleted watch history");
        }
        Ok(deleted > 0)
    }

    pub(crate) fn toggle_watchlist(
        &self,
        profile: &str,
        key: SubjectKey,
        title: &str,
        poster_path: &str,
    ) -> Result<WatchlistToggle> {
        let existing = self
            .conn
            .query_row(
                "SELECT 1 FROM watchlist WHERE profile = ?1 AND subject_id = ?2 AND kind = ?3",
                params![profile, key.subject_id, key.kind.as_str()],
                |_| Ok(()),
            )
            .optional()?;

        if existing.is_some() {
            self.conn.execute(
                "DELETE FROM watchlist WHERE profile = ?1 AND subject_id = ?2 AND kind = ?3",
                params![profile, key.subject_id, key.kind.as_str()],
            )?;
            return Ok(WatchlistToggle::Removed);
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        self.conn.execute(
            r#"
            INSERT INTO watchlist (profile, subject_id, kind, title, poster_path, added_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                profile,
                key.subject_id,
                key.kind.as_str(),
                title,
                poster_path,
                now
            ],
        )?;
        Ok(WatchlistToggle::Added)
    }

    /// Most recently added first.
    pub(crate) fn watchlist(&self, profile: &str) -> Result<Vec<WatchlistItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT subject_id, kind, title, poster_path, added_at
            FROM watchlist
            WHERE profile = ?1
            ORDER BY added_at DESC, rowid DESC
            "#,
        )?;
        let rows = stmt.query_map(params![profile], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (subject_id, kind, title, poster_path, added_at) = row?;
            out.push(WatchlistItem {
                key: SubjectKey {
                    subject_id,
                    kind: parse_kind(&kind)?,
                },
                title,
                poster_path,
                added_at,
            });
        }
        Ok(out)
    }
}

fn upsert_watch(conn: &Connection, profile: &str, event: &WatchEvent) -> Result<()> {
    let (season, episode) = match event.episode() {
        Some(ep) => (i64::from(ep.season), i64::from(ep.episode)),
        None => (NO_EPISODE, NO_EPISODE),
    };
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
    conn.execute(
        r#"
        INSERT INTO watch_events (
            profile, subject_id, kind, season_number, episode_number,
            title, poster_path, progress, write_seq, updated_at
        )
        VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
            (SELECT COALESCE(MAX(write_seq), 0) + 1 FROM watch_events),
            ?9
        )
        ON CONFLICT(profile, subject_id, kind, season_number, episode_number) DO UPDATE SET
            title = excluded.title,
            poster_path = excluded.poster_path,
            progress = excluded.progress,
            write_seq = excluded.write_seq,
            updated_at = excluded.updated_at
        "#,
        params![
            profile,
            event.subject_id(),
            event.kind().as_str(),
            season,
            episode,
            event.title(),
            event.poster_path(),
            event.progress_percent(),
            now
        ],
    )?;
    debug!(
        profile,
        subject = %event.key(),
        progress = event.progress_percent(),
        "recorded watch event"
    );
    Ok(())
}

struct WatchRow {
    subject_id: u32,
    kind: String,
    season_number: i64,
    episode_number: i64,
    title: String,
    poster_path: String,
    progress: u8,
}

impl WatchRow {
    fn into_event(self) -> Result<WatchEvent> {
        match parse_kind(&self.kind)? {
            MediaKind::Movie => Ok(WatchEvent::Movie(MovieProgress {
                subject_id: self.subject_id,
                title: self.title,
                poster_path: self.poster_path,
                progress_percent: self.progress,
            })),
            MediaKind::Series => {
                let season_number = u32::try_from(self.season_number).with_context(|| {
                    format!("series {} has invalid season", self.subject_id)
                })?;
                let episode_number = u32::try_from(self.episode_number).with_context(|| {
                    format!("series {} has invalid episode", self.subject_id)
                })?;
                Ok(WatchEvent::Series(SeriesProgress {
                    subject_id: self.subject_id,
                    title: self.title,
                    poster_path: self.poster_path,
                    season_number,
                    episode_number,
                    progress_percent: self.progress,
                }))
            }
        }
    }
}

fn parse_kind(raw: &str) -> Result<MediaKind> {
    MediaKind::parse(raw).ok_or_else(|| anyhow!("unknown subject kind '{raw}' in database"))
}
