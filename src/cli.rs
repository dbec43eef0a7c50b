use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::app::media::MediaKind;

#[derive(Debug, Parser)]
#[command(
    name = "watchtrack",
    version,
    about = "Track watch history and pick up movies and series where you left off"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum KindArg {
    Movie,
    Series,
}

impl From<KindArg> for MediaKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Movie => MediaKind::Movie,
            KindArg::Series => MediaKind::Series,
        }
    }
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// One entry per movie/series, at its most advanced position
    Continue,
    /// Suggest the episode to play next for a series
    Next {
        series_id: u32,
        #[arg(long)]
        season: Option<u32>,
    },
    /// List a season's episodes with their watch status
    Episodes {
        series_id: u32,
        #[arg(long)]
        season: Option<u32>,
    },
    /// Record progress for a movie or an episode
    Record {
        subject_id: u32,
        #[arg(long, value_enum)]
        kind: KindArg,
        #[arg(long, requires = "episode")]
        season: Option<u32>,
        #[arg(long, requires = "season")]
        episode: Option<u32>,
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=100))]
        progress: u8,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        poster: Option<String>,
    },
    /// Mark an episode as fully watched
    Watched {
        series_id: u32,
        season: u32,
        episode: u32,
    },
    /// Open the embed player and record that playback started
    Play {
        subject_id: u32,
        #[arg(long, value_enum, default_value_t = KindArg::Series)]
        kind: KindArg,
        #[arg(long, requires = "episode")]
        season: Option<u32>,
        #[arg(long, requires = "season")]
        episode: Option<u32>,
        /// Print the player URL instead of opening it
        #[arg(long)]
        print: bool,
    },
    /// Search the catalog for movies and series
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Show the watchlist, or add/remove one item
    Watchlist {
        #[arg(long)]
        toggle: Option<u32>,
        #[arg(long, value_enum, default_value_t = KindArg::Series)]
        kind: KindArg,
        #[arg(long)]
        title: Option<String>,
    },
    /// Import a history export (JSON array) from the backend
    Import { path: PathBuf },
    /// Delete all history for one movie/series
    Forget {
        subject_id: u32,
        #[arg(long, value_enum)]
        kind: KindArg,
    },
    /// Start a session for a profile
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Catalog bearer token
        #[arg(long)]
        token: Option<String>,
    },
    Logout,
    Whoami,
    Tui,
}
