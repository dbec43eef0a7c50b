use std::process::{Command as ProcessCommand, Stdio};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::config::PlayerConfig;

use super::media::EpisodeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlayTarget {
    Movie { id: u32 },
    Episode { series_id: u32, episode: EpisodeRef },
}

pub(crate) fn embed_url(base_url: &str, target: PlayTarget) -> String {
    let base = base_url.trim_end_matches('/');
    match target {
        PlayTarget::Movie { id } => format!("{base}/movie?tmdb={id}"),
        PlayTarget::Episode { series_id, episode } => format!(
            "{base}/series?tmdb={series_id}&sea={}&epi={}",
            episode.season, episode.episode
        ),
    }
}

fn opener_command(config: &PlayerConfig) -> Result<ProcessCommand> {
    if let Some(raw) = config.open_command.as_deref() {
        let mut parts = raw.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("player.open_command is empty"))?;
        let mut cmd = ProcessCommand::new(program);
        cmd.args(parts);
        return Ok(cmd);
    }

    #[cfg(target_os = "macos")]
    let cmd = ProcessCommand::new("open");
    #[cfg(target_os = "windows")]
    let cmd = {
        let mut cmd = ProcessCommand::new("cmd");
        cmd.args(["/C", "start", ""]);
        cmd
    };
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let cmd = ProcessCommand::new("xdg-open");

    Ok(cmd)
}

/// Hands the embed URL to the browser (or the configured opener).
pub(crate) fn open_in_player(config: &PlayerConfig, url: &str) -> Result<()> {
    let mut cmd = opener_command(config)?;
    cmd.arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    let program = cmd.get_program().to_string_lossy().into_owned();
    let status = cmd
        .status()
        .with_context(|| format!("failed to launch {program}"))?;
    if !status.success() {
        return Err(anyhow!("{program} exited with {status}"));
    }
    info!(url, "opened player");
    Ok(())
}
