//! Audible delivery
//!
//! Plays a sound file through an external player and optionally speaks the
//! start of the title. Playback is fire-and-forget: the sink never waits
//! for the player and never fails the request because of it.

use super::traits::{DeliveryReceipt, DeliverySink};
use crate::daemon::templates::RenderedMessage;
use crate::errors::AppResult;
use crate::shared::config::SoundConfig;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

/// Number of title characters handed to the speech command
const SPOKEN_CHARS: usize = 10;

pub trait SoundPlayer: Send + Sync {
    fn play(&self, file: &Path) -> io::Result<()>;
    fn say(&self, text: &str) -> io::Result<()>;
}

/// Runs the configured player and speech programs in the background
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    player: String,
    say_command: String,
}

impl CommandPlayer {
    pub fn from_config(config: &SoundConfig) -> Self {
        Self {
            player: config.player.clone(),
            say_command: config.say_command.clone(),
        }
    }

    fn spawn_detached(program: &str, arg: &std::ffi::OsStr) -> io::Result<()> {
        let mut child = Command::new(program)
            .arg(arg)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let program = program.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => debug!("{} exited with {}", program, status),
                Ok(_) => {}
                Err(e) => debug!("Failed to reap {}: {}", program, e),
            }
        });
        Ok(())
    }
}

impl SoundPlayer for CommandPlayer {
    fn play(&self, file: &Path) -> io::Result<()> {
        Self::spawn_detached(&self.player, file.as_os_str())
    }

    fn say(&self, text: &str) -> io::Result<()> {
        Self::spawn_detached(&self.say_command, std::ffi::OsStr::new(text))
    }
}

pub struct SoundSink {
    enabled: bool,
    file: PathBuf,
    say_message: bool,
    player: Arc<dyn SoundPlayer>,
}

impl SoundSink {
    pub fn new(config: &SoundConfig) -> Self {
        Self::with_player(config, Arc::new(CommandPlayer::from_config(config)))
    }

    pub fn with_player(config: &SoundConfig, player: Arc<dyn SoundPlayer>) -> Self {
        Self {
            enabled: config.enabled,
            file: config.file.clone(),
            say_message: config.say_message,
            player,
        }
    }
}

/// Leading characters of the title, cut on a character boundary
fn spoken_text(title: &str) -> String {
    title.chars().take(SPOKEN_CHARS).collect()
}

#[async_trait]
impl DeliverySink for SoundSink {
    fn name(&self) -> &'static str {
        "sound"
    }

    async fn deliver(&self, message: &RenderedMessage) -> AppResult<DeliveryReceipt> {
        if !self.enabled {
            return Ok(DeliveryReceipt::default());
        }

        if self.file.exists() {
            if let Err(e) = self.player.play(&self.file) {
                warn!("Failed to play {}: {}", self.file.display(), e);
            }
        } else {
            warn!("Sound file {} not found, skipping playback", self.file.display());
        }

        if self.say_message {
            if let Err(e) = self.player.say(&spoken_text(&message.title)) {
                warn!("Failed to speak notification: {}", e);
            }
        }

        Ok(DeliveryReceipt::default())
    }
}
