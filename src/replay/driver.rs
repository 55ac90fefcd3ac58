// src/replay/driver.rs
//! Playback driver task
//!
//! A single task owns the [`Player`] and is its only mutator. Commands
//! arrive on a queue and are handled between ticks; every change is
//! published as a [`PlaybackSnapshot`] on a `watch` channel.

use crate::replay::player::{PlaybackState, PlaybackStatus, Player};
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// What the display surface renders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub content: String,
    pub cursor: usize,
}

impl PlaybackSnapshot {
    fn capture(player: &Player) -> Self {
        Self {
            state: player.state(),
            content: player.content(),
            cursor: player.document().cursor(),
        }
    }
}

enum PlaybackCommand {
    Play(oneshot::Sender<Result<()>>),
    Pause(oneshot::Sender<Result<()>>),
    Seek(f64, oneshot::Sender<Result<()>>),
    SetSpeed(f64, oneshot::Sender<Result<f64>>),
    Snapshot(oneshot::Sender<PlaybackSnapshot>),
    Teardown(oneshot::Sender<()>),
}

/// Handle to a running playback driver
pub struct PlaybackHandle {
    commands: mpsc::Sender<PlaybackCommand>,
    snapshots: watch::Receiver<PlaybackSnapshot>,
    task: JoinHandle<()>,
}

impl PlaybackHandle {
    /// Move `player` onto a driver task
    pub fn spawn(player: Player) -> Self {
        let (commands, rx) = mpsc::channel(32);
        let (tx, snapshots) = watch::channel(PlaybackSnapshot::capture(&player));
        let task = tokio::spawn(drive(player, rx, tx));

        Self {
            commands,
            snapshots,
            task,
        }
    }

    pub async fn play(&self) -> Result<()> {
        self.request(PlaybackCommand::Play).await?
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(PlaybackCommand::Pause).await?
    }

    pub async fn seek(&self, time_ms: f64) -> Result<()> {
        self.request(|reply| PlaybackCommand::Seek(time_ms, reply)).await?
    }

    pub async fn set_speed(&self, multiplier: f64) -> Result<f64> {
        self.request(|reply| PlaybackCommand::SetSpeed(multiplier, reply)).await?
    }

    pub async fn snapshot(&self) -> Result<PlaybackSnapshot> {
        self.request(PlaybackCommand::Snapshot).await
    }

    /// Receiver of published snapshots
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshots.clone()
    }

    /// Reset the player and stop the driver
    pub async fn teardown(self) -> Result<()> {
        let result = self.request(PlaybackCommand::Teardown).await;
        if let Err(e) = self.task.await {
            debug!("Playback driver ended abnormally: {}", e);
        }
        result
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> PlaybackCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| EngineError::DriverStopped)?;
        response.await.map_err(|_| EngineError::DriverStopped)
    }
}

async fn drive(
    mut player: Player,
    mut commands: mpsc::Receiver<PlaybackCommand>,
    snapshots: watch::Sender<PlaybackSnapshot>,
) {
    let tick_interval = Duration::from_millis(player.config().tick_interval_ms.max(1));
    let mut last_tick = Instant::now();

    loop {
        let playing = player.state().status == PlaybackStatus::Playing;

        let command = if playing {
            tokio::select! {
                command = commands.recv() => command,
                _ = tokio::time::sleep(tick_interval) => {
                    let now = Instant::now();
                    player.tick(now - last_tick);
                    last_tick = now;
                    snapshots.send_replace(PlaybackSnapshot::capture(&player));
                    continue;
                }
            }
        } else {
            commands.recv().await
        };

        let Some(command) = command else {
            break;
        };

        // Settle time played so far before the command mutates state
        let now = Instant::now();
        if playing {
            player.tick(now - last_tick);
        }
        last_tick = now;

        match command {
            PlaybackCommand::Play(reply) => {
                let _ = reply.send(player.play());
            }
            PlaybackCommand::Pause(reply) => {
                let _ = reply.send(player.pause());
            }
            PlaybackCommand::Seek(time_ms, reply) => {
                let _ = reply.send(player.seek(time_ms));
            }
            PlaybackCommand::SetSpeed(multiplier, reply) => {
                let _ = reply.send(player.set_speed(multiplier));
            }
            PlaybackCommand::Snapshot(reply) => {
                let _ = reply.send(PlaybackSnapshot::capture(&player));
            }
            PlaybackCommand::Teardown(reply) => {
                player.teardown();
                snapshots.send_replace(PlaybackSnapshot::capture(&player));
                let _ = reply.send(());
                break;
            }
        }

        snapshots.send_replace(PlaybackSnapshot::capture(&player));
    }

    debug!("Playback driver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::event::{EventKind, EventPayload, Modifiers};
    use crate::replay::document::ContentModel;
    use crate::replay::player::PlaybackConfig;
    use crate::replay::timeline::{ReplayEvent, Timeline};

    fn event(sequence: u64, timestamp_ms: u64, kind: EventKind, text: Option<&str>) -> ReplayEvent {
        ReplayEvent {
            sequence,
            timestamp_ms,
            kind,
            payload: EventPayload {
                text: text.map(str::to_string),
                ..Default::default()
            },
            modifiers: Modifiers::default(),
            target: None,
        }
    }

    fn handle() -> PlaybackHandle {
        let mut player = Player::new(PlaybackConfig::default());
        player.load_timeline(Timeline::new(
            vec![
                event(1, 0, EventKind::Insert, Some("a")),
                event(2, 100, EventKind::Insert, Some("b")),
                event(3, 200, EventKind::Delete, None),
                event(4, 300, EventKind::Insert, Some("c")),
            ],
            ContentModel::AppendOnly,
            0,
        ));
        PlaybackHandle::spawn(player)
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_to_completion() {
        let handle = handle();
        let mut updates = handle.subscribe();

        handle.play().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state.status, PlaybackStatus::Complete);
        assert_eq!(snapshot.content, "ac");

        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().content, "ac");
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_shortens_playback() {
        let handle = handle();
        assert_eq!(handle.set_speed(4.0).await.unwrap(), 4.0);

        handle.play().await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state.status, PlaybackStatus::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_between_ticks() {
        let handle = handle();
        handle.play().await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.pause().await.unwrap();

        let paused = handle.snapshot().await.unwrap();
        assert_eq!(paused.state.status, PlaybackStatus::Paused);
        assert_eq!(paused.content, "ab");

        // Nothing advances while paused
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.snapshot().await.unwrap().state, paused.state);

        handle.seek(250.0).await.unwrap();
        assert_eq!(handle.snapshot().await.unwrap().content, "a");
    }

    #[tokio::test]
    async fn test_teardown_stops_driver() {
        let handle = handle();
        let updates = handle.subscribe();
        handle.teardown().await.unwrap();

        assert_eq!(updates.borrow().state.status, PlaybackStatus::Idle);
        assert_eq!(updates.borrow().state.total_events, 0);
    }

    #[tokio::test]
    async fn test_play_without_recording_reports_error() {
        let handle = PlaybackHandle::spawn(Player::new(PlaybackConfig::default()));
        assert!(matches!(handle.play().await, Err(EngineError::NoRecordingLoaded)));
    }
}
