//! Match Results Sink
//!
//! Finished rounds leave the tick through a bounded channel and are stored
//! on their own task, so slow storage never delays the simulation. Sinks
//! may block; each store runs on the blocking pool.
//!
//! ```text
//! tick task ──try_send──► mpsc ──► results task ──spawn_blocking──► ResultsSink::store
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::game::lifecycle::MatchResults;

/// Storage failures. Logged by the results task, never propagated.
#[derive(Debug, Error)]
pub enum SinkError {
    /// File or stream failure
    #[error("results I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure
    #[error("results encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for finished rounds. `store` may do blocking I/O.
pub trait ResultsSink: Send {
    /// Persist one round.
    fn store(&mut self, results: &MatchResults) -> Result<(), SinkError>;
}

/// Writes a one-line summary to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl ResultsSink for LogSink {
    fn store(&mut self, results: &MatchResults) -> Result<(), SinkError> {
        let top = results.players.first().map(|p| p.name.as_str()).unwrap_or("-");
        info!(
            match_number = results.match_number,
            winner = ?results.winner,
            red = results.team_scores[0],
            blue = results.team_scores[1],
            reason = ?results.reason,
            duration_ms = results.duration_ms,
            top,
            "Match results"
        );
        Ok(())
    }
}

/// Appends each round as one JSON line.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// Open (or create) `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// File being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultsSink for JsonLinesSink {
    fn store(&mut self, results: &MatchResults) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, results)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Spawn the task that drains results into `sink`.
///
/// The task ends when every sender is dropped and returns how many rounds
/// were stored.
pub fn spawn_results_task(
    mut sink: Box<dyn ResultsSink>,
    capacity: usize,
) -> (mpsc::Sender<MatchResults>, JoinHandle<usize>) {
    let (tx, mut rx) = mpsc::channel::<MatchResults>(capacity.max(1));

    let handle = tokio::spawn(async move {
        let mut stored = 0;
        while let Some(results) = rx.recv().await {
            let match_number = results.match_number;
            let joined = tokio::task::spawn_blocking(move || {
                let outcome = sink.store(&results);
                (sink, outcome)
            })
            .await;

            let (returned, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    error!(match_number, error = %e, "Results sink panicked, no further results stored");
                    break;
                }
            };
            sink = returned;
            match outcome {
                Ok(()) => stored += 1,
                Err(e) => warn!(match_number, error = %e, "Results not stored"),
            }
        }
        stored
    });

    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::lifecycle::{MatchEndReason, PlayerResult};
    use crate::world::components::Team;
    use crate::world::entity::PlayerId;

    fn results(match_number: u32) -> MatchResults {
        MatchResults {
            match_number,
            winner: Some(Team::Red),
            team_scores: [3, 1],
            players: vec![PlayerResult {
                player_id: PlayerId::new([1; 16]),
                name: "ace".into(),
                team: Team::Red,
                kills: 3,
                deaths: 0,
                assists: 1,
                score: 350,
            }],
            duration_ms: 60_000,
            reason: MatchEndReason::TimeLimit,
            ended_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_json_lines_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");

        let mut sink = JsonLinesSink::open(&path).unwrap();
        sink.store(&results(0)).unwrap();
        sink.store(&results(1)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: MatchResults = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.match_number, 1);
        assert_eq!(parsed.players[0].score, 350);
    }

    #[test]
    fn test_log_sink_accepts_everything() {
        assert!(LogSink.store(&results(4)).is_ok());
    }

    #[tokio::test]
    async fn test_results_task_drains_until_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let sink = JsonLinesSink::open(&path).unwrap();

        let (tx, handle) = spawn_results_task(Box::new(sink), 4);
        tx.send(results(0)).await.unwrap();
        tx.send(results(1)).await.unwrap();
        drop(tx);

        assert_eq!(handle.await.unwrap(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    struct SlowSink(std::time::Duration);

    impl ResultsSink for SlowSink {
        fn store(&mut self, _results: &MatchResults) -> Result<(), SinkError> {
            std::thread::sleep(self.0);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_blocking_sink_leaves_runtime_free() {
        let (tx, handle) = spawn_results_task(Box::new(SlowSink(std::time::Duration::from_millis(300))), 4);
        let started = std::time::Instant::now();
        tx.send(results(0)).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(started.elapsed() < std::time::Duration::from_millis(250));

        drop(tx);
        assert_eq!(handle.await.unwrap(), 1);
    }
}
