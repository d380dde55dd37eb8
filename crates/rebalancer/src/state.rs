//! Durable agent state: one pretty-printed JSON document holding the
//! position plus bounded audit logs. All mutations funnel through a single
//! writer task, so readers always observe a fully committed document, and
//! every write replaces the file atomically (temp file + rename in the
//! target directory).

use {
    crate::{
        announce::TweetRecord,
        domain::{Decision, PoolSnapshot, Position},
    },
    serde::{Deserialize, Serialize},
    std::{
        io::Write,
        path::{Path, PathBuf},
    },
    tokio::sync::{mpsc, oneshot},
};

const MAX_SNAPSHOTS: usize = 5_000;
const MAX_DECISIONS: usize = 2_000;
const MAX_TWEETS: usize = 2_000;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("state io: {0}")]
    Io(#[from] std::io::Error),
    #[error("state encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error("state store writer is gone")]
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub snapshots: Vec<PoolSnapshot>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub tweets: Vec<TweetRecord>,
}

enum Command {
    Read(oneshot::Sender<StateDocument>),
    AppendSnapshots(Vec<PoolSnapshot>, oneshot::Sender<Result<(), Error>>),
    AppendDecision(Decision, oneshot::Sender<Result<(), Error>>),
    AppendTweet(TweetRecord, oneshot::Sender<Result<(), Error>>),
    SetPosition(Position, oneshot::Sender<Result<(), Error>>),
}

/// Cloneable handle to the writer task.
#[derive(Clone)]
pub struct StateStore {
    commands: mpsc::Sender<Command>,
}

impl StateStore {
    /// Loads the document (initializing an empty one if the file is absent)
    /// and spawns the writer task.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let document = StateDocument::default();
                write_document(&path, &document).await?;
                document
            }
            Err(err) => return Err(err.into()),
        };

        let (commands, receiver) = mpsc::channel(64);
        tokio::spawn(writer(path, document, receiver));
        Ok(Self { commands })
    }

    pub async fn read(&self) -> Result<StateDocument, Error> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Read(reply))
            .await
            .map_err(|_| Error::Closed)?;
        response.await.map_err(|_| Error::Closed)
    }

    pub async fn append_snapshots(&self, snapshots: Vec<PoolSnapshot>) -> Result<(), Error> {
        self.mutate(|reply| Command::AppendSnapshots(snapshots, reply))
            .await
    }

    pub async fn append_decision(&self, decision: Decision) -> Result<(), Error> {
        self.mutate(|reply| Command::AppendDecision(decision, reply))
            .await
    }

    pub async fn append_tweet(&self, tweet: TweetRecord) -> Result<(), Error> {
        self.mutate(|reply| Command::AppendTweet(tweet, reply)).await
    }

    pub async fn set_position(&self, position: Position) -> Result<(), Error> {
        self.mutate(|reply| Command::SetPosition(position, reply))
            .await
    }

    async fn mutate(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<(), Error>>) -> Command,
    ) -> Result<(), Error> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::Closed)?;
        response.await.map_err(|_| Error::Closed)?
    }
}

/// The single writer. Commands are applied strictly in arrival order.
async fn writer(path: PathBuf, mut document: StateDocument, mut commands: mpsc::Receiver<Command>) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Read(reply) => {
                let _ = reply.send(document.clone());
            }
            Command::AppendSnapshots(snapshots, reply) => {
                document.snapshots.extend(snapshots);
                cap_tail(&mut document.snapshots, MAX_SNAPSHOTS);
                let _ = reply.send(write_document(&path, &document).await);
            }
            Command::AppendDecision(decision, reply) => {
                document.decisions.push(decision);
                cap_tail(&mut document.decisions, MAX_DECISIONS);
                let _ = reply.send(write_document(&path, &document).await);
            }
            Command::AppendTweet(tweet, reply) => {
                document.tweets.push(tweet);
                cap_tail(&mut document.tweets, MAX_TWEETS);
                let _ = reply.send(write_document(&path, &document).await);
            }
            Command::SetPosition(position, reply) => {
                document.position = position;
                let _ = reply.send(write_document(&path, &document).await);
            }
        }
    }
}

/// Keeps the latest `cap` entries.
fn cap_tail<T>(entries: &mut Vec<T>, cap: usize) {
    if entries.len() > cap {
        entries.drain(..entries.len() - cap);
    }
}

/// Atomic replace: serialize to a unique temp file in the target directory,
/// then rename over the target. A failed rename leaves the previous
/// document untouched and the temp file is cleaned up on drop.
async fn write_document(path: &Path, document: &StateDocument) -> Result<(), Error> {
    let bytes = serde_json::to_vec_pretty(document)?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), Error> {
        let directory = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(directory)?;
        temp.write_all(&bytes)?;
        temp.flush()?;
        temp.persist(&path).map_err(|err| err.error)?;
        Ok(())
    })
    .await
    .map_err(|err| Error::Io(std::io::Error::other(err)))?
}
