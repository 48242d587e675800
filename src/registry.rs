//! Ingestion request registry.
//!
//! One task owns the request map and applies commands in arrival order;
//! every other component talks to it through a cloneable [`Registry`]
//! handle and only ever sees snapshots.

use crate::types::{IngestionRequest, State};
use crate::{Error, Result};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

enum Command {
    Submit {
        filename: String,
        reply: oneshot::Sender<Result<IngestionRequest>>,
    },
    Transition {
        id: Uuid,
        state: State,
        message: String,
    },
    Get {
        id: Uuid,
        reply: oneshot::Sender<Option<IngestionRequest>>,
    },
    List {
        reply: oneshot::Sender<Vec<IngestionRequest>>,
    },
}

#[derive(Clone)]
pub struct Registry {
    name: &'static str,
    sender: mpsc::UnboundedSender<Command>,
}

impl Registry {
    /// Start the owning task. `name` only labels log lines.
    pub fn spawn(name: &'static str) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run(name, receiver));
        Self { name, sender }
    }

    /// Queue a new request for `filename` unless one is still in flight.
    pub async fn submit(&self, filename: &str) -> Result<IngestionRequest> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Submit {
            filename: filename.to_string(),
            reply,
        })?;
        self.receive(response).await?
    }

    /// Move a request to `state`. Requests already Done or Error stay put.
    pub fn transition(&self, id: Uuid, state: State, message: impl Into<String>) {
        let command = Command::Transition {
            id,
            state,
            message: message.into(),
        };
        if self.send(command).is_err() {
            warn!("{} registry is closed, dropping transition of {} to {:?}", self.name, id, state);
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<IngestionRequest>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Get { id, reply })?;
        self.receive(response).await
    }

    /// All requests, oldest first.
    pub async fn list(&self) -> Result<Vec<IngestionRequest>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::List { reply })?;
        self.receive(response).await
    }

    fn send(&self, command: Command) -> Result<()> {
        self.sender
            .send(command)
            .map_err(|_| Error::Internal(format!("{} registry is closed", self.name)))
    }

    async fn receive<T>(&self, response: oneshot::Receiver<T>) -> Result<T> {
        response
            .await
            .map_err(|_| Error::Internal(format!("{} registry dropped the reply", self.name)))
    }
}

async fn run(name: &'static str, mut receiver: mpsc::UnboundedReceiver<Command>) {
    let mut requests: HashMap<Uuid, IngestionRequest> = HashMap::new();

    while let Some(command) = receiver.recv().await {
        match command {
            Command::Submit { filename, reply } => {
                let in_flight = requests
                    .values()
                    .any(|r| r.filename == filename && !r.state.is_terminal());

                let result = if in_flight {
                    Err(Error::AlreadyRunning(filename))
                } else {
                    let request = IngestionRequest::queued(filename);
                    debug!("{} request {} queued for {}", name, request.id, request.filename);
                    requests.insert(request.id, request.clone());
                    Ok(request)
                };
                let _ = reply.send(result);
            }
            Command::Transition { id, state, message } => {
                let Some(request) = requests.get_mut(&id) else {
                    warn!("{} registry has no request {}", name, id);
                    continue;
                };
                if request.state.is_terminal() {
                    warn!(
                        "ignoring {:?} for {} request {}: already {:?}",
                        state, name, id, request.state
                    );
                    continue;
                }

                info!("{} request {} ({}): {:?} -> {:?}", name, id, request.filename, request.state, state);
                request.state = state;
                request.message = message;
                request.updated_at = Utc::now();
            }
            Command::Get { id, reply } => {
                let _ = reply.send(requests.get(&id).cloned());
            }
            Command::List { reply } => {
                let mut all: Vec<IngestionRequest> = requests.values().cloned().collect();
                all.sort_by_key(|r| r.created_at);
                let _ = reply.send(all);
            }
        }
    }

    debug!("{} registry stopped", name);
}
