use std::collections::HashMap;
use std::sync::Arc;

use alfred::agent::Agent;
use alfred::session::Session;
use alfred::telemetry::TraceContext;
use tokio::sync::{Mutex, RwLock};

/// A conversation and the trace of its last finished turn
#[derive(Debug)]
pub struct SessionEntry {
    pub session: Session,
    pub last_trace: Option<TraceContext>,
}

/// Sessions by id. Each one has its own lock so turns within a session run one at a time.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<Mutex<SessionEntry>>>>>,
}

impl SessionStore {
    pub async fn create(&self) -> String {
        let session = Session::new();
        let id = session.id.clone();
        self.sessions.write().await.insert(
            id.clone(),
            Arc::new(Mutex::new(SessionEntry {
                session,
                last_trace: None,
            })),
        );
        id
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<SessionEntry>>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent: Arc::new(agent),
            sessions: SessionStore::default(),
        }
    }
}
