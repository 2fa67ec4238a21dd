//! §4.4 Room Registry, §4.4a single-lane room state, and §4.5/§4.6 document
//! and awareness storage tying them together. A Room is the unit of CRDT
//! collaboration: one per `(sessionId, filePath)`, created lazily on first
//! access and destroyed after an idle period with no subscribers.

pub mod awareness;
pub mod document;
pub mod persistence;

use crate::errors::{HubError, HubResult};
use crate::file_store::FileStore;
use crate::transport::queue::OutboundQueue;
use awareness::{AwarenessRegistry, ClientId};
use document::CrdtDocument;
use persistence::PersistenceWorker;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::info;

pub type RoomKey = (String, String);

/// A connected real-time participant's outbound channel and identity.
pub struct Subscriber {
    pub user_id: String,
    pub queue: Arc<OutboundQueue>,
}

/// Everything a room's single execution lane guards together: the
/// document, awareness, and subscriber set move in lockstep so a client
/// can never observe one without the others (§4.4a).
pub struct RoomState {
    pub document: CrdtDocument,
    pub awareness: AwarenessRegistry,
    pub subscribers: HashMap<ClientId, Subscriber>,
    pub dirty: bool,
    pub last_persisted_hash: Option<String>,
    pub last_activity_at: Instant,
    next_client_id: ClientId,
}

impl RoomState {
    pub fn allocate_client_id(&mut self) -> ClientId {
        self.next_client_id += 1;
        self.next_client_id
    }
}

pub struct Room {
    pub session_id: String,
    pub file_path: String,
    state: Mutex<RoomState>,
    persistence: PersistenceWorker,
}

impl Room {
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, RoomState> {
        self.state.lock().await
    }

    pub fn notify_dirty(&self, uploader_user_id: String) {
        self.persistence.notify_dirty(uploader_user_id);
    }

    /// Sends an encoded frame to every subscriber but `exclude`, dropping
    /// subscribers whose outbound queue cannot make room even after
    /// evicting pending awareness frames (§4.7 backpressure policy).
    pub async fn broadcast(&self, frame: crate::transport::wire::Frame, exclude: Option<ClientId>) {
        let state = self.state.lock().await;
        for (id, subscriber) in state.subscribers.iter() {
            if Some(*id) == exclude {
                continue;
            }
            if subscriber.queue.push(frame.clone()).is_err() {
                subscriber.queue.close_with(4008, "backpressure limit exceeded");
            }
        }
    }
}

pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomKey, Arc<Room>>>,
    file_store: Arc<FileStore>,
    idle_ttl: Duration,
    persist_debounce: Duration,
    persist_max_wait: Duration,
}

impl RoomRegistry {
    pub fn new(
        file_store: Arc<FileStore>,
        idle_ttl: Duration,
        persist_debounce: Duration,
        persist_max_wait: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            rooms: RwLock::new(HashMap::new()),
            file_store,
            idle_ttl,
            persist_debounce,
            persist_max_wait,
        })
    }

    /// Returns the room for `(sessionId, filePath)`, creating and seeding it
    /// from the File Store on first access (§4.4 `Acquire`). Double-checked
    /// locking avoids seeding the same room twice under concurrent joins.
    pub async fn acquire(&self, session_id: &str, file_path: &str) -> HubResult<Arc<Room>> {
        let key = (session_id.to_string(), file_path.to_string());

        if let Some(room) = self.rooms.read().await.get(&key) {
            return Ok(room.clone());
        }

        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(&key) {
            return Ok(room.clone());
        }

        let content = match self.file_store.get_text(session_id, file_path).await {
            Ok(text) => text,
            Err(HubError::NotFound(_)) => String::new(),
            Err(e) => return Err(e),
        };
        let last_persisted_hash = if content.is_empty() {
            None
        } else {
            Some(hex::encode(Sha256::digest(content.as_bytes())))
        };

        let document = CrdtDocument::seeded(&content);
        let state = Mutex::new(RoomState {
            document,
            awareness: AwarenessRegistry::new(),
            subscribers: HashMap::new(),
            dirty: false,
            last_persisted_hash,
            last_activity_at: Instant::now(),
            next_client_id: 0,
        });

        let file_store = self.file_store.clone();
        let persist_debounce = self.persist_debounce;
        let persist_max_wait = self.persist_max_wait;
        let room = Arc::new_cyclic(|weak| Room {
            session_id: session_id.to_string(),
            file_path: file_path.to_string(),
            state,
            persistence: PersistenceWorker::spawn(weak.clone(), file_store, persist_debounce, persist_max_wait),
        });

        rooms.insert(key, room.clone());
        info!(session_id, file_path, "room created");
        Ok(room)
    }

    /// Removes and flushes a room synchronously, used for explicit file or
    /// session deletion and for idle eviction (§4.4 `Destroy`).
    pub async fn purge(&self, session_id: &str, file_path: &str) {
        let key = (session_id.to_string(), file_path.to_string());
        let room = self.rooms.write().await.remove(&key);
        if let Some(room) = room {
            let uploader = {
                let state = room.state.lock().await;
                state
                    .subscribers
                    .values()
                    .next()
                    .map(|s| s.user_id.clone())
                    .unwrap_or_else(|| "system".to_string())
            };
            if let Err(e) = persistence::flush_once(&room, &self.file_store, &uploader).await {
                tracing::error!(session_id, file_path, err = %e, "flush on room destroy failed");
            }
            let state = room.state.lock().await;
            for subscriber in state.subscribers.values() {
                subscriber.queue.close_with(4409, "room destroyed by admin action");
            }
            info!(session_id, file_path, "room destroyed");
        }
    }

    /// Evicts every room with no subscribers whose last activity is older
    /// than the configured idle TTL (§4.4 idle sweep).
    pub async fn sweep_idle(&self) {
        let now = Instant::now();
        let mut stale = Vec::new();
        {
            let rooms = self.rooms.read().await;
            for (key, room) in rooms.iter() {
                let state = room.state.lock().await;
                if state.subscribers.is_empty() && now.duration_since(state.last_activity_at) >= self.idle_ttl {
                    stale.push(key.clone());
                }
            }
        }
        for (session_id, file_path) in stale {
            self.purge(&session_id, &file_path).await;
        }
    }

    pub async fn active_room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
