//! §4.8 Persistence Worker — debounced, retried CRDT-to-FileStore flushing.
//! One worker runs per room so a slow or failing file never delays another
//! room's writes (§5 fairness).

use super::Room;
use crate::file_store::FileStore;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, warn};

/// Backoff schedule for a failed flush attempt (§4.8).
const RETRY_BACKOFF: [Duration; 4] = [
    Duration::from_millis(100),
    Duration::from_millis(500),
    Duration::from_secs(2),
    Duration::from_secs(10),
];

/// Raised whenever a room's document changes; carries the user whose edit
/// triggered it, so the eventual flush attributes `uploadedBy` correctly.
pub struct DirtySignal {
    pub uploader_user_id: String,
}

pub struct PersistenceWorker {
    tx: mpsc::Sender<DirtySignal>,
}

impl PersistenceWorker {
    /// Spawns the worker against a `Weak` handle to its room: the room
    /// itself owns the worker, so a strong handle here would keep the room
    /// alive forever. Once the registry drops the room, the next debounce
    /// round's upgrade fails and the task exits.
    pub fn spawn(room: Weak<Room>, file_store: Arc<FileStore>, debounce: Duration, max_wait: Duration) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(run(room, file_store, rx, debounce, max_wait));
        Self { tx }
    }

    /// Signals a change; never blocks the caller (dropped on a saturated
    /// channel, since the next signal will re-trigger the same flush).
    pub fn notify_dirty(&self, uploader_user_id: String) {
        let _ = self.tx.try_send(DirtySignal { uploader_user_id });
    }
}

async fn run(
    room: Weak<Room>,
    file_store: Arc<FileStore>,
    mut rx: mpsc::Receiver<DirtySignal>,
    debounce: Duration,
    max_wait: Duration,
) {
    while let Some(first) = rx.recv().await {
        let uploader = debounce_round(&mut rx, first, debounce, max_wait).await;
        let Some(room) = room.upgrade() else { break };
        flush_with_retry(&room, &file_store, &uploader).await;
    }
}

/// Waits until `debounce` has elapsed with no further signal, or until
/// `max_wait` has elapsed since the first signal of this round — whichever
/// comes first. Returns the most recently seen uploader.
async fn debounce_round(
    rx: &mut mpsc::Receiver<DirtySignal>,
    first: DirtySignal,
    debounce: Duration,
    max_wait: Duration,
) -> String {
    let started = Instant::now();
    let mut uploader = first.uploader_user_id;
    loop {
        let elapsed = started.elapsed();
        if elapsed >= max_wait {
            return uploader;
        }
        let wait = debounce.min(max_wait - elapsed);
        tokio::select! {
            _ = tokio::time::sleep(wait) => return uploader,
            next = rx.recv() => {
                match next {
                    Some(signal) => uploader = signal.uploader_user_id,
                    None => return uploader,
                }
            }
        }
    }
}

async fn flush_with_retry(room: &Arc<Room>, file_store: &Arc<FileStore>, uploader_user_id: &str) {
    for (attempt, delay) in std::iter::once(None)
        .chain(RETRY_BACKOFF.iter().copied().map(Some))
        .enumerate()
    {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match flush_once(room, file_store, uploader_user_id).await {
            Ok(()) => return,
            Err(e) if attempt == RETRY_BACKOFF.len() => {
                error!(session_id = %room.session_id, file_path = %room.file_path, err = %e, "persistence flush exhausted retries");
                return;
            }
            Err(e) => {
                warn!(session_id = %room.session_id, file_path = %room.file_path, attempt, err = %e, "persistence flush failed, retrying");
            }
        }
    }
}

/// Flushes the room's current content to the file store if it differs from
/// the last persisted content (§4.8). Used both by the debounced worker and
/// the synchronous flush a room destroy requires.
pub async fn flush_once(room: &Room, file_store: &Arc<FileStore>, uploader_user_id: &str) -> anyhow::Result<()> {
    let (text, hash, should_skip) = {
        let state = room.state.lock().await;
        let text = state.document.to_text();
        let hash = hex::encode(Sha256::digest(text.as_bytes()));
        let unchanged = state.last_persisted_hash.as_deref() == Some(hash.as_str());
        (text, hash, unchanged)
    };
    if should_skip {
        return Ok(());
    }

    let mime_type = crate::file_store::mime_type_for(&room.file_path);
    file_store
        .put_file(&room.session_id, &room.file_path, text.into_bytes(), mime_type, uploader_user_id)
        .await?;

    // Only recorded once the write actually lands — a failed `put_file`
    // above returns before this, so a retry sees the old hash and tries
    // again instead of believing a failed flush already persisted (§4.8).
    let mut state = room.state.lock().await;
    state.last_persisted_hash = Some(hash);
    state.dirty = false;
    Ok(())
}
