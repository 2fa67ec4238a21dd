//! §4.6 Awareness Registry — ephemeral presence/cursor state per room.
//! Never persisted (§3.6); encoded as small JSON documents on the wire
//! rather than the Yjs awareness binary protocol, since awareness has no
//! cross-client-library interop requirement (§4.6a).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ephemeral integer, unique within a room for the lifetime of a
/// subscription (§3.6).
pub type ClientId = u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwarenessUser {
    pub user_id: String,
    pub display_name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorPoint {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorState {
    pub anchor: CursorPoint,
    pub head: CursorPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwarenessState {
    pub user: AwarenessUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorState>,
    pub last_update: DateTime<Utc>,
}

/// `clientId -> AwarenessState` for one room. A `None` value in a decoded
/// update payload means "this clientId was removed" — distinct from the
/// key being absent, which means "unchanged" (§4.6 `Remove`).
#[derive(Default)]
pub struct AwarenessRegistry {
    states: HashMap<ClientId, AwarenessState>,
}

impl AwarenessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, client_id: ClientId, state: AwarenessState) {
        self.states.insert(client_id, state);
    }

    pub fn remove(&mut self, client_id: ClientId) -> Option<AwarenessState> {
        self.states.remove(&client_id)
    }

    pub fn get(&self, client_id: ClientId) -> Option<&AwarenessState> {
        self.states.get(&client_id)
    }

    pub fn all(&self) -> &HashMap<ClientId, AwarenessState> {
        &self.states
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// `AwarenessSnapshot` payload: every currently-known client (§6.5).
    pub fn encode_snapshot(&self) -> Vec<u8> {
        let by_key: HashMap<String, &AwarenessState> = self
            .states
            .iter()
            .map(|(id, state)| (id.to_string(), state))
            .collect();
        serde_json::to_vec(&by_key).unwrap_or_default()
    }

    /// `AwarenessUpdate` payload: only the listed clientIds, so unrelated
    /// subscribers never see a full rebroadcast (§4.6 "single incremental
    /// awareness update").
    pub fn encode_update(&self, changed: &[ClientId]) -> Vec<u8> {
        let by_key: HashMap<String, Option<&AwarenessState>> = changed
            .iter()
            .map(|id| (id.to_string(), self.states.get(id)))
            .collect();
        serde_json::to_vec(&by_key).unwrap_or_default()
    }

    /// Decodes a client-sent `AwarenessUpdate` payload into
    /// `clientId -> Some(state)` (set) or `clientId -> None` (remove).
    pub fn decode_update(bytes: &[u8]) -> anyhow::Result<HashMap<ClientId, Option<AwarenessState>>> {
        let raw: HashMap<String, Option<AwarenessState>> = serde_json::from_slice(bytes)?;
        raw.into_iter()
            .map(|(k, v)| Ok((k.parse::<ClientId>()?, v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(user_id: &str) -> AwarenessState {
        AwarenessState {
            user: AwarenessUser {
                user_id: user_id.into(),
                display_name: user_id.into(),
                color: "#fff".into(),
            },
            cursor: None,
            last_update: Utc::now(),
        }
    }

    #[test]
    fn set_then_remove_round_trips() {
        let mut reg = AwarenessRegistry::new();
        reg.set(1, state("alice"));
        assert!(reg.get(1).is_some());
        let removed = reg.remove(1);
        assert!(removed.is_some());
        assert!(reg.get(1).is_none());
    }

    #[test]
    fn update_payload_contains_only_changed_clients() {
        let mut reg = AwarenessRegistry::new();
        reg.set(1, state("alice"));
        reg.set(2, state("bob"));

        let bytes = reg.encode_update(&[1]);
        let decoded: HashMap<ClientId, Option<AwarenessState>> =
            serde_json::from_slice::<HashMap<String, Option<AwarenessState>>>(&bytes)
                .unwrap()
                .into_iter()
                .map(|(k, v)| (k.parse().unwrap(), v))
                .collect();
        assert_eq!(decoded.len(), 1);
        assert!(decoded.get(&1).unwrap().is_some());
    }

    #[test]
    fn removed_client_encodes_as_null() {
        let mut reg = AwarenessRegistry::new();
        reg.set(1, state("alice"));
        reg.remove(1);
        let decoded = AwarenessRegistry::decode_update(&reg.encode_update(&[1])).unwrap();
        assert_eq!(decoded.get(&1), Some(&None));
    }

    #[test]
    fn snapshot_includes_every_client() {
        let mut reg = AwarenessRegistry::new();
        reg.set(1, state("alice"));
        reg.set(2, state("bob"));
        let decoded: HashMap<String, AwarenessState> =
            serde_json::from_slice(&reg.encode_snapshot()).unwrap();
        assert_eq!(decoded.len(), 2);
    }
}
