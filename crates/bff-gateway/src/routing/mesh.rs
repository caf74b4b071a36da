//! Per-room connectivity reports.

use crate::domain::address::PeerAddress;
use crate::routing::algorithm::Mesh;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Latest connectivity report of every peer, grouped by room.
///
/// A report replaces the peer's previous entry in that room; reports are
/// never merged.
#[derive(Debug, Default)]
pub struct MeshStore {
    rooms: RwLock<HashMap<String, Mesh<PeerAddress>>>,
}

impl MeshStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite `peer`'s adjacency entry in `room`.
    pub fn update(&self, room: &str, peer: PeerAddress, connected_to: BTreeSet<PeerAddress>) {
        self.rooms
            .write()
            .entry(room.to_string())
            .or_default()
            .insert(peer, connected_to);
    }

    /// Drop `peer` from every room: its own report and every edge other
    /// peers reported towards it. Returns the rooms touched.
    pub fn forget_peer(&self, peer: &PeerAddress) -> usize {
        let mut rooms = self.rooms.write();
        let mut touched = 0;
        rooms.retain(|_, mesh| {
            let mut changed = mesh.remove(peer).is_some();
            for neighbours in mesh.values_mut() {
                changed |= neighbours.remove(peer);
            }
            if changed {
                touched += 1;
            }
            !mesh.is_empty()
        });
        touched
    }

    /// Neighbours `peer` last reported in `room`.
    #[must_use]
    pub fn neighbours(&self, room: &str, peer: &PeerAddress) -> Option<BTreeSet<PeerAddress>> {
        self.rooms.read().get(room)?.get(peer).cloned()
    }

    /// Number of rooms with at least one report.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Copy of every room's mesh, ordered by room name.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Mesh<PeerAddress>> {
        self.rooms
            .read()
            .iter()
            .map(|(room, mesh)| (room.clone(), mesh.clone()))
            .collect()
    }
}
