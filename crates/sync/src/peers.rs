// sync/src/peers.rs

use crate::batch::PeerId;
use crate::peer_state::{ModeCounts, PeerState, SyncMode};
use chain_core::BlockNumber;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Registry of per-peer sync state
///
/// Each peer's state sits behind its own mutex; a worker processing that
/// peer's batch holds the lock for the whole cycle. Operations that touch
/// other peers only ever `try_lock`, so a peer mid-cycle is skipped rather
/// than waited on.
pub struct PeerTable {
    states: RwLock<HashMap<PeerId, Arc<Mutex<PeerState>>>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Add or replace a peer's state
    pub fn register(&self, peer: PeerId, state: PeerState) {
        self.states
            .write()
            .unwrap()
            .insert(peer, Arc::new(Mutex::new(state)));
    }

    pub fn remove(&self, peer: PeerId) {
        self.states.write().unwrap().remove(&peer);
    }

    /// Handle to one peer's state, if tracked
    pub fn get(&self, peer: PeerId) -> Option<Arc<Mutex<PeerState>>> {
        self.states.read().unwrap().get(&peer).cloned()
    }

    pub fn len(&self) -> usize {
        self.states.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().unwrap().is_empty()
    }

    /// Tally peer modes for the TORRENT diversion rule
    ///
    /// Peers whose lock is held by another worker are left out of the
    /// per-mode tallies but still counted as tracked. The figures are
    /// approximate by construction.
    pub fn mode_counts(&self) -> ModeCounts {
        let states = self.states.read().unwrap();
        let mut counts = ModeCounts {
            tracked: states.len(),
            ..ModeCounts::default()
        };
        for slot in states.values() {
            if let Ok(state) = slot.try_lock() {
                counts.tally(state.mode());
            }
        }
        counts
    }

    /// Demote every reachable non-NORMAL peer to NORMAL at the given base
    ///
    /// Used when one peer's FORWARD run lands a new canonical best: the
    /// other peers' searches are obsolete. The peer named by `skip` is the
    /// caller's own and is left alone. Returns how many peers were demoted.
    pub fn force_normal_except(&self, skip: PeerId, base: BlockNumber) -> usize {
        let states = self.states.read().unwrap();
        let mut forced = 0;
        for (peer, slot) in states.iter() {
            if *peer == skip {
                continue;
            }
            if let Ok(mut state) = slot.try_lock() {
                if state.mode() != SyncMode::Normal {
                    state.transition(SyncMode::Normal, base);
                    state.reset_header_request();
                    forced += 1;
                }
            }
        }
        forced
    }

    /// Clone the state of every peer not currently locked
    pub fn snapshot(&self) -> Vec<(PeerId, PeerState)> {
        let states = self.states.read().unwrap();
        let mut out = Vec::with_capacity(states.len());
        for (peer, slot) in states.iter() {
            if let Ok(state) = slot.try_lock() {
                out.push((*peer, state.clone()));
            }
        }
        out
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(modes: &[(u64, SyncMode)]) -> PeerTable {
        let table = PeerTable::new();
        for (id, mode) in modes {
            table.register(PeerId(*id), PeerState::new(*mode, 100, 3));
        }
        table
    }

    #[test]
    fn test_register_and_get() {
        let table = PeerTable::new();
        assert!(table.is_empty());
        table.register(PeerId(1), PeerState::new(SyncMode::Normal, 10, 3));
        assert_eq!(table.len(), 1);
        assert!(table.get(PeerId(1)).is_some());
        assert!(table.get(PeerId(2)).is_none());
        table.remove(PeerId(1));
        assert!(table.get(PeerId(1)).is_none());
    }

    #[test]
    fn test_mode_counts() {
        let table = table_with(&[
            (1, SyncMode::Normal),
            (2, SyncMode::Normal),
            (3, SyncMode::Torrent),
            (4, SyncMode::Backward),
        ]);
        let counts = table.mode_counts();
        assert_eq!(counts.tracked, 4);
        assert_eq!(counts.normal, 2);
        assert_eq!(counts.torrent, 1);
    }

    #[test]
    fn test_mode_counts_skips_locked_peer() {
        let table = table_with(&[(1, SyncMode::Normal), (2, SyncMode::Normal)]);
        let slot = table.get(PeerId(1)).unwrap();
        let _held = slot.lock().unwrap();

        let counts = table.mode_counts();
        assert_eq!(counts.tracked, 2);
        assert_eq!(counts.normal, 1);
    }

    #[test]
    fn test_force_normal_except() {
        let table = table_with(&[
            (1, SyncMode::Forward),
            (2, SyncMode::Backward),
            (3, SyncMode::Normal),
        ]);
        let forced = table.force_normal_except(PeerId(1), 500);
        assert_eq!(forced, 1);

        let own = table.get(PeerId(1)).unwrap();
        assert_eq!(own.lock().unwrap().mode(), SyncMode::Forward);

        let other = table.get(PeerId(2)).unwrap();
        let other = other.lock().unwrap();
        assert_eq!(other.mode(), SyncMode::Normal);
        assert_eq!(other.base(), 500);
    }

    #[test]
    fn test_force_normal_skips_locked_peer() {
        let table = table_with(&[(1, SyncMode::Normal), (2, SyncMode::Backward)]);
        let slot = table.get(PeerId(2)).unwrap();
        let held = slot.lock().unwrap();

        assert_eq!(table.force_normal_except(PeerId(1), 500), 0);
        assert_eq!(held.mode(), SyncMode::Backward);
    }

    #[test]
    fn test_snapshot_clones_state() {
        let table = table_with(&[(1, SyncMode::Torrent)]);
        let snap = table.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].0, PeerId(1));
        assert_eq!(snap[0].1.mode(), SyncMode::Torrent);
    }
}
