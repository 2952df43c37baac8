// sync/src/engine.rs

use crate::backend::ChainBackend;
use crate::batch::{BlockBatch, PeerId};
use crate::config::SyncConfig;
use crate::dedup::ImportedCache;
use crate::peer_state::{PeerState, SyncMode};
use crate::peers::PeerTable;
use crate::stats::SyncStats;
use crate::worker::ImportWorker;
use crate::{SyncError, SyncResult};
use chain_core::BlockNumber;
use futures::future::join_all;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::info;

/// Block synchronization engine
///
/// Owns the shared batch queue, the peer table, the dedup cache and the
/// import workers. The network layer pushes batches through
/// [`SyncEngine::batch_sender`] and reads peer request eligibility back;
/// everything between those two points happens inside the workers.
pub struct SyncEngine {
    config: SyncConfig,
    chain: Arc<dyn ChainBackend>,
    peers: Arc<PeerTable>,
    imported: ImportedCache,
    stats: Arc<SyncStats>,
    run: Arc<AtomicBool>,
    sender: mpsc::Sender<BlockBatch>,
    queue: Arc<AsyncMutex<mpsc::Receiver<BlockBatch>>>,
    workers: Vec<JoinHandle<SyncResult<()>>>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig, chain: Arc<dyn ChainBackend>) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            imported: ImportedCache::new(config.dedup_capacity),
            config,
            chain,
            peers: Arc::new(PeerTable::new()),
            stats: Arc::new(SyncStats::new()),
            run: Arc::new(AtomicBool::new(false)),
            sender,
            queue: Arc::new(AsyncMutex::new(receiver)),
            workers: Vec::new(),
        }
    }

    /// Handle for the network layer to queue incoming batches
    pub fn batch_sender(&self) -> mpsc::Sender<BlockBatch> {
        self.sender.clone()
    }

    pub fn peers(&self) -> Arc<PeerTable> {
        Arc::clone(&self.peers)
    }

    pub fn stats(&self) -> Arc<SyncStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::SeqCst)
    }

    /// Start tracking a peer, beginning in NORMAL mode at the given base
    pub fn register_peer(&self, peer: PeerId, base: BlockNumber, can_torrent: bool) {
        let mut state = PeerState::new(SyncMode::Normal, base, self.config.max_repeats);
        state.set_can_torrent(can_torrent);
        self.peers.register(peer, state);
    }

    pub fn remove_peer(&self, peer: PeerId) {
        self.peers.remove(peer);
    }

    /// Peers whose request cooldown has elapsed
    pub fn ready_peers(&self) -> Vec<PeerId> {
        let cooldown = self.config.request_cooldown();
        self.peers
            .snapshot()
            .into_iter()
            .filter(|(_, state)| state.ready_for_request(cooldown))
            .map(|(peer, _)| peer)
            .collect()
    }

    /// Stamp a peer's cooldown after the fetch layer sends it a request
    pub fn note_requested(&self, peer: PeerId) {
        if let Some(slot) = self.peers.get(peer) {
            slot.lock().unwrap().note_header_request();
        }
    }

    /// Spawn the import workers; repeated calls are no-ops
    pub fn start(&mut self) {
        if self.run.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stats.begin(self.chain.best_height());

        let workers = self.config.workers.max(1);
        for id in 0..workers {
            let worker = ImportWorker::new(
                id,
                Arc::clone(&self.chain),
                Arc::clone(&self.run),
                Arc::clone(&self.queue),
                self.imported.clone(),
                Arc::clone(&self.peers),
                Arc::clone(&self.stats),
            );
            self.workers.push(tokio::spawn(worker.run()));
        }
        info!("sync engine started with {} import workers", workers);
    }

    /// Stop the workers and surface the first worker error, if any
    pub async fn shutdown(&mut self) -> SyncResult<()> {
        self.run.store(false, Ordering::SeqCst);

        let handles = mem::take(&mut self.workers);
        let mut outcome = Ok(());
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if outcome.is_ok() {
                        outcome = Err(e);
                    }
                }
                Err(e) => {
                    if outcome.is_ok() {
                        outcome = Err(SyncError::WorkerError(e.to_string()));
                    }
                }
            }
        }
        info!("sync engine stopped");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::Block;
    use std::collections::HashMap;

    struct IdleChain;

    impl ChainBackend for IdleChain {
        fn try_connect(&self, _block: &Block) -> crate::backend::ChainResult<chain_core::ImportResult> {
            Ok(chain_core::ImportResult::Exist)
        }

        fn best_height(&self) -> BlockNumber {
            42
        }

        fn pruning_enabled(&self) -> bool {
            false
        }

        fn is_prune_restricted(&self, _number: BlockNumber) -> bool {
            false
        }

        fn next_torrent_base(&self, best: BlockNumber) -> BlockNumber {
            best
        }

        fn store_pending_range(&self, _blocks: &[Block]) -> crate::backend::ChainResult<usize> {
            Ok(0)
        }

        fn load_pending_at_level(
            &self,
            _level: BlockNumber,
        ) -> crate::backend::ChainResult<HashMap<crate::backend::BranchKey, Vec<Block>>> {
            Ok(HashMap::new())
        }

        fn drop_consumed(
            &self,
            _level: BlockNumber,
            _consumed: &[crate::backend::BranchKey],
            _loaded: &HashMap<crate::backend::BranchKey, Vec<Block>>,
        ) {
        }
    }

    #[test]
    fn test_new_engine_is_idle() {
        let engine = SyncEngine::new(SyncConfig::default(), Arc::new(IdleChain));
        assert!(!engine.is_running());
        assert!(engine.peers().is_empty());
        assert_eq!(engine.stats().cycles(), 0);
    }

    #[test]
    fn test_register_peer_starts_normal() {
        let engine = SyncEngine::new(SyncConfig::default(), Arc::new(IdleChain));
        engine.register_peer(PeerId(7), 42, true);

        let slot = engine.peers().get(PeerId(7)).unwrap();
        let state = slot.lock().unwrap();
        assert_eq!(state.mode(), SyncMode::Normal);
        assert_eq!(state.base(), 42);
        assert!(state.can_torrent());
        assert!(!state.can_backward());
        drop(state);

        engine.remove_peer(PeerId(7));
        assert!(engine.peers().is_empty());
    }

    #[test]
    fn test_ready_peers_respects_cooldown() {
        let engine = SyncEngine::new(SyncConfig::default(), Arc::new(IdleChain));
        engine.register_peer(PeerId(1), 42, false);
        engine.register_peer(PeerId(2), 42, false);

        assert_eq!(engine.ready_peers().len(), 2);

        engine.note_requested(PeerId(1));
        let ready = engine.ready_peers();
        assert_eq!(ready, vec![PeerId(2)]);
    }
}
