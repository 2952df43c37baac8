// sync/src/worker.rs

use crate::backend::{BranchKey, ChainBackend, ChainError, ChainResult};
use crate::batch::BlockBatch;
use crate::dedup::ImportedCache;
use crate::peer_state::{should_divert_to_torrent, PeerState, SyncMode};
use crate::peers::PeerTable;
use crate::stats::SyncStats;
use crate::{SyncError, SyncResult};
use chain_core::{Block, BlockNumber, ImportResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

/// How long a worker waits on the queue before rechecking the run flag
const QUEUE_POLL: Duration = Duration::from_millis(200);

/// Origin label used in import logs for blocks replayed from the pending store
const REPLAY_ORIGIN: &str = "storage";

/// Worker that drains (peer, batch) items and drives blocks into the chain
///
/// Each cycle takes one batch, filters out known and prune-restricted
/// blocks, imports the rest in order, parks any unimportable suffix, and
/// re-evaluates the sending peer's fetch mode. The peer's state lock is
/// held for the whole cycle, so two workers never process the same peer
/// concurrently.
pub struct ImportWorker {
    id: usize,
    chain: Arc<dyn ChainBackend>,
    run: Arc<AtomicBool>,
    queue: Arc<AsyncMutex<mpsc::Receiver<BlockBatch>>>,
    imported: ImportedCache,
    peers: Arc<PeerTable>,
    stats: Arc<SyncStats>,
}

impl ImportWorker {
    pub fn new(
        id: usize,
        chain: Arc<dyn ChainBackend>,
        run: Arc<AtomicBool>,
        queue: Arc<AsyncMutex<mpsc::Receiver<BlockBatch>>>,
        imported: ImportedCache,
        peers: Arc<PeerTable>,
        stats: Arc<SyncStats>,
    ) -> Self {
        Self {
            id,
            chain,
            run,
            queue,
            imported,
            peers,
            stats,
        }
    }

    /// Drain the shared queue until shutdown or a fatal import error
    pub async fn run(self) -> SyncResult<()> {
        while self.run.load(Ordering::Relaxed) {
            let next = {
                let mut queue = self.queue.lock().await;
                match tokio::time::timeout(QUEUE_POLL, queue.recv()).await {
                    Ok(item) => item,
                    Err(_) => continue,
                }
            };
            let Some(batch) = next else {
                break;
            };
            if let Err(e) = self.process(batch) {
                error!("import worker {} stopping: {}", self.id, e);
                return Err(e);
            }
        }
        info!("import worker {} stopped", self.id);
        Ok(())
    }

    /// Run one full import cycle for a single batch
    ///
    /// Returns an error only when the chain reports exhausted disk space;
    /// everything else is handled within the cycle.
    pub fn process(&self, batch: BlockBatch) -> SyncResult<()> {
        let BlockBatch {
            peer,
            display_id,
            blocks,
        } = batch;

        let blocks: Vec<Block> = if self.chain.pruning_enabled() {
            blocks
                .into_iter()
                .filter(|b| self.not_imported(b))
                .filter(|b| !self.chain.is_prune_restricted(b.number()))
                .collect()
        } else {
            blocks
                .into_iter()
                .filter(|b| self.not_imported(b))
                .collect()
        };

        let Some(slot) = self.peers.get(peer) else {
            warn!("peer {} sent blocks that were not requested", display_id);
            return Ok(());
        };
        let mut state = slot.lock().unwrap();

        let mut counts = self.peers.mode_counts();
        counts.tally(state.mode());

        if should_divert_to_torrent(&state, blocks.is_empty(), &counts) {
            debug!(
                "<import-mode-before: node = {}, sync mode = {}, base = {}>",
                display_id,
                state.mode(),
                state.base()
            );
            let best = self.chain.best_height();
            state.transition(SyncMode::Torrent, self.chain.next_torrent_base(best));
            state.reset_header_request();
            debug!(
                "<import-mode-after: node = {}, sync mode = {}, base = {}>",
                display_id,
                state.mode(),
                state.base()
            );
            return Ok(());
        }

        // a FORWARD batch either extends the tested branch or exposes its
        // end; importing only the last block decides which without walking
        // the whole batch
        if state.mode() == SyncMode::Forward {
            if let Some(tail) = blocks.last() {
                match self.import_block(tail, &display_id, state.mode()) {
                    Err(e) => {
                        self.check_fatal(&e)?;
                        return Ok(());
                    }
                    Ok(result) if result.is_stored() => {
                        self.imported.insert(tail.hash());
                        let best = self.chain.best_height();
                        if state.forward_progress(tail.number(), result, best) {
                            self.peers.force_normal_except(peer, tail.number());
                        }
                        debug!(
                            "<import-FORWARD-skip: node = {}, block count = {}, last = {}>",
                            display_id,
                            blocks.len(),
                            tail.number()
                        );
                        return Ok(());
                    }
                    // NO_PARENT: the tested branch ends somewhere inside the
                    // batch, walk it block by block below
                    Ok(_) => {}
                }
            }
        }

        // a batch entirely below the best height is stale; reroute the peer
        // instead of importing blocks the chain already has
        if matches!(state.mode(), SyncMode::Torrent | SyncMode::Normal) {
            if let Some(tail) = blocks.last() {
                let best = self.chain.best_height();
                if tail.number() < best {
                    if state.can_torrent() {
                        state.transition(SyncMode::Torrent, self.chain.next_torrent_base(best));
                    } else {
                        state.transition(SyncMode::Normal, best);
                    }
                    state.reset_header_request();
                    debug!(
                        "<import-stale: node = {}, sync mode = {}, base = {}>",
                        display_id,
                        state.mode(),
                        state.base()
                    );
                    return Ok(());
                }
            }
        }

        let mut import_result = ImportResult::ImportedNotBest;
        let mut first: Option<BlockNumber> = None;
        let mut last: Option<BlockNumber> = None;

        for (i, block) in blocks.iter().enumerate() {
            if i == 0 {
                first = Some(block.number());
            }

            let result = match self.import_block(block, &display_id, state.mode()) {
                Ok(result) => result,
                Err(e) => {
                    self.check_fatal(&e)?;
                    continue;
                }
            };
            import_result = result;

            if result.is_stored() {
                self.imported.insert(block.hash());
                if last.map_or(true, |l| l <= block.number()) {
                    last = Some(block.number() + 1);
                }
            }

            // the first block's outcome decides the peer's next mode
            if i == 0 {
                match result {
                    ImportResult::NoParent => {
                        state.on_batch_orphaned(block.number(), self.chain.best_height());
                    }
                    _ => {
                        let last_number = blocks.last().map_or(block.number(), |b| b.number());
                        let best = self.chain.best_height();
                        if state.on_batch_importable(last_number, result, best) {
                            self.peers.force_normal_except(peer, block.number());
                        }
                    }
                }
            }

            if result == ImportResult::NoParent {
                let suffix = &blocks[i..];
                let stored = match self.chain.store_pending_range(suffix) {
                    Ok(stored) => stored,
                    Err(e) => {
                        self.check_fatal(&e)?;
                        0
                    }
                };
                debug!(
                    "<import-no-parent: node = {}, stopped at = {}, stored = {}, batch left = {}>",
                    display_id,
                    block.number(),
                    stored,
                    suffix.len()
                );

                if state.mode() == SyncMode::Torrent {
                    if !state.can_torrent() {
                        state.transition(SyncMode::Normal, self.chain.best_height());
                    } else if stored < suffix.len() {
                        // part of the suffix was already parked; this range
                        // is being handled elsewhere, move to the next one
                        let best = self.chain.best_height();
                        let next_base = self.chain.next_torrent_base(best);
                        if next_base == best {
                            state.transition(SyncMode::Normal, best);
                            debug!(
                                "<import-torrent-done: node = {}, base = {}>",
                                display_id, best
                            );
                        } else {
                            state.set_base(next_base);
                            debug!(
                                "<import-torrent-continue: node = {}, base = {}>",
                                display_id, next_base
                            );
                        }
                    } else {
                        state.inc_repeated();
                        state.set_base(block.number() + suffix.len() as u64);
                    }
                    state.reset_header_request();
                }
                break;
            }
        }

        if state.mode() == SyncMode::Forward {
            match import_result {
                ImportResult::Exist => state.inc_repeated(),
                ImportResult::ImportedBest => state.set_mode(SyncMode::Normal),
                _ => {}
            }
        }

        // blocks parked earlier may connect now that this batch landed
        if let (Some(first), Some(last)) = (first, last) {
            if first < last {
                let replayed = self.replay_pending(&mut state, first, last)?;
                if replayed > 0 {
                    let best = self.chain.best_height();
                    if state.mode() == SyncMode::Torrent {
                        state.set_base(self.chain.next_torrent_base(best));
                    } else {
                        state.set_base(best);
                    }
                    state.reset_repeated();
                }
            }
        }

        state.reset_header_request();
        drop(state);

        self.stats.record_best(self.chain.best_height());
        Ok(())
    }

    /// Replay parked runs level by level over `first..=last`
    ///
    /// `last` extends while replayed blocks keep connecting, so a long
    /// parked chain is consumed in one pass. Runs that import completely
    /// are dropped from the store; a run that stops at a missing parent
    /// stays parked. Returns the number of blocks imported.
    fn replay_pending(
        &self,
        state: &mut PeerState,
        first: BlockNumber,
        mut last: BlockNumber,
    ) -> SyncResult<usize> {
        let mut final_result = ImportResult::NoParent;
        let mut replayed = 0usize;
        let mut level = first;

        while level <= last {
            let loaded = match self.chain.load_pending_at_level(level) {
                Ok(loaded) => loaded,
                Err(e) => {
                    self.check_fatal(&e)?;
                    warn!("cannot load pending blocks at level {}: {}", level, e);
                    level += 1;
                    continue;
                }
            };
            if loaded.is_empty() {
                level += 1;
                continue;
            }

            let mut consumed: Vec<BranchKey> = loaded.keys().copied().collect();

            for (key, queue) in &loaded {
                debug!(
                    "<import-pending: level = {}, queue = {}, block count = {}>",
                    level,
                    key,
                    queue.len()
                );

                let fresh: Vec<&Block> = queue.iter().filter(|b| self.not_imported(b)).collect();
                debug!(
                    "<import-pending-filtered: level = {}, queue = {}, block count = {}>",
                    level,
                    key,
                    fresh.len()
                );
                if fresh.is_empty() {
                    continue;
                }

                for block in fresh {
                    let result = match self.import_block(block, REPLAY_ORIGIN, state.mode()) {
                        Ok(result) => result,
                        Err(e) => {
                            self.check_fatal(&e)?;
                            continue;
                        }
                    };
                    final_result = result;

                    if result.is_stored() {
                        self.imported.insert(block.hash());
                        replayed += 1;
                        if last <= block.number() {
                            last = block.number() + 1;
                        }
                    } else {
                        // the run still has a gap; keep it parked
                        consumed.retain(|k| k != key);
                        break;
                    }
                }
            }

            self.chain.drop_consumed(level, &consumed, &loaded);
            level += 1;
        }

        if final_result.is_best() && state.mode() == SyncMode::Forward {
            state.transition(SyncMode::Normal, self.chain.best_height());
        }

        Ok(replayed)
    }

    fn import_block(
        &self,
        block: &Block,
        origin: &str,
        mode: SyncMode,
    ) -> ChainResult<ImportResult> {
        let timer = Instant::now();
        let result = self.chain.try_connect(block)?;
        info!(
            "<import-status: node = {}, sync mode = {}, hash = {}, number = {}, txs = {}, result = {}, time elapsed = {} ms>",
            origin,
            mode,
            block.hash().short_hex(),
            block.number(),
            block.transactions.len(),
            result,
            timer.elapsed().as_millis()
        );
        Ok(result)
    }

    /// Log an import failure; disk exhaustion is the one error that stops sync
    fn check_fatal(&self, error: &ChainError) -> SyncResult<()> {
        error!("<import-block failed: {}>", error);
        if error.is_disk_full() {
            error!("sync halted, no disk space left");
            return Err(SyncError::StorageExhausted(error.to_string()));
        }
        Ok(())
    }

    fn not_imported(&self, block: &Block) -> bool {
        !self.imported.contains(&block.hash())
    }
}
