// sync/src/peer_state.rs

use chain_core::{BlockNumber, ImportResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Minimum number of NORMAL peers before any may be diverted to TORRENT
const TORRENT_MIN_NORMAL_PEERS: usize = 4;

/// Fetch strategy currently assigned to a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Steady state: request sequential blocks following the local best height
    Normal,
    /// A contiguous import run is in progress; test-then-commit fetching
    Forward,
    /// Searching downward for the fork point after an orphaned batch
    Backward,
    /// Parallel range fetching over collaborator-assigned base offsets
    Torrent,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncMode::Normal => "NORMAL",
            SyncMode::Forward => "FORWARD",
            SyncMode::Backward => "BACKWARD",
            SyncMode::Torrent => "TORRENT",
        })
    }
}

/// Per-peer population snapshot used by the TORRENT diversion rule
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeCounts {
    /// Peers currently in NORMAL mode
    pub normal: usize,
    /// Peers currently in TORRENT mode
    pub torrent: usize,
    /// All tracked peers
    pub tracked: usize,
}

impl ModeCounts {
    /// Add one peer's mode to the tally
    pub fn tally(&mut self, mode: SyncMode) {
        match mode {
            SyncMode::Normal => self.normal += 1,
            SyncMode::Torrent => self.torrent += 1,
            _ => {}
        }
    }
}

/// Sync state tracked for one peer
///
/// Holds the fetch mode, the height the peer's next request should start
/// from, and the anti-stall counters. Mode changes always go through
/// [`PeerState::transition`] so the base is updated in the same step.
#[derive(Debug, Clone)]
pub struct PeerState {
    mode: SyncMode,
    base: BlockNumber,
    repeated: u32,
    max_repeats: u32,
    can_backward: bool,
    can_torrent: bool,
    last_header_request: Option<Instant>,
}

impl PeerState {
    pub fn new(mode: SyncMode, base: BlockNumber, max_repeats: u32) -> Self {
        Self {
            mode,
            base,
            repeated: 0,
            max_repeats,
            can_backward: false,
            can_torrent: false,
            last_header_request: None,
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn base(&self) -> BlockNumber {
        self.base
    }

    pub fn repeated(&self) -> u32 {
        self.repeated
    }

    pub fn max_repeats(&self) -> u32 {
        self.max_repeats
    }

    pub fn can_backward(&self) -> bool {
        self.can_backward
    }

    pub fn can_torrent(&self) -> bool {
        self.can_torrent
    }

    /// Switch mode and base together
    pub fn transition(&mut self, mode: SyncMode, base: BlockNumber) {
        self.mode = mode;
        self.base = base;
    }

    /// Change only the mode, keeping the base written by the same evaluation
    pub fn set_mode(&mut self, mode: SyncMode) {
        self.mode = mode;
    }

    pub fn set_base(&mut self, base: BlockNumber) {
        self.base = base;
    }

    pub fn set_can_torrent(&mut self, allowed: bool) {
        self.can_torrent = allowed;
    }

    pub fn set_can_backward(&mut self, allowed: bool) {
        self.can_backward = allowed;
    }

    pub fn inc_repeated(&mut self) {
        self.repeated += 1;
    }

    pub fn reset_repeated(&mut self) {
        self.repeated = 0;
    }

    /// Make the peer eligible for an immediate next header request
    pub fn reset_header_request(&mut self) {
        self.last_header_request = None;
    }

    /// Record that a header request was just sent to this peer
    pub fn note_header_request(&mut self) {
        self.last_header_request = Some(Instant::now());
    }

    /// Whether the fetch layer may send the next header request
    pub fn ready_for_request(&self, cooldown: Duration) -> bool {
        match self.last_header_request {
            None => true,
            Some(at) => at.elapsed() >= cooldown,
        }
    }

    /// First-block outcome: the batch head connected to the chain
    ///
    /// In BACKWARD mode this means the fork point was found, so the peer
    /// flips to FORWARD starting past the batch. In FORWARD mode the shared
    /// progress update runs. Returns true when the import reached a new
    /// canonical best; the caller must then force every other non-NORMAL
    /// peer back to NORMAL.
    pub fn on_batch_importable(
        &mut self,
        last_block: BlockNumber,
        result: ImportResult,
        best: BlockNumber,
    ) -> bool {
        match self.mode {
            SyncMode::Backward => {
                self.transition(SyncMode::Forward, last_block);
                false
            }
            SyncMode::Forward => self.forward_progress(last_block, result, best),
            _ => false,
        }
    }

    /// First-block outcome: the batch head has no known parent
    ///
    /// BACKWARD keeps searching by lowering the base to the orphan's height.
    /// Any other mode either enters BACKWARD (when eligible) or falls back
    /// to NORMAL at the current best, incrementing the repeat counter or,
    /// once the counter hits the ceiling, granting backward-search
    /// eligibility instead.
    pub fn on_batch_orphaned(&mut self, number: BlockNumber, best: BlockNumber) {
        if self.mode == SyncMode::Backward {
            self.set_base(number);
            return;
        }

        if self.mode != SyncMode::Torrent && self.can_backward {
            self.transition(SyncMode::Backward, number);
        } else {
            if !self.can_backward && self.repeated == self.max_repeats {
                self.can_backward = true;
            } else {
                self.inc_repeated();
            }
            self.transition(SyncMode::Normal, best);
        }
    }

    /// Shared FORWARD progress update
    ///
    /// Moves the base past the imported run. Reaching a new canonical best
    /// completes the catch-up and demotes the peer to NORMAL; the return
    /// value tells the caller to do the same to every other non-NORMAL peer.
    /// Independently, a peer stuck at the repeat ceiling is forced back to
    /// NORMAL at the current best and its counter starts over.
    pub fn forward_progress(
        &mut self,
        last_block: BlockNumber,
        result: ImportResult,
        best: BlockNumber,
    ) -> bool {
        self.set_base(last_block);

        let completed = result.is_best();
        if completed {
            self.set_mode(SyncMode::Normal);
        }

        if self.repeated >= self.max_repeats {
            self.transition(SyncMode::Normal, best);
            self.reset_repeated();
            self.reset_header_request();
        }

        completed
    }
}

/// Decision to divert a NORMAL peer to TORRENT range fetching
///
/// Fires when the peer's batch was entirely filtered out or NORMAL peers
/// form the majority, provided the peer is TORRENT-eligible and the
/// population stays balanced: strictly fewer TORRENT peers than NORMAL
/// peers minus one, with more than four NORMAL peers overall.
pub fn should_divert_to_torrent(state: &PeerState, batch_empty: bool, counts: &ModeCounts) -> bool {
    state.mode() == SyncMode::Normal
        && (batch_empty || counts.normal > counts.tracked / 2)
        && state.can_torrent()
        && counts.normal > TORRENT_MIN_NORMAL_PEERS
        && counts.torrent < counts.normal - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn forward_state(base: BlockNumber) -> PeerState {
        let mut state = PeerState::new(SyncMode::Forward, base, 3);
        state.set_can_backward(true);
        state
    }

    #[test]
    fn test_transition_pairs_mode_and_base() {
        let mut state = PeerState::new(SyncMode::Normal, 10, 3);
        state.transition(SyncMode::Torrent, 500);
        assert_eq!(state.mode(), SyncMode::Torrent);
        assert_eq!(state.base(), 500);
    }

    #[test]
    fn test_backward_finds_fork_point() {
        let mut state = PeerState::new(SyncMode::Backward, 40, 3);
        let swept = state.on_batch_importable(45, ImportResult::Exist, 100);
        assert!(!swept);
        assert_eq!(state.mode(), SyncMode::Forward);
        assert_eq!(state.base(), 45);
    }

    #[test]
    fn test_forward_completion_reports_sweep() {
        let mut state = forward_state(50);
        let swept = state.on_batch_importable(55, ImportResult::ImportedBest, 55);
        assert!(swept);
        assert_eq!(state.mode(), SyncMode::Normal);
        assert_eq!(state.base(), 55);
    }

    #[test]
    fn test_forward_progress_without_best_keeps_mode() {
        let mut state = forward_state(50);
        let swept = state.on_batch_importable(55, ImportResult::ImportedNotBest, 100);
        assert!(!swept);
        assert_eq!(state.mode(), SyncMode::Forward);
        assert_eq!(state.base(), 55);
    }

    #[test]
    fn test_forward_stall_breaker() {
        let mut state = forward_state(50);
        for _ in 0..3 {
            state.inc_repeated();
        }
        state.note_header_request();
        state.forward_progress(55, ImportResult::Exist, 90);
        assert_eq!(state.mode(), SyncMode::Normal);
        assert_eq!(state.base(), 90);
        assert_eq!(state.repeated(), 0);
        assert!(state.ready_for_request(Duration::from_secs(60)));
    }

    #[test]
    fn test_backward_search_lowers_base() {
        let mut state = PeerState::new(SyncMode::Backward, 80, 3);
        state.on_batch_orphaned(64, 100);
        assert_eq!(state.mode(), SyncMode::Backward);
        assert_eq!(state.base(), 64);
    }

    #[test]
    fn test_orphan_enters_backward_when_eligible() {
        let mut state = PeerState::new(SyncMode::Normal, 100, 3);
        state.set_can_backward(true);
        state.on_batch_orphaned(95, 100);
        assert_eq!(state.mode(), SyncMode::Backward);
        assert_eq!(state.base(), 95);
    }

    #[test]
    fn test_orphan_graduation_to_backward_eligibility() {
        let mut state = PeerState::new(SyncMode::Normal, 100, 2);

        state.on_batch_orphaned(95, 100);
        assert_eq!(state.repeated(), 1);
        assert!(!state.can_backward());

        state.on_batch_orphaned(95, 100);
        assert_eq!(state.repeated(), 2);
        assert!(!state.can_backward());

        // counter at the ceiling: eligibility granted instead of incrementing
        state.on_batch_orphaned(95, 100);
        assert_eq!(state.repeated(), 2);
        assert!(state.can_backward());
        assert_eq!(state.mode(), SyncMode::Normal);
        assert_eq!(state.base(), 100);
    }

    #[test]
    fn test_torrent_orphan_falls_back_to_normal() {
        let mut state = PeerState::new(SyncMode::Torrent, 5000, 3);
        state.set_can_torrent(true);
        state.set_can_backward(true);
        state.on_batch_orphaned(5000, 120);
        assert_eq!(state.mode(), SyncMode::Normal);
        assert_eq!(state.base(), 120);
        assert_eq!(state.repeated(), 1);
    }

    #[test]
    fn test_request_cooldown() {
        let mut state = PeerState::new(SyncMode::Normal, 0, 3);
        assert!(state.ready_for_request(Duration::from_secs(5)));

        state.note_header_request();
        assert!(!state.ready_for_request(Duration::from_secs(5)));
        assert!(state.ready_for_request(Duration::ZERO));

        state.reset_header_request();
        assert!(state.ready_for_request(Duration::from_secs(5)));
    }

    #[test]
    fn test_divert_needs_population_margin() {
        let mut state = PeerState::new(SyncMode::Normal, 10, 3);
        state.set_can_torrent(true);

        let healthy = ModeCounts { normal: 6, torrent: 0, tracked: 8 };
        assert!(should_divert_to_torrent(&state, true, &healthy));

        let few_normal = ModeCounts { normal: 4, torrent: 0, tracked: 8 };
        assert!(!should_divert_to_torrent(&state, true, &few_normal));

        let saturated = ModeCounts { normal: 6, torrent: 5, tracked: 12 };
        assert!(!should_divert_to_torrent(&state, true, &saturated));

        state.set_can_torrent(false);
        assert!(!should_divert_to_torrent(&state, true, &healthy));
    }

    #[test]
    fn test_divert_needs_empty_batch_or_normal_majority() {
        let mut state = PeerState::new(SyncMode::Normal, 10, 3);
        state.set_can_torrent(true);

        let minority = ModeCounts { normal: 5, torrent: 0, tracked: 12 };
        assert!(!should_divert_to_torrent(&state, false, &minority));
        assert!(should_divert_to_torrent(&state, true, &minority));

        let majority = ModeCounts { normal: 7, torrent: 0, tracked: 12 };
        assert!(should_divert_to_torrent(&state, false, &majority));
    }

    proptest! {
        #[test]
        fn prop_backward_base_decreases_monotonically(
            start in 1_000u64..100_000,
            steps in prop::collection::vec(1u64..50, 1..20)
        ) {
            let mut state = PeerState::new(SyncMode::Backward, start, 3);
            let mut expected = start;
            for step in steps {
                let next = expected.saturating_sub(step);
                state.on_batch_orphaned(next, start + 100);
                prop_assert_eq!(state.mode(), SyncMode::Backward);
                prop_assert!(state.base() <= expected);
                expected = next;
                prop_assert_eq!(state.base(), expected);
            }
        }

        #[test]
        fn prop_stall_breaker_resets_counter(
            repeated in 0u32..10,
            max_repeats in 1u32..5,
            last_block in 0u64..1_000,
            best in 0u64..1_000,
        ) {
            let mut state = PeerState::new(SyncMode::Forward, 0, max_repeats);
            for _ in 0..repeated {
                state.inc_repeated();
            }
            state.forward_progress(last_block, ImportResult::Exist, best);
            if repeated >= max_repeats {
                prop_assert_eq!(state.mode(), SyncMode::Normal);
                prop_assert_eq!(state.base(), best);
                prop_assert_eq!(state.repeated(), 0);
            } else {
                prop_assert_eq!(state.mode(), SyncMode::Forward);
                prop_assert_eq!(state.base(), last_block);
                prop_assert_eq!(state.repeated(), repeated);
            }
        }

        #[test]
        fn prop_diversion_respects_population_bounds(
            normal in 0usize..12,
            torrent in 0usize..12,
            tracked in 0usize..24,
            batch_empty in any::<bool>(),
            can_torrent in any::<bool>(),
        ) {
            let mut state = PeerState::new(SyncMode::Normal, 0, 3);
            state.set_can_torrent(can_torrent);
            let counts = ModeCounts { normal, torrent, tracked };
            if should_divert_to_torrent(&state, batch_empty, &counts) {
                prop_assert!(can_torrent);
                prop_assert!(normal > TORRENT_MIN_NORMAL_PEERS);
                prop_assert!(torrent < normal - 1);
                prop_assert!(batch_empty || normal > tracked / 2);
            }
        }
    }
}
