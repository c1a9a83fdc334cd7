//! Protocol events for state change notifications.
//!
//! Every state-changing operation appends typed events to a bounded in-memory
//! log, enabling clients to track activity and react accordingly. Each event
//! carries the operation sequence number and timestamp it was stamped with.

use serde::{Deserialize, Serialize};

use crate::ledger::collateral::CollateralAmount;
use crate::ledger::token::DebtAmount;
use crate::utils::constants::MAX_EVENT_LOG_SIZE;
use crate::utils::crypto::{Hash, PublicKey};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All protocol event types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProtocolEvent {
    // Trove events
    /// Trove was opened
    TroveOpened(TroveOpenedEvent),
    /// Trove collateral or debt was adjusted
    TroveAdjusted(TroveAdjustedEvent),
    /// Trove was closed by its owner
    TroveClosed(TroveClosedEvent),
    /// Trove was liquidated
    TroveLiquidated(TroveLiquidatedEvent),

    // Redemption events
    /// Debt tokens were redeemed for collateral
    Redemption(RedemptionEvent),
    /// Redemption surplus was claimed
    SurplusClaimed(SurplusClaimedEvent),

    // Vault events
    /// Collateral deposited into the vault
    CollateralDeposited(CollateralMovedEvent),
    /// Collateral withdrawn from the vault
    CollateralWithdrawn(CollateralMovedEvent),

    // Stability pool events
    /// Deposit to the stability pool
    StabilityDeposit(StabilityDepositEvent),
    /// Withdrawal from the stability pool
    StabilityWithdraw(StabilityWithdrawEvent),

    // System events
    /// Price updated
    PriceUpdated(PriceUpdatedEvent),
    /// Recovery mode entered
    RecoveryModeEntered(RecoveryModeEvent),
    /// Recovery mode exited
    RecoveryModeExited(RecoveryModeEvent),
}

impl ProtocolEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TroveOpened(_) => "TroveOpened",
            Self::TroveAdjusted(_) => "TroveAdjusted",
            Self::TroveClosed(_) => "TroveClosed",
            Self::TroveLiquidated(_) => "TroveLiquidated",
            Self::Redemption(_) => "Redemption",
            Self::SurplusClaimed(_) => "SurplusClaimed",
            Self::CollateralDeposited(_) => "CollateralDeposited",
            Self::CollateralWithdrawn(_) => "CollateralWithdrawn",
            Self::StabilityDeposit(_) => "StabilityDeposit",
            Self::StabilityWithdraw(_) => "StabilityWithdraw",
            Self::PriceUpdated(_) => "PriceUpdated",
            Self::RecoveryModeEntered(_) => "RecoveryModeEntered",
            Self::RecoveryModeExited(_) => "RecoveryModeExited",
        }
    }

    /// Get the operation sequence number of the event
    pub fn sequence(&self) -> u64 {
        match self {
            Self::TroveOpened(e) => e.sequence,
            Self::TroveAdjusted(e) => e.sequence,
            Self::TroveClosed(e) => e.sequence,
            Self::TroveLiquidated(e) => e.sequence,
            Self::Redemption(e) => e.sequence,
            Self::SurplusClaimed(e) => e.sequence,
            Self::CollateralDeposited(e) => e.sequence,
            Self::CollateralWithdrawn(e) => e.sequence,
            Self::StabilityDeposit(e) => e.sequence,
            Self::StabilityWithdraw(e) => e.sequence,
            Self::PriceUpdated(e) => e.sequence,
            Self::RecoveryModeEntered(e) => e.sequence,
            Self::RecoveryModeExited(e) => e.sequence,
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::TroveOpened(e) => e.timestamp,
            Self::TroveAdjusted(e) => e.timestamp,
            Self::TroveClosed(e) => e.timestamp,
            Self::TroveLiquidated(e) => e.timestamp,
            Self::Redemption(e) => e.timestamp,
            Self::SurplusClaimed(e) => e.timestamp,
            Self::CollateralDeposited(e) => e.timestamp,
            Self::CollateralWithdrawn(e) => e.timestamp,
            Self::StabilityDeposit(e) => e.timestamp,
            Self::StabilityWithdraw(e) => e.timestamp,
            Self::PriceUpdated(e) => e.timestamp,
            Self::RecoveryModeEntered(e) => e.timestamp,
            Self::RecoveryModeExited(e) => e.timestamp,
        }
    }

    /// Compute event hash
    pub fn hash(&self) -> Hash {
        let data = bincode::serialize(self).unwrap_or_default();
        Hash::sha256(&data)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when a trove is opened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroveOpenedEvent {
    /// Owner public key
    pub owner: PublicKey,
    /// Initial collateral
    pub collateral: CollateralAmount,
    /// Initial debt
    pub debt: DebtAmount,
    /// Collateralization ratio at open, at PRECISION
    pub icr: u128,
    /// Operation sequence number
    pub sequence: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a trove is adjusted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroveAdjustedEvent {
    /// Owner public key
    pub owner: PublicKey,
    /// Collateral change, positive when adding
    pub collateral_delta: i64,
    /// Debt change, positive when minting
    pub debt_delta: i64,
    /// Collateral after the adjustment
    pub new_collateral: CollateralAmount,
    /// Debt after the adjustment
    pub new_debt: DebtAmount,
    /// Collateralization ratio after the adjustment, at PRECISION
    pub new_icr: u128,
    /// Operation sequence number
    pub sequence: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a trove is closed by its owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroveClosedEvent {
    /// Owner public key
    pub owner: PublicKey,
    /// Collateral returned to the owner's free balance
    pub collateral_returned: CollateralAmount,
    /// Debt repaid and burned
    pub debt_repaid: DebtAmount,
    /// Operation sequence number
    pub sequence: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a trove is liquidated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroveLiquidatedEvent {
    /// Previous owner
    pub owner: PublicKey,
    /// Caller who triggered the liquidation
    pub liquidator: PublicKey,
    /// Entire debt removed
    pub debt_liquidated: DebtAmount,
    /// Entire collateral removed
    pub collateral_liquidated: CollateralAmount,
    /// Debt absorbed by the stability pool
    pub debt_absorbed: DebtAmount,
    /// Debt redistributed across remaining troves
    pub debt_redistributed: DebtAmount,
    /// Collateral carved out for the caller
    pub gas_compensation: CollateralAmount,
    /// Collateralization ratio at liquidation, at PRECISION
    pub icr: u128,
    /// Price at liquidation
    pub price: u64,
    /// Whether the system was in recovery mode
    pub in_recovery_mode: bool,
    /// Operation sequence number
    pub sequence: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when debt tokens are redeemed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionEvent {
    /// Redeemer
    pub redeemer: PublicKey,
    /// Debt cancelled and burned
    pub debt_redeemed: DebtAmount,
    /// Collateral drawn at face value
    pub collateral_drawn: CollateralAmount,
    /// Fee kept by the protocol
    pub fee: CollateralAmount,
    /// Troves fully closed by this redemption
    pub troves_closed: u32,
    /// Whether a final trove was partially redeemed
    pub partially_redeemed: bool,
    /// Price at redemption
    pub price: u64,
    /// Operation sequence number
    pub sequence: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when a redemption surplus is claimed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurplusClaimedEvent {
    /// Owner claiming
    pub owner: PublicKey,
    /// Amount moved to the owner's free balance
    pub amount: CollateralAmount,
    /// Operation sequence number
    pub sequence: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// VAULT EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when collateral enters or leaves the vault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralMovedEvent {
    /// Account whose free balance changed
    pub owner: PublicKey,
    /// Amount moved
    pub amount: CollateralAmount,
    /// Free balance after the move
    pub new_balance: CollateralAmount,
    /// Operation sequence number
    pub sequence: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when depositing to the stability pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityDepositEvent {
    /// Depositor
    pub depositor: PublicKey,
    /// Amount deposited
    pub amount: DebtAmount,
    /// Recorded deposit after the change
    pub new_deposit: DebtAmount,
    /// Collateral gain realized by the change
    pub collateral_gain: CollateralAmount,
    /// Reward gain realized by the change, in reward units
    pub reward_gain: u64,
    /// Operation sequence number
    pub sequence: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when withdrawing from the stability pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityWithdrawEvent {
    /// Depositor
    pub depositor: PublicKey,
    /// Amount actually withdrawn, clamped to the compounded balance
    pub withdrawn: DebtAmount,
    /// Recorded deposit after the change
    pub remaining: DebtAmount,
    /// Collateral gain realized by the change
    pub collateral_gain: CollateralAmount,
    /// Reward gain realized by the change, in reward units
    pub reward_gain: u64,
    /// Operation sequence number
    pub sequence: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYSTEM EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when the price is updated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpdatedEvent {
    /// New price in debt base units per whole collateral token
    pub price: u64,
    /// Previous price
    pub previous_price: u64,
    /// Operation sequence number
    pub sequence: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted for recovery mode changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryModeEvent {
    /// Total collateralization ratio that triggered the change, at PRECISION
    pub tcr: u128,
    /// Operation sequence number
    pub sequence: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounded in-memory collection of recent protocol events.
///
/// The log keeps at most `MAX_EVENT_LOG_SIZE` events, evicting the oldest
/// first. Clients needing full history drain it between operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log, evicting the oldest past capacity
    pub fn push(&mut self, event: ProtocolEvent) {
        if self.events.len() >= MAX_EVENT_LOG_SIZE {
            self.events.remove(0);
        }
        self.events.push(event);
    }

    /// Get all events, oldest first
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get the number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take all events, leaving the log empty
    pub fn drain(&mut self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut self.events)
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Compute merkle root of all events
    pub fn merkle_root(&self) -> Hash {
        use crate::utils::crypto::merkle_root;
        let hashes: Vec<Hash> = self.events.iter().map(|e| e.hash()).collect();
        merkle_root(&hashes)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::PUBKEY_LENGTH;

    fn test_pubkey() -> PublicKey {
        PublicKey::new([0x02; PUBKEY_LENGTH])
    }

    fn opened_event(sequence: u64) -> ProtocolEvent {
        ProtocolEvent::TroveOpened(TroveOpenedEvent {
            owner: test_pubkey(),
            collateral: CollateralAmount::from_whole(1),
            debt: DebtAmount::from_whole(200),
            icr: 2_000_000_000_000_000_000,
            sequence,
            timestamp: 1_700_000_000,
        })
    }

    #[test]
    fn test_event_accessors() {
        let event = opened_event(7);
        assert_eq!(event.event_type(), "TroveOpened");
        assert_eq!(event.sequence(), 7);
        assert_eq!(event.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_event_log_filtering() {
        let mut log = EventLog::new();
        assert!(log.is_empty());

        log.push(opened_event(1));
        log.push(ProtocolEvent::PriceUpdated(PriceUpdatedEvent {
            price: 4_000_000,
            previous_price: 0,
            sequence: 2,
            timestamp: 1_700_000_001,
        }));

        assert_eq!(log.len(), 2);
        assert_eq!(log.filter_by_type("TroveOpened").len(), 1);
        assert_eq!(log.filter_by_type("PriceUpdated").len(), 1);
        assert_eq!(log.filter_by_type("Redemption").len(), 0);
    }

    #[test]
    fn test_event_hash_deterministic() {
        let event = opened_event(1);
        let hash1 = event.hash();
        let hash2 = event.hash();
        assert_eq!(hash1, hash2);
        assert!(!hash1.is_zero());
    }

    #[test]
    fn test_event_log_merkle_root() {
        let mut log = EventLog::new();

        // empty log has a zero merkle root
        let empty_root = log.merkle_root();
        assert!(empty_root.is_zero());

        log.push(opened_event(1));
        let root_with_one = log.merkle_root();
        assert!(!root_with_one.is_zero());
        assert_ne!(empty_root, root_with_one);
    }

    #[test]
    fn test_event_log_evicts_oldest() {
        let mut log = EventLog::new();
        for i in 0..(MAX_EVENT_LOG_SIZE as u64 + 5) {
            log.push(opened_event(i));
        }

        assert_eq!(log.len(), MAX_EVENT_LOG_SIZE);
        assert_eq!(log.events()[0].sequence(), 5);
    }

    #[test]
    fn test_drain_empties_the_log() {
        let mut log = EventLog::new();
        log.push(opened_event(1));
        log.push(opened_event(2));

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert!(log.is_empty());
    }
}
