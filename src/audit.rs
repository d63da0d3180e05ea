//! Audit trail for privileged state changes.
//!
//! Every successful kernel action, permission change and module state
//! mutation is recorded as one structured JSON line on an append-only
//! sink. The most recent entries are also retained in memory (bounded by
//! [`DEFAULT_RETAINED_ENTRIES`] unless changed with
//! [`AuditLogger::retaining`]) so hosts and tests can read the change log
//! back without parsing the sink.

use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::types::{Address, Keycode, Operation};

/// Structured change record, one variant per auditable mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// A module was installed at generation 0.
    ModuleInstalled {
        /// Role name.
        keycode: Keycode,
        /// Implementation address.
        address: Address,
    },
    /// A module was replaced by a new implementation.
    ModuleUpgraded {
        /// Role name.
        keycode: Keycode,
        /// Previous implementation address.
        previous: Address,
        /// New implementation address.
        address: Address,
        /// Generation after the upgrade.
        generation: u64,
        /// Permission entries of the old generation that were dropped.
        revoked_permissions: usize,
    },
    /// A policy joined the active set.
    PolicyActivated {
        /// Policy address.
        policy: Address,
        /// Number of permissions the policy asked for.
        requested_permissions: usize,
    },
    /// A policy left the active set.
    PolicyDeactivated {
        /// Policy address.
        policy: Address,
        /// Permission entries revoked with it.
        revoked_permissions: usize,
    },
    /// Executor rights moved.
    ExecutorChanged {
        /// Previous executor.
        previous: Address,
        /// New executor.
        executor: Address,
    },
    /// The kernel handed over to a successor and retired.
    KernelMigrated {
        /// Successor kernel address.
        successor: Address,
    },
    /// One permission entry was written.
    PermissionUpdated {
        /// Module role.
        keycode: Keycode,
        /// Generation the entry is scoped to.
        generation: u64,
        /// Caller the entry applies to.
        caller: Address,
        /// Guarded operation.
        operation: Operation,
        /// New value.
        granted: bool,
    },
    /// Tokens minted through the mint limiter.
    Minted {
        /// Policy or module that minted.
        caller: Address,
        /// Recipient.
        to: Address,
        /// Holder-facing amount.
        amount: u128,
        /// Window total after this mint.
        minted_today: u128,
    },
    /// Tokens burned through the mint limiter.
    Burned {
        /// Policy that burned.
        caller: Address,
        /// Holder whose tokens were burned.
        from: Address,
        /// Holder-facing amount.
        amount: u128,
    },
    /// Daily cap reconfigured.
    DailyMintCapChanged {
        /// New cap.
        cap: u128,
    },
    /// Per-caller limit reconfigured.
    PolicyLimitSet {
        /// Minter.
        minter: Address,
        /// New lifetime limit.
        limit: u128,
    },
    /// Minter removed from the limiter.
    MinterRemoved {
        /// Minter.
        minter: Address,
    },
    /// Index contracted.
    Debased {
        /// Index before.
        previous_index: u128,
        /// Index after.
        index: u128,
        /// Rate applied, in basis points.
        rate_bp: u32,
    },
    /// Debase rate reconfigured.
    DebaseRateChanged {
        /// Rate before.
        previous_bp: u32,
        /// Rate after.
        rate_bp: u32,
    },
    /// Debase cooldown or threshold reconfigured.
    DebaseScheduleChanged {
        /// Interval in seconds.
        interval_secs: u64,
        /// Effective-supply floor.
        min_threshold: u128,
    },
    /// Treasury approval changed.
    TreasuryApprovalChanged {
        /// Policy whose approval changed.
        policy: Address,
        /// `withdraw` or `debt`.
        approval: String,
        /// Approval after the change.
        amount: u128,
    },
    /// Reserves left the treasury.
    ReservesWithdrawn {
        /// Approved policy.
        caller: Address,
        /// Recipient.
        to: Address,
        /// Amount.
        amount: u128,
    },
    /// A policy borrowed reserves.
    DebtIncurred {
        /// Debtor.
        debtor: Address,
        /// Amount.
        amount: u128,
        /// Debtor's outstanding debt afterwards.
        outstanding: u128,
    },
    /// A debtor paid back reserves.
    DebtRepaid {
        /// Debtor.
        debtor: Address,
        /// Amount.
        amount: u128,
        /// Debtor's outstanding debt afterwards.
        outstanding: u128,
    },
    /// Bond discount reconfigured.
    BondDiscountChanged {
        /// Partner-token discount or standard discount.
        partner: bool,
        /// New discount, in basis points.
        discount_bp: u32,
    },
    /// A bond was opened.
    BondCreated {
        /// Bond holder.
        holder: Address,
        /// Principal burned.
        principal: u128,
        /// Payout owed at maturity.
        payout: u128,
        /// Vesting end.
        maturity: DateTime<Utc>,
    },
    /// A bond was paid out.
    BondRedeemed {
        /// Bond holder.
        holder: Address,
        /// Payout minted.
        payout: u128,
    },
    /// Token policy minter set changed.
    MinterAuthorization {
        /// Minter.
        minter: Address,
        /// Authorized after the change.
        authorized: bool,
    },
}

/// A single audit log entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// Position in this logger's sequence, starting at 1.
    pub sequence: u64,
    /// Unique record id.
    pub record_id: Uuid,
    /// Host-supplied time of the call that produced the event.
    pub timestamp: DateTime<Utc>,
    /// The change itself.
    #[serde(flatten)]
    pub event: ProtocolEvent,
}

/// Entries kept in memory by default; older ones remain only in the sink.
pub const DEFAULT_RETAINED_ENTRIES: usize = 4_096;

/// Sequence counter plus the most recent entries.
struct Retained {
    next_sequence: u64,
    limit: usize,
    entries: VecDeque<AuditEntry>,
}

/// Audit logger writing structured JSON lines to an append-only sink.
pub struct AuditLogger {
    writer: Mutex<Box<dyn Write + Send>>,
    retained: Mutex<Retained>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger").finish_non_exhaustive()
    }
}

impl AuditLogger {
    /// Create an audit logger that appends to the given file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened for appending.
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self::from_writer(Box::new(file)))
    }

    /// Create an audit logger from an arbitrary writer (for testing).
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
            retained: Mutex::new(Retained {
                next_sequence: 1,
                limit: DEFAULT_RETAINED_ENTRIES,
                entries: VecDeque::new(),
            }),
        }
    }

    /// Keep at most `limit` recent entries in memory.
    pub fn retaining(self, limit: usize) -> Self {
        if let Ok(mut retained) = self.retained.lock() {
            retained.limit = limit;
            while retained.entries.len() > limit {
                retained.entries.pop_front();
            }
        }
        self
    }

    /// Keep entries in memory only.
    pub fn in_memory() -> Self {
        Self::from_writer(Box::new(std::io::sink()))
    }

    /// Record an event, logging (not propagating) sink failures.
    ///
    /// Called after the state change has been committed, so a failing sink
    /// must not turn a successful call into a failed one.
    pub fn emit(&self, at: DateTime<Utc>, event: ProtocolEvent) {
        if let Err(e) = self.record(at, event) {
            warn!(error = %e, "failed to write audit entry");
        }
    }

    /// Record an event and write it to the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the sink write fails. The entry is
    /// retained in memory either way, subject to the retention limit.
    pub fn record(&self, at: DateTime<Utc>, event: ProtocolEvent) -> anyhow::Result<()> {
        let entry = {
            let mut retained = self
                .retained
                .lock()
                .map_err(|e| anyhow::anyhow!("audit entries lock poisoned: {e}"))?;
            let sequence = retained.next_sequence;
            retained.next_sequence = sequence
                .checked_add(1)
                .ok_or_else(|| anyhow::anyhow!("audit sequence overflow"))?;
            let entry = AuditEntry {
                sequence,
                record_id: Uuid::new_v4(),
                timestamp: at,
                event,
            };
            if retained.limit > 0 {
                if retained.entries.len() >= retained.limit {
                    retained.entries.pop_front();
                }
                retained.entries.push_back(entry.clone());
            }
            entry
        };
        self.write_entry(&entry)
    }

    /// Snapshot of the retained entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.retained
            .lock()
            .map(|retained| retained.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of retained events without the envelope.
    pub fn events(&self) -> Vec<ProtocolEvent> {
        self.entries().into_iter().map(|entry| entry.event).collect()
    }

    /// Write a single JSON line to the sink.
    fn write_entry(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        let line = serde_json::to_string(entry)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("audit lock poisoned: {e}"))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}
