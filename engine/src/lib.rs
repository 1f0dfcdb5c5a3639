//! Ritual orchestration for Lingqian - the state machine without any
//! rendering dependencies.
//!
//! One ritual runs `Idle -> Shaking -> Revealing -> Resolved -> Idle`. The
//! fortune request is issued the moment shaking starts and races the
//! animation timeline concurrently; the resolved record is never exposed
//! before both animation timers have elapsed, even when the provider
//! answers instantly.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use lingqian_providers::fallback;

mod config;
pub use config::{
    ApiKeys, AppConfig, ConfigError, LingqianConfig, ProviderConfig, RitualConfig,
};

// Re-export the pieces a front-end needs to wire a ritual together.
pub use lingqian_providers::{FortuneProvider, GenerationClient};
pub use lingqian_types::FortuneRecord;

// ============================================================================
// Phases and timings
// ============================================================================

/// Phase of the ritual state machine, published on a watch channel so the
/// display layer can drive animation and sound from transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RitualPhase {
    Idle,
    Shaking,
    Revealing,
    Resolved,
}

impl RitualPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RitualPhase::Idle => "idle",
            RitualPhase::Shaking => "shaking",
            RitualPhase::Revealing => "revealing",
            RitualPhase::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for RitualPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock durations of the ritual timeline.
///
/// With the defaults, `shake + reveal + resolve_grace` (3800 ms) exceeds the
/// provider's own 3500 ms race, so the fortune task has always settled by the
/// time the grace cap fires; the cap only trips for a client that ignores
/// its own deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RitualTimings {
    /// Stick-shaking animation window.
    pub shake: Duration,
    /// Stick-reveal animation window.
    pub reveal: Duration,
    /// Hard cap on the final await of the fortune task, so a misbehaving
    /// provider future can never wedge the state machine.
    pub resolve_grace: Duration,
}

impl Default for RitualTimings {
    fn default() -> Self {
        Self {
            shake: Duration::from_millis(2000),
            reveal: Duration::from_millis(800),
            resolve_grace: Duration::from_millis(1000),
        }
    }
}

/// Result of asking the orchestrator to start a ritual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// A ritual was already in flight (or awaiting dismissal); the trigger
    /// was a no-op and no second fortune request was issued.
    Ignored,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// In-flight ritual: the timeline task plus a handle to cancel the fortune
/// fetch if the ritual is aborted.
#[derive(Debug)]
struct ActiveRitual {
    task: JoinHandle<()>,
    fetch_abort: AbortHandle,
}

/// Sequences ritual phases against wall-clock delays, racing the fortune
/// fetch against the animation timeline so the two finish in a predictable
/// order.
#[derive(Debug)]
pub struct Orchestrator<C: GenerationClient + 'static> {
    provider: Arc<FortuneProvider<C>>,
    timings: RitualTimings,
    phase_tx: watch::Sender<RitualPhase>,
    fortune_tx: watch::Sender<Option<FortuneRecord>>,
    ritual: Option<ActiveRitual>,
    /// Monotonic ritual counter. A task may publish only while its ticket
    /// matches; `abort` bumps the counter under the same lock that guards
    /// publication, so a task past its last await cannot publish late.
    generation: Arc<Mutex<u64>>,
}

/// The counter is a plain integer, so a lock poisoned by a panicking test
/// is recovered rather than propagated.
fn lock_generation(generation: &Mutex<u64>) -> MutexGuard<'_, u64> {
    generation.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: GenerationClient + 'static> Orchestrator<C> {
    pub fn new(provider: FortuneProvider<C>) -> Self {
        Self::with_timings(provider, RitualTimings::default())
    }

    pub fn with_timings(provider: FortuneProvider<C>, timings: RitualTimings) -> Self {
        let (phase_tx, _) = watch::channel(RitualPhase::Idle);
        let (fortune_tx, _) = watch::channel(None);
        Self {
            provider: Arc::new(provider),
            timings,
            phase_tx,
            fortune_tx,
            ritual: None,
            generation: Arc::new(Mutex::new(0)),
        }
    }

    #[must_use]
    pub fn phase(&self) -> RitualPhase {
        *self.phase_tx.borrow()
    }

    /// Watch phase transitions. The receiver always observes the current
    /// phase immediately.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<RitualPhase> {
        self.phase_tx.subscribe()
    }

    /// The resolved fortune, present only while the ritual is `Resolved`.
    #[must_use]
    pub fn fortune(&self) -> Option<FortuneRecord> {
        self.fortune_tx.borrow().clone()
    }

    /// Start a ritual. Ignored unless the state machine is idle: concurrent
    /// triggers while shaking, revealing, or awaiting dismissal are no-ops.
    ///
    /// The fortune request is spawned immediately, concurrent with the shake
    /// timer, not after it.
    pub fn trigger(&mut self) -> TriggerOutcome {
        if self.ritual.is_some() || self.phase() != RitualPhase::Idle {
            tracing::debug!(phase = %self.phase(), "trigger ignored, ritual in flight");
            return TriggerOutcome::Ignored;
        }

        let fetch = tokio::spawn({
            let provider = Arc::clone(&self.provider);
            async move { provider.request_fortune().await }
        });
        let fetch_abort = fetch.abort_handle();

        let ticket = {
            let mut current = lock_generation(&self.generation);
            *current += 1;
            *current
        };

        self.phase_tx.send_replace(RitualPhase::Shaking);
        tracing::debug!("ritual started");

        let task = tokio::spawn(drive_ritual(
            fetch,
            ticket,
            Arc::clone(&self.generation),
            self.timings,
            self.phase_tx.clone(),
            self.fortune_tx.clone(),
        ));
        self.ritual = Some(ActiveRitual { task, fetch_abort });
        TriggerOutcome::Started
    }

    /// Dismiss a resolved ritual, returning the machine to idle. Returns
    /// false (and does nothing) in any other phase.
    pub fn dismiss(&mut self) -> bool {
        if self.phase() != RitualPhase::Resolved {
            return false;
        }
        self.ritual = None;
        self.fortune_tx.send_replace(None);
        self.phase_tx.send_replace(RitualPhase::Idle);
        tracing::debug!("ritual dismissed");
        true
    }

    /// Abandon the ritual from any in-flight phase: pending timers and the
    /// outstanding fortune fetch are cancelled, and a result that would have
    /// resolved later is never published.
    pub fn abort(&mut self) {
        // Holding the counter lock across the resets keeps them ordered
        // against any publish the ritual task is about to attempt.
        let mut current = lock_generation(&self.generation);
        *current += 1;
        if let Some(ritual) = self.ritual.take() {
            ritual.task.abort();
            ritual.fetch_abort.abort();
            tracing::debug!("ritual aborted");
        }
        self.fortune_tx.send_replace(None);
        self.phase_tx.send_replace(RitualPhase::Idle);
    }
}

/// Drive one ritual timeline: shake, reveal, then settle the fortune.
/// Every publish is gated on `ticket` still being the live generation, so
/// an abort that lands between an await and a send wins.
async fn drive_ritual(
    fetch: JoinHandle<FortuneRecord>,
    ticket: u64,
    generation: Arc<Mutex<u64>>,
    timings: RitualTimings,
    phase_tx: watch::Sender<RitualPhase>,
    fortune_tx: watch::Sender<Option<FortuneRecord>>,
) {
    tokio::time::sleep(timings.shake).await;
    {
        let current = lock_generation(&generation);
        if *current != ticket {
            return;
        }
        phase_tx.send_replace(RitualPhase::Revealing);
    }

    tokio::time::sleep(timings.reveal).await;

    // The provider's internal timeout is shorter than shake + reveal + grace,
    // so this await is expected to return immediately.
    let fetch_abort = fetch.abort_handle();
    let fortune = match tokio::time::timeout(timings.resolve_grace, fetch).await {
        Ok(Ok(record)) => record,
        Ok(Err(join_error)) => {
            tracing::error!(%join_error, "fortune task failed, drawing from fallback pool");
            fallback::draw()
        }
        Err(_) => {
            fetch_abort.abort();
            tracing::warn!(
                grace = ?timings.resolve_grace,
                "fortune not settled within grace window, drawing from fallback pool"
            );
            fallback::draw()
        }
    };

    let current = lock_generation(&generation);
    if *current != ticket {
        return;
    }
    fortune_tx.send_replace(Some(fortune));
    phase_tx.send_replace(RitualPhase::Resolved);
}
