//! Synchronization controller: submit-with-fallback, queue drain on
//! reconnect, and the observable state the kiosk front-end renders.
//!
//! ## Ordering
//!
//! Drains are serialized and replay one entry at a time in FIFO order. The
//! first failed replay ends the cycle: only that entry goes back to the front
//! of the queue. Entries behind it get no gateway call and are dropped from
//! the cycle; the drop is counted in [`DrainReport::discarded`] and logged.

use std::sync::{Arc, Mutex as StdMutex, Weak};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connectivity::Connectivity;
use crate::errors::{Result, SyncError};
use crate::format::format_eur;
use crate::gateway::DonationGateway;
use crate::models::{DonationEntry, NewDonation, PaymentMethod, Stats};
use crate::queue::QueueStore;
use crate::stats::{compute_stats, percent_complete};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Ready,
    Errored,
    /// Replaying the offline queue.
    Syncing,
}

/// Everything the presentation layer observes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewState {
    pub phase: Phase,
    pub stats: Option<Stats>,
    pub loading: bool,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl ViewState {
    pub fn percent_complete(&self) -> u32 {
        self.stats.as_ref().map(percent_complete).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The gateway accepted the donation.
    Confirmed(DonationEntry),
    /// The gateway write failed; the donation waits in the offline queue.
    Queued,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub replayed: usize,
    pub requeued: usize,
    /// Entries behind a failed replay, dropped without a gateway call.
    pub discarded: usize,
}

struct Subscription {
    token: CancellationToken,
    _handle: JoinHandle<()>,
}

pub struct SyncController {
    gateway: Arc<dyn DonationGateway>,
    queue: QueueStore,
    channel: String,
    state: watch::Sender<ViewState>,
    drain_lock: Mutex<()>,
    subscription: StdMutex<Option<Subscription>>,
}

impl SyncController {
    pub fn new(
        gateway: Arc<dyn DonationGateway>,
        queue: QueueStore,
        channel: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(ViewState::default());
        Self {
            gateway,
            queue,
            channel: channel.into(),
            state,
            drain_lock: Mutex::new(()),
            subscription: StdMutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ViewState {
        self.state.borrow().clone()
    }

    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    /// Reload settings and donations and recompute stats. Failures end in
    /// [`Phase::Errored`] and are never returned.
    pub async fn refresh_stats(&self) {
        self.state.send_modify(|s| {
            s.phase = Phase::Loading;
            s.loading = true;
            s.error = None;
        });

        match self.load_stats().await {
            Ok(stats) => {
                debug!(
                    "Stats refreshed: {} of {} raised",
                    stats.total_eur, stats.goal_eur
                );
                self.state.send_modify(|s| {
                    s.phase = Phase::Ready;
                    s.stats = Some(stats);
                    s.loading = false;
                });
            }
            Err(e) => {
                error!("Failed to load stats: {e}");
                let unavailable = SyncError::StatsUnavailable(e.to_string());
                self.state.send_modify(|s| {
                    s.phase = Phase::Errored;
                    s.loading = false;
                    s.error = Some(unavailable.to_string());
                });
            }
        }
    }

    async fn load_stats(&self) -> Result<Stats> {
        let settings = self.gateway.fetch_settings().await?;
        let donations = self.gateway.fetch_donations().await?;
        compute_stats(&settings, &donations)
    }

    /// Record a kiosk donation. Only [`SyncError::InvalidAmount`] is ever
    /// returned; gateway failures degrade to [`SubmitOutcome::Queued`].
    pub async fn submit_donation(
        &self,
        amount: Decimal,
        project_name: Option<String>,
        payment_method: Option<PaymentMethod>,
    ) -> Result<SubmitOutcome> {
        let amount = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        if amount <= Decimal::ZERO {
            let err = SyncError::InvalidAmount(amount);
            self.state.send_modify(|s| {
                s.message = None;
                s.error = Some(err.to_string());
            });
            return Err(err);
        }

        let mut donation = NewDonation::new(amount, self.channel.as_str());
        donation.project_name = project_name;
        donation.payment_method = payment_method;

        self.state.send_modify(|s| {
            s.loading = true;
            s.message = None;
            s.error = None;
        });

        match self.gateway.write_donation(&donation).await {
            Ok(entry) => {
                info!("Donation of {amount} EUR confirmed");
                self.state.send_modify(|s| {
                    s.message = Some(format!(
                        "Thank you for your donation of {}!",
                        format_eur(amount)
                    ));
                });
                self.refresh_stats().await;
                Ok(SubmitOutcome::Confirmed(entry))
            }
            Err(e) => {
                warn!("Donation write failed, queueing for later sync: {e}");
                self.queue.enqueue(donation).await;
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.message = Some(format!(
                        "Offline mode: your donation of {} will be synchronized later.",
                        format_eur(amount)
                    ));
                });
                self.surface_storage_fault();
                Ok(SubmitOutcome::Queued)
            }
        }
    }

    /// Replay the offline queue. Does nothing when the queue is empty.
    pub async fn drain_queue(&self) -> DrainReport {
        let _drain = self.drain_lock.lock().await;

        if !self.queue.has_pending().await {
            self.surface_storage_fault();
            return DrainReport::default();
        }
        let entries = self.queue.dequeue_all().await;
        if entries.is_empty() {
            self.surface_storage_fault();
            return DrainReport::default();
        }

        info!("Replaying {} queued donations", entries.len());
        self.state.send_modify(|s| s.phase = Phase::Syncing);

        let mut report = DrainReport::default();
        let mut pending = entries.into_iter();
        while let Some(entry) = pending.next() {
            match self.gateway.write_donation(&entry.donation).await {
                Ok(stored) => {
                    report.replayed += 1;
                    debug!(
                        "Replayed queued donation ({} EUR) as {:?}",
                        stored.amount_eur, stored.id
                    );
                }
                Err(e) => {
                    report.requeued = 1;
                    report.discarded = pending.len();
                    warn!(
                        "Replay failed, re-queueing it and discarding {} unreplayed donations: {e}",
                        report.discarded
                    );
                    self.queue.restore(vec![entry]).await;
                    break;
                }
            }
        }

        self.refresh_stats().await;
        if report.replayed > 0 {
            self.state.send_modify(|s| {
                s.message = Some(format!(
                    "{} offline donation(s) synchronized.",
                    report.replayed
                ));
            });
        }
        self.surface_storage_fault();
        report
    }

    /// Load stats, drain if currently online, and keep draining on every
    /// later offline→online transition until [`dispose`](Self::dispose).
    pub async fn initialize(self: &Arc<Self>, mut connectivity: watch::Receiver<Connectivity>) {
        self.refresh_stats().await;

        let online = *connectivity.borrow_and_update() == Connectivity::Online;
        if online {
            self.drain_queue().await;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(follow_connectivity(
            Arc::downgrade(self),
            connectivity,
            token.clone(),
        ));
        let previous = self.subscription.lock().ok().and_then(|mut sub| {
            sub.replace(Subscription {
                token,
                _handle: handle,
            })
        });
        if let Some(previous) = previous {
            previous.token.cancel();
        }
    }

    /// Stop reacting to connectivity changes.
    pub fn dispose(&self) {
        let current = self.subscription.lock().ok().and_then(|mut sub| sub.take());
        if let Some(sub) = current {
            sub.token.cancel();
            debug!("Connectivity subscription disposed");
        }
    }

    fn surface_storage_fault(&self) {
        if let Some(fault) = self.queue.take_fault() {
            self.state.send_modify(|s| {
                s.error = Some(format!("Offline queue storage unavailable: {fault}"));
            });
        }
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn follow_connectivity(
    controller: Weak<SyncController>,
    mut rx: watch::Receiver<Connectivity>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    debug!("Connectivity signal closed");
                    break;
                }
                // Offline→online pairs may coalesce into a single notification,
                // so every notification that reads online counts as a reconnect.
                let online = *rx.borrow_and_update() == Connectivity::Online;
                if online {
                    let Some(strong) = controller.upgrade() else { break };
                    info!("Back online, draining offline queue");
                    strong.drain_queue().await;
                }
            }
        }
    }
}
