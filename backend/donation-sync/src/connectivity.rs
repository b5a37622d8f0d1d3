//! Online/offline signal.
//!
//! The signal itself is a [`watch`] channel; [`run`] keeps it current by
//! probing the gateway on a fixed interval and publishing only transitions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::gateway::DonationGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

/// Create a signal starting in `initial`.
pub fn channel(initial: Connectivity) -> (watch::Sender<Connectivity>, watch::Receiver<Connectivity>) {
    watch::channel(initial)
}

/// Probe loop. Runs until `shutdown` is cancelled or every receiver is gone.
pub async fn run(
    gateway: Arc<dyn DonationGateway>,
    tx: watch::Sender<Connectivity>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!("Connectivity probe starting (every {}s)", interval.as_secs());

    loop {
        let observed = match gateway.ping().await {
            Ok(()) => Connectivity::Online,
            Err(e) => {
                debug!("Gateway probe failed: {e}");
                Connectivity::Offline
            }
        };

        let changed = tx.send_if_modified(|current| {
            if *current == observed {
                return false;
            }
            *current = observed;
            true
        });
        if changed {
            match observed {
                Connectivity::Online => info!("Gateway reachable again"),
                Connectivity::Offline => warn!("Gateway unreachable, switching to offline mode"),
            }
        }

        if tx.is_closed() {
            debug!("No connectivity subscribers left, stopping probe");
            return;
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GatewayError;
    use crate::models::{DonationEntry, GoalSettings, NewDonation};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers pings from a script; the last answer repeats.
    struct ScriptedPing(Mutex<VecDeque<bool>>);

    #[async_trait]
    impl DonationGateway for ScriptedPing {
        async fn fetch_settings(&self) -> Result<GoalSettings, GatewayError> {
            Err(GatewayError::NotFound)
        }
        async fn fetch_donations(&self) -> Result<Vec<DonationEntry>, GatewayError> {
            Ok(Vec::new())
        }
        async fn write_donation(&self, _: &NewDonation) -> Result<DonationEntry, GatewayError> {
            Err(GatewayError::request("not used"))
        }
        async fn ping(&self) -> Result<(), GatewayError> {
            let mut script = self.0.lock().unwrap();
            let up = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                *script.front().unwrap()
            };
            if up {
                Ok(())
            } else {
                Err(GatewayError::request("down"))
            }
        }
    }

    #[tokio::test]
    async fn publishes_transitions_only() {
        let gateway = Arc::new(ScriptedPing(Mutex::new(VecDeque::from([
            false, false, true, true, false,
        ]))));
        let (tx, mut rx) = channel(Connectivity::Online);
        let shutdown = CancellationToken::new();
        let probe = tokio::spawn(run(
            gateway,
            tx,
            Duration::from_millis(5),
            shutdown.clone(),
        ));

        let mut seen = Vec::new();
        while seen.len() < 3 {
            rx.changed().await.unwrap();
            seen.push(*rx.borrow_and_update());
        }
        shutdown.cancel();
        probe.await.unwrap();

        assert_eq!(
            seen,
            vec![
                Connectivity::Offline,
                Connectivity::Online,
                Connectivity::Offline
            ]
        );
    }
}
