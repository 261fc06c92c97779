//! Node reachability tracking.
//!
//! The caller drives `run` from its own task and stops it through the
//! shutdown channel; nothing here spawns in the background. Readers follow
//! the latest `MonitorSnapshot` through a watch channel.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::chain::{BalanceSet, ChainQueryClient};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub state: ConnectionState,
    /// Last height seen; kept while disconnected
    pub height: Option<u64>,
    pub balances: Option<BalanceSet>,
    pub last_error: Option<String>,
}

struct WatchedAddress {
    address: String,
    period: Duration,
}

pub struct ConnectionMonitor {
    snapshot: watch::Sender<MonitorSnapshot>,
    watched: Option<WatchedAddress>,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(MonitorSnapshot::default());
        Self {
            snapshot,
            watched: None,
        }
    }

    /// Also refresh the balances of `address`, every `period`.
    pub fn watch_address(mut self, address: &str, period: Duration) -> Self {
        self.watched = Some(WatchedAddress {
            address: address.to_string(),
            period,
        });
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot.borrow().clone()
    }

    /// One height query plus, when an address is watched, one balance query.
    pub async fn poll_once(&self, client: &ChainQueryClient) -> ConnectionState {
        self.refresh_height(client).await;
        self.refresh_balances(client).await;
        self.snapshot.borrow().state
    }

    /// Poll on `period` until `shutdown` turns true or its sender is dropped.
    pub async fn run(
        &self,
        client: &ChainQueryClient,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if *shutdown.borrow() {
            return;
        }

        let mut heights = interval(period);
        heights.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let balance_period = self.watched.as_ref().map(|w| w.period).unwrap_or(period);
        let mut balances = interval(balance_period);
        balances.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!("Connection monitor started ({:?} period)", period);
        loop {
            tokio::select! {
                _ = heights.tick() => self.refresh_height(client).await,
                _ = balances.tick(), if self.watched.is_some() => self.refresh_balances(client).await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        log::info!("Connection monitor stopped");
    }

    async fn refresh_height(&self, client: &ChainQueryClient) {
        let result = client.latest_height().await;

        self.snapshot.send_modify(|snapshot| {
            let previous = snapshot.state;
            match result {
                Ok(height) => {
                    snapshot.state = ConnectionState::Connected;
                    snapshot.height = Some(height);
                    snapshot.last_error = None;
                }
                Err(e) => {
                    snapshot.state = ConnectionState::Disconnected;
                    snapshot.last_error = Some(e.to_string());
                }
            }
            if previous != snapshot.state {
                log::info!("Node connection {:?} -> {:?}", previous, snapshot.state);
            }
        });
    }

    async fn refresh_balances(&self, client: &ChainQueryClient) {
        let Some(watched) = &self.watched else {
            return;
        };

        match client.balances_of(&watched.address).await {
            Ok(balances) => self.snapshot.send_modify(|s| s.balances = Some(balances)),
            Err(e) => {
                log::warn!("Balance refresh for {} failed: {}", watched.address, e);
                self.snapshot.send_modify(|s| s.last_error = Some(e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::transport::mock::{Failure, MockTransport};
    use crate::chain::transport::NodeTransport;
    use std::sync::Arc;

    const ADDRESS: &str = "cosmos1abcdefghijklmnopqrstuvwxyz0123456789ab";

    fn client(node: &Arc<MockTransport>) -> ChainQueryClient {
        let transports: Vec<Arc<dyn NodeTransport>> = vec![node.clone()];
        ChainQueryClient::with_transports(transports, node.clone(), "cosmos")
    }

    #[tokio::test]
    async fn test_starts_connecting() {
        let monitor = ConnectionMonitor::new();
        assert_eq!(monitor.snapshot().state, ConnectionState::Connecting);
        assert_eq!(monitor.snapshot().height, None);
    }

    #[tokio::test]
    async fn test_poll_once_connected() {
        let node = Arc::new(MockTransport::new("node").with_height(77).with_balances(&[("ustake", "5")]));
        let monitor = ConnectionMonitor::new().watch_address(ADDRESS, Duration::from_secs(10));
        let mut updates = monitor.subscribe();

        assert_eq!(monitor.poll_once(&client(&node)).await, ConnectionState::Connected);
        assert!(updates.has_changed().unwrap());

        let snapshot = updates.borrow_and_update().clone();
        assert_eq!(snapshot.height, Some(77));
        assert_eq!(snapshot.balances.unwrap().get("ustake"), Some("5"));
        assert!(snapshot.last_error.is_none());
    }

    #[tokio::test]
    async fn test_poll_once_disconnected_keeps_last_height() {
        let up = Arc::new(MockTransport::new("node").with_height(10));
        let down = Arc::new(MockTransport::failing("node", Failure::Timeout));
        let monitor = ConnectionMonitor::new();

        monitor.poll_once(&client(&up)).await;
        assert_eq!(monitor.poll_once(&client(&down)).await, ConnectionState::Disconnected);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.height, Some(10));
        assert!(snapshot.last_error.is_some());
        assert!(snapshot.balances.is_none());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let node = Arc::new(MockTransport::new("node").with_height(3));
        let client = client(&node);
        let monitor = ConnectionMonitor::new();
        let (stop, stop_rx) = watch::channel(false);

        let stopper = async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            stop.send(true).unwrap();
        };
        tokio::join!(monitor.run(&client, Duration::from_millis(10), stop_rx), stopper);

        assert!(node.call_count("latest_height") >= 2);
        assert_eq!(node.call_count("all_balances"), 0);
        assert_eq!(monitor.snapshot().state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_run_returns_when_already_stopped() {
        let node = Arc::new(MockTransport::new("node"));
        let monitor = ConnectionMonitor::new();
        let (_stop, stop_rx) = watch::channel(true);

        monitor.run(&client(&node), Duration::from_millis(10), stop_rx).await;
        assert!(node.calls().is_empty());
    }
}
