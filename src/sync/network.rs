use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::remote::OrderService;

/// Connectivity transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
  Online,
  Offline,
}

/// Stream of connectivity transitions, fed by a probe task or by hand
pub struct NetworkObserver {
  rx: mpsc::UnboundedReceiver<NetworkEvent>,
}

/// Sender side for shells that learn about connectivity themselves
#[derive(Clone)]
pub struct NetworkSignal {
  tx: mpsc::UnboundedSender<NetworkEvent>,
}

impl NetworkSignal {
  /// Returns `false` once the observer is gone.
  pub fn online(&self) -> bool {
    self.tx.send(NetworkEvent::Online).is_ok()
  }

  pub fn offline(&self) -> bool {
    self.tx.send(NetworkEvent::Offline).is_ok()
  }
}

impl NetworkObserver {
  /// An observer driven through the returned [`NetworkSignal`].
  ///
  /// The observer ends when every signal handle is dropped.
  pub fn manual() -> (Self, NetworkSignal) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { rx }, NetworkSignal { tx })
  }

  /// An observer that pings `probe` every `interval` and reports changes.
  ///
  /// Only transitions are emitted, starting from `initially_online`.
  pub fn spawn_probe<P>(probe: P, interval: Duration, initially_online: bool) -> Self
  where
    P: OrderService + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn connectivity prober
    tokio::spawn(async move {
      let mut online = initially_online;
      let mut ticker = tokio::time::interval(interval);

      loop {
        ticker.tick().await;
        if tx.is_closed() {
          break;
        }

        let reachable = probe.ping().await.is_ok();
        if reachable == online {
          continue;
        }

        online = reachable;
        let event = if reachable {
          NetworkEvent::Online
        } else {
          NetworkEvent::Offline
        };
        debug!(?event, "connectivity changed");
        if tx.send(event).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next transition
  pub async fn next(&mut self) -> Option<NetworkEvent> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::remote::MockOrderService;

  async fn next_within(observer: &mut NetworkObserver) -> Option<NetworkEvent> {
    tokio::time::timeout(Duration::from_secs(2), observer.next())
      .await
      .ok()
      .flatten()
  }

  #[tokio::test]
  async fn test_manual_signal() {
    let (mut observer, signal) = NetworkObserver::manual();
    assert!(signal.offline());
    assert!(signal.online());
    drop(signal);

    assert_eq!(observer.next().await, Some(NetworkEvent::Offline));
    assert_eq!(observer.next().await, Some(NetworkEvent::Online));
    assert_eq!(observer.next().await, None);
  }

  #[tokio::test]
  async fn test_signal_after_observer_dropped() {
    let (observer, signal) = NetworkObserver::manual();
    drop(observer);
    assert!(!signal.online());
  }

  #[tokio::test]
  async fn test_probe_reports_transitions_only() {
    let service = MockOrderService::new();
    let mut observer =
      NetworkObserver::spawn_probe(service.clone(), Duration::from_millis(10), true);

    service.set_available(false);
    assert_eq!(next_within(&mut observer).await, Some(NetworkEvent::Offline));

    service.set_available(true);
    assert_eq!(next_within(&mut observer).await, Some(NetworkEvent::Online));
  }

  #[tokio::test]
  async fn test_probe_reports_initial_mismatch() {
    let service = MockOrderService::new();
    let mut observer = NetworkObserver::spawn_probe(service, Duration::from_millis(10), false);
    assert_eq!(next_within(&mut observer).await, Some(NetworkEvent::Online));
  }
}
