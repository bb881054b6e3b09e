use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::LegError;
use crate::leg::{CoordinatorSignal, Leg};

/// Owns every leg and fans a single chunk stream out to all of them,
/// translating per-leg write-acceptance into `stuck`/`unstuck`/`unusable`
/// signals for the source reader.
pub struct FanoutCoordinator {
    legs: Vec<Leg>,
    signal_tx: mpsc::UnboundedSender<CoordinatorSignal>,
    signal_rx: Option<mpsc::UnboundedReceiver<CoordinatorSignal>>,
}

impl FanoutCoordinator {
    pub fn new() -> (Self, mpsc::UnboundedSender<CoordinatorSignal>) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        (
            Self { legs: Vec::new(), signal_tx: signal_tx.clone(), signal_rx: Some(signal_rx) },
            signal_tx,
        )
    }

    pub fn add_leg(&mut self, leg: Leg) {
        self.legs.push(leg);
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    /// Handed to the source reader exactly once; it is the single
    /// consumer of `stuck`/`unstuck`/`unusable` signals.
    pub fn take_signals(&mut self) -> mpsc::UnboundedReceiver<CoordinatorSignal> {
        self.signal_rx.take().expect("signal receiver already taken")
    }

    pub fn set_size(&self, content_length: u64) {
        for leg in &self.legs {
            leg.set_size(content_length);
        }
    }

    pub fn set_filename(&self, name: &str) {
        for leg in &self.legs {
            leg.set_filename(name);
        }
    }

    /// Forwards `chunk` to every live leg in input order. A leg that
    /// can't absorb it without exceeding `BUFFER_CAP` causes a `stuck`
    /// signal; the leg itself emits `unstuck` once it drains.
    pub fn broadcast(&self, chunk: &Bytes) {
        for leg in &self.legs {
            if !leg.is_alive() {
                continue;
            }
            if !leg.write(chunk.clone()) {
                let _ = self.signal_tx.send(CoordinatorSignal::Stuck(leg.index));
            }
        }
    }

    pub fn finalize_all(&self) {
        for leg in &self.legs {
            leg.finalize();
        }
    }

    pub fn abort_all(&self, error: LegError) {
        for leg in &self.legs {
            leg.abort(error.clone());
        }
    }

    pub fn all_dead(&self) -> bool {
        self.legs.iter().all(|leg| !leg.is_alive())
    }

    /// Called once a leg's `run()` future settles. A leg whose result
    /// carries an error needs no further buffer writes; if that was the
    /// last live leg, the source reader is told the whole fan-out is
    /// unusable, otherwise a defensive `unstuck` unblocks the producer
    /// in case this leg was the one holding it back.
    pub fn on_leg_finished(&self, index: usize, failed: bool) {
        if !failed {
            return;
        }
        if self.all_dead() {
            let _ = self.signal_tx.send(CoordinatorSignal::Unusable);
        } else {
            let _ = self.signal_tx.send(CoordinatorSignal::Unstuck(index));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;

    fn test_leg(index: usize, tx: mpsc::UnboundedSender<CoordinatorSignal>) -> Leg {
        Leg::new(index, UploadConfig::new(format!("http://host/{index}")), false, tx)
    }

    #[tokio::test]
    async fn broadcast_skips_dead_legs() {
        let (mut coordinator, tx) = FanoutCoordinator::new();
        let leg = test_leg(0, tx);
        leg.abort(LegError::Cancelled("stopped early".to_string()));
        coordinator.add_leg(leg);

        assert_eq!(coordinator.legs().len(), 1);
        coordinator.broadcast(&Bytes::from_static(b"hello"));
        assert!(coordinator.all_dead());
    }

    #[tokio::test]
    async fn on_leg_finished_signals_unusable_when_last_leg_dies() {
        let (mut coordinator, tx) = FanoutCoordinator::new();
        let mut signal_rx = coordinator.take_signals();
        let leg = test_leg(0, tx);
        leg.abort(LegError::LegHttp("connection reset".to_string()));
        coordinator.add_leg(leg);

        coordinator.on_leg_finished(0, true);
        assert!(matches!(signal_rx.try_recv(), Ok(CoordinatorSignal::Unusable)));
    }

    #[tokio::test]
    async fn on_leg_finished_unsticks_remaining_legs() {
        let (mut coordinator, tx) = FanoutCoordinator::new();
        let mut signal_rx = coordinator.take_signals();
        coordinator.add_leg(test_leg(0, tx.clone()));
        coordinator.add_leg(test_leg(1, tx));

        coordinator.on_leg_finished(0, true);
        assert!(matches!(signal_rx.try_recv(), Ok(CoordinatorSignal::Unstuck(0))));
    }
}
