//! Control Bus (C5): the single channel through which the host (CLI,
//! HTTP surface) and the Worker Pool talk to the Scheduler. One consumer
//! (the scheduler's run loop), any number of producers. FIFO, unbounded --
//! a slow scheduler never blocks a producer.

use tokio::sync::mpsc;

/// Exit-code taxonomy used on `WorkerCompletion` (§4.3): 0 normal
/// completion, 1 error/validation failure, 2 user-initiated stop.
pub const EXIT_NORMAL: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_STOPPED: i32 = 2;

#[derive(Debug, Clone)]
pub struct WorkerCompletion {
    pub worker_id: u32,
    pub task_branch: String,
    pub exit_code: i32,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// A new or augmenting natural-language request from the user.
    Intervention { text: String },
    /// Request to stop all active workers and return to `Idle`.
    Stop,
    /// A worker slot finished (successfully, with an error, or because it
    /// was stopped); see [`EXIT_NORMAL`]/[`EXIT_ERROR`]/[`EXIT_STOPPED`].
    WorkerCompletion(WorkerCompletion),
    /// Runtime change to `max_parallel`.
    ConfigUpdate { max_parallel: u32 },
    /// Result of an explicit single-worker stop request, for hosts that
    /// want to confirm a targeted stop landed.
    StopWorkerResult { worker_id: u32, stopped: bool },
}

/// Producer handle. Cheap to clone; every clone shares the same queue.
#[derive(Clone)]
pub struct ControlBus {
    tx: mpsc::UnboundedSender<ControlEvent>,
}

impl ControlBus {
    pub fn channel() -> (ControlBus, ControlBusConsumer) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ControlBus { tx: tx.clone() }, ControlBusConsumer { tx, rx })
    }

    /// Best-effort send: if the consumer has already shut down, the event
    /// is silently dropped rather than propagated as an error, since by
    /// that point there is nothing left to observe it.
    pub fn send(&self, event: ControlEvent) {
        let _ = self.tx.send(event);
    }

    pub fn intervene(&self, text: impl Into<String>) {
        self.send(ControlEvent::Intervention { text: text.into() });
    }

    pub fn stop(&self) {
        self.send(ControlEvent::Stop);
    }

    pub fn config_update(&self, max_parallel: u32) {
        self.send(ControlEvent::ConfigUpdate { max_parallel });
    }

    pub fn worker_completion(&self, completion: WorkerCompletion) {
        self.send(ControlEvent::WorkerCompletion(completion));
    }

    pub fn stop_worker_result(&self, worker_id: u32, stopped: bool) {
        self.send(ControlEvent::StopWorkerResult { worker_id, stopped });
    }
}

/// Consumer handle, owned by the scheduler's run loop. Not `Clone`: there
/// is exactly one consumer by construction.
pub struct ControlBusConsumer {
    tx: mpsc::UnboundedSender<ControlEvent>,
    rx: mpsc::UnboundedReceiver<ControlEvent>,
}

impl ControlBusConsumer {
    pub async fn recv(&mut self) -> Option<ControlEvent> {
        self.rx.recv().await
    }

    /// Drops any `Intervention` events currently buffered (not yet
    /// received), preserving every other event kind in its original
    /// relative order. Used on the `stop` path: a stop must not let
    /// already-queued interventions reopen planning after the scheduler
    /// has returned to `Idle` (§4.5, invariant 7).
    pub fn drain_interventions(&mut self) -> usize {
        let mut kept = Vec::new();
        let mut discarded = 0;
        while let Ok(event) = self.rx.try_recv() {
            match event {
                ControlEvent::Intervention { .. } => discarded += 1,
                other => kept.push(other),
            }
        }
        for event in kept {
            let _ = self.tx.send(event);
        }
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_delivered_fifo() {
        let (bus, mut consumer) = ControlBus::channel();
        bus.intervene("first");
        bus.intervene("second");

        let first = consumer.recv().await.unwrap();
        let second = consumer.recv().await.unwrap();
        assert!(matches!(first, ControlEvent::Intervention { text } if text == "first"));
        assert!(matches!(second, ControlEvent::Intervention { text } if text == "second"));
    }

    #[tokio::test]
    async fn closing_all_senders_ends_recv() {
        let (bus, mut consumer) = ControlBus::channel();
        drop(bus);
        assert!(consumer.recv().await.is_none());
    }

    #[tokio::test]
    async fn drain_interventions_discards_only_interventions() {
        let (bus, mut consumer) = ControlBus::channel();
        bus.intervene("pending work");
        bus.config_update(3);
        bus.intervene("more pending work");

        let discarded = consumer.drain_interventions();
        assert_eq!(discarded, 2);

        let remaining = consumer.recv().await.unwrap();
        assert!(matches!(remaining, ControlEvent::ConfigUpdate { max_parallel: 3 }));
    }

    #[tokio::test]
    async fn drain_interventions_is_a_no_op_when_queue_empty() {
        let (_bus, mut consumer) = ControlBus::channel();
        assert_eq!(consumer.drain_interventions(), 0);
    }
}
