//! Input event queue.
//!
//! Input threads only enqueue. The update thread drains once per tick and
//! is the only consumer that may act on the tree.

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::telemetry::{Counter, Telemetry};

/// Maximum events drained in one tick. The rest wait for the next tick.
pub const MAX_EVENTS_PER_TICK: usize = 1024;

/// Producer half handed to input threads.
#[derive(Debug)]
pub struct InputSender<E> {
    tx: Sender<E>,
}

impl<E> Clone for InputSender<E> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<E> InputSender<E> {
    /// Enqueues an event. Returns false once the queue has been dropped.
    pub fn send(&self, event: E) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Consumer half owned by the update thread.
#[derive(Debug)]
pub struct InputQueue<E> {
    rx: Receiver<E>,
    tx: Sender<E>,
    telemetry: Telemetry,
}

impl<E> InputQueue<E> {
    /// An unbounded queue.
    #[must_use]
    pub fn new(telemetry: Telemetry) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { rx, tx, telemetry }
    }

    /// A new producer handle.
    #[must_use]
    pub fn sender(&self) -> InputSender<E> {
        InputSender {
            tx: self.tx.clone(),
        }
    }

    /// Events currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Moves up to [`MAX_EVENTS_PER_TICK`] events into `out`, in arrival order.
    pub fn drain_into(&self, out: &mut Vec<E>) -> usize {
        let mut drained = 0;
        while drained < MAX_EVENTS_PER_TICK {
            match self.rx.try_recv() {
                Ok(event) => {
                    out.push(event);
                    drained += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        if drained > 0 {
            self.telemetry.add(Counter::InputEventsDrained, drained as u64);
        }
        drained
    }

    /// Drains into a fresh vector.
    #[must_use]
    pub fn drain(&self) -> Vec<E> {
        let mut out = Vec::with_capacity(self.len().min(MAX_EVENTS_PER_TICK));
        self.drain_into(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order() {
        let queue = InputQueue::new(Telemetry::disabled());
        let sender = queue.sender();
        for i in 0..5 {
            assert!(sender.send(i));
        }
        assert_eq!(queue.drain(), vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_is_capped_per_tick() {
        let queue = InputQueue::new(Telemetry::disabled());
        let sender = queue.sender();
        for i in 0..(MAX_EVENTS_PER_TICK + 10) {
            sender.send(i);
        }
        assert_eq!(queue.drain().len(), MAX_EVENTS_PER_TICK);
        assert_eq!(queue.drain().len(), 10);
    }

    #[test]
    fn test_senders_work_across_threads() {
        let queue = InputQueue::new(Telemetry::disabled());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let sender = queue.sender();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        sender.send(t * 100 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("input thread panicked");
        }
        assert_eq!(queue.drain().len(), 100);
    }
}
