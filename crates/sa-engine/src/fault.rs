//! Slot faults reported from the render thread.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use sa_ir::SlotKind;
use thiserror::Error;

/// Identifies one tone or buffer slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub kind: SlotKind,
    pub index: usize,
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} slot {}", self.kind, self.index)
    }
}

/// Why a slot (or a whole cycle) was silenced.
///
/// Torn slot reads are not faults: the slot keeps its previous record and
/// is re-read on the next cycle.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultReason {
    #[error("buffer handle is stale")]
    StaleBuffer,
    #[error("route addresses a channel outside the bus")]
    ChannelOutOfRange,
    #[error("non-finite output sample")]
    NonFiniteOutput,
    #[error("output length is not a whole number of frames for the bus")]
    BadOutputLength,
    #[error("render called before configure")]
    NotConfigured,
}

/// A fault absorbed on the render path.
///
/// `slot` is `None` for faults that silence a whole cycle.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotFault {
    pub slot: Option<SlotRef>,
    pub reason: FaultReason,
}

impl fmt::Display for SlotFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            Some(slot) => write!(f, "{slot}: {}", self.reason),
            None => write!(f, "render cycle: {}", self.reason),
        }
    }
}

impl SlotFault {
    pub fn slot(kind: SlotKind, index: usize, reason: FaultReason) -> Self {
        Self {
            slot: Some(SlotRef { kind, index }),
            reason,
        }
    }

    pub fn cycle(reason: FaultReason) -> Self {
        Self { slot: None, reason }
    }
}

/// Render-side end of the fault ring. Never blocks.
pub(crate) struct FaultSender {
    producer: HeapProd<SlotFault>,
    dropped: Arc<AtomicU64>,
}

impl FaultSender {
    pub fn report(&mut self, fault: SlotFault) {
        if self.producer.try_push(fault).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Controller-side end of the fault ring.
pub struct FaultReceiver {
    consumer: HeapCons<SlotFault>,
    dropped: Arc<AtomicU64>,
}

impl FaultReceiver {
    pub fn try_recv(&mut self) -> Option<SlotFault> {
        self.consumer.try_pop()
    }

    /// Pop every queued fault.
    pub fn drain(&mut self) -> impl Iterator<Item = SlotFault> + '_ {
        core::iter::from_fn(move || self.consumer.try_pop())
    }

    /// Faults lost because the ring was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub(crate) fn fault_channel(capacity: usize) -> (FaultSender, FaultReceiver) {
    let rb = HeapRb::<SlotFault>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    let dropped = Arc::new(AtomicU64::new(0));
    (
        FaultSender {
            producer,
            dropped: Arc::clone(&dropped),
        },
        FaultReceiver { consumer, dropped },
    )
}
