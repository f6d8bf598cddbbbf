//! Bounded message channel shared by tasks and interrupt handlers.
//!
//! A fixed-capacity FIFO with three insertion policies:
//!
//! - **back** (`send*`) - ordinary FIFO order,
//! - **front** (`send_front*`) - the item is dequeued before everything
//!   already queued; used to prioritise stack-processing continuations,
//! - **overwrite** - pending items are discarded; used for latest-value
//!   channels where the consumer only cares about the most recent state.
//!
//! State lives behind an `embassy_sync` blocking mutex.  With
//! `CriticalSectionRawMutex` every operation runs inside a critical
//! section, which makes the `*_from_interrupt` variants safe to call from
//! an ISR: they never wait, never allocate, and report whether a parked
//! consumer was woken.

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Context, Poll, Waker};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::MultiWakerRegistration;
use embassy_time::{with_timeout, Duration, Timer};
use heapless::Deque;

use crate::config::{COMMAND_QUEUE_DEPTH, DEBUG_QUEUE_DEPTH};
use crate::error::TrySendError;

/// Number of producers that can be parked on a full queue at once.
const MAX_BLOCKED_SENDERS: usize = 4;

/// Command queue feeding the radio task.
pub type CommandQueue =
    MessageQueue<CriticalSectionRawMutex, crate::ble::Command, COMMAND_QUEUE_DEPTH>;

/// Debug records feeding the debug task.
pub type DebugQueue =
    MessageQueue<CriticalSectionRawMutex, crate::debug::DebugRecord, DEBUG_QUEUE_DEPTH>;

/// Latest-value indicator state feeding the status LED task.
pub type IndicatorQueue =
    MessageQueue<CriticalSectionRawMutex, crate::indicator::IndicatorState, 1>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum End {
    Back,
    Front,
}

struct State<T, const N: usize> {
    items: Deque<T, N>,
    receiver: Option<Waker>,
    senders: MultiWakerRegistration<MAX_BLOCKED_SENDERS>,
}

impl<T, const N: usize> State<T, N> {
    const fn new() -> Self {
        Self {
            items: Deque::new(),
            receiver: None,
            senders: MultiWakerRegistration::new(),
        }
    }

    /// Insert at `end`, waking the consumer. Returns whether one was parked.
    fn push(&mut self, item: T, end: End) -> Result<bool, T> {
        match end {
            End::Back => self.items.push_back(item)?,
            End::Front => self.items.push_front(item)?,
        }
        Ok(self.wake_receiver())
    }

    fn pop(&mut self) -> Option<T> {
        let item = self.items.pop_front()?;
        self.senders.wake();
        Some(item)
    }

    fn wake_receiver(&mut self) -> bool {
        match self.receiver.take() {
            Some(waker) => {
                waker.wake();
                true
            }
            None => false,
        }
    }

    fn register_receiver(&mut self, waker: &Waker) {
        match &mut self.receiver {
            Some(existing) if existing.will_wake(waker) => {}
            slot => *slot = Some(waker.clone()),
        }
    }
}

/// Fixed-capacity message queue.
///
/// Meant to live in a `static`; all operations take `&self`.
pub struct MessageQueue<M: RawMutex, T, const N: usize> {
    inner: Mutex<M, RefCell<State<T, N>>>,
}

impl<M: RawMutex, T, const N: usize> MessageQueue<M, T, N> {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(State::new())),
        }
    }

    fn lock<R>(&self, f: impl FnOnce(&mut State<T, N>) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    // ── Non-blocking (task context, zero timeout) ─────────────────────────

    /// Append without waiting.
    pub fn try_send(&self, item: T) -> Result<(), TrySendError<T>> {
        self.lock(|s| s.push(item, End::Back))
            .map(|_| ())
            .map_err(TrySendError::Full)
    }

    /// Insert ahead of all queued items without waiting.
    pub fn try_send_front(&self, item: T) -> Result<(), TrySendError<T>> {
        self.lock(|s| s.push(item, End::Front))
            .map(|_| ())
            .map_err(TrySendError::Full)
    }

    // ── Interrupt context ─────────────────────────────────────────────────

    /// Append from an interrupt handler.
    ///
    /// Returns `Ok(true)` when a consumer parked in [`receive`](Self::receive)
    /// was woken by this insert.
    pub fn send_from_interrupt(&self, item: T) -> Result<bool, TrySendError<T>> {
        self.lock(|s| s.push(item, End::Back))
            .map_err(TrySendError::Full)
    }

    /// Insert ahead of all queued items from an interrupt handler.
    pub fn send_front_from_interrupt(&self, item: T) -> Result<bool, TrySendError<T>> {
        self.lock(|s| s.push(item, End::Front))
            .map_err(TrySendError::Full)
    }

    /// Replace whatever is pending with `item`. Never fails.
    pub fn overwrite(&self, item: T) {
        self.lock(|s| {
            s.items.clear();
            // Cannot fail: the deque was just emptied and N >= 1.
            let _ = s.push(item, End::Back);
        })
    }

    // ── Blocking (task context) ───────────────────────────────────────────

    /// Append, waiting for space indefinitely.
    pub async fn send(&self, item: T) {
        let mut slot = Some(item);
        poll_fn(|cx| self.poll_push(&mut slot, End::Back, cx)).await
    }

    /// Insert at the front, waiting for space indefinitely.
    pub async fn send_front(&self, item: T) {
        let mut slot = Some(item);
        poll_fn(|cx| self.poll_push(&mut slot, End::Front, cx)).await
    }

    /// Append, waiting at most `timeout` for space.
    pub async fn send_timeout(&self, item: T, timeout: Duration) -> Result<(), TrySendError<T>> {
        self.push_within(item, End::Back, timeout).await
    }

    /// Insert at the front, waiting at most `timeout` for space.
    pub async fn send_front_timeout(
        &self,
        item: T,
        timeout: Duration,
    ) -> Result<(), TrySendError<T>> {
        self.push_within(item, End::Front, timeout).await
    }

    async fn push_within(&self, item: T, end: End, timeout: Duration) -> Result<(), TrySendError<T>> {
        let mut slot = Some(item);
        {
            let push = poll_fn(|cx| self.poll_push(&mut slot, end, cx));
            if let Either::First(()) = select(push, Timer::after(timeout)).await {
                return Ok(());
            }
        }
        // The deadline won, but the item may still have gone in on the
        // last poll; whatever is left in the slot was not delivered.
        match slot.take() {
            Some(item) => Err(TrySendError::Full(item)),
            None => Ok(()),
        }
    }

    fn poll_push(&self, slot: &mut Option<T>, end: End, cx: &mut Context<'_>) -> Poll<()> {
        self.lock(|s| {
            let Some(item) = slot.take() else {
                return Poll::Ready(());
            };
            match s.push(item, end) {
                Ok(_) => Poll::Ready(()),
                Err(item) => {
                    *slot = Some(item);
                    s.senders.register(cx.waker());
                    Poll::Pending
                }
            }
        })
    }

    /// Wait for the next item.
    pub async fn receive(&self) -> T {
        poll_fn(|cx| self.poll_receive(cx)).await
    }

    /// Wait at most `timeout` for the next item.
    pub async fn receive_timeout(&self, timeout: Duration) -> Option<T> {
        with_timeout(timeout, self.receive()).await.ok()
    }

    /// Take the next item if one is queued.
    pub fn try_receive(&self) -> Option<T> {
        self.lock(|s| s.pop())
    }

    fn poll_receive(&self, cx: &mut Context<'_>) -> Poll<T> {
        self.lock(|s| match s.pop() {
            Some(item) => Poll::Ready(item),
            None => {
                s.register_receiver(cx.waker());
                Poll::Pending
            }
        })
    }

    // ── Inspection ────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.lock(|s| s.items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.lock(|s| s.items.is_empty())
    }

    pub fn is_full(&self) -> bool {
        self.lock(|s| s.items.is_full())
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Drop every pending item, releasing blocked senders.
    pub fn clear(&self) {
        self.lock(|s| {
            s.items.clear();
            s.senders.wake();
        })
    }
}

impl<M: RawMutex, T, const N: usize> Default for MessageQueue<M, T, N> {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    type Queue<const N: usize> = MessageQueue<CriticalSectionRawMutex, u8, N>;

    #[test]
    fn fifo_order_for_back_sends() {
        let q: Queue<4> = Queue::new();
        q.try_send(1).unwrap();
        q.try_send(2).unwrap();
        q.try_send(3).unwrap();

        assert_eq!(q.try_receive(), Some(1));
        assert_eq!(q.try_receive(), Some(2));
        assert_eq!(q.try_receive(), Some(3));
        assert_eq!(q.try_receive(), None);
    }

    #[test]
    fn front_send_jumps_the_queue() {
        let q: Queue<4> = Queue::new();
        q.try_send(1).unwrap();
        q.try_send(2).unwrap();
        q.try_send_front(9).unwrap();

        assert_eq!(q.try_receive(), Some(9));
        assert_eq!(q.try_receive(), Some(1));
        assert_eq!(q.try_receive(), Some(2));
    }

    #[test]
    fn latest_front_send_wins_over_earlier_front_sends() {
        let q: Queue<4> = Queue::new();
        q.try_send_front(1).unwrap();
        q.try_send_front(2).unwrap();

        assert_eq!(q.try_receive(), Some(2));
        assert_eq!(q.try_receive(), Some(1));
    }

    #[test]
    fn full_queue_rejects_and_returns_item() {
        let q: Queue<2> = Queue::new();
        q.try_send(1).unwrap();
        q.try_send(2).unwrap();
        assert!(q.is_full());

        assert_eq!(q.try_send(3), Err(TrySendError::Full(3)));
        assert_eq!(q.try_send_front(4), Err(TrySendError::Full(4)));
        assert_eq!(q.send_from_interrupt(5), Err(TrySendError::Full(5)));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn interrupt_send_reports_no_waiter_when_idle() {
        let q: Queue<2> = Queue::new();
        assert_eq!(q.send_from_interrupt(7), Ok(false));
        assert_eq!(q.send_front_from_interrupt(8), Ok(false));
        assert_eq!(q.try_receive(), Some(8));
    }

    #[test]
    fn interrupt_send_wakes_parked_receiver() {
        let q: Queue<2> = Queue::new();
        let (received, woke) = block_on(join(q.receive(), async {
            // The receiver has parked by the time this future first runs.
            q.send_front_from_interrupt(42)
        }));
        assert_eq!(received, 42);
        assert_eq!(woke, Ok(true));
    }

    #[test]
    fn overwrite_keeps_only_latest_value() {
        let q: Queue<1> = Queue::new();
        q.overwrite(1);
        q.overwrite(2);
        q.overwrite(3);

        assert_eq!(q.len(), 1);
        assert_eq!(q.try_receive(), Some(3));
        assert!(q.is_empty());
    }

    #[test]
    fn overwrite_discards_all_pending_items() {
        let q: Queue<3> = Queue::new();
        q.try_send(1).unwrap();
        q.try_send(2).unwrap();
        q.overwrite(5);

        assert_eq!(q.try_receive(), Some(5));
        assert_eq!(q.try_receive(), None);
    }

    #[test]
    fn blocking_send_resumes_after_receive() {
        let q: Queue<1> = Queue::new();
        q.try_send(1).unwrap();

        let (_, first) = block_on(join(q.send(2), async { q.receive().await }));
        assert_eq!(first, 1);
        assert_eq!(q.try_receive(), Some(2));
    }

    #[test]
    fn send_timeout_returns_item_when_queue_stays_full() {
        let q: Queue<1> = Queue::new();
        q.try_send(1).unwrap();

        let res = block_on(q.send_timeout(2, Duration::from_millis(20)));
        assert_eq!(res, Err(TrySendError::Full(2)));
        assert_eq!(q.try_receive(), Some(1));
    }

    #[test]
    fn send_front_timeout_succeeds_with_space() {
        let q: Queue<2> = Queue::new();
        q.try_send(1).unwrap();

        let res = block_on(q.send_front_timeout(2, Duration::from_millis(20)));
        assert_eq!(res, Ok(()));
        assert_eq!(q.try_receive(), Some(2));
    }

    #[test]
    fn receive_timeout_expires_on_empty_queue() {
        let q: Queue<1> = Queue::new();
        assert_eq!(block_on(q.receive_timeout(Duration::from_millis(10))), None);
    }

    #[test]
    fn receive_timeout_returns_pending_item() {
        let q: Queue<1> = Queue::new();
        q.try_send(3).unwrap();
        assert_eq!(block_on(q.receive_timeout(Duration::from_millis(10))), Some(3));
    }

    #[test]
    fn clear_empties_queue() {
        let q: MessageQueue<NoopRawMutex, u8, 3> = MessageQueue::new();
        q.try_send(1).unwrap();
        q.try_send(2).unwrap();
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.capacity(), 3);
    }

    #[test]
    fn interleaved_front_and_back_preserve_priority() {
        let q: Queue<8> = Queue::new();
        q.try_send(10).unwrap();
        q.send_from_interrupt(11).unwrap();
        q.send_front_from_interrupt(1).unwrap();
        q.try_send(12).unwrap();
        q.try_send_front(2).unwrap();

        let drained: heapless::Vec<u8, 8> = core::iter::from_fn(|| q.try_receive()).collect();
        assert_eq!(drained.as_slice(), &[2, 1, 10, 11, 12]);
    }

    #[derive(Clone, Copy, Debug)]
    enum Insert {
        Back,
        Front,
        IsrBack,
        IsrFront,
    }

    const SENDS: [Insert; 4] = [Insert::Back, Insert::Front, Insert::IsrBack, Insert::IsrFront];

    /// Every interleaving of up to six sends, with receives in between.
    ///
    /// A front send is dequeued before everything pending when it was made,
    /// back sends keep their relative order, and interrupt sends order
    /// exactly like their task-context twins.
    #[test]
    fn every_interleaving_honours_front_priority() {
        const LEN: usize = 6;

        for combo in 0..SENDS.len().pow(LEN as u32) {
            for receive_after in 0..=LEN {
                let q: Queue<8> = Queue::new();
                let mut received: Vec<u8> = Vec::new();
                // Items still pending at the moment each item was sent.
                let mut ahead_of: Vec<(u8, Insert, Vec<u8>)> = Vec::new();
                let mut pending: Vec<u8> = Vec::new();

                let mut code = combo;
                for item in 0..LEN as u8 {
                    if item as usize == receive_after {
                        while let Some(x) = q.try_receive() {
                            received.push(x);
                        }
                        pending.clear();
                    }

                    let send = SENDS[code % SENDS.len()];
                    code /= SENDS.len();
                    ahead_of.push((item, send, pending.clone()));
                    pending.push(item);
                    match send {
                        Insert::Back => q.try_send(item).unwrap(),
                        Insert::Front => q.try_send_front(item).unwrap(),
                        Insert::IsrBack => {
                            q.send_from_interrupt(item).unwrap();
                        }
                        Insert::IsrFront => {
                            q.send_front_from_interrupt(item).unwrap();
                        }
                    }
                }
                while let Some(x) = q.try_receive() {
                    received.push(x);
                }

                assert_eq!(received.len(), LEN, "combo {combo}");
                let pos = |x: u8| received.iter().position(|&r| r == x).unwrap();
                for (item, send, earlier) in &ahead_of {
                    match send {
                        Insert::Front | Insert::IsrFront => {
                            for e in earlier {
                                assert!(pos(*item) < pos(*e), "combo {combo}: {item} after {e}");
                            }
                        }
                        Insert::Back | Insert::IsrBack => {
                            for e in earlier {
                                assert!(pos(*e) < pos(*item), "combo {combo}: {e} after {item}");
                            }
                        }
                    }
                }
            }
        }
    }
}
