//! Lock-free single-producer/multi-consumer job queue.
//!
//! A fixed-capacity ring of deferred work items, fed by one producer per
//! frame and drained by a fixed pool of worker threads gated by a counting
//! semaphore. Workers race for the next entry with a single
//! compare-and-swap on the read cursor, so each entry runs exactly once
//! and idle workers block instead of spinning.
//!
//! # Ordering
//!
//! ```text
//! Producer writes slot, then Release-stores write_cursor
//!   -> consumer Acquire-loads write_cursor, then copies slot
//! Consumer copies slot, then AcqRel-CAS on read_cursor
//!   -> producer Acquire-loads read_cursor before reusing the slot
//! ```
//!
//! The slot copy happens *before* the claiming CAS: losers throw their
//! copy away, and the producer cannot reuse a slot until the read cursor
//! has moved past it, which is exactly the winner's CAS.
//!
//! # Cursors
//!
//! Both cursors run free as monotonically increasing `u32`s (wrapping at
//! the type boundary) and are masked down to a slot index only at access
//! time, which requires the capacity to be a power of two. Free-running
//! cursors are what make the claiming CAS sound: a consumer that stalls
//! between its slot copy and its CAS cannot have the CAS succeed against
//! a recycled cursor value, because the read cursor does not return to
//! the observed value until 2^32 dequeues later. Wrapping the cursors
//! modulo capacity instead would re-admit exactly that ABA claim after a
//! single lap of the ring.
//!
//! # Capacity
//!
//! `write == read` means empty and `write - read` is the fill level; one
//! slot is kept in reserve, so a queue of capacity N holds N-1
//! outstanding entries. Submitting into a full queue is a contract
//! violation and panics; the producer is expected to size the queue for
//! its worst-case per-frame fan-out. There is no batch-join primitive;
//! callers that need one keep their own atomic completion counter.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};

use crossbeam_utils::CachePadded;

mod worker;


pub use worker::WorkerPool;

/// Work function executed by a worker thread.
pub type JobFn = fn(u64);

/// One deferred unit of work: a function and an opaque data word
/// (typically a pointer), value-copied into the ring at submission.
#[derive(Debug, Clone, Copy)]
pub struct Job {
    pub run: JobFn,
    pub data: u64,
}

/// Counting wake-up primitive for idle workers.
///
/// Posted once per submission, consumed once per wake, so the count of
/// waiting-vs-available work stays consistent. Spurious wakes are fine:
/// the worker loops back, finds nothing, and re-blocks.
struct Semaphore {
    count: Mutex<u32>,
    available: Condvar,
}

impl Semaphore {
    fn new() -> Self {
        Self {
            count: Mutex::new(0),
            available: Condvar::new(),
        }
    }

    fn post(&self, n: u32) {
        let mut count = self.count.lock().expect("job semaphore poisoned");
        *count += n;
        if n == 1 {
            self.available.notify_one();
        } else {
            self.available.notify_all();
        }
    }

    fn wait(&self) {
        let mut count = self.count.lock().expect("job semaphore poisoned");
        while *count == 0 {
            count = self.available.wait(count).expect("job semaphore poisoned");
        }
        *count -= 1;
    }
}

/// Fixed-capacity SPMC ring of [`Job`]s.
pub struct JobQueue {
    slots: Box<[UnsafeCell<MaybeUninit<Job>>]>,
    /// Free-running; masked with `mask` at slot access.
    write_cursor: CachePadded<AtomicU32>,
    read_cursor: CachePadded<AtomicU32>,
    ready: Semaphore,
    capacity: u32,
    mask: u32,
}

// SAFETY: slot access is guarded by the cursor protocol documented above;
// Job itself is Copy + Send.
unsafe impl Send for JobQueue {}
unsafe impl Sync for JobQueue {}

impl JobQueue {
    /// Create a queue with `capacity` slots (`capacity - 1` usable).
    ///
    /// `capacity` must be a power of two so free-running cursors can be
    /// masked down to slot indices.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity >= 2, "job queue needs at least 2 slots");
        assert!(
            capacity.is_power_of_two(),
            "job queue capacity must be a power of two"
        );
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            write_cursor: CachePadded::new(AtomicU32::new(0)),
            read_cursor: CachePadded::new(AtomicU32::new(0)),
            ready: Semaphore::new(),
            capacity,
            mask: capacity - 1,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Submit a job for execution on a worker thread.
    ///
    /// Single-producer call: only one thread may submit at a time (in the
    /// runtime that is the orchestrator thread, including FFI submissions
    /// made from inside the simulation's `update`).
    ///
    /// # Panics
    ///
    /// Panics if the queue is full. That is a sizing bug in the producer,
    /// not a runtime condition; there is no backpressure by design.
    pub fn submit(&self, job: Job) {
        let write = self.write_cursor.load(Ordering::Relaxed);
        let read = self.read_cursor.load(Ordering::Acquire);
        assert!(
            write.wrapping_sub(read) < self.capacity - 1,
            "job queue overflow: more than {} outstanding jobs",
            self.capacity - 1
        );

        // SAFETY: the slot at `write` is only reused after read_cursor
        // passes it, and read_cursor can never pass write_cursor.
        unsafe {
            (*self.slots[(write & self.mask) as usize].get()).write(job);
        }

        // Publish the entry only after its fields are fully written.
        self.write_cursor
            .store(write.wrapping_add(1), Ordering::Release);
        self.ready.post(1);
    }

    /// Try to claim and run the next entry.
    ///
    /// Returns `false` if the queue was empty (the caller should block on
    /// [`wait_for_work`](Self::wait_for_work)) and `true` otherwise,
    /// including when another worker won the race for the observed entry.
    pub fn try_run_next(&self) -> bool {
        let read = self.read_cursor.load(Ordering::Acquire);
        let write = self.write_cursor.load(Ordering::Acquire);
        if read == write {
            return false;
        }

        // Copy the entry out before claiming it; see module docs for why
        // this is sound. A losing consumer's copy can overlap the
        // producer rewriting the slot, but that copy is discarded unread
        // the moment the CAS fails.
        // SAFETY: read != write, so the slot at `read` was fully written
        // before the producer's Release store we just Acquire-loaded.
        let job = unsafe { (*self.slots[(read & self.mask) as usize].get()).assume_init() };

        if self
            .read_cursor
            .compare_exchange(
                read,
                read.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            // Exactly one worker wins the CAS for this slot.
            (job.run)(job.data);
        }
        true
    }

    /// Block until a submission (or a pool wake-up) is posted.
    pub fn wait_for_work(&self) {
        self.ready.wait();
    }

    /// Wake `n` blocked workers without submitting work.
    ///
    /// Used by [`WorkerPool`] on shutdown so parked threads re-check their
    /// stop flag.
    pub(crate) fn wake(&self, n: u32) {
        self.ready.post(n);
    }
}
