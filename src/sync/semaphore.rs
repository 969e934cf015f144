// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2020 Datadog, Inc.
//
use std::thread::JoinHandle;

use flume::{Receiver, Selector, Sender};
use log::{debug, trace};

use crate::error::TurnstileError;
use crate::sync::cancel::CancelSignal;

/// One indivisible slot of the resource pool.
#[derive(Clone, Copy, Debug)]
struct Ticket;

/// The shared pool of available units, held as tickets in a bounded channel.
///
/// The channel's occupancy is the number of available units, and its bound
/// enforces `0 <= available <= capacity` structurally: a put that finds the
/// pool full means the caller returned units nobody held. Individual ticket
/// transfers are safe to perform from any thread, composite multi-ticket
/// operations are not, which is why queued acquisitions go through the
/// worker.
#[derive(Clone, Debug)]
struct TicketPool {
    slots: Sender<Ticket>,
    tickets: Receiver<Ticket>,
    capacity: usize,
}

impl TicketPool {
    fn new(capacity: usize) -> TicketPool {
        let (slots, tickets) = flume::bounded(capacity);
        let pool = TicketPool {
            slots,
            tickets,
            capacity,
        };
        for _ in 0..capacity {
            pool.put();
        }
        pool
    }

    fn available(&self) -> usize {
        self.tickets.len()
    }

    /// Non-blocking take of a single ticket.
    fn take(&self) -> bool {
        self.tickets.try_recv().is_ok()
    }

    /// Returns a single ticket to the pool.
    fn put(&self) {
        if self.slots.try_send(Ticket).is_err() {
            panic!("ticket pool overflow: returned units that were never held");
        }
    }
}

/// One blocking acquisition, as handed to the worker. Single use.
#[derive(Clone, Debug)]
struct AcquireRequest {
    amount: usize,
    /// Derived from the caller's signal; the worker checks it on every
    /// iteration of its reservation loop.
    cancel: CancelSignal,
    outcome: Sender<bool>,
}

#[derive(Clone, Copy, Debug)]
enum Verdict {
    Queued,
    Delivered(bool),
    Interrupted,
    Closed,
}

/// The worker thread that owns all queued pool mutation. It drains the
/// single-slot request channel one request at a time for the semaphore's
/// entire lifetime.
#[derive(Debug)]
struct AcquisitionWorker {
    _handle: JoinHandle<()>,
}

impl AcquisitionWorker {
    fn spawn(
        requests: Receiver<AcquireRequest>,
        pool: TicketPool,
        lifecycle: CancelSignal,
    ) -> Self {
        Self {
            _handle: std::thread::spawn(move || {
                while let Some(request) = next_request(&requests, &lifecycle) {
                    let granted = service(&pool, &request);
                    // A caller that stopped listening simply loses the verdict.
                    let _ = request.outcome.send(granted);
                }
                debug!("acquisition worker exiting");
            }),
        }
    }
}

/// Blocks until a request arrives, the lifecycle signal fires, or the
/// request channel disconnects (the semaphore was dropped).
fn next_request(
    requests: &Receiver<AcquireRequest>,
    lifecycle: &CancelSignal,
) -> Option<AcquireRequest> {
    if lifecycle.is_fired() {
        return None;
    }
    lifecycle.race(Selector::new().recv(requests, |r| r.ok()), None)
}

/// The acquire algorithm, run with no other queued acquisition in flight.
///
/// Tight poll: every iteration checks the request's cancellation signal
/// before attempting a single non-blocking ticket take. On cancellation every
/// ticket reserved so far goes back to the pool, so a failed acquisition
/// leaves the occupancy exactly as it found it.
fn service(pool: &TicketPool, request: &AcquireRequest) -> bool {
    trace!("servicing acquisition of {} units", request.amount);
    let mut acquired = 0;
    loop {
        if request.cancel.is_fired() {
            break;
        }
        if acquired == request.amount {
            return true;
        }
        if pool.take() {
            acquired += 1;
            if acquired == request.amount {
                return true;
            }
        } else {
            std::hint::spin_loop();
        }
    }

    if acquired > 0 {
        trace!("rolling back {} partially acquired units", acquired);
        for _ in 0..acquired {
            pool.put();
        }
    }
    false
}

/// A weighted counting semaphore that grants multi-unit acquisitions
/// atomically without a mutex-protected counter or condition variable.
///
/// The semaphore owns a fixed pool of `capacity` interchangeable units. A
/// blocking [`acquire`] reserves a block of units through a dedicated worker
/// thread fed by a request queue of depth one, so concurrent multi-unit
/// reservations never interleave; [`try_acquire`] and [`release`] act on the
/// pool directly from the calling thread. Blocking acquisitions are
/// cancellable through a [`CancelSignal`] and always roll back completely on
/// failure.
///
/// The semaphore's own lifetime is bound to the lifecycle signal given to
/// [`new`]: once that signal fires the worker exits and any further mutating
/// call panics. There is no explicit close.
///
/// Ordering among concurrently blocked acquirers is whatever order they win
/// the race for the single queue slot; no fairness beyond that is provided.
///
/// [`new`]: Semaphore::new
/// [`acquire`]: Semaphore::acquire
/// [`try_acquire`]: Semaphore::try_acquire
/// [`release`]: Semaphore::release
#[derive(Debug)]
pub struct Semaphore {
    pool: TicketPool,
    requests: Sender<AcquireRequest>,
    lifecycle: CancelSignal,
    _worker: AcquisitionWorker,
}

impl Semaphore {
    /// Creates a semaphore with `capacity` units, all available, and starts
    /// its acquisition worker. The worker runs until `lifecycle` fires or the
    /// semaphore is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use turnstile::sync::{CancelSignal, Semaphore};
    ///
    /// let sem = Semaphore::new(CancelSignal::never(), 4);
    /// assert_eq!(4, sem.capacity());
    /// assert_eq!(4, sem.available());
    /// ```
    pub fn new(lifecycle: CancelSignal, capacity: usize) -> Semaphore {
        let pool = TicketPool::new(capacity);
        let (requests, incoming) = flume::bounded(1);
        let worker = AcquisitionWorker::spawn(incoming, pool.clone(), lifecycle.clone());
        Semaphore {
            pool,
            requests,
            lifecycle,
            _worker: worker,
        }
    }

    /// The fixed maximum number of outstanding units.
    pub fn capacity(&self) -> usize {
        self.pool.capacity
    }

    /// The count of units currently available.
    ///
    /// A point-in-time snapshot: concurrent acquires and releases can change
    /// the count between two reads.
    pub fn available(&self) -> usize {
        self.pool.available()
    }

    /// The count of units currently held by callers.
    ///
    /// A point-in-time snapshot, like [`available`](Semaphore::available).
    pub fn busy(&self) -> usize {
        self.capacity() - self.available()
    }

    /// Acquires `units` units, blocking until the whole block is reserved or
    /// `cancel` fires, whichever happens first. Returns whether the units
    /// were granted; on `false` the pool is left exactly as it was.
    ///
    /// The request is serviced by the semaphore's worker; while another
    /// blocking acquisition occupies the queue slot, this call waits for the
    /// slot (or for `cancel`). `units` may exceed the capacity, in which case
    /// the call can only ever fail, and only once `cancel` fires.
    ///
    /// If `cancel` fires while the worker is already servicing the request,
    /// this call returns `false` immediately; the worker notices the same
    /// firing through the request's derived signal, rolls back any units it
    /// had reserved, and discards the unread verdict.
    ///
    /// The caller is responsible for returning granted units with
    /// [`release`](Semaphore::release). Whenever possible, prefer
    /// [`acquire_permit`](Semaphore::acquire_permit).
    ///
    /// # Examples
    ///
    /// ```
    /// use turnstile::sync::{CancelSignal, Semaphore};
    ///
    /// let sem = Semaphore::new(CancelSignal::never(), 4);
    /// assert!(sem.acquire(&CancelSignal::never(), 3));
    /// assert_eq!(1, sem.available());
    /// sem.release(3);
    /// ```
    pub fn acquire(&self, cancel: &CancelSignal, units: usize) -> bool {
        self.ensure_open();

        let (abandon, request_signal) = cancel.child();
        let (verdict_tx, verdict_rx) = flume::bounded(1);
        let request = AcquireRequest {
            amount: units,
            cancel: request_signal,
            outcome: verdict_tx,
        };

        // Win the single queue slot, unless the caller's signal fires first.
        let submitted = cancel.race(
            Selector::new().send(&self.requests, request, |sent| match sent {
                Ok(()) => Verdict::Queued,
                Err(_) => Verdict::Closed,
            }),
            Verdict::Interrupted,
        );
        match submitted {
            Verdict::Queued => {}
            Verdict::Interrupted => return false,
            _ => panic!("{}", TurnstileError::Closed),
        }

        // Wait for the worker's verdict or the caller's signal.
        let verdict = cancel.race(
            Selector::new().recv(&verdict_rx, |delivered| match delivered {
                Ok(granted) => Verdict::Delivered(granted),
                Err(_) => Verdict::Closed,
            }),
            Verdict::Interrupted,
        );
        // Severs the request's own signal; moot once a verdict was delivered.
        drop(abandon);
        match verdict {
            Verdict::Delivered(granted) => granted,
            Verdict::Interrupted => false,
            _ => panic!("{}", TurnstileError::Closed),
        }
    }

    /// Acquires `units` units if they are all available right now, returning
    /// immediately with `true` and reducing the available count by `units`.
    ///
    /// If insufficient units are available, returns `false` and the pool is
    /// unchanged. This method never suspends and bypasses the worker
    /// entirely; its check-then-take is not atomic with respect to a queued
    /// acquisition in flight, so it may fail even though `available()` just
    /// reported enough units.
    ///
    /// The caller is responsible for returning granted units with
    /// [`release`](Semaphore::release). Whenever possible, prefer
    /// [`try_acquire_permit`](Semaphore::try_acquire_permit).
    ///
    /// # Examples
    ///
    /// ```
    /// use turnstile::sync::{CancelSignal, Semaphore};
    ///
    /// let sem = Semaphore::new(CancelSignal::never(), 2);
    /// assert!(!sem.try_acquire(3));
    /// assert!(sem.try_acquire(2));
    /// assert_eq!(0, sem.available());
    /// sem.release(2);
    /// ```
    pub fn try_acquire(&self, units: usize) -> bool {
        self.ensure_open();

        if self.pool.available() < units {
            return false;
        }
        let mut taken = 0;
        while taken < units {
            if self.pool.take() {
                taken += 1;
                continue;
            }
            // Raced with a queued acquisition in flight; undo and bail.
            for _ in 0..taken {
                self.pool.put();
            }
            return false;
        }
        true
    }

    /// Returns `units` previously-held units to the pool.
    ///
    /// This needs to be paired with a successful [`acquire`] or
    /// [`try_acquire`]. You should not call this for units acquired through
    /// a [`Permit`].
    ///
    /// # Panics
    ///
    /// Returning more units than are held across the whole semaphore is a
    /// corrupted-accounting bug in the caller, not a recoverable condition,
    /// and panics rather than returning an error. Any mutating call after
    /// the lifecycle signal has fired panics as well.
    ///
    /// # Examples
    ///
    /// ```
    /// use turnstile::sync::{CancelSignal, Semaphore};
    ///
    /// let sem = Semaphore::new(CancelSignal::never(), 4);
    /// assert!(sem.try_acquire(4));
    /// sem.release(4);
    /// assert_eq!(4, sem.available());
    /// ```
    ///
    /// [`acquire`]: Semaphore::acquire
    /// [`try_acquire`]: Semaphore::try_acquire
    pub fn release(&self, units: usize) {
        self.ensure_open();

        let held = self.busy();
        if units > held {
            panic!(
                "{}",
                TurnstileError::InvalidRelease {
                    returned: units,
                    held,
                }
            );
        }
        for _ in 0..units {
            self.pool.put();
        }
    }

    /// Like [`acquire`](Semaphore::acquire), but returns a RAII [`Permit`]
    /// that releases the units when dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use turnstile::sync::{CancelSignal, Semaphore};
    ///
    /// let sem = Semaphore::new(CancelSignal::never(), 4);
    /// {
    ///     let _permit = sem.acquire_permit(&CancelSignal::never(), 4).unwrap();
    ///     // once it is dropped it can be acquired again
    ///     // going out of scope will drop
    /// }
    /// assert_eq!(4, sem.available());
    /// ```
    pub fn acquire_permit(&self, cancel: &CancelSignal, units: usize) -> Option<Permit<'_>> {
        if self.acquire(cancel, units) {
            Some(Permit { units, sem: self })
        } else {
            None
        }
    }

    /// Like [`try_acquire`](Semaphore::try_acquire), but returns a RAII
    /// [`Permit`] that releases the units when dropped.
    pub fn try_acquire_permit(&self, units: usize) -> Option<Permit<'_>> {
        if self.try_acquire(units) {
            Some(Permit { units, sem: self })
        } else {
            None
        }
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.is_fired() || self.requests.is_disconnected()
    }

    fn ensure_open(&self) {
        if self.is_closed() {
            panic!("{}", TurnstileError::Closed);
        }
    }
}

/// The permit is a RAII-friendly way to acquire semaphore units.
///
/// Units are held while the permit is alive, and released when the permit is
/// dropped.
#[derive(Debug)]
#[must_use = "units are only held while the permit is alive; an unused permit releases them immediately"]
pub struct Permit<'a> {
    units: usize,
    sem: &'a Semaphore,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        // After shutdown there is no pool left to return the units to.
        if !self.sem.is_closed() {
            self.sem.release(self.units);
        }
    }
}
