// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2020 Datadog, Inc.
//
//! # Turnstile - a weighted, cancellable counting semaphore.
//!
//! ## What is Turnstile
//!
//! Turnstile provides a counting semaphore whose units can be acquired and
//! released in arbitrary-size blocks by any number of threads. Unlike the
//! textbook construction there is no mutex-protected counter and no condition
//! variable: the available units live as tickets in a bounded channel, and
//! every blocking acquisition is serialized through a single worker thread
//! owned by the semaphore, fed by a request queue of depth one. The worker is
//! the only place where a multi-unit reservation is assembled, so no lock is
//! needed around the "take up to N units, roll back on failure" sequence.
//!
//! Blocking acquisitions are cancellable. Cancellation is modeled by
//! [`CancelSignal`](crate::sync::CancelSignal), a composable one-shot signal
//! that can be fired explicitly, derived from a parent signal, or armed with a
//! deadline; a timeout is nothing more than a signal that fires on its own
//! after a while. A cancelled acquisition always rolls back completely: units
//! reserved before the signal fired are returned to the pool before the
//! failure is reported.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use turnstile::sync::{CancelSignal, Semaphore};
//!
//! let sem = Semaphore::new(CancelSignal::never(), 4);
//!
//! assert!(sem.acquire(&CancelSignal::never(), 2));
//! assert_eq!(sem.available(), 2);
//! sem.release(2);
//!
//! // More units than the semaphore will ever have: fails once the
//! // deadline fires, leaving the pool exactly as it was.
//! let hurried = CancelSignal::never().with_timeout(Duration::from_millis(20));
//! assert!(!sem.acquire(&hurried, 8));
//! ```
//!
//! ## Fast path
//!
//! [`try_acquire`](crate::sync::Semaphore::try_acquire) and
//! [`release`](crate::sync::Semaphore::release) operate on the ticket pool
//! directly from the calling thread, bypassing the worker. Individual ticket
//! transfers are atomic, so the pool is never corrupted, but composite
//! guarantees like "if `available() >= n` then `try_acquire(n)` succeeds" do
//! not hold while a queued acquisition is in flight. This is a deliberate
//! trade-off: funneling the fast path through the worker would serialize
//! everything.
//!
//! ## Misuse is fatal
//!
//! Returning units that were never handed out corrupts accounting that this
//! crate cannot repair, so [`release`](crate::sync::Semaphore::release) panics
//! instead of reporting an error, as does any mutating call made after the
//! semaphore's lifecycle signal has fired. Failed acquisitions, on the other
//! hand, are ordinary `false` returns and the caller is free to retry.

mod error;
pub mod sync;

pub use enclose::enclose;
pub use error::TurnstileError;
