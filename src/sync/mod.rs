// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience

//! Set of synchronization primitives.
//!
//! Following primitives are provided.
//!
//! 1. Semaphore - A weighted counting semaphore. The semaphore maintains a
//!    pool of tickets. Each call to ['acquire'] suspends the calling thread
//!    if necessary until the requested number of units is reserved, and then
//!    takes them; the reservation is assembled by a worker thread owned by
//!    the semaphore so that concurrent multi-unit requests never interleave.
//!    ['try_acquire'] is the all-or-nothing fast path which fails instead of
//!    suspending, and ['release'] returns units to the pool.
//!
//! 2. CancelSignal - A composable one-shot cancellation signal, used both for
//!    the semaphore's lifecycle and to cancel or time out individual
//!    acquisitions. Signals can be fired explicitly through a
//!    ['CancelSource'], derived from a parent so that they fire together with
//!    it, or armed with a deadline.

mod cancel;
mod semaphore;

pub use self::{cancel::*, semaphore::*};
