// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2020 Datadog, Inc.
//
use std::time::{Duration, Instant};

use flume::{Receiver, Selector, Sender};
use smallvec::SmallVec;

/// A one-shot cancellation signal.
///
/// A signal starts unfired and fires at most once; once fired it stays fired.
/// Firing happens through the paired [`CancelSource`], through a deadline, or
/// through a parent signal the signal was derived from. Every blocking wait
/// in this crate observes the signals handed to it, so firing a signal
/// unblocks whatever is waiting on it.
///
/// Signals are cheap to clone and every clone observes the same firing.
///
/// # Examples
///
/// ```
/// use turnstile::sync::CancelSignal;
///
/// let (source, signal) = CancelSignal::source();
/// assert!(!signal.is_fired());
/// source.fire();
/// assert!(signal.is_fired());
/// ```
#[derive(Clone, Debug)]
pub struct CancelSignal {
    trip: Option<Receiver<()>>,
    deadline: Option<Instant>,
    parent: Option<Box<CancelSignal>>,
}

/// The firing end of a [`CancelSignal`].
///
/// The signal observes the source's channel being disconnected, so dropping
/// the source fires the signal just as [`CancelSource::fire`] does. Hold on
/// to the source for as long as the signal must stay unfired.
#[derive(Debug)]
pub struct CancelSource {
    _trip: Sender<()>,
}

impl CancelSource {
    /// Fires the paired signal. Dropping the source is equivalent.
    pub fn fire(self) {}
}

impl CancelSignal {
    /// A signal that never fires.
    ///
    /// # Examples
    ///
    /// ```
    /// use turnstile::sync::CancelSignal;
    ///
    /// assert!(!CancelSignal::never().is_fired());
    /// ```
    pub fn never() -> CancelSignal {
        CancelSignal {
            trip: None,
            deadline: None,
            parent: None,
        }
    }

    /// Creates an explicitly triggerable signal and its firing end.
    pub fn source() -> (CancelSource, CancelSignal) {
        // Rendezvous channel: nothing is ever sent, the signal only
        // observes disconnection.
        let (tx, rx) = flume::bounded(0);
        (
            CancelSource { _trip: tx },
            CancelSignal {
                trip: Some(rx),
                deadline: None,
                parent: None,
            },
        )
    }

    /// Derives a signal that fires together with `self` or when its own
    /// source fires, whichever happens first.
    ///
    /// # Examples
    ///
    /// ```
    /// use turnstile::sync::CancelSignal;
    ///
    /// let (parent_source, parent) = CancelSignal::source();
    /// let (_child_source, child) = parent.child();
    /// assert!(!child.is_fired());
    /// parent_source.fire();
    /// assert!(child.is_fired());
    /// ```
    pub fn child(&self) -> (CancelSource, CancelSignal) {
        let (tx, rx) = flume::bounded(0);
        (
            CancelSource { _trip: tx },
            CancelSignal {
                trip: Some(rx),
                deadline: None,
                parent: Some(Box::new(self.clone())),
            },
        )
    }

    /// Derives a signal that additionally fires once `deadline` is reached.
    pub fn with_deadline(&self, deadline: Instant) -> CancelSignal {
        CancelSignal {
            trip: None,
            deadline: Some(deadline),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Derives a signal that additionally fires after `timeout` elapses.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use turnstile::sync::CancelSignal;
    ///
    /// let signal = CancelSignal::never().with_timeout(Duration::ZERO);
    /// assert!(signal.is_fired());
    /// ```
    pub fn with_timeout(&self, timeout: Duration) -> CancelSignal {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            // A deadline beyond representable time will not be reached.
            None => self.clone(),
        }
    }

    /// Whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        if self.deadline.map_or(false, |d| Instant::now() >= d) {
            return true;
        }
        if self.trip.as_ref().map_or(false, |rx| rx.is_disconnected()) {
            return true;
        }
        self.parent.as_ref().map_or(false, |p| p.is_fired())
    }

    /// The earliest deadline armed anywhere in this signal's derivation
    /// chain, if any.
    pub fn deadline(&self) -> Option<Instant> {
        let inherited = self.parent.as_ref().and_then(|p| p.deadline());
        match (self.deadline, inherited) {
            (Some(own), Some(up)) => Some(own.min(up)),
            (own, up) => own.or(up),
        }
    }

    /// The selectable receivers of this signal's derivation chain. Each one
    /// completes with a disconnection when its source fires.
    pub(crate) fn watch_points(&self) -> SmallVec<[&Receiver<()>; 2]> {
        let mut points = SmallVec::new();
        let mut signal = Some(self);
        while let Some(s) = signal {
            if let Some(rx) = &s.trip {
                points.push(rx);
            }
            signal = s.parent.as_deref();
        }
        points
    }

    /// Completes `sel`, or returns `fired` if this signal fires first.
    pub(crate) fn race<'a, T: Clone + 'a>(&'a self, mut sel: Selector<'a, T>, fired: T) -> T {
        for trip in self.watch_points() {
            let fired = fired.clone();
            sel = sel.recv(trip, move |_| fired.clone());
        }
        match self.deadline() {
            Some(deadline) => sel.wait_deadline(deadline).unwrap_or(fired),
            None => sel.wait(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn never_does_not_fire() {
        let signal = CancelSignal::never();
        assert!(!signal.is_fired());
        assert_eq!(None, signal.deadline());
    }

    #[test]
    fn source_fires_explicitly() {
        let (source, signal) = CancelSignal::source();
        assert!(!signal.is_fired());
        source.fire();
        assert!(signal.is_fired());
    }

    #[test]
    fn dropping_the_source_fires() {
        let (source, signal) = CancelSignal::source();
        drop(source);
        assert!(signal.is_fired());
    }

    #[test]
    fn clones_observe_the_same_firing() {
        let (source, signal) = CancelSignal::source();
        let observer = signal.clone();
        source.fire();
        assert!(signal.is_fired());
        assert!(observer.is_fired());
    }

    #[test]
    fn child_fires_with_its_parent() {
        let (parent_source, parent) = CancelSignal::source();
        let (_child_source, child) = parent.child();
        assert!(!child.is_fired());
        parent_source.fire();
        assert!(child.is_fired());
    }

    #[test]
    fn child_fires_on_its_own_without_the_parent() {
        let (parent_source, parent) = CancelSignal::source();
        let (child_source, child) = parent.child();
        child_source.fire();
        assert!(child.is_fired());
        assert!(!parent.is_fired());
        drop(parent_source);
    }

    #[test]
    fn deadline_signal_fires_after_the_timeout() {
        let signal = CancelSignal::never().with_timeout(Duration::from_millis(20));
        assert!(signal.deadline().is_some());
        thread::sleep(Duration::from_millis(40));
        assert!(signal.is_fired());
    }

    #[test]
    fn earliest_deadline_in_the_chain_wins() {
        let parent = CancelSignal::never().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(600));
        assert_eq!(parent.deadline(), child.deadline());
    }

    #[test]
    fn zero_timeout_is_already_fired() {
        assert!(CancelSignal::never()
            .with_timeout(Duration::ZERO)
            .is_fired());
    }
}
