// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2020 Datadog, Inc.
//
use thiserror::Error;

/// Composite error type for every hard failure turnstile produces.
///
/// Soft failures (an acquisition that could not complete before its signal
/// fired) are plain `false` returns and never construct one of these. The
/// variants below describe corrupted bookkeeping on the caller's side and are
/// used as panic payloads rather than returned: they are not conditions to
/// retry.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// More units returned than are held across the whole semaphore.
    /// Includes the returned and held counts as debugging metadata.
    #[error("invalid release: {returned} units returned but only {held} are held")]
    InvalidRelease {
        /// Units the caller tried to return
        returned: usize,
        /// Units held across the semaphore at the time of the call
        held: usize,
    },

    /// A mutating operation was attempted after the semaphore's lifecycle
    /// signal fired and its channels were closed.
    #[error("semaphore is closed")]
    Closed,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn invalid_release_display_carries_both_counts() {
        let err = TurnstileError::InvalidRelease {
            returned: 110,
            held: 100,
        };
        assert_eq!(
            "invalid release: 110 units returned but only 100 are held",
            format!("{}", err)
        );
    }

    #[test]
    fn closed_display() {
        assert_eq!("semaphore is closed", format!("{}", TurnstileError::Closed));
    }
}
