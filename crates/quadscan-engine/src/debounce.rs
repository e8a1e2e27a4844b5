// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rate limiting for outbound status: repeated feedback messages and overlay
// region updates.

use std::time::Duration;

use quadscan_core::FeedbackKind;

/// Suppresses a feedback message that repeats the previous one within the
/// repeat interval. A different message always passes.
#[derive(Debug, Clone)]
pub struct FeedbackDebouncer {
    interval: Duration,
    last: Option<(FeedbackKind, Duration)>,
}

impl FeedbackDebouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether `kind` should be emitted at `now`. Records it if so.
    pub fn offer(&mut self, kind: FeedbackKind, now: Duration) -> bool {
        if let Some((previous, at)) = self.last {
            let repeat = previous.message() == kind.message();
            let recent = now.checked_sub(at).is_some_and(|elapsed| elapsed < self.interval);
            if repeat && recent {
                return false;
            }
        }
        self.last = Some((kind, now));
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Lets an event through at most once per interval.
#[derive(Debug, Clone)]
pub struct OverlayThrottle {
    interval: Duration,
    last: Option<Duration>,
}

impl OverlayThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn ready(&mut self, now: Duration) -> bool {
        let due = match self.last {
            Some(last) => now.checked_sub(last).is_none_or(|elapsed| elapsed >= self.interval),
            None => true,
        };
        if due {
            self.last = Some(now);
        }
        due
    }

    /// Forget the last emission so the next update goes out immediately.
    pub fn force(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn repeated_message_is_suppressed_until_interval() {
        let mut d = FeedbackDebouncer::new(ms(2000));
        assert!(d.offer(FeedbackKind::HoldSteady, ms(0)));
        assert!(!d.offer(FeedbackKind::HoldSteady, ms(1999)));
        assert!(d.offer(FeedbackKind::HoldSteady, ms(2000)));
    }

    #[test]
    fn changed_message_passes_immediately() {
        let mut d = FeedbackDebouncer::new(ms(2000));
        assert!(d.offer(FeedbackKind::HoldSteady, ms(0)));
        assert!(d.offer(FeedbackKind::ImageBlurry, ms(10)));
        assert!(d.offer(FeedbackKind::HoldSteady, ms(20)));
    }

    #[test]
    fn overlay_throttle_spaces_updates() {
        let mut t = OverlayThrottle::new(ms(50));
        assert!(t.ready(ms(0)));
        assert!(!t.ready(ms(49)));
        assert!(t.ready(ms(50)));
        t.force();
        assert!(t.ready(ms(51)));
    }
}
