//! Completion gate: is an event final enough to fetch?
//!
//! The decision is a pure function of the scheduled kickoff, a buffer
//! covering game length plus margin, and the current time. Events with no
//! usable kickoff are never ready.

use chrono::{DateTime, TimeDelta, Utc};
use gridiron_stats_models::EventRef;

/// Default buffer after kickoff before an event counts as final.
pub const DEFAULT_BUFFER_MINUTES: i64 = 180;

/// Gate outcome for a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionDecision {
    /// Not final yet, or the kickoff time is unknown.
    Pending,
    /// Final; safe to fetch.
    ReadyToFetch,
    /// Already loaded by an earlier run.
    AlreadyLoaded,
}

/// Decides whether `event` is ready at `now`.
///
/// Ready iff `now >= scheduled_at + buffer`. A missing kickoff is logged
/// and reported as [`CompletionDecision::Pending`].
#[must_use]
pub fn decide(event: &EventRef, now: DateTime<Utc>, buffer: TimeDelta) -> CompletionDecision {
    let Some(scheduled_at) = event.scheduled_at else {
        log::warn!(
            "Event {} has no usable kickoff time, holding as pending",
            event.id
        );
        return CompletionDecision::Pending;
    };

    match scheduled_at.checked_add_signed(buffer) {
        Some(ready_at) if now >= ready_at => CompletionDecision::ReadyToFetch,
        Some(_) => CompletionDecision::Pending,
        None => {
            log::warn!("Event {}: kickoff plus buffer overflows, holding", event.id);
            CompletionDecision::Pending
        }
    }
}

/// Like [`decide`], but reports [`CompletionDecision::AlreadyLoaded`] for
/// events the progress tracker already has as completed, whatever their
/// kickoff.
#[must_use]
pub fn classify(
    event: &EventRef,
    now: DateTime<Utc>,
    buffer: TimeDelta,
    already_loaded: bool,
) -> CompletionDecision {
    if already_loaded {
        CompletionDecision::AlreadyLoaded
    } else {
        decide(event, now, buffer)
    }
}

#[cfg(test)]
mod tests {
    use gridiron_stats_models::{SeasonType, Week};

    use super::*;

    fn event(id: &str, scheduled_at: Option<DateTime<Utc>>) -> EventRef {
        EventRef {
            id: id.to_string(),
            url: format!("https://www.espn.com/nfl/game/_/gameId/{id}"),
            scheduled_at,
            event_date: None,
            season: 2025,
            week: Week::Number(1),
            season_type: SeasonType::Regular,
            matchup: None,
        }
    }

    fn kickoff() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-09-07T17:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn pending_one_second_before_buffer_elapses() {
        let buffer = TimeDelta::minutes(DEFAULT_BUFFER_MINUTES);
        let e = event("1", Some(kickoff()));
        let now = kickoff() + buffer - TimeDelta::seconds(1);
        assert_eq!(decide(&e, now, buffer), CompletionDecision::Pending);
    }

    #[test]
    fn ready_one_second_after_buffer_elapses() {
        let buffer = TimeDelta::minutes(DEFAULT_BUFFER_MINUTES);
        let e = event("1", Some(kickoff()));
        let now = kickoff() + buffer + TimeDelta::seconds(1);
        assert_eq!(decide(&e, now, buffer), CompletionDecision::ReadyToFetch);
    }

    #[test]
    fn ready_exactly_at_boundary() {
        let buffer = TimeDelta::hours(3);
        let e = event("1", Some(kickoff()));
        assert_eq!(
            decide(&e, kickoff() + buffer, buffer),
            CompletionDecision::ReadyToFetch
        );
    }

    #[test]
    fn missing_kickoff_fails_closed() {
        let e = event("1", None);
        let far_future = kickoff() + TimeDelta::days(365);
        assert_eq!(
            decide(&e, far_future, TimeDelta::hours(3)),
            CompletionDecision::Pending
        );
    }

    #[test]
    fn classify_reports_already_loaded_first() {
        let e = event("1", Some(kickoff()));
        assert_eq!(
            classify(&e, kickoff(), TimeDelta::hours(3), true),
            CompletionDecision::AlreadyLoaded
        );
        assert_eq!(
            classify(&e, kickoff(), TimeDelta::hours(3), false),
            CompletionDecision::Pending
        );
        assert_eq!(
            classify(&event("2", None), kickoff(), TimeDelta::hours(3), true),
            CompletionDecision::AlreadyLoaded
        );
    }
}
