//! Civil-zone calendar and the clock abstraction every component reads time through.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Calendar date in the configured quiz zone, keying one quiz per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct QuizDate(pub NaiveDate);

impl fmt::Display for QuizDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for QuizDate {
    type Err = chrono::ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map(QuizDate)
    }
}

/// Source of "now". All wall-clock reads outside this module go through it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the operating system.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock used by tests and local replays.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock") = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock lock");
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// The anchor instants of one quiz day, all in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    /// T−10m: quiz locks, no further edits to the question list.
    pub lock_at: DateTime<Utc>,
    /// T−5m: payments captured after this instant are LATE.
    pub payment_cutoff_at: DateTime<Utc>,
    /// T: quiz goes live and the advancement loop arms.
    pub live_at: DateTime<Utc>,
    /// T+30m: quiz ends and finalization starts.
    pub end_at: DateTime<Utc>,
}

/// Resolves civil dates and daily deadlines in the configured zone.
#[derive(Debug, Clone)]
pub struct Calendar {
    offset: FixedOffset,
    zone_label: String,
    live_time: NaiveTime,
    lock_lead: Duration,
    payment_cutoff_lead: Duration,
    quiz_duration: Duration,
}

impl Calendar {
    pub fn new(
        offset: FixedOffset,
        zone_label: impl Into<String>,
        live_time: NaiveTime,
        lock_lead: Duration,
        payment_cutoff_lead: Duration,
        quiz_duration: Duration,
    ) -> Self {
        Self {
            offset,
            zone_label: zone_label.into(),
            live_time,
            lock_lead,
            payment_cutoff_lead,
            quiz_duration,
        }
    }

    /// Label of the configured zone, e.g. `Asia/Kolkata`.
    pub fn zone_label(&self) -> &str {
        &self.zone_label
    }

    /// The civil date in the quiz zone at the given instant.
    pub fn today(&self, now: DateTime<Utc>) -> QuizDate {
        QuizDate(now.with_timezone(&self.offset).date_naive())
    }

    /// Anchor deadlines for the given quiz date.
    pub fn deadlines_for(&self, date: QuizDate) -> Deadlines {
        let live_local = date
            .0
            .and_time(self.live_time)
            .and_local_timezone(self.offset)
            // A fixed offset maps every local time to exactly one instant.
            .single()
            .expect("fixed offset has no ambiguous local times");
        let live_at = live_local.with_timezone(&Utc);

        Deadlines {
            lock_at: live_at - self.lock_lead,
            payment_cutoff_at: live_at - self.payment_cutoff_lead,
            live_at,
            end_at: live_at + self.quiz_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ist_calendar() -> Calendar {
        Calendar::new(
            FixedOffset::east_opt(5 * 3600 + 1800).unwrap(),
            "Asia/Kolkata",
            NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            Duration::minutes(10),
            Duration::minutes(5),
            Duration::minutes(30),
        )
    }

    #[test]
    fn today_rolls_over_at_local_midnight() {
        let calendar = ist_calendar();
        // 18:35 UTC = 00:05 IST the next day.
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 18, 35, 0).unwrap();
        assert_eq!(calendar.today(now).to_string(), "2025-03-02");

        let earlier = Utc.with_ymd_and_hms(2025, 3, 1, 18, 25, 0).unwrap();
        assert_eq!(calendar.today(earlier).to_string(), "2025-03-01");
    }

    #[test]
    fn deadlines_are_anchored_to_live_start() {
        let calendar = ist_calendar();
        let date: QuizDate = "2025-03-02".parse().unwrap();
        let deadlines = calendar.deadlines_for(date);

        // 20:00 IST = 14:30 UTC.
        let live = Utc.with_ymd_and_hms(2025, 3, 2, 14, 30, 0).unwrap();
        assert_eq!(deadlines.live_at, live);
        assert_eq!(deadlines.lock_at, live - Duration::minutes(10));
        assert_eq!(deadlines.payment_cutoff_at, live - Duration::minutes(5));
        assert_eq!(deadlines.end_at, live + Duration::minutes(30));
        assert!(deadlines.lock_at <= deadlines.payment_cutoff_at);
        assert!(deadlines.payment_cutoff_at <= deadlines.live_at);
    }

    #[test]
    fn quiz_date_round_trips_through_display() {
        let date: QuizDate = "2025-12-31".parse().unwrap();
        assert_eq!(date.to_string(), "2025-12-31");
        assert!("2025-13-01".parse::<QuizDate>().is_err());
    }

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2025, 3, 2, 14, 30, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::seconds(15));
        assert_eq!(clock.now(), start + Duration::seconds(15));
    }
}
