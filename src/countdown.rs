use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;

/// Duty timestamps travel as `DD/MM/YYYY HH:MM:SS` strings (24-hour time).
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Text shown once the countdown has run out.
pub const EXPIRED_TEXT: &str = "EXPIRED";

/// Background tick period in milliseconds. Anything comfortably under a
/// second keeps a seconds-resolution display honest.
pub const TICK_INTERVAL_MS: u64 = 250;

const MILLIS_PER_SECOND: i64 = 1000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

#[derive(Debug, Error)]
pub enum CountdownError {
    #[error("malformed timestamp '{input}': expected DD/MM/YYYY HH:MM:SS")]
    MalformedTimestamp {
        input: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Source of the current instant. The server uses the system clock; tests
/// inject a scripted one.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    Running,
    Expired,
}

/// Parse a duty timestamp, rejecting anything that is not a well-formed
/// `DD/MM/YYYY HH:MM:SS` with in-range fields.
pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime, CountdownError> {
    NaiveDateTime::parse_from_str(input.trim(), TIMESTAMP_FORMAT).map_err(|source| {
        CountdownError::MalformedTimestamp {
            input: input.to_string(),
            source,
        }
    })
}

/// Countdown to the end of a duty shift.
///
/// The deadline is anchored to the local clock at construction:
/// `deadline = now + (duty_end - server_now)`. Only the difference between
/// the two server-reported timestamps matters, so a skewed local wall clock
/// still counts down the right interval.
///
/// The state machine is one-way: once a tick observes a non-positive
/// remaining duration the countdown is `Expired`, the display reads
/// `EXPIRED`, and no later tick changes either again.
pub struct Countdown {
    deadline: DateTime<Utc>,
    state: CountdownState,
    display: String,
}

impl Countdown {
    pub fn new(
        server_now: &str,
        duty_end: &str,
        clock: &impl Clock,
    ) -> Result<Self, CountdownError> {
        // May be negative if the shift is already over.
        let offset = parse_timestamp(duty_end)? - parse_timestamp(server_now)?;
        let mut countdown = Self {
            deadline: clock.now() + offset,
            state: CountdownState::Running,
            display: String::new(),
        };
        countdown.tick(clock);
        Ok(countdown)
    }

    /// Time left until the deadline. Negative once the deadline has passed.
    pub fn remaining(&self, clock: &impl Clock) -> Duration {
        self.deadline - clock.now()
    }

    /// Advance the countdown by one observation of the clock.
    pub fn tick(&mut self, clock: &impl Clock) -> CountdownState {
        if self.state == CountdownState::Expired {
            return self.state;
        }

        let remaining = self.remaining(clock);
        if remaining <= Duration::zero() {
            self.state = CountdownState::Expired;
            self.display = EXPIRED_TEXT.to_string();
        } else {
            self.display = format_remaining(remaining);
        }
        self.state
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn is_expired(&self) -> bool {
        self.state == CountdownState::Expired
    }

    /// Rendering produced by the most recent tick.
    pub fn display(&self) -> &str {
        &self.display
    }
}

/// Format a positive remaining duration as `HH:MM:SS`.
///
/// Hours wrap modulo 24: a remainder of a day or more silently loses its day
/// count. Duty shifts are assumed to fit inside 24 hours.
pub fn format_remaining(remaining: Duration) -> String {
    let millis = remaining.num_milliseconds();
    let hours = (millis % MILLIS_PER_DAY) / MILLIS_PER_HOUR;
    let minutes = (millis % MILLIS_PER_HOUR) / MILLIS_PER_MINUTE;
    let seconds = (millis % MILLIS_PER_MINUTE) / MILLIS_PER_SECOND;

    format!(
        "{}:{}:{}",
        two_digits(hours),
        two_digits(minutes),
        two_digits(seconds)
    )
}

fn two_digits(n: i64) -> String {
    if n > 9 {
        n.to_string()
    } else {
        format!("0{}", n)
    }
}

/// Drive a shared countdown until it expires.
///
/// The interval is owned by the spawned task and dropped when the loop
/// breaks on the expiring tick, so the tick can never fire again after the
/// transition.
pub fn spawn_ticker(countdown: Arc<Mutex<Countdown>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(TICK_INTERVAL_MS));
        loop {
            interval.tick().await;
            let state = {
                let mut countdown = countdown.lock().unwrap();
                countdown.tick(&SystemClock)
            };
            if state == CountdownState::Expired {
                tracing::debug!("countdown expired, ticker stopped");
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};
    use std::cell::Cell;

    struct FakeClock {
        now: Cell<DateTime<Utc>>,
    }

    impl FakeClock {
        fn at(now: DateTime<Utc>) -> Self {
            Self {
                now: Cell::new(now),
            }
        }

        fn advance(&self, delta: Duration) {
            self.now.set(self.now.get() + delta);
        }

        fn rewind(&self, delta: Duration) {
            self.now.set(self.now.get() - delta);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            self.now.get()
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_timestamp_day_month_order() {
        let parsed = parse_timestamp("25/12/2024 09:30:00").unwrap();

        // 25/12 is the 25th of December, not month 25
        assert_eq!(parsed.year(), 2024);
        assert_eq!(parsed.month(), 12);
        assert_eq!(parsed.day(), 25);
        assert_eq!(parsed.hour(), 9);
        assert_eq!(parsed.minute(), 30);
        assert_eq!(parsed.second(), 0);
    }

    #[test]
    fn test_parse_timestamp_rejects_malformed_input() {
        // Wrong separators, missing time part, out-of-range fields
        assert!(parse_timestamp("2024-12-25 09:30:00").is_err());
        assert!(parse_timestamp("25/12/2024").is_err());
        assert!(parse_timestamp("99/99/9999 99:99:99").is_err());
        assert!(parse_timestamp("").is_err());

        let err = parse_timestamp("not a timestamp").unwrap_err();
        assert!(err.to_string().contains("not a timestamp"));
    }

    #[test]
    fn test_parse_timestamp_rejects_rolled_over_month() {
        // Month 13 must be an error, not a silent roll into next year
        assert!(parse_timestamp("01/13/2024 00:00:00").is_err());
    }

    #[test]
    fn test_initial_remaining_equals_server_interval() {
        let clock = FakeClock::at(utc(2024, 12, 25, 9, 30, 0));
        let countdown =
            Countdown::new("25/12/2024 09:30:00", "25/12/2024 12:30:00", &clock).unwrap();

        assert_eq!(countdown.remaining(&clock), Duration::hours(3));
        assert_eq!(countdown.state(), CountdownState::Running);
    }

    #[test]
    fn test_deadline_anchored_to_local_clock() {
        // Local clock is wildly wrong; the countdown only trusts the
        // server-reported difference.
        let clock = FakeClock::at(utc(1999, 1, 1, 0, 0, 0));
        let countdown =
            Countdown::new("25/12/2024 09:30:00", "25/12/2024 10:00:00", &clock).unwrap();

        assert_eq!(countdown.remaining(&clock), Duration::minutes(30));
    }

    #[test]
    fn test_remaining_is_non_increasing_across_ticks() {
        let clock = FakeClock::at(utc(2024, 12, 25, 9, 0, 0));
        let mut countdown =
            Countdown::new("25/12/2024 09:00:00", "25/12/2024 12:00:00", &clock).unwrap();

        let mut previous = countdown.remaining(&clock);
        for _ in 0..10 {
            clock.advance(Duration::seconds(17));
            countdown.tick(&clock);
            let current = countdown.remaining(&clock);
            assert!(current <= previous);
            previous = current;
        }
    }

    #[test]
    fn test_display_formats_remaining_time() {
        let clock = FakeClock::at(utc(2024, 12, 25, 9, 0, 0));
        let mut countdown =
            Countdown::new("25/12/2024 09:00:00", "25/12/2024 10:01:01", &clock).unwrap();

        // 1h 1m 1s left
        assert_eq!(countdown.display(), "01:01:01");

        clock.advance(Duration::hours(1) + Duration::seconds(2));
        countdown.tick(&clock);
        assert_eq!(countdown.display(), "00:00:59");
    }

    #[test]
    fn test_expiry_is_terminal() {
        let clock = FakeClock::at(utc(2024, 12, 25, 9, 0, 0));
        let mut countdown =
            Countdown::new("25/12/2024 09:00:00", "25/12/2024 09:01:00", &clock).unwrap();

        clock.advance(Duration::minutes(1));
        assert_eq!(countdown.tick(&clock), CountdownState::Expired);
        assert_eq!(countdown.display(), EXPIRED_TEXT);

        // Even if the clock is adjusted backwards, Expired never transitions
        // back to Running.
        clock.rewind(Duration::minutes(30));
        assert_eq!(countdown.tick(&clock), CountdownState::Expired);
        assert_eq!(countdown.display(), EXPIRED_TEXT);
    }

    #[test]
    fn test_already_finished_shift_expires_on_first_tick() {
        let clock = FakeClock::at(utc(2024, 12, 25, 9, 0, 0));
        let countdown =
            Countdown::new("25/12/2024 09:00:00", "25/12/2024 08:00:00", &clock).unwrap();

        assert!(countdown.is_expired());
        assert_eq!(countdown.display(), EXPIRED_TEXT);
    }

    #[test]
    fn test_format_remaining_two_digit_padding() {
        assert_eq!(format_remaining(Duration::milliseconds(3_661_000)), "01:01:01");
        assert_eq!(format_remaining(Duration::milliseconds(59_000)), "00:00:59");
        assert_eq!(format_remaining(Duration::seconds(45_296)), "12:34:56");
    }

    #[test]
    fn test_format_remaining_wraps_at_a_day() {
        // 25 hours shows as 1 hour, days are not displayed
        assert_eq!(format_remaining(Duration::hours(25)), "01:00:00");
    }
}
