use crate::errors::{Error, Result};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Compute the next fire time for a task.
///
/// An interval beats a times-of-day list when both are configured. Times of
/// day are evaluated in the given civil timezone, not machine-local time:
/// the earliest listed time still in the future today wins, otherwise the
/// earliest listed time rolls to tomorrow. A task with neither recurrence is
/// an error; the caller decides whether that is fatal.
pub fn next_fire(
    interval_minutes: Option<i64>,
    times: &[NaiveTime],
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    if let Some(minutes) = interval_minutes {
        if minutes <= 0 {
            return Err(Error::Schedule(format!(
                "interval must be positive, got {minutes}"
            )));
        }
        return Ok(now + Duration::minutes(minutes));
    }

    if times.is_empty() {
        return Err(Error::Schedule(
            "no recurrence configured: neither interval nor times".to_string(),
        ));
    }

    let local_now = now.with_timezone(&tz);
    let today = local_now.date_naive();

    if let Some(next_today) = times
        .iter()
        .filter(|t| **t > local_now.time())
        .min()
        .copied()
    {
        return resolve_local(tz, today.and_time(next_today));
    }

    // Everything listed has already passed today.
    let earliest = times
        .iter()
        .min()
        .copied()
        .ok_or_else(|| Error::Schedule("empty times list".to_string()))?;
    let tomorrow = today
        .succ_opt()
        .ok_or_else(|| Error::Schedule("date overflow computing next day".to_string()))?;
    resolve_local(tz, tomorrow.and_time(earliest))
}

/// Map a civil datetime to UTC. An ambiguous local time (fall-back) takes
/// the earlier instant; a skipped local time (spring-forward) slides one
/// hour later into the gap's far side.
fn resolve_local(tz: Tz, naive: chrono::NaiveDateTime) -> Result<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        chrono::LocalResult::Ambiguous(earlier, _) => Ok(earlier.with_timezone(&Utc)),
        chrono::LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| {
                    Error::Schedule(format!("unresolvable local time {naive} in {tz}"))
                })
        }
    }
}
