//! Cron-expression occurrence computation.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::domain::errors::{SchedulerError, SchedulerResult};

/// Given a cron expression and a reference instant, computes occurrences.
/// Must be side-effect free and deterministic.
pub trait OccurrenceOracle: Send + Sync {
    /// The first occurrence strictly after `after`, or `None` if the
    /// expression produces no further occurrences (never the case for a
    /// well-formed standard cron expression, but kept fallible for
    /// exotic or exhausted schedules).
    fn next(&self, expression: &str, after: DateTime<Utc>) -> SchedulerResult<Option<DateTime<Utc>>>;

    /// All occurrences in `(from, to]`, in ascending order. Errors if the
    /// expression is malformed.
    fn between(
        &self,
        expression: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SchedulerResult<Vec<DateTime<Utc>>>;
}

/// `OccurrenceOracle` backed by the `cron` crate's schedule iterator,
/// which parses the seconds-inclusive six-field form (second minute hour
/// day-of-month month day-of-week).
#[derive(Debug, Default, Clone, Copy)]
pub struct CronOracle;

impl CronOracle {
    fn parse(expression: &str) -> SchedulerResult<Option<Schedule>> {
        if expression.trim().is_empty() {
            return Ok(None);
        }
        let schedule = Schedule::from_str(expression)
            .map_err(|e| SchedulerError::InvalidExpression(format!("{expression}: {e}")))?;
        Ok(Some(schedule))
    }
}

impl OccurrenceOracle for CronOracle {
    fn next(&self, expression: &str, after: DateTime<Utc>) -> SchedulerResult<Option<DateTime<Utc>>> {
        let Some(schedule) = Self::parse(expression)? else {
            return Ok(None);
        };
        Ok(schedule.after(&after).next())
    }

    fn between(
        &self,
        expression: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SchedulerResult<Vec<DateTime<Utc>>> {
        if to < from {
            return Err(SchedulerError::InvalidSeriesBounds);
        }
        let Some(schedule) = Self::parse(expression)? else {
            return Ok(Vec::new());
        };
        Ok(schedule
            .after(&from)
            .take_while(|occurrence| *occurrence <= to)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn empty_expression_yields_no_occurrence() {
        let oracle = CronOracle;
        let now = Utc::now();
        assert_eq!(oracle.next("", now).unwrap(), None);
        assert_eq!(oracle.next("   ", now).unwrap(), None);
    }

    #[test]
    fn invalid_expression_is_rejected() {
        let oracle = CronOracle;
        let result = oracle.next("not a cron expression", Utc::now());
        assert!(matches!(result, Err(SchedulerError::InvalidExpression(_))));
    }

    #[test]
    fn hourly_expression_lands_on_the_hour() {
        let oracle = CronOracle;
        let reference = Utc.with_ymd_and_hms(2026, 1, 1, 10, 15, 0).unwrap();
        let next = oracle.next("0 0 * * * *", reference).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn between_is_ascending_and_bounded() {
        let oracle = CronOracle;
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap();
        let occurrences = oracle.between("0 0 * * * *", from, to).unwrap();
        assert_eq!(
            occurrences,
            vec![
                Utc.with_ymd_and_hms(2026, 1, 1, 1, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 1, 1, 2, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn between_rejects_inverted_bounds() {
        let oracle = CronOracle;
        let now = Utc::now();
        let result = oracle.between("0 0 * * * *", now, now - chrono::Duration::hours(1));
        assert!(matches!(result, Err(SchedulerError::InvalidSeriesBounds)));
    }
}
