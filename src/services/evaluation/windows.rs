use chrono::{Duration, NaiveDate};

use crate::error::{EvalError, EvalResult};

use super::types::{DateWindow, EvalOptions, EvalWindows};

/// Derives the Before/After/Last windows from one input date.
///
/// Before and After sit `guard` days away from the input date on either side;
/// Last is anchored at the newest date with any data for the site. The After
/// and Last windows may extend past `max_date`; aggregation then comes back
/// empty and the affected metric reports Inconclusive, which is the intended
/// soft failure mode for short history.
pub fn resolve_windows(
    input_date: NaiveDate,
    max_date: NaiveDate,
    options: &EvalOptions,
) -> EvalResult<EvalWindows> {
    options
        .validate()
        .map_err(EvalError::InvalidConfiguration)?;

    let period = Duration::days(options.period_days);
    let guard = Duration::days(options.guard_days);

    let before = DateWindow::new(input_date - guard - period, input_date - guard);
    let after = DateWindow::new(input_date + guard, input_date + guard + period);
    let last = DateWindow::new(max_date - period, max_date);

    if max_date < after.to {
        tracing::debug!(
            %input_date,
            %max_date,
            after_to = %after.to,
            "after window extends beyond available data; expect inconclusive metrics"
        );
    }

    Ok(EvalWindows { before, after, last })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn default_windows_match_guard_and_period_offsets() {
        let windows = resolve_windows(
            date(2024, 9, 21),
            date(2024, 11, 30),
            &EvalOptions::default(),
        )
        .expect("windows");

        assert_eq!(windows.before.from, date(2024, 9, 7));
        assert_eq!(windows.before.to, date(2024, 9, 14));
        assert_eq!(windows.after.from, date(2024, 9, 28));
        assert_eq!(windows.after.to, date(2024, 10, 5));
        assert_eq!(windows.last.from, date(2024, 11, 23));
        assert_eq!(windows.last.to, date(2024, 11, 30));

        // Window ordering invariant.
        assert!(windows.before.to <= windows.after.from);
        assert!(windows.after.to <= windows.last.from);
    }

    #[test]
    fn short_history_is_not_an_error() {
        // max_date before the after window ends: still resolves, the empty
        // aggregation downstream carries the signal.
        let windows = resolve_windows(
            date(2024, 9, 21),
            date(2024, 9, 25),
            &EvalOptions::default(),
        )
        .expect("windows");
        assert!(windows.last.to < windows.after.to);
    }

    #[test]
    fn invalid_options_are_rejected_before_computation() {
        let options = EvalOptions {
            period_days: -3,
            ..EvalOptions::default()
        };
        let err = resolve_windows(date(2024, 9, 21), date(2024, 11, 30), &options).unwrap_err();
        assert!(matches!(err, EvalError::InvalidConfiguration(_)));
    }

    #[test]
    fn zero_guard_puts_windows_adjacent_to_input_date() {
        let options = EvalOptions {
            guard_days: 0,
            ..EvalOptions::default()
        };
        let windows =
            resolve_windows(date(2024, 9, 21), date(2024, 11, 30), &options).expect("windows");
        assert_eq!(windows.before.to, date(2024, 9, 21));
        assert_eq!(windows.after.from, date(2024, 9, 21));
    }
}
