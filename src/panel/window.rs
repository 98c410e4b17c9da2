//! Date windows for the `fdate1`/`fdate2` query parameters.

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

const DAY_START: &str = "00:00:00";
const DAY_END: &str = "23:59:59";

/// Which rows a report asks the panel for.
///
/// In TOML: `window = "today"`, `window = { since = "2026-01-01" }` or
/// `window = { fixed = { from = "...", to = "..." } }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateWindow {
    /// Today 00:00:00 through today 23:59:59.
    Today,
    /// First of the current month through today.
    MonthToDate,
    /// A fixed start date (`YYYY-MM-DD`) through today.
    Since(String),
    /// Literal bounds, sent verbatim.
    Fixed { from: String, to: String },
    /// Send no date parameters at all.
    None,
}

impl DateWindow {
    /// Check that a `since` date parses. Other variants are always valid.
    pub fn validate(&self) -> Result<(), String> {
        if let Self::Since(d) = self {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|e| format!("invalid since date {d:?}: {e}"))?;
        }
        Ok(())
    }

    /// Render the `(fdate1, fdate2)` pair relative to `today`.
    pub fn bounds_for(&self, today: NaiveDate) -> Option<(String, String)> {
        let end = format!("{} {DAY_END}", today.format("%Y-%m-%d"));
        match self {
            Self::Today => Some((format!("{} {DAY_START}", today.format("%Y-%m-%d")), end)),
            Self::MonthToDate => {
                let first = today.with_day(1).unwrap_or(today);
                Some((format!("{} {DAY_START}", first.format("%Y-%m-%d")), end))
            }
            Self::Since(d) => Some((format!("{d} {DAY_START}"), end)),
            Self::Fixed { from, to } => Some((from.clone(), to.clone())),
            Self::None => None,
        }
    }

    /// [`bounds_for`](Self::bounds_for) using the local calendar date.
    pub fn bounds(&self) -> Option<(String, String)> {
        self.bounds_for(Local::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_today() {
        let (from, to) = DateWindow::Today.bounds_for(day(2026, 3, 14)).unwrap();
        assert_eq!(from, "2026-03-14 00:00:00");
        assert_eq!(to, "2026-03-14 23:59:59");
    }

    #[test]
    fn test_month_to_date() {
        let (from, to) = DateWindow::MonthToDate.bounds_for(day(2026, 3, 14)).unwrap();
        assert_eq!(from, "2026-03-01 00:00:00");
        assert_eq!(to, "2026-03-14 23:59:59");
    }

    #[test]
    fn test_since_and_fixed() {
        let w = DateWindow::Since("2026-01-01".into());
        assert!(w.validate().is_ok());
        let (from, _) = w.bounds_for(day(2026, 2, 2)).unwrap();
        assert_eq!(from, "2026-01-01 00:00:00");

        let fixed = DateWindow::Fixed {
            from: "2026-01-07 00:00:00".into(),
            to: "2259-12-20 23:59:59".into(),
        };
        assert_eq!(
            fixed.bounds_for(day(2030, 1, 1)),
            Some(("2026-01-07 00:00:00".into(), "2259-12-20 23:59:59".into()))
        );
        assert_eq!(DateWindow::None.bounds_for(day(2026, 1, 1)), None);
    }

    #[test]
    fn test_since_invalid() {
        assert!(DateWindow::Since("01/01/2026".into()).validate().is_err());
    }

    #[test]
    fn test_toml_shapes() {
        #[derive(Deserialize)]
        struct W {
            window: DateWindow,
        }
        let w: W = toml::from_str(r#"window = "month_to_date""#).unwrap();
        assert_eq!(w.window, DateWindow::MonthToDate);
        let w: W = toml::from_str(r#"window = { since = "2026-01-01" }"#).unwrap();
        assert_eq!(w.window, DateWindow::Since("2026-01-01".into()));
    }
}
