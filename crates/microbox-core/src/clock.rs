//! # Local Clock Face
//!
//! Formats the local wall clock the way the dashboard shows it:
//! `hh:mm:ss AM|PM` (12-hour, zero-padded, midnight and noon as 12) and
//! `M/D/YYYY`. Independent of any network state.

use chrono::{Datelike, Timelike};

use crate::slots::{SlotKeys, SlotValue};
use crate::updater::ElementUpdater;

/// Time and date text for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockFace {
    pub time: String,
    pub date: String,
}

impl ClockFace {
    pub fn at<T: Datelike + Timelike>(now: &T) -> Self {
        let hour = now.hour();
        let meridiem = if hour < 12 { "AM" } else { "PM" };
        let hour12 = match hour % 12 {
            0 => 12,
            h => h,
        };

        ClockFace {
            time: format!(
                "{:02}:{:02}:{:02} {}",
                hour12,
                now.minute(),
                now.second(),
                meridiem
            ),
            date: format!("{}/{}/{}", now.month(), now.day(), now.year()),
        }
    }

    /// Writes both fields through the updater; unchanged fields are skipped.
    pub fn write(&self, updater: &ElementUpdater, keys: &SlotKeys) -> usize {
        let time = updater.write(&keys.local_time, SlotValue::text(self.time.as_str()));
        let date = updater.write(&keys.local_date, SlotValue::text(self.date.as_str()));
        usize::from(time) + usize::from(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updater::RecordingView;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn at(h: u32, m: u32, s: u32) -> ClockFace {
        let dt = NaiveDate::from_ymd_opt(2025, 1, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap();
        ClockFace::at(&dt)
    }

    #[test]
    fn test_twelve_hour_format() {
        assert_eq!(at(0, 5, 9).time, "12:05:09 AM");
        assert_eq!(at(9, 30, 0).time, "09:30:00 AM");
        assert_eq!(at(12, 0, 0).time, "12:00:00 PM");
        assert_eq!(at(23, 59, 59).time, "11:59:59 PM");
    }

    #[test]
    fn test_date_is_not_padded() {
        assert_eq!(at(8, 0, 0).date, "1/5/2025");
    }

    #[test]
    fn test_write_skips_unchanged_date() {
        let view = Arc::new(RecordingView::accepting_all());
        let updater = ElementUpdater::new(view.clone());
        let keys = SlotKeys::default();

        assert_eq!(at(8, 0, 0).write(&updater, &keys), 2);
        assert_eq!(at(8, 0, 1).write(&updater, &keys), 1);
        assert_eq!(view.render_count("date"), 1);
        assert_eq!(view.text("time").as_deref(), Some("08:00:01 AM"));
    }
}
