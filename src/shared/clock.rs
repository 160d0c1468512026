use chrono::{DateTime, NaiveDate, Utc};

// The wall clock is trusted once it has moved past a known-good date;
// an unsynced RTC boots into the past.
pub fn system_time_valid(now: DateTime<Utc>, min_date: NaiveDate) -> bool {
    now.date_naive() >= min_date
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn clock_before_threshold_is_untrusted() {
        let min_date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        let today = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();

        assert!(!system_time_valid(epoch, min_date));
        assert!(system_time_valid(today, min_date));
    }
}
