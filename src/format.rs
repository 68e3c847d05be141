use chrono::{DateTime, Local, TimeZone, Utc};

/// `YYYY/MM/DD HH:mm` in the local time zone
pub fn format_date(at: &DateTime<Utc>) -> String {
    format_date_in(at, &Local)
}

/// `YYYY/MM/DD HH:mm` in `tz`
pub fn format_date_in<Tz: TimeZone>(at: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.with_timezone(tz).format("%Y/%m/%d %H:%M").to_string()
}

/// `m:ss`; negative or non-finite input reads as zero
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_format_date_pads_fields() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let afternoon = Utc.with_ymd_and_hms(2024, 5, 1, 6, 30, 0).unwrap();
        let morning = Utc.with_ymd_and_hms(2024, 1, 4, 23, 5, 0).unwrap();

        assert_eq!(format_date_in(&afternoon, &tokyo), "2024/05/01 15:30");
        assert_eq!(format_date_in(&morning, &tokyo), "2024/01/05 08:05");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(30.0), "0:30");
        assert_eq!(format_duration(60.0), "1:00");
        assert_eq!(format_duration(65.0), "1:05");
        assert_eq!(format_duration(95.9), "1:35");
        assert_eq!(format_duration(615.0), "10:15");
        assert_eq!(format_duration(-3.0), "0:00");
        assert_eq!(format_duration(f64::NAN), "0:00");
    }
}
