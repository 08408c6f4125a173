use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime};

pub fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

/// Seconds between two stored UTC timestamps, never negative.
pub fn seconds_between(earlier: PrimitiveDateTime, later: PrimitiveDateTime) -> f64 {
    let delta = (later.assume_utc() - earlier.assume_utc()).as_seconds_f64();
    delta.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Month, Time};

    fn at(hour: u8, minute: u8) -> PrimitiveDateTime {
        let date = Date::from_calendar_date(2026, Month::March, 9).unwrap();
        PrimitiveDateTime::new(date, Time::from_hms(hour, minute, 0).unwrap())
    }

    #[test]
    fn format_primitive_outputs_utc_z() {
        assert_eq!(format_primitive(at(10, 20)), "2026-03-09T10:20:00Z");
    }

    #[test]
    fn seconds_between_clamps_at_zero() {
        assert_eq!(seconds_between(at(10, 0), at(10, 5)), 300.0);
        assert_eq!(seconds_between(at(10, 5), at(10, 0)), 0.0);
    }
}
