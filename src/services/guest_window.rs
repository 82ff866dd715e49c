use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;

/// Local checkout time the edit deadline is measured from.
pub const CHECKOUT_HOUR: u32 = 11;
/// Guests must finish editing this long before checkout.
pub const EDIT_CUTOFF_HOURS: i64 = 1;

/// True while `now` (local wall-clock time) is strictly earlier than one hour
/// before 11:00 on the checkout date.
pub fn can_guest_edit(checkout_date: NaiveDate, now: NaiveDateTime) -> bool {
    let checkout_time =
        NaiveTime::from_hms_opt(CHECKOUT_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
    let deadline = checkout_date.and_time(checkout_time) - Duration::hours(EDIT_CUTOFF_HOURS);
    now < deadline
}

/// Evaluates [`can_guest_edit`] against the host's local clock.
pub fn can_guest_edit_at(checkout_date: NaiveDate, now: DateTime<Utc>, timezone: Tz) -> bool {
    can_guest_edit(checkout_date, now.with_timezone(&timezone).naive_local())
}

/// Parses a stored IANA timezone name, falling back when it is unknown.
pub fn host_timezone(raw: &str, fallback: Tz) -> Tz {
    raw.trim().parse::<Tz>().unwrap_or_else(|_| {
        if !raw.trim().is_empty() {
            tracing::warn!(timezone = raw, "Unknown host timezone, using default");
        }
        fallback
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
    use chrono_tz::Tz;

    use super::{can_guest_edit, can_guest_edit_at, host_timezone};

    fn checkout() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 10).expect("valid date")
    }

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, day)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .expect("valid time")
    }

    #[test]
    fn open_before_cutoff() {
        assert!(can_guest_edit(checkout(), at(9, 23, 0)));
        assert!(can_guest_edit(checkout(), at(10, 9, 59)));
    }

    #[test]
    fn closed_within_last_hour_and_after() {
        assert!(!can_guest_edit(checkout(), at(10, 10, 0)));
        assert!(!can_guest_edit(checkout(), at(10, 10, 30)));
        assert!(!can_guest_edit(checkout(), at(10, 11, 0)));
        assert!(!can_guest_edit(checkout(), at(11, 8, 0)));
    }

    #[test]
    fn uses_host_local_time() {
        let warsaw: Tz = "Europe/Warsaw".parse().expect("known tz");
        // 07:30 UTC is 09:30 in Warsaw during summer time.
        let open = Utc.with_ymd_and_hms(2025, 7, 10, 7, 30, 0).single().expect("utc");
        assert!(can_guest_edit_at(checkout(), open, warsaw));
        // 08:30 UTC is 10:30 local, inside the final hour.
        let closed = Utc.with_ymd_and_hms(2025, 7, 10, 8, 30, 0).single().expect("utc");
        assert!(!can_guest_edit_at(checkout(), closed, warsaw));
        assert!(can_guest_edit_at(checkout(), closed, chrono_tz::UTC));
    }

    #[test]
    fn unknown_timezone_falls_back() {
        assert_eq!(host_timezone("Nowhere/Land", chrono_tz::UTC), chrono_tz::UTC);
        assert_eq!(
            host_timezone(" Europe/Warsaw ", chrono_tz::UTC),
            chrono_tz::Europe::Warsaw
        );
    }
}
