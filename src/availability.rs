// Availability and price computation for a single venue.
// Everything here is pure: callers hand in already fetched venues and bookings.

use crate::models::{Booking, BookingRequest, Venue};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::fmt;
use thiserror::Error;

// Validation failures surfaced to the booking form
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookingError {
    #[error("Please select a valid date range.")]
    InvalidRange,

    #[error("Dates unavailable: already booked from {date_from} to {date_to}")]
    Conflict {
        booking_id: String,
        date_from: NaiveDate,
        date_to: NaiveDate,
    },

    #[error("Number of guests must be between 1 and {max_guests}")]
    GuestCount { count: Option<i64>, max_guests: u32 },
}

/// Candidate stay selected in the calendar.
///
/// Either endpoint may be unset while the guest is still picking dates. Only the
/// calendar day of each endpoint matters; the time of day is ignored everywhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn unset() -> Self {
        Self::default()
    }

    // Midnight UTC on both days
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Self {
        Self::new(midnight(start), midnight(end))
    }

    pub fn clear(&mut self) {
        *self = Self::unset();
    }

    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start.map(|d| d.date_naive())
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end.map(|d| d.date_naive())
    }

    /// The `[check-in, check-out)` days, if both are set and chronological.
    pub fn nights_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.start_date(), self.end_date()) {
            (Some(from), Some(to)) if from < to => Some((from, to)),
            _ => None,
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Number of nights in the range, 0 when it is incomplete or not chronological.
pub fn compute_nights(range: &DateRange) -> u32 {
    range
        .nights_span()
        .map(|(from, to)| (to - from).num_days())
        .and_then(|days| u32::try_from(days).ok())
        .unwrap_or(0)
}

pub fn compute_total_price(range: &DateRange, nightly_price: f64) -> f64 {
    if !nightly_price.is_finite() || nightly_price < 0.0 {
        return 0.0;
    }
    f64::from(compute_nights(range)) * nightly_price
}

/// Price summary shown under the calendar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceQuote {
    pub nights: u32,
    pub nightly_price: f64,
    pub total: f64,
}

impl fmt::Display for PriceQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} night(s) x ${} total: ${}",
            self.nights, self.nightly_price, self.total
        )
    }
}

pub fn quote(range: &DateRange, nightly_price: f64) -> PriceQuote {
    PriceQuote {
        nights: compute_nights(range),
        nightly_price,
        total: compute_total_price(range, nightly_price),
    }
}

// Half-open day intervals [a, b) and [c, d) overlap iff a < d && c < b
fn overlaps(a: (NaiveDate, NaiveDate), b: (NaiveDate, NaiveDate)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// Bookings nested in a venue carry no venue reference and always belong to it.
pub fn belongs_to(booking: &Booking, venue_id: &str) -> bool {
    booking.venue.as_ref().map_or(true, |v| v.id == venue_id)
}

/// Checks the candidate range against existing bookings of the same venue.
pub fn validate_range<'a, I>(range: &DateRange, existing: I) -> Result<(), BookingError>
where
    I: IntoIterator<Item = &'a Booking>,
{
    let candidate = range.nights_span().ok_or(BookingError::InvalidRange)?;

    for booking in existing {
        let booked = (booking.date_from.date_naive(), booking.date_to.date_naive());
        if overlaps(candidate, booked) {
            return Err(BookingError::Conflict {
                booking_id: booking.id.clone(),
                date_from: booked.0,
                date_to: booked.1,
            });
        }
    }

    Ok(())
}

pub fn validate_guest_count(count: Option<i64>, max_guests: u32) -> Result<u32, BookingError> {
    match count {
        Some(c) if c >= 1 && c <= i64::from(max_guests) => Ok(c as u32),
        _ => Err(BookingError::GuestCount { count, max_guests }),
    }
}

/// Parses the raw guest input. Anything that is not a whole number is `None`.
pub fn parse_guest_count(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// Runs every booking validation and builds the request for the bookings endpoint.
pub fn prepare_booking(
    venue: &Venue,
    range: &DateRange,
    guests: Option<i64>,
) -> Result<BookingRequest, BookingError> {
    validate_range(
        range,
        venue.bookings().iter().filter(|b| belongs_to(b, &venue.id)),
    )?;
    let guests = validate_guest_count(guests, venue.max_guests)?;

    match (range.start, range.end) {
        (Some(date_from), Some(date_to)) => Ok(BookingRequest {
            date_from,
            date_to,
            guests,
            venue_id: venue.id.clone(),
        }),
        _ => Err(BookingError::InvalidRange),
    }
}
