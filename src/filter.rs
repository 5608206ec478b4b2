// Client-side venue filtering for the listing page

use crate::models::Venue;
use std::cmp::Ordering;
use std::str::FromStr;
use tracing::debug;

/// Well-typed filter criteria. `None` means the criterion imposes no constraint,
/// while `Some(0)` is a real constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    pub location: Option<String>,
    pub rating: Option<f64>,
    pub guests: Option<u32>,
    pub price: Option<f64>,
}

// Raw values as typed into the filter overlay
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterForm {
    pub location: String,
    pub rating: String,
    pub guests: String,
    pub price: String,
}

fn parse_field<T: FromStr>(name: &str, raw: &str) -> Option<T> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            debug!(field = name, value = raw, "ignoring unparsable filter value");
            None
        }
    }
}

impl From<&FilterForm> for FilterCriteria {
    fn from(form: &FilterForm) -> Self {
        let location = form.location.trim();
        Self {
            location: (!location.is_empty()).then(|| location.to_string()),
            rating: parse_field::<f64>("rating", &form.rating).filter(|r| r.is_finite()),
            guests: parse_field("guests", &form.guests),
            price: parse_field::<f64>("price", &form.price).filter(|p| p.is_finite()),
        }
    }
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.active_location().is_none()
            && self.rating.is_none()
            && self.guests.is_none()
            && self.price.is_none()
    }

    fn active_location(&self) -> Option<&str> {
        self.location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }

    /// AND of every active criterion. Missing venue fields fail an active criterion.
    pub fn matches(&self, venue: &Venue) -> bool {
        if let Some(location) = self.active_location() {
            let needle = location.to_lowercase();
            if !venue
                .city()
                .map_or(false, |city| city.to_lowercase().contains(&needle))
            {
                return false;
            }
        }

        if let Some(min_rating) = self.rating {
            if !venue.rating.map_or(false, |rating| rating >= min_rating) {
                return false;
            }
        }

        if let Some(min_guests) = self.guests {
            if venue.max_guests < min_guests {
                return false;
            }
        }

        if let Some(max_price) = self.price {
            if !(venue.price <= max_price) {
                return false;
            }
        }

        true
    }
}

// Stateless filter engine
#[derive(Debug, Default, Clone, Copy)]
pub struct VenueFilterEngine;

impl VenueFilterEngine {
    pub fn new() -> Self {
        Self
    }

    /// Returns the matching venues in their original relative order.
    pub fn apply(&self, venues: &[Venue], criteria: &FilterCriteria) -> Vec<Venue> {
        let filtered: Vec<Venue> = venues
            .iter()
            .filter(|venue| criteria.matches(venue))
            .cloned()
            .collect();

        debug!(
            total = venues.len(),
            matched = filtered.len(),
            "applied venue filters"
        );
        filtered
    }
}

/// Newest venues first; venues without a creation time go last. Stable.
pub fn sort_newest_first(venues: &mut [Venue]) {
    venues.sort_by(|a, b| match (a.created, b.created) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
