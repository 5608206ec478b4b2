use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Envelope wrapping every successful response of the remote API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(default)]
    pub meta: serde_json::Value,
}

// Error body returned by the remote API on non-2xx responses
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub errors: Vec<ApiErrorDetail>,
    pub status: String,
    pub status_code: u16,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiErrorDetail {
    pub message: String,
}

impl ApiErrorBody {
    pub fn first_message(&self) -> Option<&str> {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .find(|m| !m.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Media {
    pub url: String,
    pub alt: String,
}

/// Amenity flags of a venue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct VenueMeta {
    pub wifi: bool,
    pub parking: bool,
    pub breakfast: bool,
    pub pets: bool,
}

impl VenueMeta {
    pub fn has_any(&self) -> bool {
        self.wifi || self.parking || self.breakfast || self.pets
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Location {
    pub address: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub continent: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Public part of a profile, as embedded in venues and bookings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfileRef {
    pub name: String,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<Media>,
    pub banner: Option<Media>,
}

/// A rentable listing as returned by the venues endpoints.
///
/// `owner` and `bookings` are only present when the venue was fetched with the
/// matching expansion flags.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub media: Vec<Media>,
    pub price: f64,
    pub max_guests: u32,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta: VenueMeta,
    #[serde(default)]
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ProfileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookings: Option<Vec<Booking>>,
}

impl Venue {
    pub fn city(&self) -> Option<&str> {
        self.location.city.as_deref()
    }

    pub fn cover_image(&self) -> Option<&str> {
        self.media.first().map(|m| m.url.as_str())
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.name.as_str())
    }

    pub fn bookings(&self) -> &[Booking] {
        self.bookings.as_deref().unwrap_or_default()
    }
}

// Minimal venue reference carried by bookings fetched outside a venue
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BookingVenue {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
    pub guests: u32,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<BookingVenue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<ProfileRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfileCounts {
    pub venues: u32,
    pub bookings: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar: Option<Media>,
    pub banner: Option<Media>,
    pub venue_manager: bool,
    #[serde(rename = "_count")]
    pub count: ProfileCounts,
}

// Request payloads

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
    pub guests: u32,
    pub venue_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PayloadLocation {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VenuePayload {
    pub name: String,
    pub description: String,
    pub media: Vec<Media>,
    pub price: f64,
    pub max_guests: u32,
    pub meta: VenueMeta,
    pub location: PayloadLocation,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProfileUpdate {
    pub avatar: Media,
    pub bio: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub venue_manager: bool,
}

// Body of a successful login
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginData {
    pub name: String,
    pub email: String,
    pub access_token: String,
    pub venue_manager: Option<bool>,
}
