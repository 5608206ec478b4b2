// Create / update venue form handling

use crate::models::{Media, PayloadLocation, Venue, VenueMeta, VenuePayload};
use std::fmt;
use thiserror::Error;

pub const VENUE_IMAGE_ALT: &str = "Venue Image";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VenueFormError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("At least 1 guest")]
    InvalidMaxGuests,

    #[error("Price must be positive")]
    InvalidPrice,
}

/// Every field error of one submission, in field order.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueFormErrors(pub Vec<VenueFormError>);

impl fmt::Display for VenueFormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for VenueFormErrors {}

impl VenueFormErrors {
    pub fn contains(&self, error: &VenueFormError) -> bool {
        self.0.contains(error)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenueForm {
    pub name: String,
    pub address: String,
    pub description: String,
    pub max_guests: Option<i64>,
    pub price: Option<f64>,
    pub images: Vec<String>,
    pub meta: VenueMeta,
}

impl VenueForm {
    pub fn new() -> Self {
        Self::default()
    }

    // Pre-fill the update form from an existing venue
    pub fn from_venue(venue: &Venue) -> Self {
        Self {
            name: venue.name.clone(),
            address: venue.location.address.clone().unwrap_or_default(),
            description: venue.description.clone(),
            max_guests: Some(i64::from(venue.max_guests)),
            price: Some(venue.price),
            images: venue.media.iter().map(|m| m.url.clone()).collect(),
            meta: venue.meta,
        }
    }

    /// Adds an image URL. Only absolute http(s) URLs not already listed are accepted.
    pub fn add_image(&mut self, url: &str) -> bool {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return false;
        }
        if self.images.iter().any(|existing| existing == url) {
            return false;
        }
        self.images.push(url.to_string());
        true
    }

    pub fn remove_image(&mut self, url: &str) {
        self.images.retain(|image| image != url);
    }

    pub fn validate(&self) -> Result<VenuePayload, VenueFormErrors> {
        let mut errors = Vec::new();

        let required = [
            ("Venue name", &self.name),
            ("Address", &self.address),
            ("Description", &self.description),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.push(VenueFormError::MissingField(field));
            }
        }

        let max_guests = match self.max_guests {
            Some(n) if n >= 1 && n <= i64::from(u32::MAX) => Some(n as u32),
            _ => {
                errors.push(VenueFormError::InvalidMaxGuests);
                None
            }
        };

        let price = match self.price {
            Some(p) if p.is_finite() && p >= 1.0 => Some(p),
            _ => {
                errors.push(VenueFormError::InvalidPrice);
                None
            }
        };

        match (max_guests, price) {
            (Some(max_guests), Some(price)) if errors.is_empty() => Ok(VenuePayload {
                name: self.name.trim().to_string(),
                description: self.description.trim().to_string(),
                media: self
                    .images
                    .iter()
                    .map(|url| Media {
                        url: url.clone(),
                        alt: VENUE_IMAGE_ALT.to_string(),
                    })
                    .collect(),
                price,
                max_guests,
                meta: self.meta,
                location: PayloadLocation {
                    address: self.address.trim().to_string(),
                },
            }),
            _ => Err(VenueFormErrors(errors)),
        }
    }
}
