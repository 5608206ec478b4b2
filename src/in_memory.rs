// In-process implementation of the remote API.
// Enforces the same ownership and availability rules as the hosted service so
// flows can be exercised without network access.

use crate::api::{ApiError, HolidazeApi};
use crate::availability::{validate_guest_count, validate_range, BookingError, DateRange};
use crate::models::{
    Booking, BookingRequest, BookingVenue, Credentials, Location, Profile, ProfileCounts,
    ProfileRef, ProfileUpdate, Registration, Venue, VenuePayload,
};
use crate::session::Session;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

struct Account {
    name: String,
    password: String,
}

#[derive(Default)]
pub struct InMemoryApi {
    venues: DashMap<String, Venue>,
    // venue ids in creation order
    venue_order: RwLock<Vec<String>>,
    bookings: RwLock<Vec<Booking>>,
    accounts: DashMap<String, Account>,
    profiles: DashMap<String, Profile>,
    tokens: DashMap<String, String>,
    next_id: AtomicU64,
    request_count: AtomicUsize,
    fail_next_requests: AtomicUsize,
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError::ApiResponseError {
        status_code: 400,
        message: message.into(),
        is_retryable: false,
    }
}

impl InMemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Inserts a venue as-is. Bookings nested in it move into the booking store.
    pub fn seed_venue(&self, mut venue: Venue) {
        if let Some(bookings) = venue.bookings.take() {
            let reference = BookingVenue {
                id: venue.id.clone(),
                name: venue.name.clone(),
            };
            let mut store = self.bookings.write();
            for mut booking in bookings {
                booking.venue = Some(reference.clone());
                store.push(booking);
            }
        }
        self.venue_order.write().push(venue.id.clone());
        self.venues.insert(venue.id.clone(), venue);
    }

    pub fn fail_next_requests(&self, count: usize) {
        self.fail_next_requests.store(count, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.read().len()
    }

    fn begin_request(&self) -> Result<(), ApiError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .fail_next_requests
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ApiError::ApiResponseError {
                status_code: 500,
                message: "Internal Server Error".to_string(),
                is_retryable: true,
            });
        }
        Ok(())
    }

    fn authenticate(&self, session: &Session) -> Result<String, ApiError> {
        self.tokens
            .get(&session.access_token)
            .map(|name| name.value().clone())
            .ok_or(ApiError::Unauthorized)
    }

    fn profile_ref(&self, name: &str) -> ProfileRef {
        self.profiles
            .get(name)
            .map(|p| ProfileRef {
                name: p.name.clone(),
                email: Some(p.email.clone()),
                bio: p.bio.clone(),
                avatar: p.avatar.clone(),
                banner: p.banner.clone(),
            })
            .unwrap_or_else(|| ProfileRef {
                name: name.to_string(),
                ..ProfileRef::default()
            })
    }

    fn bookings_for_venue(&self, venue_id: &str) -> Vec<Booking> {
        self.bookings
            .read()
            .iter()
            .filter(|b| b.venue.as_ref().map_or(false, |v| v.id == venue_id))
            .cloned()
            .collect()
    }

    fn expanded(&self, venue: &Venue) -> Venue {
        let mut venue = venue.clone();
        venue.bookings = Some(
            self.bookings_for_venue(&venue.id)
                .into_iter()
                .map(|mut b| {
                    b.venue = None;
                    b
                })
                .collect(),
        );
        venue
    }

    fn owned_venue(&self, user: &str, id: &str) -> Result<Venue, ApiError> {
        let venue = self
            .venues
            .get(id)
            .map(|v| v.value().clone())
            .ok_or_else(|| ApiError::NotFound(format!("No venue with id {}", id)))?;
        if venue.owner_name() != Some(user) {
            return Err(ApiError::Unauthorized);
        }
        Ok(venue)
    }

    fn require_manager(&self, user: &str) -> Result<(), ApiError> {
        match self.profiles.get(user) {
            Some(profile) if profile.venue_manager => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }

    fn apply_payload(venue: &mut Venue, payload: &VenuePayload) {
        venue.name = payload.name.clone();
        venue.description = payload.description.clone();
        venue.media = payload.media.clone();
        venue.price = payload.price;
        venue.max_guests = payload.max_guests;
        venue.meta = payload.meta;
        venue.location.address = Some(payload.location.address.clone());
        venue.updated = Some(Utc::now());
    }
}

#[async_trait]
impl HolidazeApi for InMemoryApi {
    async fn list_venues(&self) -> Result<Vec<Venue>, ApiError> {
        self.begin_request()?;
        let order = self.venue_order.read();
        Ok(order
            .iter()
            .filter_map(|id| self.venues.get(id).map(|v| v.value().clone()))
            .collect())
    }

    async fn get_venue(&self, id: &str) -> Result<Venue, ApiError> {
        self.begin_request()?;
        self.venues
            .get(id)
            .map(|v| self.expanded(v.value()))
            .ok_or_else(|| ApiError::NotFound(format!("No venue with id {}", id)))
    }

    async fn create_venue(
        &self,
        session: &Session,
        payload: &VenuePayload,
    ) -> Result<Venue, ApiError> {
        self.begin_request()?;
        let user = self.authenticate(session)?;
        self.require_manager(&user)?;

        let now = Utc::now();
        let mut venue = Venue {
            id: self.next_id("venue"),
            name: String::new(),
            description: String::new(),
            media: Vec::new(),
            price: 0.0,
            max_guests: 0,
            rating: None,
            created: Some(now),
            updated: Some(now),
            meta: Default::default(),
            location: Location::default(),
            owner: Some(self.profile_ref(&user)),
            bookings: None,
        };
        Self::apply_payload(&mut venue, payload);
        debug!(venue_id = %venue.id, owner = %user, "venue created");

        self.seed_venue(venue.clone());
        Ok(venue)
    }

    async fn update_venue(
        &self,
        session: &Session,
        id: &str,
        payload: &VenuePayload,
    ) -> Result<Venue, ApiError> {
        self.begin_request()?;
        let user = self.authenticate(session)?;
        let mut venue = self.owned_venue(&user, id)?;

        Self::apply_payload(&mut venue, payload);
        self.venues.insert(venue.id.clone(), venue.clone());
        Ok(venue)
    }

    async fn delete_venue(&self, session: &Session, id: &str) -> Result<(), ApiError> {
        self.begin_request()?;
        let user = self.authenticate(session)?;
        self.owned_venue(&user, id)?;

        self.venues.remove(id);
        self.venue_order.write().retain(|v| v != id);
        self.bookings
            .write()
            .retain(|b| b.venue.as_ref().map_or(true, |v| v.id != id));
        Ok(())
    }

    async fn create_booking(
        &self,
        session: &Session,
        request: &BookingRequest,
    ) -> Result<Booking, ApiError> {
        self.begin_request()?;
        let user = self.authenticate(session)?;
        let venue = self
            .venues
            .get(&request.venue_id)
            .map(|v| v.value().clone())
            .ok_or_else(|| ApiError::NotFound(format!("No venue with id {}", request.venue_id)))?;

        let range = DateRange::new(request.date_from, request.date_to);
        let mut store = self.bookings.write();
        let existing = store
            .iter()
            .filter(|b| b.venue.as_ref().map_or(false, |v| v.id == venue.id));

        validate_range(&range, existing).map_err(|err| match err {
            BookingError::Conflict { .. } => ApiError::ApiResponseError {
                status_code: 409,
                message: err.to_string(),
                is_retryable: false,
            },
            other => bad_request(other.to_string()),
        })?;
        validate_guest_count(Some(i64::from(request.guests)), venue.max_guests)
            .map_err(|err| bad_request(err.to_string()))?;

        let booking = Booking {
            id: self.next_id("booking"),
            date_from: request.date_from,
            date_to: request.date_to,
            guests: request.guests,
            created: Some(Utc::now()),
            venue: Some(BookingVenue {
                id: venue.id.clone(),
                name: venue.name.clone(),
            }),
            customer: Some(self.profile_ref(&user)),
        };
        store.push(booking.clone());
        Ok(booking)
    }

    async fn get_profile(&self, session: &Session, name: &str) -> Result<Profile, ApiError> {
        self.begin_request()?;
        self.authenticate(session)?;

        let mut profile = self
            .profiles
            .get(name)
            .map(|p| p.value().clone())
            .ok_or_else(|| ApiError::NotFound(format!("No profile with name {}", name)))?;
        profile.count = ProfileCounts {
            venues: self
                .venues
                .iter()
                .filter(|v| v.owner_name() == Some(name))
                .count() as u32,
            bookings: self
                .bookings
                .read()
                .iter()
                .filter(|b| b.customer.as_ref().map_or(false, |c| c.name == name))
                .count() as u32,
        };
        Ok(profile)
    }

    async fn profile_venues(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Vec<Venue>, ApiError> {
        self.begin_request()?;
        self.authenticate(session)?;

        let order = self.venue_order.read();
        Ok(order
            .iter()
            .filter_map(|id| self.venues.get(id).map(|v| v.value().clone()))
            .filter(|v| v.owner_name() == Some(name))
            .map(|v| self.expanded(&v))
            .collect())
    }

    async fn profile_bookings(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Vec<Booking>, ApiError> {
        self.begin_request()?;
        self.authenticate(session)?;

        Ok(self
            .bookings
            .read()
            .iter()
            .filter(|b| b.customer.as_ref().map_or(false, |c| c.name == name))
            .cloned()
            .collect())
    }

    async fn update_profile(
        &self,
        session: &Session,
        name: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, ApiError> {
        self.begin_request()?;
        let user = self.authenticate(session)?;
        if user != name {
            return Err(ApiError::Unauthorized);
        }

        let mut profile = self
            .profiles
            .get_mut(name)
            .ok_or_else(|| ApiError::NotFound(format!("No profile with name {}", name)))?;
        profile.bio = Some(update.bio.clone());
        profile.avatar = Some(update.avatar.clone());
        Ok(profile.clone())
    }

    async fn login(&self, credentials: &Credentials) -> Result<Session, ApiError> {
        self.begin_request()?;
        let name = match self.accounts.get(&credentials.email.to_lowercase()) {
            Some(account) if account.password == credentials.password => account.name.clone(),
            _ => return Err(ApiError::Unauthorized),
        };
        let venue_manager = self
            .profiles
            .get(&name)
            .map_or(false, |p| p.venue_manager);

        let access_token = self.next_id("token");
        self.tokens.insert(access_token.clone(), name.clone());
        Ok(Session {
            access_token,
            user_name: name,
            venue_manager,
        })
    }

    async fn register(&self, registration: &Registration) -> Result<Profile, ApiError> {
        self.begin_request()?;
        let email = registration.email.trim().to_lowercase();
        if registration.name.trim().is_empty() || email.is_empty() {
            return Err(bad_request("Name and email are required"));
        }
        if registration.password.len() < 8 {
            return Err(bad_request("Password must be at least 8 characters"));
        }
        if self.accounts.contains_key(&email) || self.profiles.contains_key(&registration.name) {
            return Err(bad_request("Profile already exists"));
        }

        let profile = Profile {
            name: registration.name.clone(),
            email: email.clone(),
            venue_manager: registration.venue_manager,
            ..Profile::default()
        };
        self.accounts.insert(
            email,
            Account {
                name: registration.name.clone(),
                password: registration.password.clone(),
            },
        );
        self.profiles
            .insert(registration.name.clone(), profile.clone());
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate};

    fn at(day: &str) -> DateTime<Utc> {
        format!("{}T00:00:00Z", day).parse().unwrap()
    }

    fn payload(name: &str) -> VenuePayload {
        VenuePayload {
            name: name.to_string(),
            description: "desc".to_string(),
            media: vec![],
            price: 100.0,
            max_guests: 2,
            meta: Default::default(),
            location: crate::models::PayloadLocation {
                address: "Street 1".to_string(),
            },
        }
    }

    async fn account(api: &InMemoryApi, name: &str, venue_manager: bool) -> Session {
        api.register(&Registration {
            name: name.to_string(),
            email: format!("{}@stud.noroff.no", name),
            password: "password123".to_string(),
            venue_manager,
        })
        .await
        .unwrap();
        api.login(&Credentials {
            email: format!("{}@stud.noroff.no", name),
            password: "password123".to_string(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let api = InMemoryApi::new();
        let session = account(&api, "kari", true).await;
        assert!(session.venue_manager);

        let wrong = api
            .login(&Credentials {
                email: "kari@stud.noroff.no".to_string(),
                password: "nope".to_string(),
            })
            .await;
        assert_eq!(wrong.unwrap_err(), ApiError::Unauthorized);

        let duplicate = api
            .register(&Registration {
                name: "kari".to_string(),
                email: "other@stud.noroff.no".to_string(),
                password: "password123".to_string(),
                venue_manager: false,
            })
            .await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_only_managers_create_and_owners_manage() {
        let api = InMemoryApi::new();
        let owner = account(&api, "kari", true).await;
        let other = account(&api, "per", true).await;
        let customer = account(&api, "ola", false).await;

        assert_eq!(
            api.create_venue(&customer, &payload("Nope")).await.unwrap_err(),
            ApiError::Unauthorized
        );

        let venue = api.create_venue(&owner, &payload("Cabin")).await.unwrap();
        assert_eq!(venue.owner_name(), Some("kari"));

        assert_eq!(
            api.update_venue(&other, &venue.id, &payload("Hijack"))
                .await
                .unwrap_err(),
            ApiError::Unauthorized
        );
        let updated = api
            .update_venue(&owner, &venue.id, &payload("Cabin II"))
            .await
            .unwrap();
        assert_eq!(updated.name, "Cabin II");

        api.delete_venue(&owner, &venue.id).await.unwrap();
        assert!(matches!(
            api.get_venue(&venue.id).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_booking_rules_enforced_server_side() {
        let api = InMemoryApi::new();
        let owner = account(&api, "kari", true).await;
        let guest = account(&api, "ola", false).await;
        let venue = api.create_venue(&owner, &payload("Cabin")).await.unwrap();

        let request = |from: &str, to: &str, guests: u32| BookingRequest {
            date_from: at(from),
            date_to: at(to),
            guests,
            venue_id: venue.id.clone(),
        };

        api.create_booking(&guest, &request("2024-01-01", "2024-01-05", 2))
            .await
            .unwrap();
        api.create_booking(&guest, &request("2024-01-05", "2024-01-07", 1))
            .await
            .unwrap();

        let conflict = api
            .create_booking(&guest, &request("2024-01-04", "2024-01-06", 1))
            .await
            .unwrap_err();
        assert!(matches!(conflict, ApiError::ApiResponseError { status_code: 409, .. }));

        let too_many = api
            .create_booking(&guest, &request("2024-02-01", "2024-02-02", 3))
            .await
            .unwrap_err();
        assert!(matches!(too_many, ApiError::ApiResponseError { status_code: 400, .. }));

        let fetched = api.get_venue(&venue.id).await.unwrap();
        assert_eq!(fetched.bookings().len(), 2);
        assert_eq!(
            fetched.bookings()[0].date_from.date_naive(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );

        let profile = api.get_profile(&guest, "ola").await.unwrap();
        assert_eq!(profile.count.bookings, 2);
        assert_eq!(api.profile_bookings(&guest, "ola").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthorized() {
        let api = InMemoryApi::new();
        let forged = Session {
            access_token: "forged".to_string(),
            user_name: "kari".to_string(),
            venue_manager: true,
        };
        assert_eq!(
            api.create_venue(&forged, &payload("Cabin")).await.unwrap_err(),
            ApiError::Unauthorized
        );
    }

    #[test]
    fn test_failure_injection() {
        let api = InMemoryApi::new();
        api.fail_next_requests(1);

        let first = tokio_test::block_on(api.list_venues());
        assert!(first.unwrap_err().is_retryable());
        let second = tokio_test::block_on(api.list_venues());
        assert!(second.unwrap().is_empty());
        assert_eq!(api.request_count(), 2);
    }
}
