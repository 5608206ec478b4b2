// Orchestration of the user flows on top of the remote API.
// Validation happens locally before anything is submitted; the UI layer only
// renders the values and errors returned here.

use crate::api::{ApiError, HolidazeApi};
use crate::auth_form::{AuthFormErrors, LoginForm, SignUpForm};
use crate::availability::{prepare_booking, BookingError, DateRange};
use crate::filter::{sort_newest_first, FilterCriteria, FilterForm, VenueFilterEngine};
use crate::models::{Booking, Media, Profile, ProfileUpdate, Venue};
use crate::session::Session;
use crate::venue_form::{VenueForm, VenueFormErrors};
use thiserror::Error;
use tracing::{error, info, warn};

pub const VENUE_CREATED_MESSAGE: &str = "Venue created successfully.";
pub const AVATAR_ALT: &str = "User avatar";

#[derive(Error, Debug)]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] BookingError),

    #[error(transparent)]
    Form(#[from] VenueFormErrors),

    #[error(transparent)]
    Auth(#[from] AuthFormErrors),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Not permitted: {0}")]
    Forbidden(&'static str),
}

/// The fetched venue list, newest first, filtered in memory on every apply.
#[derive(Debug, Clone, Default)]
pub struct VenueCatalog {
    venues: Vec<Venue>,
    engine: VenueFilterEngine,
}

impl VenueCatalog {
    pub fn from_venues(mut venues: Vec<Venue>) -> Self {
        sort_newest_first(&mut venues);
        Self {
            venues,
            engine: VenueFilterEngine::new(),
        }
    }

    pub fn venues(&self) -> &[Venue] {
        &self.venues
    }

    pub fn is_empty(&self) -> bool {
        self.venues.is_empty()
    }

    pub fn apply(&self, criteria: &FilterCriteria) -> Vec<Venue> {
        self.engine.apply(&self.venues, criteria)
    }

    pub fn apply_form(&self, form: &FilterForm) -> Vec<Venue> {
        self.apply(&FilterCriteria::from(form))
    }
}

#[derive(Debug, Clone)]
pub struct VenuePage {
    pub venue: Venue,
    pub viewer_is_manager: bool,
    pub can_book: bool,
    pub can_manage: bool,
}

#[derive(Debug, Clone)]
pub struct VenueCreated {
    pub venue: Venue,
    pub message: &'static str,
    pub redirect: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProfileListings {
    Venues(Vec<Venue>),
    Bookings(Vec<Booking>),
}

#[derive(Debug, Clone)]
pub struct ProfileOverview {
    pub profile: Profile,
    pub listings: ProfileListings,
    pub is_own_profile: bool,
}

pub struct BookingService<A> {
    api: A,
}

impl<A: HolidazeApi> BookingService<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn catalog(&self) -> Result<VenueCatalog, ApiError> {
        let venues = self.api.list_venues().await.map_err(|e| {
            error!(error = %e, "failed to fetch venues");
            e
        })?;
        info!(count = venues.len(), "venues loaded");
        Ok(VenueCatalog::from_venues(venues))
    }

    /// Loads a venue with its bookings and, for a logged-in viewer, their profile.
    /// A failed profile lookup is logged and the session's own role is used instead.
    pub async fn open_venue(
        &self,
        id: &str,
        session: Option<&Session>,
    ) -> Result<VenuePage, ApiError> {
        let (venue, viewer_is_manager) = match session {
            Some(session) => {
                let (venue, profile) = futures::join!(
                    self.api.get_venue(id),
                    self.api.get_profile(session, &session.user_name)
                );
                let viewer_is_manager = match profile {
                    Ok(profile) => profile.venue_manager,
                    Err(e) => {
                        warn!(
                            user = %session.user_name,
                            error = %e,
                            "failed to fetch viewer profile"
                        );
                        session.venue_manager
                    }
                };
                (venue?, viewer_is_manager)
            }
            None => (self.api.get_venue(id).await?, false),
        };

        let can_book = session.map_or(false, |s| s.can_book() && !viewer_is_manager);
        let can_manage = session.map_or(false, |s| viewer_is_manager && s.can_manage(&venue));
        Ok(VenuePage {
            can_book,
            can_manage,
            viewer_is_manager,
            venue,
        })
    }

    pub async fn book(
        &self,
        session: &Session,
        venue: &Venue,
        range: &DateRange,
        guests: Option<i64>,
    ) -> Result<Booking, FlowError> {
        if !session.can_book() {
            return Err(FlowError::Forbidden("venue managers cannot book venues"));
        }
        let request = prepare_booking(venue, range, guests)?;

        let booking = self
            .api
            .create_booking(session, &request)
            .await
            .map_err(|e| {
                error!(venue_id = %venue.id, error = %e, "booking failed");
                e
            })?;
        info!(
            booking_id = %booking.id,
            venue_id = %venue.id,
            guests = booking.guests,
            "booking created"
        );
        Ok(booking)
    }

    /// Success feedback is returned together with the redirect target so the
    /// caller can show it before navigating away.
    pub async fn create_venue(
        &self,
        session: &Session,
        form: &VenueForm,
    ) -> Result<VenueCreated, FlowError> {
        if !session.can_create_venue() {
            return Err(FlowError::Forbidden("only venue managers can create venues"));
        }
        let payload = form.validate()?;

        let venue = self.api.create_venue(session, &payload).await.map_err(|e| {
            error!(error = %e, "failed to create venue");
            e
        })?;
        info!(venue_id = %venue.id, "venue created");

        Ok(VenueCreated {
            redirect: format!("/venue/{}", venue.id),
            message: VENUE_CREATED_MESSAGE,
            venue,
        })
    }

    pub async fn update_venue(
        &self,
        session: &Session,
        venue: &Venue,
        form: &VenueForm,
    ) -> Result<Venue, FlowError> {
        if !session.can_manage(venue) {
            return Err(FlowError::Forbidden("only the owner can update this venue"));
        }
        let payload = form.validate()?;

        let updated = self.api.update_venue(session, &venue.id, &payload).await?;
        info!(venue_id = %updated.id, "venue updated");
        Ok(updated)
    }

    pub async fn delete_venue(&self, session: &Session, venue: &Venue) -> Result<(), FlowError> {
        if !session.can_manage(venue) {
            return Err(FlowError::Forbidden("only the owner can delete this venue"));
        }
        self.api.delete_venue(session, &venue.id).await?;
        info!(venue_id = %venue.id, "venue deleted");
        Ok(())
    }

    // Managers see their venues, customers their bookings
    pub async fn load_profile(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<ProfileOverview, ApiError> {
        let profile = self.api.get_profile(session, name).await?;
        let listings = if profile.venue_manager {
            ProfileListings::Venues(self.api.profile_venues(session, name).await?)
        } else {
            ProfileListings::Bookings(self.api.profile_bookings(session, name).await?)
        };

        Ok(ProfileOverview {
            is_own_profile: session.is_own_profile(&profile.name),
            profile,
            listings,
        })
    }

    /// Blank inputs keep the current bio / avatar.
    pub async fn update_profile(
        &self,
        session: &Session,
        profile: &Profile,
        bio: &str,
        avatar_url: &str,
    ) -> Result<Profile, FlowError> {
        if !session.is_own_profile(&profile.name) {
            return Err(FlowError::Forbidden("profiles can only be edited by their owner"));
        }

        let current_avatar = profile.avatar.as_ref().map(|a| a.url.as_str());
        let update = ProfileUpdate {
            avatar: Media {
                url: non_blank(avatar_url)
                    .or(current_avatar)
                    .unwrap_or_default()
                    .to_string(),
                alt: AVATAR_ALT.to_string(),
            },
            bio: non_blank(bio)
                .or(profile.bio.as_deref())
                .unwrap_or_default()
                .to_string(),
        };

        let updated = self
            .api
            .update_profile(session, &profile.name, &update)
            .await?;
        info!(profile = %updated.name, "profile updated");
        Ok(updated)
    }

    pub async fn login(&self, form: &LoginForm) -> Result<Session, FlowError> {
        let credentials = form.validate()?;
        let session = self.api.login(&credentials).await.map_err(|e| {
            warn!(error = %e, "login failed");
            e
        })?;
        info!(user = %session.user_name, "logged in");
        Ok(session)
    }

    pub async fn register(&self, form: &SignUpForm) -> Result<Profile, FlowError> {
        let registration = form.validate()?;
        let profile = self.api.register(&registration).await?;
        info!(user = %profile.name, venue_manager = profile.venue_manager, "registered");
        Ok(profile)
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryApi;
    use crate::models::{Location, VenueMeta};
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    async fn signed_up(
        service: &BookingService<InMemoryApi>,
        name: &str,
        manager: bool,
    ) -> Session {
        let email = format!("{}@stud.noroff.no", name);
        service
            .register(&SignUpForm {
                full_name: name.to_string(),
                email: email.clone(),
                password: "password123".to_string(),
                confirm_password: "password123".to_string(),
                venue_manager: manager,
            })
            .await
            .unwrap();
        service
            .login(&LoginForm::new(&email, "password123"))
            .await
            .unwrap()
    }

    fn cabin_form() -> VenueForm {
        VenueForm {
            name: "Fjord Cabin".to_string(),
            address: "Fjordveien 1".to_string(),
            description: "Quiet cabin by the fjord".to_string(),
            max_guests: Some(4),
            price: Some(120.0),
            images: vec!["https://img.example/cabin.jpg".to_string()],
            meta: VenueMeta::default(),
        }
    }

    fn seeded_venue(id: &str, city: &str, rating: f64, created: &str) -> Venue {
        Venue {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            media: vec![],
            price: 100.0,
            max_guests: 4,
            rating: Some(rating),
            created: Some(created.parse().unwrap()),
            updated: None,
            meta: VenueMeta::default(),
            location: Location {
                city: Some(city.to_string()),
                ..Location::default()
            },
            owner: None,
            bookings: None,
        }
    }

    #[tokio::test]
    async fn test_catalog_sorts_newest_first_and_filters() {
        let api = InMemoryApi::new();
        api.seed_venue(seeded_venue("old-oslo", "Oslo", 4.5, "2024-01-01T00:00:00Z"));
        api.seed_venue(seeded_venue("bergen", "Bergen", 3.0, "2024-02-01T00:00:00Z"));
        api.seed_venue(seeded_venue("new-oslo", "Oslo", 3.5, "2024-03-01T00:00:00Z"));
        let service = BookingService::new(api);

        let catalog = service.catalog().await.unwrap();
        let ids: Vec<&str> = catalog.venues().iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["new-oslo", "bergen", "old-oslo"]);

        let oslo = catalog.apply_form(&FilterForm {
            location: "oslo".to_string(),
            ..FilterForm::default()
        });
        assert_eq!(oslo.len(), 2);
        assert_eq!(oslo[0].id, "new-oslo");

        let rated = catalog.apply_form(&FilterForm {
            location: "oslo".to_string(),
            rating: "4".to_string(),
            ..FilterForm::default()
        });
        assert_eq!(rated.len(), 1);
        assert_eq!(rated[0].id, "old-oslo");
    }

    #[tokio::test]
    async fn test_full_booking_flow() {
        let service = BookingService::new(InMemoryApi::new());
        let manager = signed_up(&service, "kari", true).await;
        let guest = signed_up(&service, "ola", false).await;

        let created = service.create_venue(&manager, &cabin_form()).await.unwrap();
        assert_eq!(created.message, VENUE_CREATED_MESSAGE);
        assert_eq!(created.redirect, format!("/venue/{}", created.venue.id));

        let page = service
            .open_venue(&created.venue.id, Some(&guest))
            .await
            .unwrap();
        assert!(page.can_book);
        assert!(!page.can_manage);

        let range = DateRange::from_dates(date("2024-07-01"), date("2024-07-04"));
        let booking = service
            .book(&guest, &page.venue, &range, Some(2))
            .await
            .unwrap();
        assert_eq!(booking.guests, 2);

        // Reload: the same dates now conflict locally before reaching the API
        let requests_before = service.api().request_count();
        let page = service
            .open_venue(&created.venue.id, Some(&guest))
            .await
            .unwrap();
        let overlapping = DateRange::from_dates(date("2024-07-03"), date("2024-07-05"));
        let err = service
            .book(&guest, &page.venue, &overlapping, Some(2))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Validation(BookingError::Conflict { .. })));
        assert_eq!(service.api().request_count(), requests_before + 2);

        // Back-to-back stay starting on checkout day is fine
        let adjacent = DateRange::from_dates(date("2024-07-04"), date("2024-07-06"));
        service
            .book(&guest, &page.venue, &adjacent, Some(4))
            .await
            .unwrap();
        assert_eq!(service.api().booking_count(), 2);
    }

    #[tokio::test]
    async fn test_booking_validation_errors_never_reach_api() {
        let service = BookingService::new(InMemoryApi::new());
        let manager = signed_up(&service, "kari", true).await;
        let guest = signed_up(&service, "ola", false).await;
        let venue = service
            .create_venue(&manager, &cabin_form())
            .await
            .unwrap()
            .venue;
        let before = service.api().request_count();

        let err = service
            .book(&guest, &venue, &DateRange::unset(), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Validation(BookingError::InvalidRange)));

        let range = DateRange::from_dates(date("2024-07-01"), date("2024-07-02"));
        let err = service.book(&guest, &venue, &range, Some(5)).await.unwrap_err();
        assert!(matches!(err, FlowError::Validation(BookingError::GuestCount { .. })));

        let err = service.book(&manager, &venue, &range, Some(1)).await.unwrap_err();
        assert!(matches!(err, FlowError::Forbidden(_)));

        assert_eq!(service.api().request_count(), before);
    }

    #[tokio::test]
    async fn test_open_venue_as_owner_and_anonymous() {
        let service = BookingService::new(InMemoryApi::new());
        let manager = signed_up(&service, "kari", true).await;
        let venue = service
            .create_venue(&manager, &cabin_form())
            .await
            .unwrap()
            .venue;

        let owner_view = service.open_venue(&venue.id, Some(&manager)).await.unwrap();
        assert!(owner_view.viewer_is_manager);
        assert!(owner_view.can_manage);
        assert!(!owner_view.can_book);

        let anonymous = service.open_venue(&venue.id, None).await.unwrap();
        assert!(!anonymous.can_book);
        assert!(!anonymous.can_manage);
    }

    #[tokio::test]
    async fn test_open_venue_survives_profile_failure() {
        let service = BookingService::new(InMemoryApi::new());
        let manager = signed_up(&service, "kari", true).await;
        let venue = service
            .create_venue(&manager, &cabin_form())
            .await
            .unwrap()
            .venue;
        let stale = Session {
            access_token: "expired".to_string(),
            ..manager
        };

        let page = service.open_venue(&venue.id, Some(&stale)).await.unwrap();
        assert_eq!(page.venue.id, venue.id);
        assert!(page.viewer_is_manager);
        assert!(!page.can_book);
        assert!(page.can_manage);
    }

    #[tokio::test]
    async fn test_open_venue_stale_customer_session_can_still_book() {
        let service = BookingService::new(InMemoryApi::new());
        let manager = signed_up(&service, "kari", true).await;
        let guest = signed_up(&service, "ola", false).await;
        let venue = service
            .create_venue(&manager, &cabin_form())
            .await
            .unwrap()
            .venue;
        let stale = Session {
            access_token: "expired".to_string(),
            ..guest
        };

        let page = service.open_venue(&venue.id, Some(&stale)).await.unwrap();
        assert!(!page.viewer_is_manager);
        assert!(page.can_book);
        assert!(!page.can_manage);
    }

    #[tokio::test]
    async fn test_create_venue_rejects_invalid_form_and_customers() {
        let service = BookingService::new(InMemoryApi::new());
        let manager = signed_up(&service, "kari", true).await;
        let guest = signed_up(&service, "ola", false).await;

        let err = service
            .create_venue(&manager, &VenueForm::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Form(ref errors) if errors.0.len() == 5));

        let err = service
            .create_venue(&guest, &cabin_form())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete_by_owner_only() {
        let service = BookingService::new(InMemoryApi::new());
        let owner = signed_up(&service, "kari", true).await;
        let other = signed_up(&service, "per", true).await;
        let venue = service
            .create_venue(&owner, &cabin_form())
            .await
            .unwrap()
            .venue;

        let mut form = VenueForm::from_venue(&venue);
        assert_eq!(form.address, "Fjordveien 1");
        form.price = Some(150.0);

        let err = service.update_venue(&other, &venue, &form).await.unwrap_err();
        assert!(matches!(err, FlowError::Forbidden(_)));

        let updated = service.update_venue(&owner, &venue, &form).await.unwrap();
        assert_eq!(updated.price, 150.0);
        assert_eq!(updated.media.len(), 1);

        assert!(service.delete_venue(&other, &venue).await.is_err());
        service.delete_venue(&owner, &venue).await.unwrap();
        assert!(service.catalog().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_profile_overview_by_role() {
        let service = BookingService::new(InMemoryApi::new());
        let manager = signed_up(&service, "kari", true).await;
        let guest = signed_up(&service, "ola", false).await;
        let venue = service
            .create_venue(&manager, &cabin_form())
            .await
            .unwrap()
            .venue;
        let range = DateRange::from_dates(date("2024-08-01"), date("2024-08-03"));
        service.book(&guest, &venue, &range, Some(1)).await.unwrap();

        let manager_view = service.load_profile(&manager, "kari").await.unwrap();
        assert!(manager_view.is_own_profile);
        match manager_view.listings {
            ProfileListings::Venues(venues) => {
                assert_eq!(venues.len(), 1);
                assert_eq!(venues[0].bookings().len(), 1);
            }
            other => panic!("expected venues, got {:?}", other),
        }

        let guest_view = service.load_profile(&manager, "ola").await.unwrap();
        assert!(!guest_view.is_own_profile);
        assert!(matches!(guest_view.listings, ProfileListings::Bookings(ref b) if b.len() == 1));
    }

    #[tokio::test]
    async fn test_update_profile_keeps_blank_fields() {
        let service = BookingService::new(InMemoryApi::new());
        let guest = signed_up(&service, "ola", false).await;
        let other = signed_up(&service, "per", false).await;
        let profile = service.load_profile(&guest, "ola").await.unwrap().profile;

        let updated = service
            .update_profile(&guest, &profile, "Likes cabins", "https://img.example/me.jpg")
            .await
            .unwrap();
        assert_eq!(updated.bio.as_deref(), Some("Likes cabins"));

        let kept = service
            .update_profile(&guest, &updated, "  ", "")
            .await
            .unwrap();
        assert_eq!(kept.bio.as_deref(), Some("Likes cabins"));
        assert_eq!(
            kept.avatar.map(|a| a.url),
            Some("https://img.example/me.jpg".to_string())
        );

        let err = service
            .update_profile(&other, &profile, "hacked", "")
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_invalid_auth_forms_never_reach_api() {
        let service = BookingService::new(InMemoryApi::new());

        let err = service
            .register(&SignUpForm {
                full_name: "Kari".to_string(),
                email: "kari@gmail.com".to_string(),
                password: "password123".to_string(),
                confirm_password: "password321".to_string(),
                venue_manager: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Auth(ref errors) if errors.0.len() == 2));

        let err = service
            .login(&LoginForm::new("kari@stud.noroff.no", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Auth(_)));

        assert_eq!(service.api().request_count(), 0);
    }

    #[tokio::test]
    async fn test_login_rejected_by_api_after_valid_form() {
        let service = BookingService::new(InMemoryApi::new());
        signed_up(&service, "ola", false).await;

        let err = service
            .login(&LoginForm::new("ola@stud.noroff.no", "wrong-password"))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Api(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_catalog_propagates_api_failure() {
        let api = InMemoryApi::new();
        api.fail_next_requests(1);
        let service = BookingService::new(api);

        let err = service.catalog().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(service.catalog().await.unwrap().is_empty());
    }
}
