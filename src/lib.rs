// Booking and venue browsing core for the Holidaze marketplace front end

pub mod api;
pub mod auth_form;
pub mod availability;
pub mod filter;
pub mod in_memory;
pub mod models;
pub mod service;
pub mod session;
pub mod venue_form;

// Re-export key types for convenience
pub use api::{
    ApiError, ClientConfig, ClientError, ClientStats, HolidazeApi, HttpApiClient, RetryConfig,
};
pub use auth_form::{AuthFormError, AuthFormErrors, LoginForm, SignUpForm};
pub use availability::{
    compute_nights, compute_total_price, prepare_booking, quote, validate_guest_count,
    validate_range, BookingError, DateRange, PriceQuote,
};
pub use filter::{sort_newest_first, FilterCriteria, FilterForm, VenueFilterEngine};
pub use in_memory::InMemoryApi;
pub use models::{Booking, BookingRequest, Profile, Venue, VenuePayload};
pub use service::{
    BookingService, FlowError, ProfileListings, ProfileOverview, VenueCatalog, VenueCreated,
    VenuePage,
};
pub use session::{role_of, Role, Session};
pub use venue_form::{VenueForm, VenueFormError, VenueFormErrors};
