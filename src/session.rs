// Explicit authentication context threaded through every authenticated call

use crate::models::{LoginData, Venue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub user_name: String,
    pub venue_manager: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Anonymous,
    Customer,
    VenueManager,
}

impl From<LoginData> for Session {
    fn from(data: LoginData) -> Self {
        Self {
            access_token: data.access_token,
            user_name: data.name,
            venue_manager: data.venue_manager.unwrap_or(false),
        }
    }
}

impl Session {
    pub fn role(&self) -> Role {
        if self.venue_manager {
            Role::VenueManager
        } else {
            Role::Customer
        }
    }

    pub fn is_own_profile(&self, profile_name: &str) -> bool {
        self.user_name == profile_name
    }

    pub fn owns(&self, venue: &Venue) -> bool {
        venue.owner_name() == Some(self.user_name.as_str())
    }

    // Venue managers never book
    pub fn can_book(&self) -> bool {
        !self.venue_manager
    }

    pub fn can_create_venue(&self) -> bool {
        self.venue_manager
    }

    pub fn can_manage(&self, venue: &Venue) -> bool {
        self.venue_manager && self.owns(venue)
    }
}

pub fn role_of(session: Option<&Session>) -> Role {
    session.map_or(Role::Anonymous, Session::role)
}
