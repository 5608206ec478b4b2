// Sign-up and login form checks run before any credentials leave the client

use crate::models::{Credentials, Registration};
use std::fmt;
use thiserror::Error;

pub const STUDENT_EMAIL_DOMAIN: &str = "stud.noroff.no";
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthFormError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Email must end with @stud.noroff.no")]
    InvalidEmail,

    #[error("Password must be at least 6 characters")]
    PasswordTooShort,

    #[error("Passwords must match")]
    PasswordMismatch,
}

/// Every field error of one submission, in field order.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthFormErrors(pub Vec<AuthFormError>);

impl fmt::Display for AuthFormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for AuthFormErrors {}

impl AuthFormErrors {
    pub fn contains(&self, error: &AuthFormError) -> bool {
        self.0.contains(error)
    }
}

/// `local@stud.noroff.no` where the local part is letters, digits, `_`, `.`, `+` or `-`.
pub fn is_student_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && local
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-'))
                && domain == STUDENT_EMAIL_DOMAIN
        }
        None => false,
    }
}

fn check_email(email: &str, errors: &mut Vec<AuthFormError>) {
    if email.is_empty() {
        errors.push(AuthFormError::MissingField("Email"));
    } else if !is_student_email(email) {
        errors.push(AuthFormError::InvalidEmail);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    // Length is only enforced at sign-up
    pub fn validate(&self) -> Result<Credentials, AuthFormErrors> {
        let mut errors = Vec::new();
        let email = self.email.trim();
        check_email(email, &mut errors);
        if self.password.is_empty() {
            errors.push(AuthFormError::MissingField("Password"));
        }

        if !errors.is_empty() {
            return Err(AuthFormErrors(errors));
        }
        Ok(Credentials {
            email: email.to_string(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignUpForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub venue_manager: bool,
}

impl SignUpForm {
    pub fn validate(&self) -> Result<Registration, AuthFormErrors> {
        let mut errors = Vec::new();

        let full_name = self.full_name.trim();
        if full_name.is_empty() {
            errors.push(AuthFormError::MissingField("Full name"));
        }

        let email = self.email.trim();
        check_email(email, &mut errors);

        if self.password.is_empty() {
            errors.push(AuthFormError::MissingField("Password"));
        } else if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(AuthFormError::PasswordTooShort);
        }

        if self.confirm_password.is_empty() {
            errors.push(AuthFormError::MissingField("Confirm password"));
        } else if self.confirm_password != self.password {
            errors.push(AuthFormError::PasswordMismatch);
        }

        if !errors.is_empty() {
            return Err(AuthFormErrors(errors));
        }
        Ok(Registration {
            name: full_name.to_string(),
            email: email.to_string(),
            password: self.password.clone(),
            venue_manager: self.venue_manager,
        })
    }
}
