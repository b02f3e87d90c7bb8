use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::select;
use lazy_static::lazy_static;
use regex::Regex;

use crate::db::Connection;
use crate::types::{ApiError, ValidationError};

pub const USERNAME_MAX_LENGTH: usize = 150;
pub const PASSWORD_MIN_LENGTH: usize = 8;

lazy_static! {
    static ref EMAIL_RE: Regex = {
        let pattern = r"\A[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?\.)+[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?\z";
        Regex::new(pattern).unwrap()
    };
    static ref USERNAME_RE: Regex = Regex::new(r"\A[\w.@+-]+\z").unwrap();
}

pub fn validate_email_re(email: &str) -> Result<(), ValidationError> {
    if !EMAIL_RE.is_match(email) {
        Err(ValidationError::from("email", "Enter a valid email address."))
    } else {
        Ok(())
    }
}

pub fn validate_username_re(username: &str) -> Result<(), ValidationError> {
    if !USERNAME_RE.is_match(username) {
        Err(ValidationError::from(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        ))
    } else {
        Ok(())
    }
}

pub fn validate_username(username_to_validate: &str, connection: &mut Connection) -> Result<(), ApiError> {
    use crate::db::schema::users::dsl::*;
    validate_username_re(username_to_validate)?;

    let username_exists = select(exists(users.filter(username.eq(username_to_validate))))
        .get_result::<bool>(connection)?;
    if username_exists {
        Err(ValidationError::from("username", "A user with that username already exists.").into())
    } else {
        Ok(())
    }
}

pub fn validate_password(password: &str, username: Option<&str>) -> Result<(), ValidationError> {
    let mut errors = ValidationError::default();
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        errors.add_error(
            "password",
            format!(
                "This password is too short. It must contain at least {} characters.",
                PASSWORD_MIN_LENGTH
            ),
        );
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.add_error("password", "This password is entirely numeric.");
    }
    if let Some(username) = username {
        if !username.is_empty() && password.eq_ignore_ascii_case(username) {
            errors.add_error("password", "The password is too similar to the username.");
        }
    }
    errors.into_result(())
}
