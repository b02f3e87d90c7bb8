use diesel::result::Error as DieselError;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Settings;
use crate::db::{Connection, DbConnection, TryLoadById};
use crate::fields::CharField;
use crate::types::{created, ApiError, ApiResult, Created, JsonBody, Validate, ValidationError};
use crate::utils::{deserialize_some, now};

pub mod models;
pub mod tokens;
mod utils;

use self::models::{NewUser, User};
use self::tokens::{issue_pair, TokenPayload, TokenType};
use self::utils::*;

pub type CurrentUser = Result<User, ApiError>;

fn bearer_token<'r>(request: &'r Request<'_>) -> Option<&'r str> {
    let header = request.headers().get_one("Authorization")?;
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let token = match bearer_token(request) {
            Some(token) => token,
            None => return Outcome::Error((Status::Unauthorized, ApiError::NotAuthenticated)),
        };
        let settings = match request.rocket().state::<Settings>() {
            Some(settings) => settings,
            None => return Outcome::Error((Status::InternalServerError, ApiError::Internal)),
        };
        let payload = match TokenPayload::verify(token, TokenType::Access, settings) {
            Some(payload) => payload,
            None => {
                tracing::debug!("rejected access token");
                return Outcome::Error((Status::Unauthorized, ApiError::InvalidToken));
            }
        };

        let mut connection = match request.guard::<DbConnection>().await {
            Outcome::Success(connection) => connection,
            _ => return Outcome::Error((Status::ServiceUnavailable, ApiError::Internal)),
        };
        match User::try_load_by_id(payload.user_id, &mut connection) {
            Ok(user) => Outcome::Success(user),
            Err(DieselError::NotFound) => {
                tracing::debug!(user_id = payload.user_id, "token for a deleted user");
                Outcome::Error((Status::Unauthorized, ApiError::UserNotFound))
            }
            Err(e) => Outcome::Error((Status::InternalServerError, e.into())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Registration {
    #[serde(default, deserialize_with = "deserialize_some")]
    username: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_some")]
    email: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_some")]
    password: Option<Value>,
}

impl Validate for Registration {
    type Valid = NewUser;

    fn validate(self, connection: &mut Connection) -> Result<NewUser, ApiError> {
        let mut errors = ValidationError::default();

        let username = CharField::new("username")
            .max_length(USERNAME_MAX_LENGTH)
            .clean(self.username, &mut errors);
        let email = CharField::new("email")
            .required(false)
            .allow_blank()
            .max_length(254)
            .clean(self.email, &mut errors)
            .unwrap_or_default();
        let password = CharField::new("password").clean(self.password, &mut errors);

        if let Some(ref username) = username {
            match validate_username(username, connection) {
                Ok(_) => {}
                Err(ApiError::Validation(e)) => errors.merge(e),
                Err(other) => return Err(other),
            }
        }
        if !email.is_empty() {
            if let Err(e) = validate_email_re(&email) {
                errors.merge(e);
            }
        }
        if let Some(ref password) = password {
            if let Err(e) = validate_password(password, username.as_deref()) {
                errors.merge(e);
            }
        }

        match (username, password) {
            (Some(username), Some(password)) if errors.is_empty() => Ok(NewUser {
                username,
                email,
                password: User::make_password(&password)?,
                date_joined: now(),
            }),
            _ => Err(errors.into()),
        }
    }
}

#[post("/users", data = "<registration>")]
pub fn register(
    mut connection: DbConnection,
    registration: Result<JsonBody<Registration>, ApiError>,
) -> Created<User> {
    let new_user = registration?.validate(&mut connection)?;
    let user = new_user.insert(&mut connection)?;
    tracing::info!(user_id = user.id, username = %user.username, "registered user");
    Ok(created(user))
}

#[get("/users/me")]
pub fn current(user: CurrentUser) -> ApiResult<User> {
    Ok(Json(user?))
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccount {
    #[serde(default, deserialize_with = "deserialize_some")]
    current_password: Option<Value>,
}

#[delete("/users/me", data = "<confirmation>")]
pub fn delete_current(
    mut connection: DbConnection,
    user: CurrentUser,
    confirmation: Result<JsonBody<DeleteAccount>, ApiError>,
) -> Result<Status, ApiError> {
    let user = user?;
    let mut errors = ValidationError::default();
    let password = CharField::new("current_password")
        .clean(confirmation?.into_inner().current_password, &mut errors);
    match password {
        Some(password) if user.verify_password(&password) => {}
        Some(_) => errors.add_error("current_password", "Invalid password."),
        None => {}
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    user.delete(&mut connection)?;
    tracing::info!(user_id = user.id, "deleted user");
    Ok(Status::NoContent)
}

#[derive(Debug, Deserialize)]
pub struct Login {
    #[serde(default, deserialize_with = "deserialize_some")]
    username: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_some")]
    password: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    refresh: String,
    access: String,
}

#[post("/jwt/create", data = "<login>")]
pub fn login(
    mut connection: DbConnection,
    settings: &State<Settings>,
    login: Result<JsonBody<Login>, ApiError>,
) -> ApiResult<TokenPair> {
    let login = login?.into_inner();
    let mut errors = ValidationError::default();
    let username = CharField::new("username").clean(login.username, &mut errors);
    let password = CharField::new("password").clean(login.password, &mut errors);
    let (username, password) = match (username, password) {
        (Some(username), Some(password)) if errors.is_empty() => (username, password),
        _ => return Err(errors.into()),
    };

    let user = match User::load_by_name(&username, &mut connection) {
        Ok(user) => user,
        Err(DieselError::NotFound) => return Err(ApiError::BadCredentials),
        Err(e) => return Err(e.into()),
    };
    if !user.verify_password(&password) {
        tracing::debug!(username = %username, "wrong password");
        return Err(ApiError::BadCredentials);
    }

    let (refresh, access) = issue_pair(user.id, settings)?;
    Ok(Json(TokenPair { refresh, access }))
}

#[derive(Debug, Deserialize)]
pub struct Refresh {
    #[serde(default, deserialize_with = "deserialize_some")]
    refresh: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Verify {
    #[serde(default, deserialize_with = "deserialize_some")]
    token: Option<Value>,
}

fn token_not_valid() -> ApiError {
    ApiError::TokenNotValid
}

#[post("/jwt/refresh", data = "<refresh>")]
pub fn refresh(
    settings: &State<Settings>,
    refresh: Result<JsonBody<Refresh>, ApiError>,
) -> ApiResult<Value> {
    let mut errors = ValidationError::default();
    let token = CharField::new("refresh").clean(refresh?.into_inner().refresh, &mut errors);
    let token = errors.into_result(token)?.ok_or_else(token_not_valid)?;

    let payload = TokenPayload::verify(&token, TokenType::Refresh, settings).ok_or_else(token_not_valid)?;
    let access = TokenPayload::new(TokenType::Access, payload.user_id, settings).sign(settings)?;
    Ok(Json(json!({ "access": access })))
}

#[post("/jwt/verify", data = "<verify>")]
pub fn verify(
    settings: &State<Settings>,
    verify: Result<JsonBody<Verify>, ApiError>,
) -> ApiResult<Value> {
    let mut errors = ValidationError::default();
    let token = CharField::new("token").clean(verify?.into_inner().token, &mut errors);
    let token = errors.into_result(token)?.ok_or_else(token_not_valid)?;

    let valid = TokenPayload::verify(&token, TokenType::Access, settings).is_some()
        || TokenPayload::verify(&token, TokenType::Refresh, settings).is_some();
    if valid {
        Ok(Json(json!({})))
    } else {
        Err(token_not_valid())
    }
}
