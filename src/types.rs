use diesel::result::Error as DieselError;
use rocket::data::{self, Data, FromData, Limits};
use rocket::http::{Header, Status};
use rocket::outcome::Outcome;
use rocket::request::Request;
use rocket::response::{self, status, Responder, Response};
use rocket::serde::json::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

use crate::db::Connection;

pub trait Validate
where
    Self: Sized,
{
    type Valid;
    fn validate(self, connection: &mut Connection) -> Result<Self::Valid, ApiError>;
}

#[derive(Debug)]
pub enum ApiError {
    Diesel(DieselError),
    Validation(ValidationError),
    Parse(String),
    NotAuthenticated,
    InvalidToken,
    TokenNotValid,
    UserNotFound,
    BadCredentials,
    Forbidden,
    NotFound,
    MethodNotAllowed(&'static str),
    Internal,
}

impl From<DieselError> for ApiError {
    fn from(err: DieselError) -> ApiError {
        ApiError::Diesel(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> ApiError {
        ApiError::Validation(err)
    }
}

/// A JSON request body. An empty body reads as `{}`.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<T> JsonBody<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned> JsonBody<T> {
    pub fn parse(body: &str) -> Result<JsonBody<T>, ApiError> {
        let body = if body.trim().is_empty() { "{}" } else { body };
        serde_json::from_str(body)
            .map(JsonBody)
            .map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[rocket::async_trait]
impl<'r, T: DeserializeOwned + Send> FromData<'r> for JsonBody<T> {
    type Error = ApiError;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> data::Outcome<'r, Self> {
        let limit = req.limits().get("json").unwrap_or(Limits::JSON);
        let body = match data.open(limit).into_string().await {
            Ok(body) if body.is_complete() => body.into_inner(),
            Ok(_) => {
                let error = ApiError::Parse("request body is too large".to_string());
                return Outcome::Error((Status::PayloadTooLarge, error));
            }
            Err(e) => return Outcome::Error((Status::BadRequest, ApiError::Parse(e.to_string()))),
        };
        match JsonBody::parse(&body) {
            Ok(parsed) => Outcome::Success(parsed),
            Err(e) => Outcome::Error((Status::BadRequest, e)),
        }
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
pub type Created<T> = Result<status::Custom<Json<T>>, ApiError>;

pub fn created<T>(value: T) -> status::Custom<Json<T>> {
    status::Custom(Status::Created, Json(value))
}

/// Field name to messages, rendered as the 400 body.
#[derive(Debug, Serialize, Default, PartialEq)]
pub struct ValidationError(BTreeMap<String, Vec<String>>);

impl ValidationError {
    pub fn add_error<K: Into<String>, V: Into<String>>(&mut self, key: K, val: V) {
        let entry = self.0.entry(key.into()).or_default();
        entry.push(val.into());
    }

    pub fn from<K: Into<String>, V: Into<String>>(key: K, val: V) -> Self {
        let mut error = ValidationError::default();
        error.add_error(key, val);
        error
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn merge(&mut self, other: ValidationError) {
        for (key, errors) in other.0.into_iter() {
            let entry = self.0.entry(key).or_default();
            entry.extend(errors);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn messages(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `Ok(value)` when nothing was recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationError> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

fn detail(status: Status, body: serde_json::Value) -> (Status, Json<serde_json::Value>) {
    (status, Json(body))
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let (status, body) = match self {
            ApiError::Diesel(DieselError::NotFound) | ApiError::NotFound => {
                detail(Status::NotFound, json!({ "detail": "Not found." }))
            }
            ApiError::Diesel(error) => {
                tracing::error!("database error: {}", error);
                detail(
                    Status::InternalServerError,
                    json!({ "detail": "A server error occurred." }),
                )
            }
            ApiError::Internal => detail(
                Status::InternalServerError,
                json!({ "detail": "A server error occurred." }),
            ),
            ApiError::Validation(error) => detail(Status::BadRequest, json!(error)),
            ApiError::Parse(reason) => detail(
                Status::BadRequest,
                json!({ "detail": format!("JSON parse error - {}", reason) }),
            ),
            ApiError::NotAuthenticated => detail(
                Status::Unauthorized,
                json!({ "detail": "Authentication credentials were not provided." }),
            ),
            ApiError::InvalidToken => detail(
                Status::Unauthorized,
                json!({
                    "detail": "Given token not valid for any token type",
                    "code": "token_not_valid"
                }),
            ),
            ApiError::TokenNotValid => detail(
                Status::Unauthorized,
                json!({ "detail": "Token is invalid or expired", "code": "token_not_valid" }),
            ),
            ApiError::UserNotFound => detail(
                Status::Unauthorized,
                json!({ "detail": "User not found", "code": "user_not_found" }),
            ),
            ApiError::BadCredentials => detail(
                Status::Unauthorized,
                json!({ "detail": "No active account found with the given credentials" }),
            ),
            ApiError::Forbidden => detail(
                Status::Forbidden,
                json!({ "detail": "You do not have permission to perform this action." }),
            ),
            ApiError::MethodNotAllowed(method) => detail(
                Status::MethodNotAllowed,
                json!({ "detail": format!("Method \"{}\" not allowed.", method) }),
            ),
        };

        let response = body.respond_to(req)?;
        let mut builder = Response::build_from(response);
        builder.status(status);
        if status == Status::Unauthorized {
            builder.header(Header::new("WWW-Authenticate", "Bearer realm=\"api\""));
        }
        builder.ok()
    }
}

impl<T> Validate for JsonBody<T>
where
    T: Validate,
{
    type Valid = <T as Validate>::Valid;
    fn validate(self, connection: &mut Connection) -> Result<Self::Valid, ApiError> {
        self.into_inner().validate(connection)
    }
}
