#[macro_use]
extern crate rocket;
#[macro_use]
extern crate error_chain;

pub mod comment;
pub mod config;
pub mod db;
pub mod errors;
pub mod fields;
pub mod filters;
pub mod follow;
pub mod group;
pub mod logger;
pub mod pagination;
pub mod permissions;
pub mod post;
pub mod types;
pub mod users;
pub mod utils;

use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Build, Request, Rocket};
use serde_json::{json, Value};

use crate::config::Settings;
use crate::pagination::RequestUrl;

fn detail(status: Status, message: &str) -> (Status, Json<Value>) {
    (status, Json(json!({ "detail": message })))
}

#[catch(400)]
fn bad_request() -> (Status, Json<Value>) {
    detail(Status::BadRequest, "Bad request.")
}

#[catch(401)]
fn unauthorized() -> (Status, Json<Value>) {
    detail(Status::Unauthorized, "Authentication credentials were not provided.")
}

#[catch(403)]
fn forbidden() -> (Status, Json<Value>) {
    detail(Status::Forbidden, "You do not have permission to perform this action.")
}

#[catch(404)]
fn not_found() -> (Status, Json<Value>) {
    detail(Status::NotFound, "Not found.")
}

/// A path segment that does not parse, such as `/v1/posts/abc/`.
#[catch(422)]
fn unprocessable() -> (Status, Json<Value>) {
    detail(Status::NotFound, "Not found.")
}

#[catch(503)]
fn unavailable() -> (Status, Json<Value>) {
    detail(Status::ServiceUnavailable, "Service temporarily unavailable, try again later.")
}

#[catch(default)]
fn default_catcher(status: Status, _request: &Request) -> (Status, Json<Value>) {
    if status.code >= 500 {
        detail(status, "A server error occurred.")
    } else {
        detail(status, status.reason().unwrap_or("Error."))
    }
}

#[get("/v1")]
fn api_root(url: RequestUrl) -> Json<Value> {
    Json(json!({
        "follow": url.join("/v1/follow/"),
        "groups": url.join("/v1/groups/"),
        "posts": url.join("/v1/posts/"),
    }))
}

/// Opens the pool, applies pending migrations and assembles the server.
pub fn build(settings: Settings) -> errors::Result<Rocket<Build>> {
    let pool = db::init_pool(&settings.database_url, settings.pool_size)?;
    db::run_migrations(&pool)?;
    tracing::info!(database = %settings.database_url, "database ready");

    Ok(rocket::build()
        .manage(pool)
        .manage(settings)
        .mount("/", routes![api_root])
        .mount(
            "/v1",
            routes![
                users::register,
                users::current,
                users::delete_current,
                users::login,
                users::refresh,
                users::verify,
            ],
        )
        .mount(
            "/v1",
            routes![
                group::list,
                group::retrieve,
                group::create,
                group::update,
                group::partial_update,
                group::destroy,
            ],
        )
        .mount(
            "/v1",
            routes![
                post::list,
                post::retrieve,
                post::create,
                post::update,
                post::partial_update,
                post::destroy,
            ],
        )
        .mount(
            "/v1",
            routes![
                comment::list,
                comment::retrieve,
                comment::create,
                comment::update,
                comment::partial_update,
                comment::destroy,
            ],
        )
        .mount("/v1", routes![follow::list, follow::create])
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                unprocessable,
                unavailable,
                default_catcher
            ],
        ))
}
