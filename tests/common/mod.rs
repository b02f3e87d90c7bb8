#![allow(dead_code)]

use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::{Client, LocalResponse};
use serde_json::{json, Value};
use tempfile::TempDir;

use yatube_api::config::Settings;
use yatube_api::db::Pool;
use yatube_api::group::{Group, NewGroup};

pub const PASSWORD: &str = "s3cret-pass";

pub struct TestApp {
    pub client: Client,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> TestApp {
        let dir = tempfile::tempdir().expect("temp dir");
        let database_url = dir.path().join("db.sqlite3");
        let settings = Settings::new(database_url.to_string_lossy().into_owned(), "test-secret");
        let rocket = yatube_api::build(settings).expect("build rocket");
        let client = Client::tracked(rocket).expect("valid rocket instance");
        TestApp { client, _dir: dir }
    }

    /// Registers `username` and returns an access token.
    pub fn user(&self, username: &str) -> String {
        let response = self.post_json("/v1/users/", json!({ "username": username, "password": PASSWORD }), None);
        assert_eq!(response.status(), Status::Created);
        self.token(username)
    }

    pub fn token(&self, username: &str) -> String {
        let response = self.post_json(
            "/v1/jwt/create/",
            json!({ "username": username, "password": PASSWORD }),
            None,
        );
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().expect("token pair");
        body["access"].as_str().expect("access token").to_string()
    }

    pub fn group(&self, title: &str, slug: &str) -> Group {
        let pool = self.client.rocket().state::<Pool>().expect("managed pool");
        let mut connection = pool.get().expect("connection");
        NewGroup {
            title: title.into(),
            slug: slug.into(),
            description: format!("About {}", title),
        }
        .insert(&mut connection)
        .expect("group insert")
    }

    pub fn get(&self, uri: &str, token: Option<&str>) -> LocalResponse<'_> {
        let mut request = self.client.get(uri.to_string());
        if let Some(token) = token {
            request = request.header(bearer(token));
        }
        request.dispatch()
    }

    pub fn post_json(&self, uri: &str, body: Value, token: Option<&str>) -> LocalResponse<'_> {
        let mut request = self
            .client
            .post(uri.to_string())
            .header(ContentType::JSON)
            .body(body.to_string());
        if let Some(token) = token {
            request = request.header(bearer(token));
        }
        request.dispatch()
    }

    /// Sends `body` as is, for payloads that are not a JSON value.
    pub fn post_raw(&self, uri: &str, body: &str, token: Option<&str>) -> LocalResponse<'_> {
        let mut request = self
            .client
            .post(uri.to_string())
            .header(ContentType::JSON)
            .body(body.to_string());
        if let Some(token) = token {
            request = request.header(bearer(token));
        }
        request.dispatch()
    }

    pub fn put_json(&self, uri: &str, body: Value, token: Option<&str>) -> LocalResponse<'_> {
        let mut request = self
            .client
            .put(uri.to_string())
            .header(ContentType::JSON)
            .body(body.to_string());
        if let Some(token) = token {
            request = request.header(bearer(token));
        }
        request.dispatch()
    }

    pub fn patch_json(&self, uri: &str, body: Value, token: Option<&str>) -> LocalResponse<'_> {
        let mut request = self
            .client
            .patch(uri.to_string())
            .header(ContentType::JSON)
            .body(body.to_string());
        if let Some(token) = token {
            request = request.header(bearer(token));
        }
        request.dispatch()
    }

    pub fn delete(&self, uri: &str, token: Option<&str>) -> LocalResponse<'_> {
        let mut request = self.client.delete(uri.to_string());
        if let Some(token) = token {
            request = request.header(bearer(token));
        }
        request.dispatch()
    }

    /// Creates a post as the token's user and returns its JSON.
    pub fn post(&self, token: &str, body: Value) -> Value {
        let response = self.post_json("/v1/posts/", body, Some(token));
        assert_eq!(response.status(), Status::Created);
        response.into_json().expect("post body")
    }
}

pub fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {}", token))
}

pub fn json_body(response: LocalResponse<'_>) -> Value {
    response.into_json().expect("json body")
}
