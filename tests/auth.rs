mod common;

use rocket::http::Status;
use serde_json::{json, Value};

use common::{json_body, TestApp, PASSWORD};

#[test]
fn register_returns_public_fields_only() {
    let app = TestApp::new();
    let response = app.post_json(
        "/v1/users/",
        json!({ "username": "leo", "email": "leo@example.com", "password": PASSWORD }),
        None,
    );
    assert_eq!(response.status(), Status::Created);
    let body = json_body(response);
    assert_eq!(body["username"], "leo");
    assert_eq!(body["email"], "leo@example.com");
    assert!(body["id"].is_i64());
    assert!(body.get("password").is_none());
}

#[test]
fn register_rejects_taken_names_and_weak_passwords() {
    let app = TestApp::new();
    app.user("leo");

    let response = app.post_json("/v1/users/", json!({ "username": "leo", "password": PASSWORD }), None);
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(
        json_body(response),
        json!({ "username": ["A user with that username already exists."] })
    );

    let response = app.post_json("/v1/users/", json!({ "username": "anna", "password": "12345678" }), None);
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(
        json_body(response)["password"],
        json!(["This password is entirely numeric."])
    );

    let response = app.post_json("/v1/users/", json!({ "email": "not-an-email" }), None);
    assert_eq!(response.status(), Status::BadRequest);
    let body = json_body(response);
    assert_eq!(body["username"], json!(["This field is required."]));
    assert_eq!(body["password"], json!(["This field is required."]));
    assert_eq!(body["email"], json!(["Enter a valid email address."]));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let app = TestApp::new();
    let response = app
        .client
        .post("/v1/users/")
        .header(rocket::http::ContentType::JSON)
        .body("{\"username\": ")
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);
    let body = json_body(response);
    assert!(body["detail"].as_str().unwrap().starts_with("JSON parse error - "));
}

#[test]
fn bad_credentials_are_rejected() {
    let app = TestApp::new();
    app.user("leo");

    let response = app.post_json("/v1/jwt/create/", json!({ "username": "leo", "password": "wrong-one" }), None);
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(
        response.headers().get_one("WWW-Authenticate"),
        Some("Bearer realm=\"api\"")
    );
    assert_eq!(
        json_body(response),
        json!({ "detail": "No active account found with the given credentials" })
    );
}

#[test]
fn me_requires_a_valid_token() {
    let app = TestApp::new();
    let token = app.user("leo");

    let response = app.get("/v1/users/me/", Some(&token));
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(json_body(response)["username"], "leo");

    let response = app.get("/v1/users/me/", None);
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(
        json_body(response),
        json!({ "detail": "Authentication credentials were not provided." })
    );
}

#[test]
fn bad_token_is_rejected_even_on_safe_methods() {
    let app = TestApp::new();
    let response = app.get("/v1/posts/", Some("not.a.token"));
    assert_eq!(response.status(), Status::Unauthorized);
    let body = json_body(response);
    assert_eq!(body["code"], "token_not_valid");
    assert_eq!(body["detail"], "Given token not valid for any token type");
}

#[test]
fn refresh_token_cannot_authenticate_but_issues_access() {
    let app = TestApp::new();
    app.user("leo");
    let pair = json_body(app.post_json(
        "/v1/jwt/create/",
        json!({ "username": "leo", "password": PASSWORD }),
        None,
    ));
    let refresh = pair["refresh"].as_str().unwrap().to_string();

    let response = app.get("/v1/users/me/", Some(&refresh));
    assert_eq!(response.status(), Status::Unauthorized);

    let response = app.post_json("/v1/jwt/refresh/", json!({ "refresh": refresh }), None);
    assert_eq!(response.status(), Status::Ok);
    let access = json_body(response)["access"].as_str().unwrap().to_string();

    let response = app.get("/v1/users/me/", Some(&access));
    assert_eq!(response.status(), Status::Ok);

    let response = app.post_json("/v1/jwt/refresh/", json!({ "refresh": access }), None);
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(
        json_body(response),
        json!({ "detail": "Token is invalid or expired", "code": "token_not_valid" })
    );
}

#[test]
fn verify_accepts_issued_tokens_only() {
    let app = TestApp::new();
    let token = app.user("leo");

    let response = app.post_json("/v1/jwt/verify/", json!({ "token": token }), None);
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(json_body(response), json!({}));

    let response = app.post_json("/v1/jwt/verify/", json!({ "token": "garbage" }), None);
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(json_body(response)["code"], "token_not_valid");
}

#[test]
fn deleting_the_account_removes_its_content() {
    let app = TestApp::new();
    let token = app.user("leo");
    let post = app.post(&token, json!({ "text": "War and Peace" }));

    let response = app
        .client
        .delete("/v1/users/me/")
        .header(common::bearer(&token))
        .header(rocket::http::ContentType::JSON)
        .body(json!({ "current_password": "nope-nope" }).to_string())
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(json_body(response), json!({ "current_password": ["Invalid password."] }));

    let response = app
        .client
        .delete("/v1/users/me/")
        .header(common::bearer(&token))
        .header(rocket::http::ContentType::JSON)
        .body(json!({ "current_password": PASSWORD }).to_string())
        .dispatch();
    assert_eq!(response.status(), Status::NoContent);

    let response = app.get("/v1/users/me/", Some(&token));
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(json_body(response)["code"], "user_not_found");

    let response = app.get(&format!("/v1/posts/{}/", post["id"]), None);
    assert_eq!(response.status(), Status::NotFound);

    let posts: Value = json_body(app.get("/v1/posts/", None));
    assert_eq!(posts, json!([]));
}
