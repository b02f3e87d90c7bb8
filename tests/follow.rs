mod common;

use rocket::http::Status;
use serde_json::json;

use common::{json_body, TestApp};

#[test]
fn follow_requires_authentication() {
    let app = TestApp::new();
    app.user("leo");

    assert_eq!(app.get("/v1/follow/", None).status(), Status::Unauthorized);
    let response = app.post_json("/v1/follow/", json!({ "following": "leo" }), None);
    assert_eq!(response.status(), Status::Unauthorized);
}

#[test]
fn follow_and_list() {
    let app = TestApp::new();
    let leo = app.user("leo");
    app.user("fyodor");
    app.user("anton");

    for name in ["fyodor", "anton"] {
        let response = app.post_json("/v1/follow/", json!({ "following": name }), Some(&leo));
        assert_eq!(response.status(), Status::Created);
        assert_eq!(json_body(response), json!({ "user": "leo", "following": name }));
    }

    let listing = json_body(app.get("/v1/follow/", Some(&leo)));
    assert_eq!(
        listing,
        json!([
            { "user": "leo", "following": "fyodor" },
            { "user": "leo", "following": "anton" },
        ])
    );

    let listing = json_body(app.get("/v1/follow/?search=ANT", Some(&leo)));
    assert_eq!(listing, json!([{ "user": "leo", "following": "anton" }]));

    let anton = app.token("anton");
    assert_eq!(json_body(app.get("/v1/follow/", Some(&anton))), json!([]));
}

#[test]
fn invalid_follows_are_rejected() {
    let app = TestApp::new();
    let leo = app.user("leo");
    app.user("fyodor");

    let response = app.post_json("/v1/follow/", json!({ "following": "leo" }), Some(&leo));
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(json_body(response), json!({ "following": ["You cannot follow yourself"] }));

    let response = app.post_json("/v1/follow/", json!({ "following": "nobody" }), Some(&leo));
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(
        json_body(response),
        json!({ "following": ["Object with username=nobody does not exist."] })
    );

    let response = app.post_json("/v1/follow/", json!({}), Some(&leo));
    assert_eq!(json_body(response), json!({ "following": ["This field is required."] }));

    let response = app.post_json("/v1/follow/", json!({ "following": "fyodor" }), Some(&leo));
    assert_eq!(response.status(), Status::Created);
    let response = app.post_json("/v1/follow/", json!({ "following": "fyodor" }), Some(&leo));
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(
        json_body(response),
        json!({ "non_field_errors": ["You already follow this user"] })
    );
}

#[test]
fn deleting_a_user_drops_their_follows() {
    let app = TestApp::new();
    let leo = app.user("leo");
    let fyodor = app.user("fyodor");
    app.post_json("/v1/follow/", json!({ "following": "fyodor" }), Some(&leo));

    let response = app
        .client
        .delete("/v1/users/me/")
        .header(common::bearer(&fyodor))
        .header(rocket::http::ContentType::JSON)
        .body(json!({ "current_password": common::PASSWORD }).to_string())
        .dispatch();
    assert_eq!(response.status(), Status::NoContent);

    assert_eq!(json_body(app.get("/v1/follow/", Some(&leo))), json!([]));
}
