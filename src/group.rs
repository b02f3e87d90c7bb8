use diesel::dsl::exists;
use diesel::expression_methods::EscapeExpressionMethods;
use diesel::prelude::*;
use diesel::select;
use diesel::sqlite::Sqlite;
use lazy_static::lazy_static;
use regex::Regex;
use rocket::http::Method;
use rocket::serde::json::Json;
use rocket::FromForm;
use serde::Serialize;

use crate::db::schema::groups;
use crate::db::{Connection, DbConnection, TryLoadById};
use crate::filters::{self, contains_pattern, LIKE_ESCAPE};
use crate::permissions::authenticated_or_read_only;
use crate::types::{ApiError, ApiResult, ValidationError};
use crate::users::CurrentUser;

pub const TITLE_MAX_LENGTH: usize = 200;
pub const SLUG_MAX_LENGTH: usize = 50;

lazy_static! {
    static ref SLUG_RE: Regex = Regex::new(r"\A[-a-zA-Z0-9_]+\z").unwrap();
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Serialize)]
pub struct Group {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl Group {
    pub fn load_by_slug(slug_: &str, connection: &mut Connection) -> QueryResult<Group> {
        use crate::db::schema::groups::dsl::*;
        groups.filter(slug.eq(slug_)).get_result::<Group>(connection)
    }

    pub fn all(connection: &mut Connection) -> QueryResult<Vec<Group>> {
        groups::table
            .order((groups::title.asc(), groups::id.asc()))
            .load::<Group>(connection)
    }

    /// Deletes the group. Its posts stay, ungrouped.
    pub fn delete(&self, connection: &mut Connection) -> QueryResult<usize> {
        diesel::delete(self).execute(connection)
    }

    pub fn exists(group_id: i32, connection: &mut Connection) -> QueryResult<bool> {
        select(exists(groups::table.find(group_id))).get_result::<bool>(connection)
    }
}

impl TryLoadById for Group {
    fn try_load_by_id(group_id: i32, connection: &mut Connection) -> QueryResult<Group> {
        groups::table.find(group_id).get_result::<Group>(connection)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = groups)]
pub struct NewGroup {
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl NewGroup {
    pub fn validate(&self, connection: &mut Connection) -> Result<(), ApiError> {
        use crate::db::schema::groups::dsl::*;
        let mut errors = ValidationError::default();

        if self.title.trim().is_empty() {
            errors.add_error("title", "This field may not be blank.");
        } else if self.title.chars().count() > TITLE_MAX_LENGTH {
            errors.add_error(
                "title",
                format!("Ensure this field has no more than {} characters.", TITLE_MAX_LENGTH),
            );
        }

        if !SLUG_RE.is_match(&self.slug) {
            errors.add_error(
                "slug",
                "Enter a valid \"slug\" consisting of letters, numbers, underscores or hyphens.",
            );
        } else if self.slug.len() > SLUG_MAX_LENGTH {
            errors.add_error(
                "slug",
                format!("Ensure this field has no more than {} characters.", SLUG_MAX_LENGTH),
            );
        } else {
            let taken = select(exists(groups.filter(slug.eq(&self.slug)))).get_result::<bool>(connection)?;
            if taken {
                errors.add_error("slug", "group with this slug already exists.");
            }
        }

        errors.into_result(()).map_err(ApiError::from)
    }

    pub fn insert(&self, connection: &mut Connection) -> Result<Group, ApiError> {
        self.validate(connection)?;
        let group = diesel::insert_into(groups::table)
            .values(self)
            .get_result::<Group>(connection)?;
        tracing::info!(group_id = group.id, slug = %group.slug, "created group");
        Ok(group)
    }
}

#[derive(Debug, Default, FromForm)]
pub struct GroupQuery {
    slug: Option<String>,
    title: Option<String>,
    ordering: Option<String>,
    search: Option<String>,
}

type BoxedGroups = groups::BoxedQuery<'static, Sqlite>;

fn filtered(query: &GroupQuery) -> BoxedGroups {
    let mut groups_query: BoxedGroups = groups::table.into_boxed();

    if let Some(slug) = filters::text_param(query.slug.as_deref()) {
        groups_query = groups_query.filter(groups::slug.eq(slug.to_string()));
    }
    if let Some(title) = filters::text_param(query.title.as_deref()) {
        groups_query = groups_query.filter(groups::title.eq(title.to_string()));
    }
    for term in filters::search_terms(query.search.as_deref()) {
        let pattern = contains_pattern(&term);
        groups_query = groups_query.filter(
            groups::title
                .like(pattern.clone())
                .escape(LIKE_ESCAPE)
                .or(groups::slug.like(pattern.clone()).escape(LIKE_ESCAPE))
                .or(groups::description.like(pattern).escape(LIKE_ESCAPE)),
        );
    }

    for order in filters::ordering(query.ordering.as_deref(), &["slug", "title"], "title") {
        groups_query = match (order.field, order.descending) {
            ("slug", false) => groups_query.then_order_by(groups::slug.asc()),
            ("slug", true) => groups_query.then_order_by(groups::slug.desc()),
            ("title", false) => groups_query.then_order_by(groups::title.asc()),
            ("title", true) => groups_query.then_order_by(groups::title.desc()),
            _ => groups_query,
        };
    }
    groups_query.then_order_by(groups::id.asc())
}

#[get("/groups?<query..>")]
pub fn list(mut connection: DbConnection, user: CurrentUser, query: GroupQuery) -> ApiResult<Vec<Group>> {
    authenticated_or_read_only(Method::Get, user)?;
    let groups = filtered(&query).load::<Group>(&mut *connection)?;
    Ok(Json(groups))
}

#[get("/groups/<id>")]
pub fn retrieve(mut connection: DbConnection, user: CurrentUser, id: i32) -> ApiResult<Group> {
    authenticated_or_read_only(Method::Get, user)?;
    Ok(Json(Group::try_load_by_id(id, &mut connection)?))
}

/// Groups are read-only over the API: writes answer 405 once authenticated.
fn read_only(method: Method, user: CurrentUser) -> ApiError {
    match authenticated_or_read_only(method, user) {
        Ok(_) => ApiError::MethodNotAllowed(method.as_str()),
        Err(e) => e,
    }
}

#[post("/groups")]
pub fn create(method: Method, user: CurrentUser) -> ApiError {
    read_only(method, user)
}

#[put("/groups/<_id>")]
pub fn update(method: Method, user: CurrentUser, _id: i32) -> ApiError {
    read_only(method, user)
}

#[patch("/groups/<_id>")]
pub fn partial_update(method: Method, user: CurrentUser, _id: i32) -> ApiError {
    read_only(method, user)
}

#[delete("/groups/<_id>")]
pub fn destroy(method: Method, user: CurrentUser, _id: i32) -> ApiError {
    read_only(method, user)
}
