use chrono::NaiveDateTime;
use diesel::dsl::exists;
use diesel::expression_methods::EscapeExpressionMethods;
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use rocket::http::{Method, Status};
use rocket::serde::json::Json;
use rocket::FromForm;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::schema::{groups, posts, users};
use crate::db::{Connection, DbConnection, TryLoadById};
use crate::fields::{self, CharField};
use crate::filters::{self, contains_pattern, LIKE_ESCAPE};
use crate::group::Group;
use crate::pagination::{LimitOffset, Listing, Page, RequestUrl};
use crate::permissions::{authenticated_or_read_only, check_object_permission, Authored};
use crate::types::{created, ApiError, ApiResult, Created, JsonBody, Validate, ValidationError};
use crate::users::models::User;
use crate::users::CurrentUser;
use crate::utils::{deserialize_some, now, serialize_date};

pub const IMAGE_MAX_LENGTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable)]
pub struct Post {
    pub id: i32,
    pub text: String,
    pub pub_date: NaiveDateTime,
    pub author_id: i32,
    pub image: Option<String>,
    pub group_id: Option<i32>,
}

impl Authored for Post {
    fn author_id(&self) -> i32 {
        self.author_id
    }
}

impl TryLoadById for Post {
    fn try_load_by_id(post_id: i32, connection: &mut Connection) -> QueryResult<Post> {
        posts::table.find(post_id).get_result::<Post>(connection)
    }
}

impl Post {
    pub fn load_by_group(group_id_: i32, connection: &mut Connection) -> QueryResult<Vec<Post>> {
        use crate::db::schema::posts::dsl::*;
        posts
            .filter(group_id.eq(group_id_))
            .order(id.asc())
            .load::<Post>(connection)
    }
}

#[derive(Debug, Serialize)]
pub struct PostView {
    id: i32,
    author: String,
    text: String,
    #[serde(serialize_with = "serialize_date")]
    pub_date: NaiveDateTime,
    image: Option<String>,
    group: Option<i32>,
}

impl From<(Post, String)> for PostView {
    fn from(post_and_author: (Post, String)) -> Self {
        let (post, author) = post_and_author;
        PostView {
            id: post.id,
            author,
            text: post.text,
            pub_date: post.pub_date,
            image: post.image,
            group: post.group_id,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = posts)]
pub struct NewPost {
    pub text: String,
    pub pub_date: NaiveDateTime,
    pub author_id: i32,
    pub image: Option<String>,
    pub group_id: Option<i32>,
}

impl NewPost {
    pub fn insert(&self, connection: &mut Connection) -> QueryResult<Post> {
        diesel::insert_into(posts::table)
            .values(self)
            .get_result::<Post>(connection)
    }
}

/// Validated writable fields; `None` leaves a column untouched.
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = posts)]
pub struct PostChanges {
    pub text: Option<String>,
    pub image: Option<Option<String>>,
    pub group_id: Option<Option<i32>>,
}

impl PostChanges {
    fn is_empty(&self) -> bool {
        self.text.is_none() && self.image.is_none() && self.group_id.is_none()
    }

    fn into_new_post(self, author_id: i32) -> Result<NewPost, ApiError> {
        let text = self
            .text
            .ok_or_else(|| ValidationError::from("text", fields::REQUIRED))?;
        Ok(NewPost {
            text,
            pub_date: now(),
            author_id,
            image: self.image.flatten(),
            group_id: self.group_id.flatten(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PostInput {
    #[serde(default, deserialize_with = "deserialize_some")]
    text: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_some")]
    image: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_some")]
    group: Option<Value>,
}

impl PostInput {
    /// `partial` is PATCH: absent fields are left alone instead of required.
    pub fn clean(self, partial: bool, connection: &mut Connection) -> Result<PostChanges, ApiError> {
        let mut errors = ValidationError::default();

        let text = CharField::new("text")
            .required(!partial)
            .clean(self.text, &mut errors);
        let image = CharField::new("image")
            .required(false)
            .allow_blank()
            .max_length(IMAGE_MAX_LENGTH)
            .clean_nullable(self.image, &mut errors)
            .map(|image| image.filter(|image| !image.is_empty()));
        let group_id = fields::clean_pk("group", self.group, &mut errors);

        if let Some(Some(group_id)) = group_id {
            if !Group::exists(group_id, connection)? {
                errors.add_error("group", fields::does_not_exist(group_id));
            }
        }

        let changes = PostChanges {
            text,
            image,
            group_id,
        };
        Ok(errors.into_result(changes)?)
    }
}

impl Validate for PostInput {
    type Valid = PostChanges;

    fn validate(self, connection: &mut Connection) -> Result<PostChanges, ApiError> {
        self.clean(false, connection)
    }
}

#[derive(Debug, Default, FromForm)]
pub struct PostQuery {
    author: Option<String>,
    group: Option<String>,
    pub_date: Option<String>,
    ordering: Option<String>,
    search: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

type BoxedPosts = posts::BoxedQuery<'static, Sqlite>;

fn filtered(query: &PostQuery, connection: &mut Connection) -> Result<BoxedPosts, ApiError> {
    let mut errors = ValidationError::default();
    let author = filters::id_param("author", query.author.as_deref(), &mut errors);
    let group = filters::id_param("group", query.group.as_deref(), &mut errors);
    let pub_date = filters::datetime_param("pub_date", query.pub_date.as_deref(), &mut errors);

    if let Some(author) = author {
        if !User::exists(author, connection)? {
            errors.add_error("author", filters::INVALID_CHOICE);
        }
    }
    if let Some(group) = group {
        if !Group::exists(group, connection)? {
            errors.add_error("group", filters::INVALID_CHOICE);
        }
    }
    errors.into_result(())?;

    let mut posts_query: BoxedPosts = posts::table.into_boxed();
    if let Some(author) = author {
        posts_query = posts_query.filter(posts::author_id.eq(author));
    }
    if let Some(group) = group {
        posts_query = posts_query.filter(posts::group_id.eq(group));
    }
    if let Some(pub_date) = pub_date {
        posts_query = posts_query.filter(posts::pub_date.eq(pub_date));
    }

    for term in filters::search_terms(query.search.as_deref()) {
        let pattern = contains_pattern(&term);
        let by_author = users::table
            .filter(users::id.eq(posts::author_id))
            .filter(users::username.like(pattern.clone()).escape(LIKE_ESCAPE));
        let by_group = groups::table
            .filter(groups::id.nullable().eq(posts::group_id))
            .filter(
                groups::title
                    .like(pattern.clone())
                    .escape(LIKE_ESCAPE)
                    .or(groups::slug.like(pattern.clone()).escape(LIKE_ESCAPE)),
            );
        posts_query = posts_query.filter(
            posts::text
                .like(pattern)
                .escape(LIKE_ESCAPE)
                .or(exists(by_author))
                .or(exists(by_group)),
        );
    }
    Ok(posts_query)
}

fn ordered(mut posts_query: BoxedPosts, query: &PostQuery) -> BoxedPosts {
    let ordering = filters::ordering(query.ordering.as_deref(), &["author", "pub_date"], "-pub_date");
    let newest_first = ordering.first().map(|order| order.descending).unwrap_or(false);
    for order in ordering {
        posts_query = match (order.field, order.descending) {
            ("author", false) => posts_query.then_order_by(posts::author_id.asc()),
            ("author", true) => posts_query.then_order_by(posts::author_id.desc()),
            ("pub_date", false) => posts_query.then_order_by(posts::pub_date.asc()),
            ("pub_date", true) => posts_query.then_order_by(posts::pub_date.desc()),
            _ => posts_query,
        };
    }
    if newest_first {
        posts_query.then_order_by(posts::id.desc())
    } else {
        posts_query.then_order_by(posts::id.asc())
    }
}

fn with_authors(posts: Vec<Post>, connection: &mut Connection) -> QueryResult<Vec<PostView>> {
    let author_ids: Vec<i32> = posts.iter().map(|post| post.author_id).collect();
    let authors = User::usernames(&author_ids, connection)?;
    Ok(posts
        .into_iter()
        .map(|post| {
            let author = authors.get(&post.author_id).cloned().unwrap_or_default();
            PostView::from((post, author))
        })
        .collect())
}

#[get("/posts?<query..>")]
pub fn list(
    mut connection: DbConnection,
    user: CurrentUser,
    url: RequestUrl,
    query: PostQuery,
) -> ApiResult<Listing<PostView>> {
    authenticated_or_read_only(Method::Get, user)?;

    let page = LimitOffset::from_query(query.limit.as_deref(), query.offset.as_deref());
    let posts_query = ordered(filtered(&query, &mut connection)?, &query);

    match page {
        None => {
            let posts = posts_query.load::<Post>(&mut *connection)?;
            Ok(Json(Listing::All(with_authors(posts, &mut connection)?)))
        }
        Some(page) => {
            let count = filtered(&query, &mut connection)?
                .count()
                .get_result::<i64>(&mut *connection)?;
            let posts = posts_query
                .limit(page.limit)
                .offset(page.offset)
                .load::<Post>(&mut *connection)?;
            let results = with_authors(posts, &mut connection)?;
            Ok(Json(Listing::Page(Page::new(results, count, page, &url))))
        }
    }
}

fn load_view(post_id: i32, connection: &mut Connection) -> QueryResult<PostView> {
    posts::table
        .inner_join(users::table)
        .filter(posts::id.eq(post_id))
        .select((posts::all_columns, users::username))
        .get_result::<(Post, String)>(connection)
        .map(PostView::from)
}

#[get("/posts/<id>")]
pub fn retrieve(mut connection: DbConnection, user: CurrentUser, id: i32) -> ApiResult<PostView> {
    authenticated_or_read_only(Method::Get, user)?;
    Ok(Json(load_view(id, &mut connection)?))
}

#[post("/posts", data = "<input>")]
pub fn create(
    mut connection: DbConnection,
    user: CurrentUser,
    input: Result<JsonBody<PostInput>, ApiError>,
) -> Created<PostView> {
    let user = user?;
    let new_post = input?
        .validate(&mut connection)?
        .into_new_post(user.id)?;
    let post = new_post.insert(&mut connection)?;
    tracing::info!(post_id = post.id, author_id = user.id, "created post");
    Ok(created((post, user.username).into()))
}

fn update_post(
    connection: &mut Connection,
    method: Method,
    user: CurrentUser,
    id: i32,
    input: Result<JsonBody<PostInput>, ApiError>,
) -> ApiResult<PostView> {
    let user = user?;
    let post = Post::try_load_by_id(id, connection)?;
    check_object_permission(method, Some(&user), &post)?;

    let changes = input?.into_inner().clean(method == Method::Patch, connection)?;
    let post = if changes.is_empty() {
        post
    } else {
        diesel::update(&post).set(&changes).get_result::<Post>(connection)?
    };
    tracing::info!(post_id = post.id, "updated post");
    Ok(Json((post, user.username).into()))
}

#[put("/posts/<id>", data = "<input>")]
pub fn update(
    mut connection: DbConnection,
    method: Method,
    user: CurrentUser,
    id: i32,
    input: Result<JsonBody<PostInput>, ApiError>,
) -> ApiResult<PostView> {
    update_post(&mut connection, method, user, id, input)
}

#[patch("/posts/<id>", data = "<input>")]
pub fn partial_update(
    mut connection: DbConnection,
    method: Method,
    user: CurrentUser,
    id: i32,
    input: Result<JsonBody<PostInput>, ApiError>,
) -> ApiResult<PostView> {
    update_post(&mut connection, method, user, id, input)
}

#[delete("/posts/<id>")]
pub fn destroy(
    mut connection: DbConnection,
    method: Method,
    user: CurrentUser,
    id: i32,
) -> Result<Status, ApiError> {
    let user = user?;
    let post = Post::try_load_by_id(id, &mut connection)?;
    check_object_permission(method, Some(&user), &post)?;

    diesel::delete(&post).execute(&mut *connection)?;
    tracing::info!(post_id = post.id, "deleted post");
    Ok(Status::NoContent)
}
