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

use crate::db::schema::{comments, users};
use crate::db::{Connection, DbConnection, TryLoadById};
use crate::fields::CharField;
use crate::filters::{self, contains_pattern, LIKE_ESCAPE};
use crate::permissions::{authenticated_or_read_only, check_object_permission, Authored};
use crate::post::Post;
use crate::types::{created, ApiError, ApiResult, Created, JsonBody, ValidationError};
use crate::users::models::User;
use crate::users::CurrentUser;
use crate::utils::{deserialize_some, now, serialize_date};

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Associations)]
#[diesel(belongs_to(Post))]
pub struct Comment {
    pub id: i32,
    pub author_id: i32,
    pub post_id: i32,
    pub text: String,
    pub created: NaiveDateTime,
}

impl Authored for Comment {
    fn author_id(&self) -> i32 {
        self.author_id
    }
}

impl Comment {
    /// The comment, if it belongs to `post`.
    pub fn load_for_post(post: &Post, comment_id: i32, connection: &mut Connection) -> QueryResult<Comment> {
        Comment::belonging_to(post)
            .filter(comments::id.eq(comment_id))
            .get_result::<Comment>(connection)
    }
}

#[derive(Serialize, Debug)]
pub struct CommentView {
    id: i32,
    author: String,
    post: i32,
    text: String,
    #[serde(serialize_with = "serialize_date")]
    created: NaiveDateTime,
}

impl From<(Comment, String)> for CommentView {
    fn from(comment_and_author: (Comment, String)) -> Self {
        let (comment, author) = comment_and_author;
        CommentView {
            id: comment.id,
            author,
            post: comment.post_id,
            text: comment.text,
            created: comment.created,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment {
    author_id: i32,
    post_id: i32,
    text: String,
    created: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct CommentInput {
    #[serde(default, deserialize_with = "deserialize_some")]
    text: Option<Value>,
}

impl CommentInput {
    fn text(self) -> Result<String, ValidationError> {
        CharField::new("text").clean_required(self.text)
    }

    /// The cleaned text; `None` on a partial update that leaves it alone.
    fn clean(self, partial: bool) -> Result<Option<String>, ValidationError> {
        if partial && self.text.is_none() {
            return Ok(None);
        }
        self.text().map(Some)
    }
}

#[derive(Debug, Default, FromForm)]
pub struct CommentQuery {
    author: Option<String>,
    post: Option<String>,
    created: Option<String>,
    ordering: Option<String>,
    search: Option<String>,
}

type BoxedComments = comments::BoxedQuery<'static, Sqlite>;

fn filtered(post: &Post, query: &CommentQuery, connection: &mut Connection) -> Result<BoxedComments, ApiError> {
    let mut errors = ValidationError::default();
    let author = filters::id_param("author", query.author.as_deref(), &mut errors);
    let post_filter = filters::id_param("post", query.post.as_deref(), &mut errors);
    let created = filters::datetime_param("created", query.created.as_deref(), &mut errors);

    if let Some(author) = author {
        if !User::exists(author, connection)? {
            errors.add_error("author", filters::INVALID_CHOICE);
        }
    }
    if let Some(post_filter) = post_filter {
        match Post::try_load_by_id(post_filter, connection) {
            Ok(_) => {}
            Err(diesel::result::Error::NotFound) => errors.add_error("post", filters::INVALID_CHOICE),
            Err(e) => return Err(e.into()),
        }
    }
    errors.into_result(())?;

    let mut comments_query: BoxedComments = comments::table
        .filter(comments::post_id.eq(post.id))
        .into_boxed();
    if let Some(author) = author {
        comments_query = comments_query.filter(comments::author_id.eq(author));
    }
    if let Some(post_filter) = post_filter {
        comments_query = comments_query.filter(comments::post_id.eq(post_filter));
    }
    if let Some(created) = created {
        comments_query = comments_query.filter(comments::created.eq(created));
    }

    for term in filters::search_terms(query.search.as_deref()) {
        let pattern = contains_pattern(&term);
        let by_author = users::table
            .filter(users::id.eq(comments::author_id))
            .filter(users::username.like(pattern.clone()).escape(LIKE_ESCAPE));
        comments_query = comments_query.filter(
            comments::text
                .like(pattern)
                .escape(LIKE_ESCAPE)
                .or(exists(by_author)),
        );
    }

    let ordering = filters::ordering(query.ordering.as_deref(), &["author", "post", "created"], "created");
    let newest_first = ordering.first().map(|order| order.descending).unwrap_or(false);
    for order in ordering {
        comments_query = match (order.field, order.descending) {
            ("author", false) => comments_query.then_order_by(comments::author_id.asc()),
            ("author", true) => comments_query.then_order_by(comments::author_id.desc()),
            ("post", false) => comments_query.then_order_by(comments::post_id.asc()),
            ("post", true) => comments_query.then_order_by(comments::post_id.desc()),
            ("created", false) => comments_query.then_order_by(comments::created.asc()),
            ("created", true) => comments_query.then_order_by(comments::created.desc()),
            _ => comments_query,
        };
    }
    if newest_first {
        Ok(comments_query.then_order_by(comments::id.desc()))
    } else {
        Ok(comments_query.then_order_by(comments::id.asc()))
    }
}

fn with_authors(comments: Vec<Comment>, connection: &mut Connection) -> QueryResult<Vec<CommentView>> {
    let author_ids: Vec<i32> = comments.iter().map(|comment| comment.author_id).collect();
    let authors = User::usernames(&author_ids, connection)?;
    Ok(comments
        .into_iter()
        .map(|comment| {
            let author = authors.get(&comment.author_id).cloned().unwrap_or_default();
            CommentView::from((comment, author))
        })
        .collect())
}

#[get("/posts/<post_id>/comments?<query..>")]
pub fn list(
    mut connection: DbConnection,
    user: CurrentUser,
    post_id: i32,
    query: CommentQuery,
) -> ApiResult<Vec<CommentView>> {
    authenticated_or_read_only(Method::Get, user)?;
    let post = Post::try_load_by_id(post_id, &mut connection)?;
    let comments = filtered(&post, &query, &mut connection)?.load::<Comment>(&mut *connection)?;
    Ok(Json(with_authors(comments, &mut connection)?))
}

#[get("/posts/<post_id>/comments/<id>")]
pub fn retrieve(
    mut connection: DbConnection,
    user: CurrentUser,
    post_id: i32,
    id: i32,
) -> ApiResult<CommentView> {
    authenticated_or_read_only(Method::Get, user)?;
    let post = Post::try_load_by_id(post_id, &mut connection)?;
    let comment = Comment::load_for_post(&post, id, &mut connection)?;
    let author = User::try_load_by_id(comment.author_id, &mut connection)?;
    Ok(Json((comment, author.username).into()))
}

#[post("/posts/<post_id>/comments", data = "<input>")]
pub fn create(
    mut connection: DbConnection,
    user: CurrentUser,
    post_id: i32,
    input: Result<JsonBody<CommentInput>, ApiError>,
) -> Created<CommentView> {
    let user = user?;
    let text = input?.into_inner().text()?;
    let post = Post::try_load_by_id(post_id, &mut connection)?;

    let new_comment = NewComment {
        author_id: user.id,
        post_id: post.id,
        text,
        created: now(),
    };
    let comment = diesel::insert_into(comments::table)
        .values(&new_comment)
        .get_result::<Comment>(&mut *connection)?;
    tracing::info!(comment_id = comment.id, post_id = post.id, author_id = user.id, "created comment");
    Ok(created((comment, user.username).into()))
}

fn update_comment(
    connection: &mut Connection,
    method: Method,
    user: CurrentUser,
    post_id: i32,
    id: i32,
    input: Result<JsonBody<CommentInput>, ApiError>,
) -> ApiResult<CommentView> {
    let user = user?;
    let post = Post::try_load_by_id(post_id, connection)?;
    let comment = Comment::load_for_post(&post, id, connection)?;
    check_object_permission(method, Some(&user), &comment)?;

    let comment = match input?.into_inner().clean(method == Method::Patch)? {
        Some(text) => diesel::update(&comment)
            .set(comments::text.eq(text))
            .get_result::<Comment>(connection)?,
        None => comment,
    };
    tracing::info!(comment_id = comment.id, "updated comment");
    Ok(Json((comment, user.username).into()))
}

#[put("/posts/<post_id>/comments/<id>", data = "<input>")]
pub fn update(
    mut connection: DbConnection,
    method: Method,
    user: CurrentUser,
    post_id: i32,
    id: i32,
    input: Result<JsonBody<CommentInput>, ApiError>,
) -> ApiResult<CommentView> {
    update_comment(&mut connection, method, user, post_id, id, input)
}

#[patch("/posts/<post_id>/comments/<id>", data = "<input>")]
pub fn partial_update(
    mut connection: DbConnection,
    method: Method,
    user: CurrentUser,
    post_id: i32,
    id: i32,
    input: Result<JsonBody<CommentInput>, ApiError>,
) -> ApiResult<CommentView> {
    update_comment(&mut connection, method, user, post_id, id, input)
}

#[delete("/posts/<post_id>/comments/<id>")]
pub fn destroy(
    mut connection: DbConnection,
    method: Method,
    user: CurrentUser,
    post_id: i32,
    id: i32,
) -> Result<Status, ApiError> {
    let user = user?;
    let post = Post::try_load_by_id(post_id, &mut connection)?;
    let comment = Comment::load_for_post(&post, id, &mut connection)?;
    check_object_permission(method, Some(&user), &comment)?;

    diesel::delete(&comment).execute(&mut *connection)?;
    tracing::info!(comment_id = comment.id, post_id = post.id, "deleted comment");
    Ok(Status::NoContent)
}
