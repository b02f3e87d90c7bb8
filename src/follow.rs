use diesel::dsl::exists;
use diesel::expression_methods::EscapeExpressionMethods;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::select;
use diesel::sqlite::Sqlite;
use rocket::serde::json::Json;
use rocket::FromForm;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::schema::{follows, users};
use crate::db::{Connection, DbConnection};
use crate::fields::CharField;
use crate::filters::{self, contains_pattern, LIKE_ESCAPE};
use crate::types::{created, ApiError, ApiResult, Created, JsonBody, ValidationError};
use crate::users::models::User;
use crate::users::CurrentUser;
use crate::utils::deserialize_some;

const CANNOT_FOLLOW_SELF: &str = "You cannot follow yourself";
const ALREADY_FOLLOWING: &str = "You already follow this user";

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable)]
pub struct Follow {
    pub id: i32,
    pub user_id: i32,
    pub following_id: i32,
}

impl Follow {
    pub fn is_following(user_id: i32, following_id: i32, connection: &mut Connection) -> QueryResult<bool> {
        select(exists(
            follows::table
                .filter(follows::user_id.eq(user_id))
                .filter(follows::following_id.eq(following_id)),
        ))
        .get_result::<bool>(connection)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = follows)]
pub struct NewFollow {
    user_id: i32,
    following_id: i32,
}

impl NewFollow {
    /// Inserts the edge. A constraint violation from a concurrent insert
    /// answers like the validation it slipped past.
    fn insert(&self, connection: &mut Connection) -> Result<Follow, ApiError> {
        let result = diesel::insert_into(follows::table)
            .values(self)
            .get_result::<Follow>(connection);
        match result {
            Ok(follow) => Ok(follow),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Err(ValidationError::from("non_field_errors", ALREADY_FOLLOWING).into())
            }
            Err(DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, _)) => {
                Err(ValidationError::from("following", CANNOT_FOLLOW_SELF).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FollowView {
    user: String,
    following: String,
}

#[derive(Debug, Deserialize)]
pub struct FollowInput {
    #[serde(default, deserialize_with = "deserialize_some")]
    following: Option<Value>,
}

impl FollowInput {
    fn validate(self, user: &User, connection: &mut Connection) -> Result<(NewFollow, String), ApiError> {
        let name = CharField::new("following").clean_required(self.following)?;

        let following = match User::load_by_name(&name, connection) {
            Ok(following) => following,
            Err(DieselError::NotFound) => {
                return Err(ValidationError::from(
                    "following",
                    format!("Object with username={} does not exist.", name),
                )
                .into())
            }
            Err(e) => return Err(e.into()),
        };
        if following.id == user.id {
            return Err(ValidationError::from("following", CANNOT_FOLLOW_SELF).into());
        }
        if Follow::is_following(user.id, following.id, connection)? {
            return Err(ValidationError::from("non_field_errors", ALREADY_FOLLOWING).into());
        }

        let new_follow = NewFollow {
            user_id: user.id,
            following_id: following.id,
        };
        Ok((new_follow, following.username))
    }
}

#[derive(Debug, Default, FromForm)]
pub struct FollowQuery {
    search: Option<String>,
}

#[get("/follow?<query..>")]
pub fn list(mut connection: DbConnection, user: CurrentUser, query: FollowQuery) -> ApiResult<Vec<FollowView>> {
    let user = user?;

    let mut follows_query: follows::BoxedQuery<'static, Sqlite> = follows::table
        .filter(follows::user_id.eq(user.id))
        .into_boxed();
    for term in filters::search_terms(query.search.as_deref()) {
        let by_following = users::table
            .filter(users::id.eq(follows::following_id))
            .filter(users::username.like(contains_pattern(&term)).escape(LIKE_ESCAPE));
        follows_query = follows_query.filter(exists(by_following));
    }
    let follows = follows_query
        .order(follows::id.asc())
        .load::<Follow>(&mut *connection)?;

    let following_ids: Vec<i32> = follows.iter().map(|follow| follow.following_id).collect();
    let names = User::usernames(&following_ids, &mut connection)?;
    let views = follows
        .into_iter()
        .map(|follow| FollowView {
            user: user.username.clone(),
            following: names.get(&follow.following_id).cloned().unwrap_or_default(),
        })
        .collect();
    Ok(Json(views))
}

#[post("/follow", data = "<input>")]
pub fn create(
    mut connection: DbConnection,
    user: CurrentUser,
    input: Result<JsonBody<FollowInput>, ApiError>,
) -> Created<FollowView> {
    let user = user?;
    let (new_follow, following) = input?.into_inner().validate(&user, &mut connection)?;
    let follow = new_follow.insert(&mut connection)?;
    tracing::info!(
        follow_id = follow.id,
        user_id = user.id,
        following_id = follow.following_id,
        "created follow"
    );
    Ok(created(FollowView {
        user: user.username,
        following,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::users::models::NewUser;
    use crate::utils::now;
    use serde_json::json;

    fn user(username: &str, connection: &mut Connection) -> User {
        NewUser {
            username: username.into(),
            email: String::new(),
            password: String::new(),
            date_joined: now(),
        }
        .insert(connection)
        .unwrap()
    }

    fn rejected(result: Result<Follow, ApiError>) -> ValidationError {
        match result {
            Err(ApiError::Validation(errors)) => errors,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_insert_reports_already_following() {
        let (_dir, pool) = test_pool();
        let mut connection = pool.get().unwrap();
        let leo = user("leo", &mut connection);
        let fyodor = user("fyodor", &mut connection);

        let edge = NewFollow {
            user_id: leo.id,
            following_id: fyodor.id,
        };
        let follow = edge.insert(&mut connection).unwrap();
        assert_eq!(follow.following_id, fyodor.id);

        assert_eq!(
            rejected(edge.insert(&mut connection)),
            ValidationError::from("non_field_errors", ALREADY_FOLLOWING)
        );
        assert!(Follow::is_following(leo.id, fyodor.id, &mut connection).unwrap());
    }

    #[test]
    fn self_edge_insert_reports_cannot_follow_self() {
        let (_dir, pool) = test_pool();
        let mut connection = pool.get().unwrap();
        let leo = user("leo", &mut connection);

        let edge = NewFollow {
            user_id: leo.id,
            following_id: leo.id,
        };
        assert_eq!(
            rejected(edge.insert(&mut connection)),
            ValidationError::from("following", CANNOT_FOLLOW_SELF)
        );
        assert!(!Follow::is_following(leo.id, leo.id, &mut connection).unwrap());
    }

    #[test]
    fn view_is_two_usernames() {
        let view = FollowView {
            user: "leo".into(),
            following: "fyodor".into(),
        };
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({ "user": "leo", "following": "fyodor" })
        );
    }

    #[test]
    fn following_is_optional_in_the_payload() {
        let input: FollowInput = serde_json::from_value(json!({})).unwrap();
        assert!(input.following.is_none());

        let input: FollowInput = serde_json::from_value(json!({ "following": null })).unwrap();
        assert_eq!(input.following, Some(Value::Null));
    }
}
