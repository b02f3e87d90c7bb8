use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::NaiveDateTime;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::select;
use serde::Serialize;
use std::collections::HashMap;

use crate::db::schema::users;
use crate::db::{Connection, TryLoadById};
use crate::types::ApiError;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(skip_serializing)]
    pub date_joined: NaiveDateTime,
}

impl User {
    pub fn make_password(password: &str) -> Result<String, ApiError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                tracing::error!("failed to hash password: {}", e);
                ApiError::Internal
            })
    }

    pub fn verify_password(&self, password_to_verify: &str) -> bool {
        let hash = match PasswordHash::new(&self.password) {
            Ok(hash) => hash,
            Err(err) => {
                tracing::error!(user_id = self.id, "failed to parse password hash: {}", err);
                return false;
            }
        };

        Argon2::default()
            .verify_password(password_to_verify.as_bytes(), &hash)
            .is_ok()
    }

    pub fn load_by_name(name: &str, connection: &mut Connection) -> QueryResult<User> {
        use crate::db::schema::users::dsl::*;
        users.filter(username.eq(name)).get_result::<User>(connection)
    }

    pub fn exists(user_id: i32, connection: &mut Connection) -> QueryResult<bool> {
        select(exists(users::table.find(user_id))).get_result::<bool>(connection)
    }

    /// Usernames of the given users, keyed by id.
    pub fn usernames(ids: &[i32], connection: &mut Connection) -> QueryResult<HashMap<i32, String>> {
        use crate::db::schema::users::dsl::*;
        let pairs = users
            .filter(id.eq_any(ids))
            .select((id, username))
            .load::<(i32, String)>(connection)?;
        Ok(pairs.into_iter().collect())
    }

    /// Deletes the user; posts, comments and follows go with it.
    pub fn delete(&self, connection: &mut Connection) -> QueryResult<usize> {
        diesel::delete(self).execute(connection)
    }
}

impl TryLoadById for User {
    fn try_load_by_id(user_id: i32, connection: &mut Connection) -> QueryResult<User> {
        users::table.find(user_id).get_result::<User>(connection)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub date_joined: NaiveDateTime,
}

impl NewUser {
    pub fn insert(&self, connection: &mut Connection) -> QueryResult<User> {
        diesel::insert_into(users::table)
            .values(self)
            .get_result::<User>(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user_with_password(password: &str) -> User {
        User {
            id: 1,
            username: "leo".into(),
            email: String::new(),
            password: User::make_password(password).unwrap(),
            date_joined: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let user = user_with_password("correct horse");
        assert!(user.password.starts_with("$argon2"));
        assert!(user.verify_password("correct horse"));
        assert!(!user.verify_password("battery staple"));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        let mut user = user_with_password("whatever1");
        user.password = "not-a-hash".into();
        assert!(!user.verify_password("whatever1"));
    }

    #[test]
    fn password_is_not_serialized() {
        let user = user_with_password("secret-pass");
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["username"], "leo");
        assert!(value.get("password").is_none());
        assert!(value.get("date_joined").is_none());
    }
}
