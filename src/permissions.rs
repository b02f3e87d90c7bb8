use rocket::http::Method;

use crate::types::ApiError;
use crate::users::models::User;
use crate::users::CurrentUser;

/// Rows owned by a user.
pub trait Authored {
    fn author_id(&self) -> i32;
}

pub fn is_safe(method: Method) -> bool {
    matches!(method, Method::Get | Method::Head | Method::Options)
}

/// Reads are open to everyone; writes need an authenticated user.
pub fn authenticated_or_read_only(method: Method, user: CurrentUser) -> Result<Option<User>, ApiError> {
    match user {
        Ok(user) => Ok(Some(user)),
        Err(ApiError::NotAuthenticated) if is_safe(method) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Reads are open to everyone; writes only to the object's author.
pub fn is_author_or_read_only<T: Authored>(method: Method, user: Option<&User>, obj: &T) -> bool {
    if is_safe(method) {
        return true;
    }
    match user {
        Some(user) => obj.author_id() == user.id,
        None => false,
    }
}

pub fn check_object_permission<T: Authored>(
    method: Method,
    user: Option<&User>,
    obj: &T,
) -> Result<(), ApiError> {
    if is_author_or_read_only(method, user, obj) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}
