//! Limit/offset pagination.
//!
//! Without a usable `limit` the whole list is returned as a bare array;
//! with one the results are wrapped in a `{count, next, previous, results}`
//! envelope whose links point back at the requested URL.

use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use serde::Serialize;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitOffset {
    pub limit: i64,
    pub offset: i64,
}

impl LimitOffset {
    /// `None` unless `limit` is a positive integer. A bad `offset` is 0.
    pub fn from_query(limit: Option<&str>, offset: Option<&str>) -> Option<LimitOffset> {
        let limit = limit?.trim().parse::<i64>().ok().filter(|limit| *limit > 0)?;
        let offset = offset
            .and_then(|offset| offset.trim().parse::<i64>().ok())
            .filter(|offset| *offset >= 0)
            .unwrap_or(0);
        Some(LimitOffset { limit, offset })
    }

    pub fn next_offset(&self, count: i64) -> Option<i64> {
        match self.offset.checked_add(self.limit) {
            Some(end) if end < count => Some(end),
            _ => None,
        }
    }

    /// `Some(None)` means "previous page starts at 0": the offset parameter
    /// is dropped from the link.
    pub fn previous_offset(&self) -> Option<Option<i64>> {
        if self.offset <= 0 {
            None
        } else if self.offset - self.limit <= 0 {
            Some(None)
        } else {
            Some(Some(self.offset - self.limit))
        }
    }
}

/// The absolute URL of the current request.
#[derive(Debug, Clone)]
pub struct RequestUrl(Url);

impl RequestUrl {
    pub fn parse(host: &str, origin: &str) -> Option<RequestUrl> {
        Url::parse(&format!("http://{}{}", host, origin)).ok().map(RequestUrl)
    }

    /// An absolute link to `path` on the same host.
    pub fn join(&self, path: &str) -> String {
        self.0
            .join(path)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| path.to_string())
    }

    /// The same URL with `limit`/`offset` replaced.
    pub fn with_page(&self, limit: i64, offset: Option<i64>) -> String {
        let mut url = self.0.clone();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "limit" && key != "offset")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            for (key, value) in &kept {
                query.append_pair(key, value);
            }
            query.append_pair("limit", &limit.to_string());
            if let Some(offset) = offset {
                query.append_pair("offset", &offset.to_string());
            }
        }
        url.to_string()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestUrl {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, ()> {
        let host = request
            .host()
            .map(|host| host.to_string())
            .unwrap_or_else(|| "localhost".to_string());
        match RequestUrl::parse(&host, &request.uri().to_string()) {
            Some(url) => Outcome::Success(url),
            None => Outcome::Error((Status::BadRequest, ())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: i64, page: LimitOffset, url: &RequestUrl) -> Page<T> {
        Page {
            count,
            next: page
                .next_offset(count)
                .map(|offset| url.with_page(page.limit, Some(offset))),
            previous: page
                .previous_offset()
                .map(|offset| url.with_page(page.limit, offset)),
            results,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Page(Page<T>),
    All(Vec<T>),
}
