use std::convert::Infallible;

use rocket::request::{FromRequest, Outcome};
use rocket::Request;

use crate::data::Page;

const MAX_PAGE_LENGTH: u32 = 100;

fn query_number(request: &Request<'_>, long: &str, short: &str) -> Option<u32> {
    request
        .query_value(long)
        .and_then(|it| it.ok())
        .or_else(|| request.query_value(short).and_then(|it| it.ok()))
}

/// Reads `?page=&len=` (or `?p=&l=`) from the query string.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for Page {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let defaults = Page::default();
        let length = query_number(request, "len", "l")
            .unwrap_or(defaults.length)
            .clamp(1, MAX_PAGE_LENGTH);
        let page = query_number(request, "page", "p").unwrap_or(defaults.page);

        Outcome::Success(Page { length, page })
    }
}
