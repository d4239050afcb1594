//! Rendering page contexts.
//!
//! A page is the context a template would receive, serialized as JSON. Every
//! page passes through [`Rendered`], which adds the context-processor values.

use crate::server::extract::Json;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use time::OffsetDateTime;

/// Current calendar year, for the footer of every page.
pub fn year() -> i32 {
    OffsetDateTime::now_utc().year()
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Rendered<T> {
    year: i32,
    #[serde(flatten)]
    context: T,
}

impl<T> Rendered<T> {
    pub fn new(context: T) -> Self {
        Self {
            year: year(),
            context,
        }
    }
}

impl<T: Serialize> IntoResponse for Rendered<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
