use crate::reject::{self, TryExt};
use std::collections::HashMap;
use warp::{http::Uri, reply::Response, Rejection, Reply};

pub trait DefaultExt {
    fn is_default(&self) -> bool;
}
impl<T: Default + PartialEq> DefaultExt for T {
    fn is_default(&self) -> bool {
        self.eq(&Default::default())
    }
}

/// Fetches a form field, rejecting missing and empty values
pub fn field<'a>(form: &'a HashMap<String, String>, name: &str) -> Result<&'a str, Rejection> {
    match form.get(name).map(String::as_str) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(reject::bad_request(format!("Missing field `{}`", name))),
    }
}

/// Replaces plain text arrows and dashes with their typographic forms
pub fn typeset(notes: &str) -> String {
    notes.replace(" -- ", " \u{2013} ").replace("->", "\u{2192}")
}

pub fn see_other(location: String) -> Result<Response, Rejection> {
    let uri: Uri = location.parse().or_500()?;
    Ok(warp::redirect::see_other(uri).into_response())
}
