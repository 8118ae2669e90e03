//! Status web server: a single `GET /` page rendered from the status store

pub mod handlers;
pub mod view;
