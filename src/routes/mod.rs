pub mod auth;
pub mod category;
pub mod comments;
pub mod home;
pub mod posts;
pub mod profile;
pub mod uploads;

use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::state::AppState;

/// Optional `?page=` query shared by every feed. Anything non-numeric
/// falls back to page 1; out-of-range values are clamped by the query
/// layer.
#[derive(Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    pub fn number(&self) -> i64 {
        self.page
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or(1)
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home::index))
        .route("/uploads/{file}", get(uploads::serve))
        .merge(auth::router())
        .merge(category::router())
        .merge(profile::router())
        .merge(posts::router())
        .merge(comments::router())
}
