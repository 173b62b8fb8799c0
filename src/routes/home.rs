use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::db::queries::{self, PostSummary};
use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::routes::PageQuery;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/index.html")]
pub struct IndexTemplate {
    pub auth_username: String,
    pub posts: Vec<PostSummary>,
    pub page_number: i64,
    pub total_pages: i64,
    pub has_prev: bool,
    pub has_next: bool,
    pub base_path: String,
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// GET / — the public home feed.
pub async fn index(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let page = queries::home_feed(&conn, &queries::now_stamp(), query.number())?;

    let (has_prev, has_next) = (page.has_prev(), page.has_next());
    Ok(Html(IndexTemplate {
        auth_username: maybe_user.username(),
        posts: page.posts,
        page_number: page.number,
        total_pages: page.total_pages,
        has_prev,
        has_next,
        base_path: "/".to_string(),
    })
    .into_response())
}
