use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::db::queries::{self, PostSummary};
use crate::error::{AppError, AppResult};
use crate::extractors::MaybeUser;
use crate::routes::home::Html;
use crate::routes::PageQuery;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/category.html")]
pub struct CategoryTemplate {
    pub auth_username: String,
    pub title: String,
    pub description: String,
    pub posts: Vec<PostSummary>,
    pub page_number: i64,
    pub total_pages: i64,
    pub has_prev: bool,
    pub has_next: bool,
    pub base_path: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/category/{slug}", get(feed))
}

/// GET /category/{slug} — posts in one published category. An unpublished
/// or missing category is a 404 for the whole listing.
async fn feed(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let (category, page) =
        queries::category_feed(&conn, &slug, &queries::now_stamp(), query.number())?
            .ok_or(AppError::NotFound)?;

    let (has_prev, has_next) = (page.has_prev(), page.has_next());
    Ok(Html(CategoryTemplate {
        auth_username: maybe_user.username(),
        title: category.title,
        description: category.description,
        posts: page.posts,
        page_number: page.number,
        total_pages: page.total_pages,
        has_prev,
        has_next,
        base_path: format!("/category/{}", category.slug),
    })
    .into_response())
}
