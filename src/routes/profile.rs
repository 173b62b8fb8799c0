use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};

use crate::db::queries::{self, PostSummary};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::forms::ProfileForm;
use crate::routes::home::Html;
use crate::routes::PageQuery;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/profile.html")]
pub struct ProfileTemplate {
    pub auth_username: String,
    pub profile_username: String,
    pub profile_full_name: String,
    pub is_self: bool,
    pub posts: Vec<PostSummary>,
    pub page_number: i64,
    pub total_pages: i64,
    pub has_prev: bool,
    pub has_next: bool,
    pub base_path: String,
}

#[derive(Template)]
#[template(path = "pages/profile_edit.html")]
pub struct ProfileEditTemplate {
    pub auth_username: String,
    pub form: ProfileForm,
    pub error: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile/edit", get(edit_form).post(edit_submit))
        .route("/profile/{username}", get(feed))
}

/// GET /profile/{username} — every post by this user, visibility flags
/// ignored. The owner's drafts and future posts show up here.
async fn feed(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let (user, page) =
        queries::profile_feed(&conn, &username, query.number())?.ok_or(AppError::NotFound)?;

    let is_self = maybe_user.id() == Some(user.id.as_str());
    let (has_prev, has_next) = (page.has_prev(), page.has_next());
    Ok(Html(ProfileTemplate {
        auth_username: maybe_user.username(),
        profile_full_name: user.full_name(),
        profile_username: user.username,
        is_self,
        posts: page.posts,
        page_number: page.number,
        total_pages: page.total_pages,
        has_prev,
        has_next,
        base_path: format!("/profile/{}", username),
    })
    .into_response())
}

/// GET /profile/edit — identity fields pre-filled from the current user.
async fn edit_form(user: CurrentUser) -> AppResult<Response> {
    Ok(Html(ProfileEditTemplate {
        auth_username: user.username.clone(),
        form: ProfileForm {
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
        },
        error: String::new(),
    })
    .into_response())
}

/// POST /profile/edit — no password change path here.
async fn edit_submit(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<ProfileForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let taken = queries::username_taken(&conn, form.username.trim(), Some(&user.id))?;

    if let Err(error) = form.validate(taken) {
        return Ok(Html(ProfileEditTemplate {
            auth_username: user.username,
            form,
            error,
        })
        .into_response());
    }

    queries::update_profile(
        &conn,
        &user.id,
        form.username.trim(),
        form.first_name.trim(),
        form.last_name.trim(),
        form.email.trim(),
    )?;

    Ok(Redirect::to(&format!("/profile/{}", form.username.trim())).into_response())
}
