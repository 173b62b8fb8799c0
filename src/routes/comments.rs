use askama::Template;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};

use crate::db::models::Comment;
use crate::db::queries::{self, OwnerLookup};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::forms::CommentForm;
use crate::routes::home::Html;
use crate::state::AppState;

/// Serves both the edit form and the delete confirmation.
#[derive(Template)]
#[template(path = "pages/comment_form.html")]
pub struct CommentFormTemplate {
    pub auth_username: String,
    pub heading: String,
    pub form_action: String,
    pub deleting: bool,
    pub text: String,
    pub error: String,
    pub created_at: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts/{id}/comment", post(add))
        .route(
            "/posts/{id}/comments/{comment_id}/edit",
            get(edit_form).post(edit_submit),
        )
        .route(
            "/posts/{id}/comments/{comment_id}/delete",
            get(delete_confirm).post(delete_submit),
        )
}

/// POST /posts/{id}/comment — append a comment and return to the
/// post. An invalid submission writes nothing and returns to the same
/// view.
async fn add(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    queries::post_detail(&conn, &post_id)?.ok_or(AppError::NotFound)?;

    if let Ok(text) = form.validate() {
        queries::insert_comment(&conn, &post_id, &user.id, &text)?;
    }

    Ok(Redirect::to(&format!("/posts/{}", post_id)).into_response())
}

/// Resolve the comment for a mutation: 404 when the id (or its pairing
/// with the post) is wrong, silent redirect when the requester is not the
/// author.
fn gate(
    conn: &rusqlite::Connection,
    post_id: &str,
    comment_id: &str,
    user: &CurrentUser,
) -> AppResult<Result<Comment, Response>> {
    match queries::comment_for_owner(conn, post_id, comment_id, &user.id)? {
        OwnerLookup::Missing => Err(AppError::NotFound),
        OwnerLookup::NotOwner => Ok(Err(
            Redirect::to(&format!("/posts/{}", post_id)).into_response()
        )),
        OwnerLookup::Owned(comment) => Ok(Ok(comment)),
    }
}

async fn edit_form(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let comment = match gate(&conn, &post_id, &comment_id, &user)? {
        Ok(comment) => comment,
        Err(redirect) => return Ok(redirect),
    };

    Ok(Html(CommentFormTemplate {
        auth_username: user.username,
        heading: "Edit comment".to_string(),
        form_action: format!("/posts/{}/comments/{}/edit", post_id, comment_id),
        deleting: false,
        text: comment.text,
        error: String::new(),
        created_at: comment.created_at,
    })
    .into_response())
}

async fn edit_submit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((post_id, comment_id)): Path<(String, String)>,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let comment = match gate(&conn, &post_id, &comment_id, &user)? {
        Ok(comment) => comment,
        Err(redirect) => return Ok(redirect),
    };

    match form.validate() {
        Ok(text) => {
            queries::update_comment(&conn, &comment_id, &text)?;
            Ok(Redirect::to(&format!("/posts/{}", post_id)).into_response())
        }
        Err(error) => Ok(Html(CommentFormTemplate {
            auth_username: user.username,
            heading: "Edit comment".to_string(),
            form_action: format!("/posts/{}/comments/{}/edit", post_id, comment_id),
            deleting: false,
            text: form.text,
            error,
            created_at: comment.created_at,
        })
        .into_response()),
    }
}

/// GET — show the comment for confirmation; POST — delete and return to
/// the post.
async fn delete_confirm(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let comment = match gate(&conn, &post_id, &comment_id, &user)? {
        Ok(comment) => comment,
        Err(redirect) => return Ok(redirect),
    };

    Ok(Html(CommentFormTemplate {
        auth_username: user.username,
        heading: "Delete comment".to_string(),
        form_action: format!("/posts/{}/comments/{}/delete", post_id, comment_id),
        deleting: true,
        text: comment.text,
        error: String::new(),
        created_at: comment.created_at,
    })
    .into_response())
}

async fn delete_submit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    if let Err(redirect) = gate(&conn, &post_id, &comment_id, &user)? {
        return Ok(redirect);
    }

    queries::delete_comment(&conn, &comment_id)?;
    Ok(Redirect::to(&format!("/posts/{}", post_id)).into_response())
}
