use askama::Template;
use axum::extract::{Multipart, Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;

use crate::db::models::Post;
use crate::db::queries::{self, OwnerLookup, STAMP_FORMAT};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::forms::{PostForm, PostFormErrors};
use crate::routes::home::Html;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/detail.html")]
pub struct DetailTemplate {
    pub auth_username: String,
    pub id: String,
    pub title: String,
    pub text: String,
    pub pub_date: String,
    pub author_username: String,
    pub category_title: String,
    pub category_slug: String,
    pub location_name: String,
    pub image_path: String,
    pub is_published: bool,
    pub is_author: bool,
    pub can_comment: bool,
    pub comments: Vec<CommentView>,
}

pub struct CommentView {
    pub id: String,
    pub author_username: String,
    pub text: String,
    pub created_at: String,
    pub is_author: bool,
}

/// One template serves create, edit, and the delete confirmation, like the
/// rest of the post form flow.
#[derive(Template)]
#[template(path = "pages/post_form.html")]
pub struct PostFormTemplate {
    pub auth_username: String,
    pub heading: String,
    pub form_action: String,
    pub deleting: bool,
    pub title: String,
    pub text: String,
    pub pub_date: String,
    pub category_id: String,
    pub location_id: String,
    pub categories: Vec<(String, String)>,
    pub locations: Vec<(String, String)>,
    pub title_error: String,
    pub text_error: String,
    pub pub_date_error: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts/create", get(create_form).post(create_submit))
        .route("/posts/{id}", get(detail))
        .route("/posts/{id}/edit", get(edit_form).post(edit_submit))
        .route("/posts/{id}/delete", get(delete_confirm).post(delete_submit))
}

/// Stored timestamps render back into the `datetime-local` input format.
fn input_value(stamp: &str) -> String {
    chrono::NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M").to_string())
        .unwrap_or_else(|_| stamp.to_string())
}

/// GET /posts/{id} — fetch unconditionally, then gate. A post hidden from
/// this requester is indistinguishable from one that does not exist.
async fn detail(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let post = queries::post_detail(&conn, &id)?.ok_or(AppError::NotFound)?;

    if !post.visible_to(maybe_user.id(), &queries::now_stamp()) {
        return Err(AppError::NotFound);
    }

    let viewer_id = maybe_user.id().map(str::to_string);
    let comments = queries::post_comments(&conn, &post.id)?
        .into_iter()
        .map(|c| CommentView {
            is_author: viewer_id.as_deref() == Some(c.author_id.as_str()),
            id: c.id,
            author_username: c.author_username,
            text: c.text,
            created_at: c.created_at,
        })
        .collect();

    let is_author = maybe_user.id() == Some(post.author_id.as_str());
    Ok(Html(DetailTemplate {
        auth_username: maybe_user.username(),
        id: post.id,
        title: post.title,
        text: post.text,
        pub_date: post.pub_date,
        author_username: post.author_username,
        category_title: post.category_title,
        category_slug: post.category_slug,
        location_name: post.location_name,
        image_path: post.image_path,
        is_published: post.is_published,
        is_author,
        can_comment: maybe_user.0.is_some(),
        comments,
    })
    .into_response())
}

// -- Create --

async fn create_form(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    Ok(render_form(
        &conn,
        &user,
        "New post",
        "/posts/create".to_string(),
        false,
        &PostForm::default(),
        PostFormErrors::default(),
    )?)
}

/// POST /posts/create — the new post is owned by the requester, whatever
/// the submitted fields claim.
async fn create_submit(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let form = PostForm::from_multipart(&mut multipart).await?;
    let conn = state.db.get()?;

    let valid = match form.validate() {
        Ok(valid) => valid,
        Err(errors) => {
            return render_form(
                &conn,
                &user,
                "New post",
                "/posts/create".to_string(),
                false,
                &form,
                errors,
            );
        }
    };

    let image_path = match &form.image {
        Some(upload) => Some(
            upload
                .store(state.config.uploads_path())
                .map_err(|e| AppError::Internal(format!("Failed to store image: {e}")))?,
        ),
        None => None,
    };

    let post_id = queries::insert_post(
        &conn,
        &user.id,
        &queries::NewPost {
            title: &valid.title,
            text: &valid.text,
            pub_date: &valid.pub_date,
            category_id: valid.category_id.as_deref(),
            location_id: valid.location_id.as_deref(),
            image_path: image_path.as_deref(),
        },
    )?;
    tracing::info!("User {} created post {}", user.username, post_id);

    Ok(Redirect::to(&format!("/profile/{}", user.username)).into_response())
}

// -- Edit --

/// Resolve the post for a mutation, or produce the appropriate response:
/// 404 when missing, silent redirect to the detail page when the requester
/// is not the author.
fn gate(
    conn: &rusqlite::Connection,
    post_id: &str,
    user: &CurrentUser,
) -> AppResult<Result<Post, Response>> {
    match queries::post_for_owner(conn, post_id, &user.id)? {
        OwnerLookup::Missing => Err(AppError::NotFound),
        OwnerLookup::NotOwner => Ok(Err(
            Redirect::to(&format!("/posts/{}", post_id)).into_response()
        )),
        OwnerLookup::Owned(post) => Ok(Ok(post)),
    }
}

async fn edit_form(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let post = match gate(&conn, &id, &user)? {
        Ok(post) => post,
        Err(redirect) => return Ok(redirect),
    };

    let form = PostForm {
        title: post.title,
        text: post.text,
        pub_date: input_value(&post.pub_date),
        category_id: post.category_id.unwrap_or_default(),
        location_id: post.location_id.unwrap_or_default(),
        image: None,
    };
    render_form(
        &conn,
        &user,
        "Edit post",
        format!("/posts/{}/edit", id),
        false,
        &form,
        PostFormErrors::default(),
    )
}

async fn edit_submit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let form = PostForm::from_multipart(&mut multipart).await?;
    let conn = state.db.get()?;
    let post = match gate(&conn, &id, &user)? {
        Ok(post) => post,
        Err(redirect) => return Ok(redirect),
    };

    let valid = match form.validate() {
        Ok(valid) => valid,
        Err(errors) => {
            return render_form(
                &conn,
                &user,
                "Edit post",
                format!("/posts/{}/edit", id),
                false,
                &form,
                errors,
            );
        }
    };

    // A new upload replaces the image; otherwise the existing one stays.
    let image_path = match &form.image {
        Some(upload) => Some(
            upload
                .store(state.config.uploads_path())
                .map_err(|e| AppError::Internal(format!("Failed to store image: {e}")))?,
        ),
        None => post.image_path,
    };

    queries::update_post(
        &conn,
        &id,
        &user.id,
        &queries::NewPost {
            title: &valid.title,
            text: &valid.text,
            pub_date: &valid.pub_date,
            category_id: valid.category_id.as_deref(),
            location_id: valid.location_id.as_deref(),
            image_path: image_path.as_deref(),
        },
    )?;

    Ok(Redirect::to(&format!("/posts/{}", id)).into_response())
}

// -- Delete --

/// GET /posts/{id}/delete — show the post for confirmation before the
/// irreversible POST.
async fn delete_confirm(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let post = match gate(&conn, &id, &user)? {
        Ok(post) => post,
        Err(redirect) => return Ok(redirect),
    };

    let form = PostForm {
        title: post.title,
        text: post.text,
        pub_date: input_value(&post.pub_date),
        category_id: post.category_id.unwrap_or_default(),
        location_id: post.location_id.unwrap_or_default(),
        image: None,
    };
    render_form(
        &conn,
        &user,
        "Delete post",
        format!("/posts/{}/delete", id),
        true,
        &form,
        PostFormErrors::default(),
    )
}

async fn delete_submit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    if let Err(redirect) = gate(&conn, &id, &user)? {
        return Ok(redirect);
    }

    queries::delete_post(&conn, &id)?;
    tracing::info!("User {} deleted post {}", user.username, id);

    Ok(Redirect::to(&format!("/profile/{}", user.username)).into_response())
}

fn render_form(
    conn: &rusqlite::Connection,
    user: &CurrentUser,
    heading: &str,
    form_action: String,
    deleting: bool,
    form: &PostForm,
    errors: PostFormErrors,
) -> AppResult<Response> {
    Ok(Html(PostFormTemplate {
        auth_username: user.username.clone(),
        heading: heading.to_string(),
        form_action,
        deleting,
        title: form.title.clone(),
        text: form.text.clone(),
        pub_date: form.pub_date.clone(),
        category_id: form.category_id.clone(),
        location_id: form.location_id.clone(),
        categories: queries::published_categories(conn)?,
        locations: queries::published_locations(conn)?,
        title_error: errors.title.unwrap_or_default(),
        text_error: errors.text.unwrap_or_default(),
        pub_date_error: errors.pub_date.unwrap_or_default(),
    })
    .into_response())
}
