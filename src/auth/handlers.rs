use askama::Template;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::Form;

use crate::auth::session;
use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::forms::{LoginForm, RegistrationForm};
use crate::routes::home::Html;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub auth_username: String,
    pub username: String,
    pub error: String,
}

#[derive(Template)]
#[template(path = "pages/registration.html")]
pub struct RegistrationTemplate {
    pub auth_username: String,
    pub form: RegistrationForm,
    pub username_error: String,
    pub password1_error: String,
    pub password2_error: String,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val.to_string())
            } else {
                None
            }
        })
}

// -- Login --

/// GET /auth/login
pub async fn login_page() -> AppResult<Response> {
    Ok(Html(LoginTemplate {
        auth_username: String::new(),
        username: String::new(),
        error: String::new(),
    })
    .into_response())
}

/// POST /auth/login — verify credentials and set the session cookie.
pub async fn login_submit(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let user = queries::user_by_username(&conn, form.username.trim())?;
    drop(conn);

    let user = match user {
        Some(user) if bcrypt::verify(&form.password, &user.password_hash).unwrap_or(false) => user,
        _ => {
            tracing::debug!("Failed login attempt for {:?}", form.username);
            return Ok(Html(LoginTemplate {
                auth_username: String::new(),
                username: form.username,
                error: "Invalid username or password".to_string(),
            })
            .into_response());
        }
    };
    let token = session::create_session(&state.db, &user.id, state.config.auth.session_hours)?;
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &token,
        state.config.auth.session_hours,
    );

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Redirect::to("/"),
    )
        .into_response())
}

/// POST /auth/logout — delete the session row and clear the cookie.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = cookie_value(&headers, &state.config.auth.cookie_name) {
        session::delete_session(&state.db, &token)?;
    }

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )]),
        Redirect::to("/"),
    )
        .into_response())
}

// -- Registration --

/// GET /auth/registration
pub async fn registration_page() -> AppResult<Response> {
    Ok(registration_form_response(RegistrationForm::default(), None))
}

/// POST /auth/registration — create the user and send them to the login
/// page; no auto-login.
pub async fn registration_submit(
    State(state): State<AppState>,
    Form(form): Form<RegistrationForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let taken = queries::username_taken(&conn, form.username.trim(), None)?;

    if let Err(errors) = form.validate(taken) {
        return Ok(registration_form_response(form, Some(errors)));
    }

    let password_hash = bcrypt::hash(&form.password1, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {e}")))?;

    let user_id = queries::insert_user(
        &conn,
        &queries::NewUser {
            username: form.username.trim(),
            first_name: form.first_name.trim(),
            last_name: form.last_name.trim(),
            email: form.email.trim(),
            password_hash: &password_hash,
        },
    )?;
    tracing::info!("Registered user {} ({})", form.username.trim(), user_id);

    Ok(Redirect::to("/auth/login").into_response())
}

fn registration_form_response(
    form: RegistrationForm,
    errors: Option<crate::forms::RegistrationErrors>,
) -> Response {
    let errors = errors.unwrap_or_default();
    Html(RegistrationTemplate {
        auth_username: String::new(),
        username_error: errors.username.unwrap_or_default(),
        password1_error: errors.password1.unwrap_or_default(),
        password2_error: errors.password2.unwrap_or_default(),
        form,
    })
    .into_response()
}
