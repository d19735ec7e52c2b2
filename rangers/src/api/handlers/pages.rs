use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use minijinja::context;
use tracing::{debug, instrument};

use crate::{AppState, auth::current_user::CurrentSession, db::models::users::UserRecord, errors::Error};

const DEFAULT_LANDING: &str = "/dashboard";

/// Only same-site paths are followed after login.
fn safe_return_path(candidate: Option<&String>) -> &str {
    match candidate {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => path,
        _ => DEFAULT_LANDING,
    }
}

async fn session_user(state: &AppState, session: &CurrentSession) -> Result<Option<UserRecord>, Error> {
    Ok(state.store.find_by_id(session.0.sub).await?)
}

#[instrument(skip_all)]
pub async fn home(State(state): State<AppState>, session: Option<CurrentSession>) -> Result<Html<String>, Error> {
    let username = match &session {
        Some(session) => session_user(&state, session).await?.map(|user| user.username),
        None => None,
    };
    Ok(Html(state.pages.render("home.html", context! { username })?))
}

#[instrument(skip_all)]
pub async fn login_page(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Result<Html<String>, Error> {
    let next = state
        .config
        .guard
        .return_to_param
        .as_ref()
        .map(|param| safe_return_path(params.get(param)))
        .unwrap_or(DEFAULT_LANDING);

    Ok(Html(state.pages.render("login.html", context! { next })?))
}

#[instrument(skip_all)]
pub async fn signup_page(State(state): State<AppState>) -> Result<Html<String>, Error> {
    let ctx = context! {
        username_min_length => state.config.signup.username_min_length,
        password_min_length => state.config.auth.native.password.min_length,
        staff_signup => state.config.signup.staff_passcode.is_some(),
    };
    Ok(Html(state.pages.render("signup.html", ctx)?))
}

/// Signed-in landing page.
///
/// A valid token for an account that no longer exists is treated like no session.
#[instrument(skip_all)]
pub async fn dashboard(State(state): State<AppState>, session: CurrentSession) -> Result<Response, Error> {
    let Some(user) = session_user(&state, &session).await? else {
        debug!("Session for unknown user {}", session.0.sub);
        return Ok(Redirect::temporary(state.policy.login_path()).into_response());
    };

    let html = state.pages.render(
        "dashboard.html",
        context! { username => user.username, role => user.role.as_str() },
    )?;
    Ok(Html(html).into_response())
}

/// Courses are listed on the dashboard.
pub async fn course_index() -> Redirect {
    Redirect::temporary(DEFAULT_LANDING)
}

#[instrument(skip_all)]
pub async fn course(State(state): State<AppState>, session: CurrentSession, Path(path): Path<String>) -> Result<Response, Error> {
    let Some(user) = session_user(&state, &session).await? else {
        return Ok(Redirect::temporary(state.policy.login_path()).into_response());
    };

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let course = segments.next().unwrap_or_default();
    let lesson = segments.collect::<Vec<_>>().join(" / ");

    let html = state.pages.render(
        "course.html",
        context! { course, lesson, username => user.username },
    )?;
    Ok(Html(html).into_response())
}
