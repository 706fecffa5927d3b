use askama::Template;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use rusqlite::params;
use serde::Deserialize;

use crate::auth::passwords::{self, PASSWORD_MIN};
use crate::auth::session;
use crate::db::models::{slugify, User};
use crate::error::{AppError, AppResult};
use crate::flash::{self, Flash, IncomingFlash};
use crate::routes::home::Html;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/signup.html")]
pub struct SignupTemplate {
    pub error: Option<String>,
    pub name: String,
    pub email: String,
}

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub email: String,
    pub flash: Option<Flash>,
}

#[derive(Template)]
#[template(path = "pages/forgot.html")]
pub struct ForgotTemplate {
    pub flash: Option<Flash>,
}

#[derive(Template)]
#[template(path = "pages/reset.html")]
pub struct ResetTemplate {
    pub error: Option<String>,
    pub token: String,
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

pub fn get_cookie_value<'a>(parts: &'a axum::http::request::Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
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
                Some(val)
            } else {
                None
            }
        })
}

// -- Signup --

#[derive(Deserialize)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// GET /signup
pub async fn signup_page() -> Html<SignupTemplate> {
    Html(SignupTemplate {
        error: None,
        name: String::new(),
        email: String::new(),
    })
}

/// POST /signup
pub async fn signup(
    State(state): State<AppState>,
    Form(form): Form<SignupForm>,
) -> AppResult<Response> {
    let name = form.name.trim().to_string();
    let email = form.email.trim().to_lowercase();

    let rerender = |status: StatusCode, error: &str| {
        (
            status,
            Html(SignupTemplate {
                error: Some(error.to_string()),
                name: name.clone(),
                email: email.clone(),
            }),
        )
            .into_response()
    };

    if name.is_empty() {
        return Ok(rerender(StatusCode::UNPROCESSABLE_ENTITY, "Name should not be empty"));
    }
    if !passwords::looks_like_email(&email) {
        return Ok(rerender(StatusCode::UNPROCESSABLE_ENTITY, "invalid email address"));
    }
    if form.password.chars().count() < PASSWORD_MIN {
        return Ok(rerender(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Password must be at least 5 chars long",
        ));
    }

    {
        let conn = state.db.get()?;
        if User::by_name(&conn, &name)?.is_some() {
            return Ok(rerender(
                StatusCode::CONFLICT,
                "This username has already been registered",
            ));
        }
        if User::by_email(&conn, &email)?.is_some() {
            return Ok(rerender(
                StatusCode::CONFLICT,
                "This email has already been registered",
            ));
        }
    }

    if form.password != form.confirm_password {
        return Ok(rerender(StatusCode::UNPROCESSABLE_ENTITY, "Confirm password failed"));
    }

    let password_hash = passwords::hash_password(&form.password)?;
    let id = uuid::Uuid::now_v7().to_string();
    {
        let conn = state.db.get()?;
        conn.execute(
            "INSERT INTO users (id, name, email, password_hash, slug) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, name, email, password_hash, slugify(&name)],
        )?;
    }

    // Welcome email; signup succeeds even when it cannot be sent
    let subject = "Welcome to Study Abroad!";
    let message = format!(
        "Hello {},\n\n\
         Thank you for signing up for Study Abroad!\n\n\
         Thanks,\nStudy Abroad! team\n",
        name
    );
    if let Err(e) = state.mailer.send(&email, subject, &message).await {
        tracing::warn!("welcome email failed: {}", e);
    }

    Ok(flash::redirect("/login", Flash::success("Successfully registered!")))
}

// -- Login / logout --

#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// GET /login
pub async fn login_page(incoming: IncomingFlash) -> Response {
    flash::consume(
        Html(LoginTemplate {
            error: None,
            email: String::new(),
            flash: incoming.0,
        })
        .into_response(),
    )
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let email = form.email.trim().to_lowercase();

    let rerender = |status: StatusCode, error: &str| {
        (
            status,
            Html(LoginTemplate {
                error: Some(error.to_string()),
                email: email.clone(),
                flash: None,
            }),
        )
            .into_response()
    };

    if !passwords::looks_like_email(&email) {
        return Ok(rerender(StatusCode::UNPROCESSABLE_ENTITY, "invalid email address"));
    }
    if form.password.chars().count() < PASSWORD_MIN {
        return Ok(rerender(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Password must be at least 5 chars long",
        ));
    }

    let user = {
        let conn = state.db.get()?;
        User::by_email(&conn, &email)?
    };
    let Some(user) = user else {
        return Ok(rerender(StatusCode::UNAUTHORIZED, "Invalid email or password"));
    };
    if !passwords::verify_password(&form.password, &user.password_hash)? {
        return Ok(rerender(StatusCode::UNAUTHORIZED, "Invalid email or password"));
    }

    let token = session::create_session(&state.db, &user.id, state.config.auth.session_hours)?;

    let mut response = flash::redirect("/schools", Flash::success("Welcome!"));
    response.headers_mut().append(
        header::SET_COOKIE,
        session_cookie(
            &state.config.auth.cookie_name,
            &token,
            state.config.auth.session_hours,
        )
        .parse()
        .map_err(|_| AppError::Internal("invalid session cookie".into()))?,
    );
    Ok(response)
}

/// GET /logout — delete session and redirect
pub async fn logout(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> AppResult<Response> {
    let (parts, _body) = request.into_parts();

    if let Some(token) = get_cookie_value(&parts, &state.config.auth.cookie_name) {
        let _ = session::delete_session(&state.db, token);
    }

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/".to_string()),
            (
                header::SET_COOKIE,
                clear_session_cookie(&state.config.auth.cookie_name),
            ),
        ],
        "",
    )
        .into_response())
}

// -- Password reset --

#[derive(Deserialize)]
pub struct ForgotForm {
    pub email: String,
}

/// GET /forgot
pub async fn forgot_page(incoming: IncomingFlash) -> Response {
    flash::consume(Html(ForgotTemplate { flash: incoming.0 }).into_response())
}

/// POST /forgot — issue a reset token and email the link
pub async fn forgot(
    State(state): State<AppState>,
    Form(form): Form<ForgotForm>,
) -> AppResult<Response> {
    let email = form.email.trim().to_lowercase();

    let user = {
        let conn = state.db.get()?;
        User::by_email(&conn, &email)?
    };
    let Some(user) = user else {
        return Ok(flash::redirect(
            "/forgot",
            Flash::error("No account with that email address exists."),
        ));
    };

    let token = session::generate_token();
    {
        let conn = state.db.get()?;
        conn.execute(
            "UPDATE users SET reset_password_token = ?1, \
             reset_password_expires = datetime('now', '+1 hours') WHERE id = ?2",
            params![token, user.id],
        )?;
    }

    let subject = "Password Reset";
    let message = format!(
        "You are receiving this email because you (or someone else) has requested the reset of a password.\n\
         Please click on the following link, or paste this into your browser to complete the process:\n\n\
         {}/reset/{}\n\n\
         If you did not request this, please ignore this email and your password will remain unchanged.\n\n\
         Thanks,\nStudy Abroad! team\n",
        state.config.base_url(),
        token
    );

    if let Err(e) = state.mailer.send(&user.email, subject, &message).await {
        tracing::warn!("reset email failed: {}", e);
        // revert the token so the dead link cannot be used
        let conn = state.db.get()?;
        conn.execute(
            "UPDATE users SET reset_password_token = NULL, reset_password_expires = NULL \
             WHERE id = ?1",
            params![user.id],
        )?;
        return Ok(flash::redirect(
            "/forgot",
            Flash::error("Email could not be sent. Please try again"),
        ));
    }

    Ok(flash::redirect(
        "/login",
        Flash::success("Message sent to your email address. Check the email and reset password"),
    ))
}

fn user_by_reset_token(
    state: &AppState,
    token: &str,
) -> Result<Option<User>, AppError> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE reset_password_token = ?1 \
         AND reset_password_expires > datetime('now')",
        crate::db::models::USER_COLUMNS
    ))?;
    let mut rows = stmt.query_map(params![token], User::from_row)?;
    Ok(rows.next().transpose()?)
}

/// GET /reset/{token}
pub async fn reset_page(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Response> {
    if user_by_reset_token(&state, &token)?.is_none() {
        return Ok(flash::redirect(
            "/forgot",
            Flash::error("Password reset token is invalid or has expired"),
        ));
    }

    Ok(Html(ResetTemplate { error: None, token }).into_response())
}

#[derive(Deserialize)]
pub struct ResetForm {
    pub new_password: String,
    pub confirm_new_password: String,
}

/// POST /reset/{token}
pub async fn reset(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Form(form): Form<ResetForm>,
) -> AppResult<Response> {
    let Some(user) = user_by_reset_token(&state, &token)? else {
        return Ok(flash::redirect(
            "/forgot",
            Flash::error("Password reset token is invalid or has expired"),
        ));
    };

    let rerender = |status: StatusCode, error: &str| {
        (
            status,
            Html(ResetTemplate {
                error: Some(error.to_string()),
                token: token.clone(),
            }),
        )
            .into_response()
    };

    if form.new_password.chars().count() < PASSWORD_MIN {
        return Ok(rerender(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Password must be at least 5 chars long",
        ));
    }
    if form.new_password != form.confirm_new_password {
        return Ok(rerender(StatusCode::UNPROCESSABLE_ENTITY, "Confirm password failed"));
    }

    let password_hash = passwords::hash_password(&form.new_password)?;
    {
        let conn = state.db.get()?;
        conn.execute(
            "UPDATE users SET password_hash = ?1, reset_password_token = NULL, \
             reset_password_expires = NULL WHERE id = ?2",
            params![password_hash, user.id],
        )?;
    }

    // Confirmation email; the reset stands even when it cannot be sent
    let subject = "Your password has been changed";
    let message = format!(
        "This is a confirmation that the password for your account ({}) has just been changed.\n\n\
         Thanks,\nStudy Abroad! team\n",
        user.email
    );
    if let Err(e) = state.mailer.send(&user.email, subject, &message).await {
        tracing::warn!("password-change email failed: {}", e);
    }

    Ok(flash::redirect(
        "/login",
        Flash::success("Your password has been changed successfully! Login with your new password"),
    ))
}
