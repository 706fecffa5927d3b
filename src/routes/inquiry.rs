use askama::Template;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use rusqlite::params;
use serde::Deserialize;

use crate::auth::passwords;
use crate::db::models::User;
use crate::error::AppResult;
use crate::flash::{self, Flash};
use crate::routes::home::Html;
use crate::state::AppState;

const INQUIRY_MAX: usize = 500;

#[derive(Template)]
#[template(path = "pages/inquiry.html")]
pub struct InquiryTemplate {
    pub error: Option<String>,
    pub name: String,
    pub email: String,
    pub inquiry: String,
}

#[derive(Deserialize)]
pub struct InquiryForm {
    pub name: String,
    pub email: String,
    pub inquiry: String,
}

/// GET /inquiry/new
pub async fn new_page() -> Html<InquiryTemplate> {
    Html(InquiryTemplate {
        error: None,
        name: String::new(),
        email: String::new(),
        inquiry: String::new(),
    })
}

/// POST /inquiry — record an inquiry and acknowledge by email
pub async fn create(
    State(state): State<AppState>,
    Form(form): Form<InquiryForm>,
) -> AppResult<Response> {
    let name = form.name.trim().to_string();
    let email = form.email.trim().to_lowercase();
    let inquiry = form.inquiry.trim().to_string();

    let rerender = |status: StatusCode, error: &str| {
        (
            status,
            Html(InquiryTemplate {
                error: Some(error.to_string()),
                name: name.clone(),
                email: email.clone(),
                inquiry: inquiry.clone(),
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
    if inquiry.chars().count() > INQUIRY_MAX {
        return Ok(rerender(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Inquiry must be within 500 chars long",
        ));
    }

    let id = uuid::Uuid::now_v7().to_string();
    {
        let conn = state.db.get()?;
        // link the inquiry to a registered account when the email matches
        let user = User::by_email(&conn, &email)?;
        conn.execute(
            "INSERT INTO inquiries (id, name, email, inquiry, is_registered_user, user_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                name,
                email,
                if inquiry.is_empty() { None } else { Some(inquiry.as_str()) },
                user.is_some(),
                user.map(|u| u.id)
            ],
        )?;
    }

    let subject = "Inquiry sent to our team successfully!";
    let message = format!(
        "Hello {},\n\n\
         We received your inquiry and will get back to you as soon as possible.\n\n\
         Thanks,\nStudy Abroad! team\n",
        name
    );
    if let Err(e) = state.mailer.send(&email, subject, &message).await {
        tracing::warn!("inquiry email failed: {}", e);
        return Ok(rerender(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Email could not be sent. Please try again",
        ));
    }

    Ok(flash::redirect(
        "/schools",
        Flash::success("Inquiry sent to our team successfully!"),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/inquiry/new", get(new_page))
        .route("/inquiry", axum::routing::post(create))
}
