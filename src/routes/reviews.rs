use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::post;
use axum::{Form, Router};
use serde::Deserialize;

use crate::authz::{self, AuthzError};
use crate::db::models::School;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::flash::{self, Flash};
use crate::reviews::{self, ReviewError, ReviewInput};
use crate::routes::schools::{render_show, ReviewFormEcho};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReviewForm {
    pub title: String,
    pub degree: String,
    pub rating: String,
    pub description: String,
}

impl ReviewForm {
    fn input(&self) -> ReviewInput {
        ReviewInput {
            title: self.title.clone(),
            degree: self.degree.clone(),
            // unparseable ratings fall out of range and fail validation
            rating: self.rating.trim().parse().unwrap_or(0),
            description: if self.description.is_empty() {
                None
            } else {
                Some(self.description.clone())
            },
        }
    }

    fn echo(&self) -> ReviewFormEcho {
        ReviewFormEcho {
            title: self.title.clone(),
            degree: self.degree.clone(),
            rating: self.rating.clone(),
            description: self.description.clone(),
        }
    }
}

fn school_by_slug(state: &AppState, slug: &str) -> AppResult<School> {
    let conn = state.db.get()?;
    School::by_slug(&conn, slug)?.ok_or(AppError::NotFound)
}

/// POST /schools/{slug}/reviews — create a review
pub async fn create(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    user: CurrentUser,
    Form(form): Form<ReviewForm>,
) -> AppResult<Response> {
    let school = school_by_slug(&state, &slug)?;
    let school_url = format!("/schools/{}", school.slug);

    match reviews::create(&state.db, &user.id, &school.id, &form.input()) {
        Ok(_) => Ok(flash::redirect(&school_url, Flash::success("Created new review!"))),
        Err(ReviewError::AlreadyReviewed) => Ok(flash::redirect(
            &school_url,
            Flash::error("You have already written a review for this school"),
        )),
        Err(ReviewError::Invalid(message)) => render_show(
            &state,
            &school,
            Some(&user),
            None,
            Some(message),
            Some(form.echo()),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        Err(ReviewError::App(e)) => Err(e),
    }
}

/// POST /schools/{slug}/reviews/{id}/edit — update a review
pub async fn update(
    State(state): State<AppState>,
    Path((slug, review_id)): Path<(String, String)>,
    user: CurrentUser,
    Form(form): Form<ReviewForm>,
) -> AppResult<Response> {
    let school = school_by_slug(&state, &slug)?;
    let school_url = format!("/schools/{}", school.slug);

    let review = match authz::authorize_review(&state.db, &review_id, (&user).into()) {
        Ok(review) => review,
        Err(AuthzError::NotFound) => return Err(AppError::NotFound),
        Err(AuthzError::Denied) => {
            return Ok(flash::redirect(
                &school_url,
                Flash::error("You are not authorized to do that"),
            ))
        }
        Err(AuthzError::App(e)) => return Err(e),
    };

    match reviews::update(&state.db, &review.id, &school.id, &form.input()) {
        Ok(()) => Ok(flash::redirect(&school_url, Flash::success("Edited review!"))),
        Err(ReviewError::Invalid(message)) => render_show(
            &state,
            &school,
            Some(&user),
            None,
            Some(message),
            Some(form.echo()),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        Err(ReviewError::AlreadyReviewed) => Ok(flash::redirect(
            &school_url,
            Flash::error("You have already written a review for this school"),
        )),
        Err(ReviewError::App(e)) => Err(e),
    }
}

/// POST /schools/{slug}/reviews/{id}/delete — delete a review
pub async fn delete(
    State(state): State<AppState>,
    Path((slug, review_id)): Path<(String, String)>,
    user: CurrentUser,
) -> AppResult<Response> {
    let school = school_by_slug(&state, &slug)?;
    let school_url = format!("/schools/{}", school.slug);

    let review = match authz::authorize_review(&state.db, &review_id, (&user).into()) {
        Ok(review) => review,
        Err(AuthzError::NotFound) => return Err(AppError::NotFound),
        Err(AuthzError::Denied) => {
            return Ok(flash::redirect(
                &school_url,
                Flash::error("You are not authorized to do that"),
            ))
        }
        Err(AuthzError::App(e)) => return Err(e),
    };

    match reviews::delete(&state.db, &review.id, &school.id) {
        Ok(()) => Ok(flash::redirect(&school_url, Flash::success("Deleted review!"))),
        Err(ReviewError::App(e)) => Err(e),
        Err(other) => Err(AppError::Internal(other.to_string())),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/schools/{slug}/reviews", post(create))
        .route("/schools/{slug}/reviews/{review_id}/edit", post(update))
        .route("/schools/{slug}/reviews/{review_id}/delete", post(delete))
}
