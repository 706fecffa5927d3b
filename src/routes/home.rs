use askama::Template;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::AppResult;
use crate::flash::{self, Flash, IncomingFlash};
use crate::routes::schools::{school_cards, SchoolCard, SchoolOrder};
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/landing.html")]
pub struct LandingTemplate {
    pub latest_schools: Vec<SchoolCard>,
    pub latest_reviews: Vec<LatestReview>,
    pub flash: Option<Flash>,
}

pub struct LatestReview {
    pub title: String,
    pub rating: i64,
    pub school_name: String,
    pub school_slug: String,
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

/// GET / — landing page with the newest schools and reviews
pub async fn landing(State(state): State<AppState>, incoming: IncomingFlash) -> AppResult<Response> {
    let conn = state.db.get()?;

    let latest_schools = school_cards(&conn, SchoolOrder::Newest, 3, 0)?;

    let latest_reviews = {
        let mut stmt = conn.prepare(
            "SELECT r.title, r.rating, s.name, s.slug FROM reviews r \
             JOIN schools s ON s.id = r.school_id \
             ORDER BY r.created_at DESC LIMIT 3",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LatestReview {
                    title: row.get(0)?,
                    rating: row.get(1)?,
                    school_name: row.get(2)?,
                    school_slug: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    Ok(flash::consume(
        Html(LandingTemplate {
            latest_schools,
            latest_reviews,
            flash: incoming.0,
        })
        .into_response(),
    ))
}
