use askama::Template;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::error::AppResult;
use crate::routes::home::Html;
use crate::routes::schools::{school_cards, SchoolCard, SchoolOrder};
use crate::state::AppState;

const TOP: i64 = 5;

#[derive(Template)]
#[template(path = "pages/ranking.html")]
pub struct RankingTemplate {
    pub favorited: Vec<SchoolCard>,
    pub rated: Vec<SchoolCard>,
    pub reviewed: Vec<SchoolCard>,
    pub latest: Vec<SchoolCard>,
}

/// GET /ranking — four leaderboards over the school directory.
/// "Most reviewed" sorts by actual review count, not a stored reference.
pub async fn ranking(State(state): State<AppState>) -> AppResult<Response> {
    let conn = state.db.get()?;

    let template = RankingTemplate {
        favorited: school_cards(&conn, SchoolOrder::MostLiked, TOP, 0)?,
        rated: school_cards(&conn, SchoolOrder::TopRated, TOP, 0)?,
        reviewed: school_cards(&conn, SchoolOrder::MostReviewed, TOP, 0)?,
        latest: school_cards(&conn, SchoolOrder::Newest, TOP, 0)?,
    };

    Ok(Html(template).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ranking", get(ranking))
}
