use axum::routing::get;
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", get(handlers::signup_page).post(handlers::signup))
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route("/logout", get(handlers::logout))
        .route(
            "/forgot",
            get(handlers::forgot_page).post(handlers::forgot),
        )
        .route(
            "/reset/{token}",
            get(handlers::reset_page).post(handlers::reset),
        )
}
