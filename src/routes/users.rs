use askama::Template;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use rusqlite::params;
use serde::Deserialize;

use crate::auth::passwords::{self, PASSWORD_MIN};
use crate::authz::{self, AuthzError};
use crate::cascade::{self, CascadeError};
use crate::db::models::{slugify, User, STUDENT_TYPES};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::flash::{self, Flash, IncomingFlash};
use crate::routes::home::Html;
use crate::routes::schools::SchoolCard;
use crate::state::AppState;
use crate::storage;
use crate::toggles::{self, Relation, ToggleError};

const INTRODUCTION_MAX: usize = 500;

// -- Templates --

pub struct FollowEntry {
    pub name: String,
    pub slug: String,
}

pub struct UserReviewRow {
    pub school_name: String,
    pub school_slug: String,
    pub title: String,
    pub rating: i64,
    pub degree: String,
}

#[derive(Template)]
#[template(path = "pages/user.html")]
pub struct UserTemplate {
    pub title: String,
    pub name: String,
    pub slug: String,
    pub introduction: String,
    pub student_type: String,
    pub image_url: String,
    pub mypage: bool,
    pub logged_in: bool,
    pub is_following: bool,
    pub following: Vec<FollowEntry>,
    pub follower_count: i64,
    pub schools: Vec<SchoolCard>,
    pub reviews: Vec<UserReviewRow>,
    pub flash: Option<Flash>,
}

#[derive(Template)]
#[template(path = "pages/user_edit.html")]
pub struct UserEditTemplate {
    pub content: String,
    pub error: Option<String>,
    pub slug: String,
    pub name: String,
    pub introduction: String,
    pub student_type: String,
    pub email: String,
    pub student_types: Vec<String>,
}

// -- Handlers --

/// GET /users/{slug} — profile page
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    maybe_user: MaybeUser,
    incoming: IncomingFlash,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let user = User::by_slug(&conn, &slug)?.ok_or(AppError::NotFound)?;

    let viewer = maybe_user.0;
    let mypage = viewer.as_ref().is_some_and(|v| v.id == user.id);
    let title = if mypage {
        "My Page".to_string()
    } else {
        format!("{}'s Page", user.name)
    };

    // users this user follows
    let following = {
        let mut stmt = conn.prepare(
            "SELECT u.name, u.slug FROM users u \
             JOIN user_follows f ON f.user_id = u.id \
             WHERE f.follower_id = ?1 ORDER BY u.name",
        )?;
        let rows = stmt
            .query_map(params![user.id], |row| {
                Ok(FollowEntry {
                    name: row.get(0)?,
                    slug: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let follower_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM user_follows WHERE user_id = ?1",
        params![user.id],
        |row| row.get(0),
    )?;

    // schools this user favorited
    let schools = {
        let mut stmt = conn.prepare(
            "SELECT s.name, s.slug, s.image_url, s.formatted_address, s.average_rating, \
             (SELECT COUNT(*) FROM reviews r WHERE r.school_id = s.id), \
             (SELECT COUNT(*) FROM school_likes l2 WHERE l2.school_id = s.id) \
             FROM schools s JOIN school_likes l ON l.school_id = s.id \
             WHERE l.user_id = ?1 ORDER BY s.name",
        )?;
        let rows = stmt
            .query_map(params![user.id], |row| {
                Ok(SchoolCard {
                    name: row.get(0)?,
                    slug: row.get(1)?,
                    image_url: row.get(2)?,
                    formatted_address: row.get(3)?,
                    average_display: crate::routes::schools::display_average(row.get(4)?),
                    review_count: row.get(5)?,
                    like_count: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let reviews = {
        let mut stmt = conn.prepare(
            "SELECT s.name, s.slug, r.title, r.rating, r.degree \
             FROM reviews r JOIN schools s ON s.id = r.school_id \
             WHERE r.user_id = ?1 ORDER BY r.created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![user.id], |row| {
                Ok(UserReviewRow {
                    school_name: row.get(0)?,
                    school_slug: row.get(1)?,
                    title: row.get(2)?,
                    rating: row.get(3)?,
                    degree: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    drop(conn);

    let is_following = match &viewer {
        Some(v) if !mypage => {
            toggles::is_member(&state.db, Relation::Follow, &v.id, &user.id)?
        }
        _ => false,
    };

    Ok(flash::consume(
        Html(UserTemplate {
            title,
            name: user.name,
            slug: user.slug,
            introduction: user.introduction.unwrap_or_default(),
            student_type: user.student_type.unwrap_or_default(),
            image_url: user.image_url,
            mypage,
            logged_in: viewer.is_some(),
            is_following,
            following,
            follower_count,
            schools,
            reviews,
            flash: incoming.0,
        })
        .into_response(),
    ))
}

#[derive(Deserialize)]
pub struct ContentQuery {
    pub content: Option<String>,
}

/// GET /users/{slug}/edit?content=profile|email|password
pub async fn edit_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<ContentQuery>,
    user: CurrentUser,
) -> AppResult<Response> {
    let target = match authz::authorize_profile(&state.db, &slug, (&user).into()) {
        Ok(target) => target,
        Err(AuthzError::NotFound) => return Err(AppError::NotFound),
        Err(AuthzError::Denied) => {
            return Ok(flash::redirect(
                &format!("/users/{}", slug),
                Flash::error("You are not authorized to do that"),
            ))
        }
        Err(AuthzError::App(e)) => return Err(e),
    };

    let content = match query.content.as_deref() {
        Some("email") => "email",
        Some("password") => "password",
        _ => "profile",
    };

    Ok(Html(UserEditTemplate {
        content: content.to_string(),
        error: None,
        slug: target.slug.clone(),
        name: target.name.clone(),
        introduction: target.introduction.clone().unwrap_or_default(),
        student_type: target.student_type.clone().unwrap_or_default(),
        email: target.email.clone(),
        student_types: STUDENT_TYPES.iter().map(|t| t.to_string()).collect(),
    })
    .into_response())
}

struct UserEditForm {
    content: String,
    name: String,
    introduction: String,
    student_type: String,
    new_email: String,
    current_password: String,
    new_password: String,
    confirm_new_password: String,
    image: Option<(Vec<u8>, String)>,
}

async fn parse_edit_form(mut multipart: Multipart) -> Result<UserEditForm, AppError> {
    let mut form = UserEditForm {
        content: String::new(),
        name: String::new(),
        introduction: String::new(),
        student_type: String::new(),
        new_email: String::new(),
        current_password: String::new(),
        new_password: String::new(),
        confirm_new_password: String::new(),
        image: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid form: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("invalid upload: {}", e)))?;
            if !filename.is_empty() && !bytes.is_empty() {
                form.image = Some((bytes.to_vec(), filename));
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::BadRequest(format!("invalid form: {}", e)))?;
        match name.as_str() {
            "content" => form.content = value.trim().to_string(),
            "name" => form.name = value.trim().to_string(),
            "introduction" => form.introduction = value.trim().to_string(),
            "student_type" => form.student_type = value.trim().to_string(),
            "new_email" => form.new_email = value.trim().to_lowercase(),
            "current_password" => form.current_password = value,
            "new_password" => form.new_password = value,
            "confirm_new_password" => form.confirm_new_password = value,
            _ => {}
        }
    }

    Ok(form)
}

/// POST /users/{slug}/edit — update profile, email, or password
pub async fn update(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let target = match authz::authorize_profile(&state.db, &slug, (&user).into()) {
        Ok(target) => target,
        Err(AuthzError::NotFound) => return Err(AppError::NotFound),
        Err(AuthzError::Denied) => {
            return Ok(flash::redirect(
                &format!("/users/{}", slug),
                Flash::error("You are not authorized to do that"),
            ))
        }
        Err(AuthzError::App(e)) => return Err(e),
    };

    let form = parse_edit_form(multipart).await?;

    let rerender = |status: StatusCode, error: &str, form: &UserEditForm| {
        (
            status,
            Html(UserEditTemplate {
                content: form.content.clone(),
                error: Some(error.to_string()),
                slug: target.slug.clone(),
                name: if form.name.is_empty() {
                    target.name.clone()
                } else {
                    form.name.clone()
                },
                introduction: form.introduction.clone(),
                student_type: form.student_type.clone(),
                email: target.email.clone(),
                student_types: STUDENT_TYPES.iter().map(|t| t.to_string()).collect(),
            }),
        )
            .into_response()
    };

    match form.content.as_str() {
        "profile" => {
            if form.name.is_empty() {
                return Ok(rerender(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "Name should not be empty",
                    &form,
                ));
            }
            if form.introduction.chars().count() > INTRODUCTION_MAX {
                return Ok(rerender(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "Introduction should be within 500 chars long",
                    &form,
                ));
            }

            let new_slug = slugify(&form.name);
            {
                let conn = state.db.get()?;
                if let Some(existing) = User::by_name(&conn, &form.name)? {
                    if existing.id != target.id {
                        return Ok(rerender(
                            StatusCode::CONFLICT,
                            "This username has already been registered",
                            &form,
                        ));
                    }
                }
                if let Some(existing) = User::by_slug(&conn, &new_slug)? {
                    if existing.id != target.id {
                        return Ok(rerender(
                            StatusCode::CONFLICT,
                            "This username has already been registered",
                            &form,
                        ));
                    }
                }
            }

            let (image_url, image_handle) = match &form.image {
                Some((bytes, filename)) => {
                    if !storage::is_placeholder(&target.image_url) {
                        if let Some(handle) = &target.image_handle {
                            state.storage.destroy(handle).await?;
                        }
                    }
                    let stored = state.storage.store(bytes, filename).await?;
                    (stored.url, Some(stored.handle))
                }
                None => (target.image_url.clone(), target.image_handle.clone()),
            };

            {
                let conn = state.db.get()?;
                conn.execute(
                    "UPDATE users SET name = ?1, slug = ?2, introduction = ?3, \
                     student_type = ?4, image_url = ?5, image_handle = ?6 WHERE id = ?7",
                    params![
                        form.name,
                        new_slug,
                        if form.introduction.is_empty() {
                            None
                        } else {
                            Some(form.introduction.as_str())
                        },
                        if form.student_type.is_empty() {
                            None
                        } else {
                            Some(form.student_type.as_str())
                        },
                        image_url,
                        image_handle,
                        target.id
                    ],
                )?;
            }

            Ok(flash::redirect(
                &format!("/users/{}", new_slug),
                Flash::success("Edited your account!"),
            ))
        }
        "email" => {
            if !passwords::looks_like_email(&form.new_email) {
                return Ok(rerender(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "invalid email address",
                    &form,
                ));
            }
            {
                let conn = state.db.get()?;
                if User::by_email(&conn, &form.new_email)?.is_some() {
                    return Ok(rerender(
                        StatusCode::CONFLICT,
                        "This email has already been registered",
                        &form,
                    ));
                }
                conn.execute(
                    "UPDATE users SET email = ?1 WHERE id = ?2",
                    params![form.new_email, target.id],
                )?;
            }

            Ok(flash::redirect(
                &format!("/users/{}", target.slug),
                Flash::success("Edited your account!"),
            ))
        }
        "password" => {
            if !passwords::verify_password(&form.current_password, &target.password_hash)? {
                return Ok(rerender(
                    StatusCode::UNAUTHORIZED,
                    "incorrect current password",
                    &form,
                ));
            }
            if form.new_password.chars().count() < PASSWORD_MIN {
                return Ok(rerender(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "Password must be at least 5 chars long",
                    &form,
                ));
            }
            if form.new_password != form.confirm_new_password {
                return Ok(rerender(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "Confirm password failed",
                    &form,
                ));
            }

            let password_hash = passwords::hash_password(&form.new_password)?;
            {
                let conn = state.db.get()?;
                conn.execute(
                    "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                    params![password_hash, target.id],
                )?;
            }

            Ok(flash::redirect(
                &format!("/users/{}", target.slug),
                Flash::success("Edited your account!"),
            ))
        }
        _ => Err(AppError::BadRequest("unknown form content".into())),
    }
}

/// POST /users/{slug}/delete — delete an account and everything it owns
pub async fn delete(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    user: CurrentUser,
) -> AppResult<Response> {
    let target = match authz::authorize_profile(&state.db, &slug, (&user).into()) {
        Ok(target) => target,
        Err(AuthzError::NotFound) => return Err(AppError::NotFound),
        Err(AuthzError::Denied) => {
            return Ok(flash::redirect(
                &format!("/users/{}", slug),
                Flash::error("You are not authorized to do that"),
            ))
        }
        Err(AuthzError::App(e)) => return Err(e),
    };

    // check before touching the image so a refused delete has no side effects
    if target.is_admin {
        return Ok(flash::redirect(
            &format!("/users/{}", target.slug),
            Flash::error("Admin user cannot be deleted"),
        ));
    }

    if !storage::is_placeholder(&target.image_url) {
        if let Some(handle) = &target.image_handle {
            state.storage.destroy(handle).await?;
        }
    }

    match cascade::delete_user(&state.db, &target) {
        Ok(()) => {}
        Err(CascadeError::AdminUndeletable) => {
            return Ok(flash::redirect(
                &format!("/users/{}", target.slug),
                Flash::error("Admin user cannot be deleted"),
            ))
        }
        Err(CascadeError::App(e)) => return Err(e),
    }

    let mut response = flash::redirect("/schools", Flash::success("Deleted your account!"));
    let clear_cookie = format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        state.config.auth.cookie_name
    );
    response.headers_mut().append(
        header::SET_COOKIE,
        clear_cookie
            .parse()
            .map_err(|_| AppError::Internal("invalid cookie".into()))?,
    );
    Ok(response)
}

/// POST /users/{slug}/follow — toggle the viewer in the followed set
pub async fn follow(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    user: CurrentUser,
) -> AppResult<Response> {
    let target = {
        let conn = state.db.get()?;
        User::by_slug(&conn, &slug)?.ok_or(AppError::NotFound)?
    };
    let profile_url = format!("/users/{}", target.slug);

    match toggles::toggle(&state.db, Relation::Follow, &user.id, &target.id) {
        Ok(_) => Ok(flash::see_other(&profile_url)),
        Err(ToggleError::SelfReference) => Ok(flash::redirect(
            &profile_url,
            Flash::error("You cannot follow yourself"),
        )),
        Err(ToggleError::App(e)) => Err(e),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/{slug}", get(show))
        .route("/users/{slug}/edit", get(edit_page).post(update))
        .route("/users/{slug}/delete", post(delete))
        .route("/users/{slug}/follow", post(follow))
}
