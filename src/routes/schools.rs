use askama::Template;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::authz::{self, AuthzError};
use crate::cascade;
use crate::db::models::{slugify, School, DEGREES, SCHOOL_TYPES};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::flash::{self, Flash, IncomingFlash};
use crate::reviews;
use crate::routes::home::Html;
use crate::state::AppState;
use crate::storage;
use crate::toggles::{self, Relation};

const PER_PAGE: i64 = 8;

// -- View models --

/// Compact school listing used by the index, landing, ranking, and sidebars.
pub struct SchoolCard {
    pub name: String,
    pub slug: String,
    pub image_url: String,
    pub formatted_address: String,
    pub average_display: String,
    pub review_count: i64,
    pub like_count: i64,
}

#[derive(Debug, Clone, Copy)]
pub enum SchoolOrder {
    Newest,
    MostLiked,
    TopRated,
    MostReviewed,
}

pub fn display_average(average: Option<f64>) -> String {
    match average {
        Some(value) => format!("{:.1}", value),
        None => "No ratings".to_string(),
    }
}

/// School cards in the requested order. Ranking orders sort by actual
/// counts, not stored references.
pub fn school_cards(
    conn: &Connection,
    order: SchoolOrder,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<Vec<SchoolCard>> {
    let order_by = match order {
        SchoolOrder::Newest => "s.created_at DESC",
        SchoolOrder::MostLiked => "like_count DESC, s.created_at DESC",
        SchoolOrder::TopRated => "s.average_rating IS NULL, s.average_rating DESC",
        SchoolOrder::MostReviewed => "review_count DESC, s.created_at DESC",
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT s.name, s.slug, s.image_url, s.formatted_address, s.average_rating, \
         (SELECT COUNT(*) FROM reviews r WHERE r.school_id = s.id) AS review_count, \
         (SELECT COUNT(*) FROM school_likes l WHERE l.school_id = s.id) AS like_count \
         FROM schools s ORDER BY {order_by} LIMIT ?1 OFFSET ?2"
    ))?;
    let cards = stmt
        .query_map(params![limit, offset], |row| {
            Ok(SchoolCard {
                name: row.get(0)?,
                slug: row.get(1)?,
                image_url: row.get(2)?,
                formatted_address: row.get(3)?,
                average_display: display_average(row.get(4)?),
                review_count: row.get(5)?,
                like_count: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cards)
}

// -- Templates --

#[derive(Template)]
#[template(path = "pages/schools.html")]
pub struct SchoolsTemplate {
    pub schools: Vec<SchoolCard>,
    pub current_page: i64,
    pub pages: i64,
    pub flash: Option<Flash>,
}

#[derive(Template)]
#[template(path = "pages/school_form.html")]
pub struct SchoolFormTemplate {
    pub heading: String,
    pub action: String,
    pub error: Option<String>,
    pub name: String,
    pub address: String,
    pub school_type: String,
    pub website: String,
    pub description: String,
    pub school_types: Vec<String>,
}

pub struct ReviewRow {
    pub id: String,
    pub title: String,
    pub degree: String,
    pub rating: i64,
    pub description: String,
    pub author_name: String,
    pub author_slug: String,
    pub is_mine: bool,
}

/// Submitted review form values echoed back on a validation failure.
#[derive(Default, Clone)]
pub struct ReviewFormEcho {
    pub title: String,
    pub degree: String,
    pub rating: String,
    pub description: String,
}

#[derive(Template)]
#[template(path = "pages/school_show.html")]
pub struct SchoolShowTemplate {
    pub name: String,
    pub slug: String,
    pub formatted_address: String,
    pub school_type: String,
    pub website: String,
    pub description: String,
    pub image_url: String,
    pub average_display: String,
    pub created_display: String,
    pub like_count: i64,
    pub review_count: i64,
    pub reviews: Vec<ReviewRow>,
    pub popular: Vec<SchoolCard>,
    pub new_arrivals: Vec<SchoolCard>,
    pub logged_in: bool,
    pub can_edit: bool,
    pub is_favorite: bool,
    pub has_review: bool,
    pub review_form: ReviewFormEcho,
    pub degrees: Vec<String>,
    pub error: Option<String>,
    pub flash: Option<Flash>,
}

// -- Shared show-page rendering --

/// Render the school page. Review handlers reuse this for 422 re-renders
/// with the submitted form values echoed back.
pub fn render_show(
    state: &AppState,
    school: &School,
    viewer: Option<&CurrentUser>,
    flash: Option<Flash>,
    error: Option<String>,
    echo: Option<ReviewFormEcho>,
    status: StatusCode,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    let all_reviews = reviews::reviews_for(&conn, &school.id)?;
    let review_count = all_reviews.len() as i64;

    let viewer_id = viewer.map(|u| u.id.as_str());
    let review_rows = {
        let mut stmt = conn.prepare(
            "SELECT r.id, r.title, r.degree, r.rating, r.description, u.name, u.slug, u.id \
             FROM reviews r JOIN users u ON u.id = r.user_id \
             WHERE r.school_id = ?1 ORDER BY r.created_at DESC LIMIT 3",
        )?;
        let rows = stmt
            .query_map(params![school.id], |row| {
                let author_id: String = row.get(7)?;
                Ok(ReviewRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    degree: row.get(2)?,
                    rating: row.get(3)?,
                    description: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    author_name: row.get(5)?,
                    author_slug: row.get(6)?,
                    is_mine: viewer_id == Some(author_id.as_str()),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let like_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM school_likes WHERE school_id = ?1",
        params![school.id],
        |row| row.get(0),
    )?;

    let popular = school_cards(&conn, SchoolOrder::MostLiked, 3, 0)?;
    let new_arrivals = school_cards(&conn, SchoolOrder::Newest, 3, 0)?;
    drop(conn);

    let (is_favorite, has_review, can_edit) = match viewer {
        Some(user) => (
            toggles::is_member(&state.db, Relation::Favorite, &user.id, &school.id)?,
            reviews::has_review(&state.db, &user.id, &school.id)?,
            school.user_id == user.id || user.is_admin,
        ),
        None => (false, false, false),
    };

    let template = SchoolShowTemplate {
        name: school.name.clone(),
        slug: school.slug.clone(),
        formatted_address: school.formatted_address.clone(),
        school_type: school.school_type.clone().unwrap_or_default(),
        website: school.website.clone().unwrap_or_default(),
        description: school.description.clone().unwrap_or_default(),
        image_url: school.image_url.clone(),
        average_display: display_average(school.average_rating),
        created_display: crate::db::models::format_date(&school.created_at),
        like_count,
        review_count,
        reviews: review_rows,
        popular,
        new_arrivals,
        logged_in: viewer.is_some(),
        can_edit,
        is_favorite,
        has_review,
        review_form: echo.unwrap_or_default(),
        degrees: DEGREES.iter().map(|d| d.to_string()).collect(),
        error,
        flash,
    };

    Ok(flash::consume((status, Html(template)).into_response()))
}

// -- Multipart form parsing --

pub struct SchoolFormData {
    pub name: String,
    pub address: String,
    pub school_type: String,
    pub website: String,
    pub description: String,
    pub image: Option<(Vec<u8>, String)>,
}

async fn parse_school_form(mut multipart: Multipart) -> Result<SchoolFormData, AppError> {
    let mut form = SchoolFormData {
        name: String::new(),
        address: String::new(),
        school_type: String::new(),
        website: String::new(),
        description: String::new(),
        image: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid form: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("invalid upload: {}", e)))?;
                if !filename.is_empty() && !bytes.is_empty() {
                    form.image = Some((bytes.to_vec(), filename));
                }
            }
            other => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("invalid form: {}", e)))?;
                match other {
                    "name" => form.name = value.trim().to_string(),
                    "address" => form.address = value.trim().to_string(),
                    "school_type" => form.school_type = value.trim().to_string(),
                    "website" => form.website = value.trim().to_string(),
                    "description" => form.description = value.trim().to_string(),
                    _ => {}
                }
            }
        }
    }

    Ok(form)
}

fn form_template(
    heading: &str,
    action: &str,
    error: Option<String>,
    form: &SchoolFormData,
) -> SchoolFormTemplate {
    SchoolFormTemplate {
        heading: heading.to_string(),
        action: action.to_string(),
        error,
        name: form.name.clone(),
        address: form.address.clone(),
        school_type: form.school_type.clone(),
        website: form.website.clone(),
        description: form.description.clone(),
        school_types: SCHOOL_TYPES.iter().map(|t| t.to_string()).collect(),
    }
}

fn empty_form() -> SchoolFormData {
    SchoolFormData {
        name: String::new(),
        address: String::new(),
        school_type: String::new(),
        website: String::new(),
        description: String::new(),
        image: None,
    }
}

// -- Handlers --

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

/// GET /schools — paginated index
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    incoming: IncomingFlash,
) -> AppResult<Response> {
    let current_page = query.page.unwrap_or(1).max(1);

    let conn = state.db.get()?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM schools", [], |row| row.get(0))?;
    let pages = (count + PER_PAGE - 1) / PER_PAGE;
    let schools = school_cards(
        &conn,
        SchoolOrder::Newest,
        PER_PAGE,
        (current_page - 1) * PER_PAGE,
    )?;

    Ok(flash::consume(
        Html(SchoolsTemplate {
            schools,
            current_page,
            pages,
            flash: incoming.0,
        })
        .into_response(),
    ))
}

/// GET /schools/new
pub async fn new_page(_user: CurrentUser) -> Html<SchoolFormTemplate> {
    Html(form_template("Add New School", "/schools", None, &empty_form()))
}

/// POST /schools — create a school
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let form = parse_school_form(multipart).await?;

    let rerender = |status: StatusCode, error: &str, form: &SchoolFormData| {
        (
            status,
            Html(form_template(
                "Add New School",
                "/schools",
                Some(error.to_string()),
                form,
            )),
        )
            .into_response()
    };

    if form.name.is_empty() {
        return Ok(rerender(StatusCode::UNPROCESSABLE_ENTITY, "Name should not be empty", &form));
    }
    if form.address.is_empty() {
        return Ok(rerender(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Address should not be empty",
            &form,
        ));
    }

    let slug = slugify(&form.name);
    {
        let conn = state.db.get()?;
        if School::by_name(&conn, &form.name)?.is_some() || School::by_slug(&conn, &slug)?.is_some()
        {
            return Ok(rerender(
                StatusCode::CONFLICT,
                "This school has already been registered",
                &form,
            ));
        }
    }

    // Geocoding failure is fatal to the write
    let location = state.geocoder.geocode(&form.address).await?;

    let (image_url, image_handle) = match &form.image {
        Some((bytes, filename)) => {
            let stored = state.storage.store(bytes, filename).await?;
            (stored.url, Some(stored.handle))
        }
        None => (storage::DEFAULT_SCHOOL_IMAGE.to_string(), None),
    };

    let id = uuid::Uuid::now_v7().to_string();
    {
        let conn = state.db.get()?;
        conn.execute(
            "INSERT INTO schools (id, name, slug, formatted_address, longitude, latitude, \
             street, city, state, country, zipcode, school_type, website, description, \
             image_url, image_handle, user_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                id,
                form.name,
                slug,
                location.formatted_address,
                location.longitude,
                location.latitude,
                location.street,
                location.city,
                location.state,
                location.country,
                location.zipcode,
                non_empty(&form.school_type),
                non_empty(&form.website),
                non_empty(&form.description),
                image_url,
                image_handle,
                user.id
            ],
        )?;
    }

    Ok(flash::redirect("/schools", Flash::success("Created new school!")))
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// GET /schools/{slug} — show page
pub async fn show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    maybe_user: MaybeUser,
    incoming: IncomingFlash,
) -> AppResult<Response> {
    let school = {
        let conn = state.db.get()?;
        School::by_slug(&conn, &slug)?.ok_or(AppError::NotFound)?
    };

    render_show(
        &state,
        &school,
        maybe_user.0.as_ref(),
        incoming.0,
        None,
        None,
        StatusCode::OK,
    )
}

/// GET /schools/{slug}/edit
pub async fn edit_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    user: CurrentUser,
) -> AppResult<Response> {
    let school = match authz::authorize_school(&state.db, &slug, (&user).into()) {
        Ok(school) => school,
        Err(AuthzError::NotFound) => return Err(AppError::NotFound),
        Err(AuthzError::Denied) => {
            return Ok(flash::redirect(
                "/schools",
                Flash::error("You are not authorized to do that"),
            ))
        }
        Err(AuthzError::App(e)) => return Err(e),
    };

    let form = SchoolFormData {
        name: school.name.clone(),
        address: school.formatted_address.clone(),
        school_type: school.school_type.clone().unwrap_or_default(),
        website: school.website.clone().unwrap_or_default(),
        description: school.description.clone().unwrap_or_default(),
        image: None,
    };
    let action = format!("/schools/{}/edit", school.slug);
    Ok(Html(form_template("Edit School", &action, None, &form)).into_response())
}

/// POST /schools/{slug}/edit — update a school
pub async fn update(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let school = match authz::authorize_school(&state.db, &slug, (&user).into()) {
        Ok(school) => school,
        Err(AuthzError::NotFound) => return Err(AppError::NotFound),
        Err(AuthzError::Denied) => {
            return Ok(flash::redirect(
                "/schools",
                Flash::error("You are not authorized to do that"),
            ))
        }
        Err(AuthzError::App(e)) => return Err(e),
    };

    let form = parse_school_form(multipart).await?;
    let action = format!("/schools/{}/edit", school.slug);

    let rerender = |status: StatusCode, error: &str, form: &SchoolFormData| {
        (
            status,
            Html(form_template(
                "Edit School",
                &action,
                Some(error.to_string()),
                form,
            )),
        )
            .into_response()
    };

    if form.name.is_empty() {
        return Ok(rerender(StatusCode::UNPROCESSABLE_ENTITY, "Name should not be empty", &form));
    }
    if form.address.is_empty() {
        return Ok(rerender(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Address should not be empty",
            &form,
        ));
    }

    let new_slug = slugify(&form.name);
    {
        let conn = state.db.get()?;
        if let Some(existing) = School::by_name(&conn, &form.name)? {
            if existing.id != school.id {
                return Ok(rerender(
                    StatusCode::CONFLICT,
                    "This school has already been registered",
                    &form,
                ));
            }
        }
        if let Some(existing) = School::by_slug(&conn, &new_slug)? {
            if existing.id != school.id {
                return Ok(rerender(
                    StatusCode::CONFLICT,
                    "This school has already been registered",
                    &form,
                ));
            }
        }
    }

    let location = state.geocoder.geocode(&form.address).await?;

    let (image_url, image_handle) = match &form.image {
        Some((bytes, filename)) => {
            // replace the previous image unless it is the placeholder
            if !storage::is_placeholder(&school.image_url) {
                if let Some(handle) = &school.image_handle {
                    state.storage.destroy(handle).await?;
                }
            }
            let stored = state.storage.store(bytes, filename).await?;
            (stored.url, Some(stored.handle))
        }
        None => (school.image_url.clone(), school.image_handle.clone()),
    };

    {
        let conn = state.db.get()?;
        conn.execute(
            "UPDATE schools SET name = ?1, slug = ?2, formatted_address = ?3, longitude = ?4, \
             latitude = ?5, street = ?6, city = ?7, state = ?8, country = ?9, zipcode = ?10, \
             school_type = ?11, website = ?12, description = ?13, image_url = ?14, \
             image_handle = ?15 WHERE id = ?16",
            params![
                form.name,
                new_slug,
                location.formatted_address,
                location.longitude,
                location.latitude,
                location.street,
                location.city,
                location.state,
                location.country,
                location.zipcode,
                non_empty(&form.school_type),
                non_empty(&form.website),
                non_empty(&form.description),
                image_url,
                image_handle,
                school.id
            ],
        )?;
    }

    Ok(flash::redirect("/schools", Flash::success("Edited school!")))
}

/// POST /schools/{slug}/delete — delete a school and its reviews
pub async fn delete(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    user: CurrentUser,
) -> AppResult<Response> {
    let school = match authz::authorize_school(&state.db, &slug, (&user).into()) {
        Ok(school) => school,
        Err(AuthzError::NotFound) => return Err(AppError::NotFound),
        Err(AuthzError::Denied) => {
            return Ok(flash::redirect(
                "/schools",
                Flash::error("You are not authorized to do that"),
            ))
        }
        Err(AuthzError::App(e)) => return Err(e),
    };

    if !storage::is_placeholder(&school.image_url) {
        if let Some(handle) = &school.image_handle {
            state.storage.destroy(handle).await?;
        }
    }

    cascade::delete_school(&state.db, &school.id)?;

    Ok(flash::redirect("/schools", Flash::success("Deleted school!")))
}

/// POST /schools/{slug}/favorite — toggle the viewer in the likes set
pub async fn favorite(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    user: CurrentUser,
) -> AppResult<Response> {
    let school = {
        let conn = state.db.get()?;
        School::by_slug(&conn, &slug)?.ok_or(AppError::NotFound)?
    };

    if let Err(e) = toggles::toggle(&state.db, Relation::Favorite, &user.id, &school.id) {
        return Err(match e {
            toggles::ToggleError::SelfReference => AppError::BadRequest(e.to_string()),
            toggles::ToggleError::App(err) => err,
        });
    }

    Ok(flash::see_other(&format!("/schools/{}", school.slug)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/schools", get(list).post(create))
        .route("/schools/new", get(new_page))
        .route("/schools/{slug}", get(show))
        .route("/schools/{slug}/edit", get(edit_page).post(update))
        .route("/schools/{slug}/delete", post(delete))
        .route("/schools/{slug}/favorite", post(favorite))
}
