//! Review lifecycle: create, update, delete.
//!
//! Each state change ends with a synchronous recompute of the school's
//! average rating. A user gets at most one review per school, enforced by a
//! write-time lookup (the uniqueness key spans two reference columns).

use rusqlite::{params, Connection};

use crate::db::models::{self, Review, REVIEW_COLUMNS};
use crate::error::AppError;
use crate::ratings;
use crate::state::DbPool;

pub const DESCRIPTION_MAX: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct ReviewInput {
    pub title: String,
    pub degree: String,
    pub rating: i64,
    pub description: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("You have already written a review for this school")]
    AlreadyReviewed,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    App(#[from] AppError),
}

impl From<rusqlite::Error> for ReviewError {
    fn from(e: rusqlite::Error) -> Self {
        ReviewError::App(e.into())
    }
}

impl From<r2d2::Error> for ReviewError {
    fn from(e: r2d2::Error) -> Self {
        ReviewError::App(e.into())
    }
}

/// All reviews referencing a school, newest first.
pub fn reviews_for(conn: &Connection, school_id: &str) -> rusqlite::Result<Vec<Review>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE school_id = ?1 ORDER BY created_at DESC"
    ))?;
    let reviews = stmt
        .query_map(params![school_id], Review::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(reviews)
}

/// Whether this user has already reviewed this school.
pub fn has_review(pool: &DbPool, user_id: &str, school_id: &str) -> Result<bool, AppError> {
    let conn = pool.get()?;
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM reviews WHERE user_id = ?1 AND school_id = ?2",
        params![user_id, school_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// First failing validation message, in form order.
pub fn validate(input: &ReviewInput) -> Result<(), String> {
    if input.title.trim().is_empty() {
        return Err("Title should not be empty".to_string());
    }
    if !models::is_valid_degree(&input.degree) {
        return Err("Please choose a degree".to_string());
    }
    if !(1..=5).contains(&input.rating) {
        return Err("Rating must be between 1 and 5".to_string());
    }
    if let Some(description) = &input.description {
        if description.chars().count() > DESCRIPTION_MAX {
            return Err("Description should be within 500 chars long".to_string());
        }
    }
    Ok(())
}

/// Create a review. The duplicate check runs first and short-circuits
/// regardless of field validity.
pub fn create(
    pool: &DbPool,
    user_id: &str,
    school_id: &str,
    input: &ReviewInput,
) -> Result<Review, ReviewError> {
    if has_review(pool, user_id, school_id)? {
        return Err(ReviewError::AlreadyReviewed);
    }
    validate(input).map_err(ReviewError::Invalid)?;

    let id = uuid::Uuid::now_v7().to_string();
    {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO reviews (id, title, degree, rating, description, school_id, user_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                input.title.trim(),
                input.degree,
                input.rating,
                input.description,
                school_id,
                user_id
            ],
        )?;
    }

    ratings::recompute_average(pool, school_id)?;

    let conn = pool.get()?;
    let review = Review::by_id(&conn, &id)?.ok_or_else(|| {
        ReviewError::App(AppError::Internal("review vanished after insert".into()))
    })?;
    Ok(review)
}

/// Update a review's fields. Authorization has already been checked by the
/// caller via the guard.
pub fn update(
    pool: &DbPool,
    review_id: &str,
    school_id: &str,
    input: &ReviewInput,
) -> Result<(), ReviewError> {
    validate(input).map_err(ReviewError::Invalid)?;

    {
        let conn = pool.get()?;
        conn.execute(
            "UPDATE reviews SET title = ?1, degree = ?2, rating = ?3, description = ?4 \
             WHERE id = ?5",
            params![
                input.title.trim(),
                input.degree,
                input.rating,
                input.description,
                review_id
            ],
        )?;
    }

    ratings::recompute_average(pool, school_id)?;
    Ok(())
}

/// Delete a review and refresh the school's average.
pub fn delete(pool: &DbPool, review_id: &str, school_id: &str) -> Result<(), ReviewError> {
    {
        let conn = pool.get()?;
        conn.execute("DELETE FROM reviews WHERE id = ?1", params![review_id])?;
    }

    ratings::recompute_average(pool, school_id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::testutil::{insert_school, insert_user};

    fn setup() -> (DbPool, String, String) {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let user = insert_user(&pool, "alice");
        let school = insert_school(&pool, "Foo College", &user);
        (pool, user, school)
    }

    fn valid_input(rating: i64) -> ReviewInput {
        ReviewInput {
            title: "Great year abroad".to_string(),
            degree: "Bachelor (4 years)".to_string(),
            rating,
            description: Some("Solid teaching.".to_string()),
        }
    }

    fn stored_average(pool: &DbPool, school_id: &str) -> Option<f64> {
        let conn = pool.get().unwrap();
        conn.query_row(
            "SELECT average_rating FROM schools WHERE id = ?1",
            [school_id],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn create_persists_and_recomputes_average() {
        let (pool, user, school) = setup();

        let review = create(&pool, &user, &school, &valid_input(4)).unwrap();
        assert_eq!(review.rating, 4);
        assert_eq!(review.school_id, school);
        assert_eq!(stored_average(&pool, &school), Some(4.0));
    }

    #[test]
    fn second_review_by_same_user_is_a_conflict_not_a_second_record() {
        let (pool, user, school) = setup();
        create(&pool, &user, &school, &valid_input(4)).unwrap();

        let result = create(&pool, &user, &school, &valid_input(5));
        assert!(matches!(result, Err(ReviewError::AlreadyReviewed)));

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM reviews WHERE school_id = ?1",
                [school.as_str()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn duplicate_check_runs_before_validation() {
        let (pool, user, school) = setup();
        create(&pool, &user, &school, &valid_input(4)).unwrap();

        // invalid input, but the duplicate message wins
        let mut input = valid_input(4);
        input.title = String::new();
        let result = create(&pool, &user, &school, &input);
        assert!(matches!(result, Err(ReviewError::AlreadyReviewed)));
    }

    #[test]
    fn validation_messages_surface_first_failure() {
        let mut input = valid_input(4);
        input.title = "  ".to_string();
        assert_eq!(validate(&input).unwrap_err(), "Title should not be empty");

        let mut input = valid_input(4);
        input.degree = "PhD".to_string();
        assert_eq!(validate(&input).unwrap_err(), "Please choose a degree");

        let mut input = valid_input(0);
        assert_eq!(
            validate(&input).unwrap_err(),
            "Rating must be between 1 and 5"
        );
        input.rating = 6;
        assert_eq!(
            validate(&input).unwrap_err(),
            "Rating must be between 1 and 5"
        );

        let mut input = valid_input(4);
        input.description = Some("x".repeat(DESCRIPTION_MAX + 1));
        assert_eq!(
            validate(&input).unwrap_err(),
            "Description should be within 500 chars long"
        );
    }

    #[test]
    fn update_changes_fields_and_recomputes() {
        let (pool, user, school) = setup();
        let review = create(&pool, &user, &school, &valid_input(2)).unwrap();

        let other = insert_user(&pool, "bob");
        create(&pool, &other, &school, &valid_input(4)).unwrap();
        assert_eq!(stored_average(&pool, &school), Some(3.0));

        update(&pool, &review.id, &school, &valid_input(5)).unwrap();
        assert_eq!(stored_average(&pool, &school), Some(4.5));
    }

    #[test]
    fn delete_removes_review_and_recomputes() {
        let (pool, user, school) = setup();
        let review = create(&pool, &user, &school, &valid_input(3)).unwrap();

        let other = insert_user(&pool, "bob");
        let kept = create(&pool, &other, &school, &valid_input(5)).unwrap();
        assert_eq!(stored_average(&pool, &school), Some(4.0));

        delete(&pool, &review.id, &school).unwrap();
        assert_eq!(stored_average(&pool, &school), Some(5.0));

        delete(&pool, &kept.id, &school).unwrap();
        // all reviews gone: average is absent, not zero
        assert_eq!(stored_average(&pool, &school), None);
    }

    #[test]
    fn deleted_author_can_review_again() {
        let (pool, user, school) = setup();
        let review = create(&pool, &user, &school, &valid_input(3)).unwrap();
        delete(&pool, &review.id, &school).unwrap();

        assert!(create(&pool, &user, &school, &valid_input(4)).is_ok());
    }
}
