//! Derived `average_rating` maintenance for schools.

use rusqlite::params;

use crate::error::AppError;
use crate::reviews;
use crate::state::DbPool;

/// Recompute a school's average rating from its current review set and
/// persist it. NULL (not zero) when the school has no reviews. Returns the
/// stored value.
///
/// Must run as the last step of every review create/update/delete that
/// touches the school.
pub fn recompute_average(pool: &DbPool, school_id: &str) -> Result<Option<f64>, AppError> {
    let conn = pool.get()?;
    let ratings: Vec<i64> = reviews::reviews_for(&conn, school_id)?
        .iter()
        .map(|r| r.rating)
        .collect();

    let average = if ratings.is_empty() {
        None
    } else {
        Some(ratings.iter().sum::<i64>() as f64 / ratings.len() as f64)
    };

    conn.execute(
        "UPDATE schools SET average_rating = ?1 WHERE id = ?2",
        params![average, school_id],
    )?;

    Ok(average)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::testutil::{insert_review, insert_school, insert_user};

    fn setup() -> (DbPool, String) {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let user = insert_user(&pool, "alice");
        let school = insert_school(&pool, "Foo College", &user);
        (pool, school)
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
    fn average_of_ratings_is_stored() {
        let (pool, school) = setup();
        for (i, rating) in [5, 3, 4].iter().enumerate() {
            let reviewer = insert_user(&pool, &format!("user{}", i));
            insert_review(&pool, &school, &reviewer, *rating);
        }

        let average = recompute_average(&pool, &school).unwrap();
        assert_eq!(average, Some(4.0));
        assert_eq!(stored_average(&pool, &school), Some(4.0));
    }

    #[test]
    fn empty_review_set_stores_null_not_zero() {
        let (pool, school) = setup();
        let average = recompute_average(&pool, &school).unwrap();
        assert_eq!(average, None);
        assert_eq!(stored_average(&pool, &school), None);
    }

    #[test]
    fn recompute_is_idempotent() {
        let (pool, school) = setup();
        let reviewer = insert_user(&pool, "bob");
        insert_review(&pool, &school, &reviewer, 2);

        let first = recompute_average(&pool, &school).unwrap();
        let second = recompute_average(&pool, &school).unwrap();
        assert_eq!(first, second);
        assert_eq!(second, Some(2.0));
    }

    #[test]
    fn fractional_averages_survive() {
        let (pool, school) = setup();
        for (i, rating) in [5, 4].iter().enumerate() {
            let reviewer = insert_user(&pool, &format!("user{}", i));
            insert_review(&pool, &school, &reviewer, *rating);
        }
        assert_eq!(recompute_average(&pool, &school).unwrap(), Some(4.5));
    }
}
