//! Explicit deletion cascades for schools and users.
//!
//! Cascades are orchestrated here rather than through store-level triggers,
//! so ordering is visible and dependent rows are removed inside the same
//! transaction as the owning row.

use rusqlite::{params, Transaction};

use crate::db::models::User;
use crate::error::AppError;
use crate::ratings;
use crate::state::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum CascadeError {
    #[error("Admin user cannot be deleted")]
    AdminUndeletable,
    #[error(transparent)]
    App(#[from] AppError),
}

impl From<rusqlite::Error> for CascadeError {
    fn from(e: rusqlite::Error) -> Self {
        CascadeError::App(e.into())
    }
}

impl From<r2d2::Error> for CascadeError {
    fn from(e: r2d2::Error) -> Self {
        CascadeError::App(e.into())
    }
}

/// Delete a school together with its reviews and like rows.
pub fn delete_school(pool: &DbPool, school_id: &str) -> Result<(), AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    delete_school_tx(&tx, school_id)?;
    tx.commit()?;
    Ok(())
}

fn delete_school_tx(tx: &Transaction<'_>, school_id: &str) -> rusqlite::Result<()> {
    tx.execute("DELETE FROM reviews WHERE school_id = ?1", params![school_id])?;
    tx.execute(
        "DELETE FROM school_likes WHERE school_id = ?1",
        params![school_id],
    )?;
    tx.execute("DELETE FROM schools WHERE id = ?1", params![school_id])?;
    Ok(())
}

/// Delete a user account and everything hanging off it: owned schools (and
/// their reviews), reviews authored elsewhere, like and follow rows, and
/// sessions. Admin accounts are refused outright.
///
/// Schools that merely lost one of this user's reviews survive, so their
/// average rating is recomputed afterwards.
pub fn delete_user(pool: &DbPool, user: &User) -> Result<(), CascadeError> {
    if user.is_admin {
        return Err(CascadeError::AdminUndeletable);
    }

    let touched_schools: Vec<String>;
    {
        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        // Schools this user reviewed but does not own keep existing and need
        // a fresh average once the user's reviews are gone.
        touched_schools = {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT school_id FROM reviews \
                 WHERE user_id = ?1 \
                 AND school_id NOT IN (SELECT id FROM schools WHERE user_id = ?1)",
            )?;
            let rows = stmt
                .query_map(params![user.id], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            rows
        };

        let owned_schools: Vec<String> = {
            let mut stmt = tx.prepare("SELECT id FROM schools WHERE user_id = ?1")?;
            let rows = stmt
                .query_map(params![user.id], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            rows
        };
        for school_id in &owned_schools {
            delete_school_tx(&tx, school_id)?;
        }

        tx.execute("DELETE FROM reviews WHERE user_id = ?1", params![user.id])?;
        tx.execute(
            "DELETE FROM school_likes WHERE user_id = ?1",
            params![user.id],
        )?;
        tx.execute(
            "DELETE FROM user_follows WHERE user_id = ?1 OR follower_id = ?1",
            params![user.id],
        )?;
        tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![user.id])?;
        tx.execute("DELETE FROM users WHERE id = ?1", params![user.id])?;

        tx.commit()?;
    }

    for school_id in &touched_schools {
        ratings::recompute_average(pool, school_id)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::testutil::{insert_admin, insert_review, insert_school, insert_user};
    use crate::toggles::{self, Relation};

    fn user_by_id(pool: &DbPool, id: &str) -> User {
        let conn = pool.get().unwrap();
        User::by_id(&conn, id).unwrap().unwrap()
    }

    fn count(pool: &DbPool, sql: &str, param: &str) -> i64 {
        let conn = pool.get().unwrap();
        conn.query_row(sql, [param], |row| row.get(0)).unwrap()
    }

    #[test]
    fn deleting_school_removes_its_reviews_and_likes() {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let owner = insert_user(&pool, "owner");
        let fan = insert_user(&pool, "fan");
        let school = insert_school(&pool, "Foo College", &owner);
        insert_review(&pool, &school, &fan, 5);
        toggles::toggle(&pool, Relation::Favorite, &fan, &school).unwrap();

        delete_school(&pool, &school).unwrap();

        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM reviews WHERE school_id = ?1", &school),
            0
        );
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM school_likes WHERE school_id = ?1", &school),
            0
        );
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM schools WHERE id = ?1", &school),
            0
        );
    }

    #[test]
    fn deleting_user_cascades_through_owned_schools() {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let doomed = insert_user(&pool, "doomed");
        let bystander = insert_user(&pool, "bystander");

        let owned = insert_school(&pool, "Doomed College", &doomed);
        insert_review(&pool, &owned, &bystander, 5);

        delete_user(&pool, &user_by_id(&pool, &doomed)).unwrap();

        // the owned school and every review referencing it are gone
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM schools WHERE id = ?1", &owned),
            0
        );
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM reviews WHERE school_id = ?1", &owned),
            0
        );
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM users WHERE id = ?1", &doomed),
            0
        );
    }

    #[test]
    fn deleting_user_strips_likes_follows_and_refreshes_ratings() {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let doomed = insert_user(&pool, "doomed");
        let keeper = insert_user(&pool, "keeper");

        let kept_school = insert_school(&pool, "Kept College", &keeper);
        insert_review(&pool, &kept_school, &doomed, 1);
        insert_review(&pool, &kept_school, &keeper, 5);
        ratings::recompute_average(&pool, &kept_school).unwrap();

        toggles::toggle(&pool, Relation::Favorite, &doomed, &kept_school).unwrap();
        toggles::toggle(&pool, Relation::Follow, &doomed, &keeper).unwrap();
        toggles::toggle(&pool, Relation::Follow, &keeper, &doomed).unwrap();

        delete_user(&pool, &user_by_id(&pool, &doomed)).unwrap();

        // no review or like or follow rows reference the deleted user
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM reviews WHERE user_id = ?1", &doomed),
            0
        );
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM school_likes WHERE user_id = ?1", &doomed),
            0
        );
        assert_eq!(
            count(
                &pool,
                "SELECT COUNT(*) FROM user_follows WHERE user_id = ?1 OR follower_id = ?1",
                &doomed
            ),
            0
        );

        // the surviving school's average reflects only the keeper's review
        let conn = pool.get().unwrap();
        let average: Option<f64> = conn
            .query_row(
                "SELECT average_rating FROM schools WHERE id = ?1",
                [kept_school.as_str()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(average, Some(5.0));
    }

    #[test]
    fn admin_deletion_is_refused() {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let admin = insert_admin(&pool, "admin");

        let result = delete_user(&pool, &user_by_id(&pool, &admin));
        assert!(matches!(result, Err(CascadeError::AdminUndeletable)));
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM users WHERE id = ?1", &admin),
            1
        );
    }
}
