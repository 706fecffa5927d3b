//! Membership toggles for the "favorite" and "follow" relations.
//!
//! Both relations are plain membership sets keyed on (target, principal);
//! a toggle flips membership and reports the resulting state. Concurrent
//! toggles on the same pair race at the store level (last writer wins).

use rusqlite::params;

use crate::error::AppError;
use crate::state::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// User favorites a school: rows in school_likes (school_id, user_id).
    Favorite,
    /// User follows another user: rows in user_follows (user_id, follower_id).
    Follow,
}

impl Relation {
    /// (table, target column, principal column)
    fn mapping(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Relation::Favorite => ("school_likes", "school_id", "user_id"),
            Relation::Follow => ("user_follows", "user_id", "follower_id"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToggleError {
    #[error("You cannot follow yourself")]
    SelfReference,
    #[error(transparent)]
    App(#[from] AppError),
}

impl From<rusqlite::Error> for ToggleError {
    fn from(e: rusqlite::Error) -> Self {
        ToggleError::App(e.into())
    }
}

impl From<r2d2::Error> for ToggleError {
    fn from(e: r2d2::Error) -> Self {
        ToggleError::App(e.into())
    }
}

/// Whether the principal is currently a member of the target's set.
pub fn is_member(
    pool: &DbPool,
    relation: Relation,
    principal_id: &str,
    target_id: &str,
) -> Result<bool, AppError> {
    let (table, target_col, principal_col) = relation.mapping();
    let conn = pool.get()?;
    let member: bool = conn.query_row(
        &format!("SELECT COUNT(*) > 0 FROM {table} WHERE {target_col} = ?1 AND {principal_col} = ?2"),
        params![target_id, principal_id],
        |row| row.get(0),
    )?;
    Ok(member)
}

/// All principal ids in the target's set.
pub fn members_of(
    pool: &DbPool,
    relation: Relation,
    target_id: &str,
) -> Result<Vec<String>, AppError> {
    let (table, target_col, principal_col) = relation.mapping();
    let conn = pool.get()?;
    let mut stmt =
        conn.prepare(&format!("SELECT {principal_col} FROM {table} WHERE {target_col} = ?1"))?;
    let members = stmt
        .query_map(params![target_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(members)
}

/// Flip the principal's membership in the target's set. Returns the resulting
/// membership state. A user can never follow themself.
pub fn toggle(
    pool: &DbPool,
    relation: Relation,
    principal_id: &str,
    target_id: &str,
) -> Result<bool, ToggleError> {
    if relation == Relation::Follow && principal_id == target_id {
        return Err(ToggleError::SelfReference);
    }

    let (table, target_col, principal_col) = relation.mapping();
    let conn = pool.get()?;

    let removed = conn.execute(
        &format!("DELETE FROM {table} WHERE {target_col} = ?1 AND {principal_col} = ?2"),
        params![target_id, principal_id],
    )?;
    if removed > 0 {
        return Ok(false);
    }

    conn.execute(
        &format!("INSERT INTO {table} ({target_col}, {principal_col}) VALUES (?1, ?2)"),
        params![target_id, principal_id],
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::testutil::{insert_school, insert_user};

    fn setup() -> (DbPool, String, String) {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let alice = insert_user(&pool, "alice");
        let bob = insert_user(&pool, "bob");
        (pool, alice, bob)
    }

    #[test]
    fn favorite_toggle_flips_membership() {
        let (pool, alice, _) = setup();
        let school = insert_school(&pool, "Foo College", &alice);

        assert!(!is_member(&pool, Relation::Favorite, &alice, &school).unwrap());
        assert!(toggle(&pool, Relation::Favorite, &alice, &school).unwrap());
        assert!(is_member(&pool, Relation::Favorite, &alice, &school).unwrap());
    }

    #[test]
    fn double_toggle_returns_to_original_state() {
        let (pool, alice, _) = setup();
        let school = insert_school(&pool, "Foo College", &alice);

        assert!(toggle(&pool, Relation::Favorite, &alice, &school).unwrap());
        assert!(!toggle(&pool, Relation::Favorite, &alice, &school).unwrap());
        assert!(!is_member(&pool, Relation::Favorite, &alice, &school).unwrap());
        assert!(members_of(&pool, Relation::Favorite, &school)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn follow_toggle_works_between_distinct_users() {
        let (pool, alice, bob) = setup();

        assert!(toggle(&pool, Relation::Follow, &alice, &bob).unwrap());
        assert!(is_member(&pool, Relation::Follow, &alice, &bob).unwrap());
        // bob does not automatically follow alice back
        assert!(!is_member(&pool, Relation::Follow, &bob, &alice).unwrap());
        assert_eq!(members_of(&pool, Relation::Follow, &bob).unwrap(), vec![alice.clone()]);

        assert!(!toggle(&pool, Relation::Follow, &alice, &bob).unwrap());
        assert!(!is_member(&pool, Relation::Follow, &alice, &bob).unwrap());
    }

    #[test]
    fn self_follow_is_rejected_before_touching_the_store() {
        let (pool, alice, _) = setup();

        let result = toggle(&pool, Relation::Follow, &alice, &alice);
        assert!(matches!(result, Err(ToggleError::SelfReference)));
        assert!(!is_member(&pool, Relation::Follow, &alice, &alice).unwrap());
    }

    #[test]
    fn sets_do_not_hold_duplicates() {
        let (pool, alice, bob) = setup();
        let school = insert_school(&pool, "Foo College", &bob);

        toggle(&pool, Relation::Favorite, &alice, &school).unwrap();
        toggle(&pool, Relation::Favorite, &bob, &school).unwrap();
        // toggling alice off and on again leaves exactly two members
        toggle(&pool, Relation::Favorite, &alice, &school).unwrap();
        toggle(&pool, Relation::Favorite, &alice, &school).unwrap();

        let members = members_of(&pool, Relation::Favorite, &school).unwrap();
        assert_eq!(members.len(), 2);
    }
}
