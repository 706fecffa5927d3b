//! Shared setup for integration tests: a migrated on-disk database in a
//! temporary directory, plus seed helpers.
#![allow(dead_code)]

use rusqlite::params;
use studyabroad::db;
use studyabroad::db::models::slugify;
use studyabroad::state::DbPool;
use tempfile::TempDir;

pub fn test_db() -> (TempDir, DbPool) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let pool = db::create_pool(&db_path).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");
    (temp_dir, pool)
}

pub fn seed_user(pool: &DbPool, name: &str) -> String {
    seed_user_with_admin(pool, name, false)
}

pub fn seed_admin(pool: &DbPool, name: &str) -> String {
    seed_user_with_admin(pool, name, true)
}

fn seed_user_with_admin(pool: &DbPool, name: &str, is_admin: bool) -> String {
    let id = uuid::Uuid::now_v7().to_string();
    let conn = pool.get().unwrap();
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, slug, is_admin) \
         VALUES (?1, ?2, ?3, 'hash', ?4, ?5)",
        params![id, name, format!("{}@example.com", name), slugify(name), is_admin],
    )
    .unwrap();
    id
}

pub fn seed_school(pool: &DbPool, name: &str, owner_id: &str) -> String {
    let id = uuid::Uuid::now_v7().to_string();
    let conn = pool.get().unwrap();
    conn.execute(
        "INSERT INTO schools (id, name, slug, formatted_address, user_id) \
         VALUES (?1, ?2, ?3, 'Somewhere, Earth', ?4)",
        params![id, name, slugify(name), owner_id],
    )
    .unwrap();
    id
}

pub fn stored_average(pool: &DbPool, school_id: &str) -> Option<f64> {
    let conn = pool.get().unwrap();
    conn.query_row(
        "SELECT average_rating FROM schools WHERE id = ?1",
        [school_id],
        |row| row.get(0),
    )
    .unwrap()
}

pub fn count(pool: &DbPool, sql: &str, param: &str) -> i64 {
    let conn = pool.get().unwrap();
    conn.query_row(sql, [param], |row| row.get(0)).unwrap()
}
