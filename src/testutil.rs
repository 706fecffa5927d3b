//! Seed helpers shared by unit tests.

use rusqlite::params;

use crate::db::models::slugify;
use crate::state::DbPool;

pub fn insert_user(pool: &DbPool, name: &str) -> String {
    insert_user_with_admin(pool, name, false)
}

pub fn insert_admin(pool: &DbPool, name: &str) -> String {
    insert_user_with_admin(pool, name, true)
}

fn insert_user_with_admin(pool: &DbPool, name: &str, is_admin: bool) -> String {
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

pub fn insert_school(pool: &DbPool, name: &str, owner_id: &str) -> String {
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

pub fn insert_review(pool: &DbPool, school_id: &str, user_id: &str, rating: i64) -> String {
    let id = uuid::Uuid::now_v7().to_string();
    let conn = pool.get().unwrap();
    conn.execute(
        "INSERT INTO reviews (id, title, degree, rating, school_id, user_id) \
         VALUES (?1, 'A review', 'Master', ?2, ?3, ?4)",
        params![id, rating, school_id, user_id],
    )
    .unwrap();
    id
}
