use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub introduction: Option<String>,
    pub student_type: Option<String>,
    pub image_url: String,
    pub image_handle: Option<String>,
    pub reset_password_token: Option<String>,
    pub reset_password_expires: Option<String>,
    pub slug: String,
    pub is_admin: bool,
    pub created_at: String,
}

pub const USER_COLUMNS: &str = "id, name, email, password_hash, introduction, student_type, \
     image_url, image_handle, reset_password_token, reset_password_expires, slug, is_admin, created_at";

impl User {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            introduction: row.get(4)?,
            student_type: row.get(5)?,
            image_url: row.get(6)?,
            image_handle: row.get(7)?,
            reset_password_token: row.get(8)?,
            reset_password_expires: row.get(9)?,
            slug: row.get(10)?,
            is_admin: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    pub fn by_slug(conn: &Connection, slug: &str) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE slug = ?1"),
            [slug],
            Self::from_row,
        )
        .optional()
    }

    pub fn by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            [id],
            Self::from_row,
        )
        .optional()
    }

    pub fn by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            [email],
            Self::from_row,
        )
        .optional()
    }

    pub fn by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE name = ?1"),
            [name],
            Self::from_row,
        )
        .optional()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct School {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub formatted_address: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub zipcode: Option<String>,
    pub school_type: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub image_url: String,
    pub image_handle: Option<String>,
    pub average_rating: Option<f64>,
    pub user_id: String,
    pub created_at: String,
}

pub const SCHOOL_COLUMNS: &str = "id, name, slug, formatted_address, longitude, latitude, street, \
     city, state, country, zipcode, school_type, website, description, image_url, image_handle, \
     average_rating, user_id, created_at";

impl School {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(School {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            formatted_address: row.get(3)?,
            longitude: row.get(4)?,
            latitude: row.get(5)?,
            street: row.get(6)?,
            city: row.get(7)?,
            state: row.get(8)?,
            country: row.get(9)?,
            zipcode: row.get(10)?,
            school_type: row.get(11)?,
            website: row.get(12)?,
            description: row.get(13)?,
            image_url: row.get(14)?,
            image_handle: row.get(15)?,
            average_rating: row.get(16)?,
            user_id: row.get(17)?,
            created_at: row.get(18)?,
        })
    }

    pub fn by_slug(conn: &Connection, slug: &str) -> rusqlite::Result<Option<School>> {
        conn.query_row(
            &format!("SELECT {SCHOOL_COLUMNS} FROM schools WHERE slug = ?1"),
            [slug],
            Self::from_row,
        )
        .optional()
    }

    pub fn by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<School>> {
        conn.query_row(
            &format!("SELECT {SCHOOL_COLUMNS} FROM schools WHERE name = ?1"),
            [name],
            Self::from_row,
        )
        .optional()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub title: String,
    pub degree: String,
    pub rating: i64,
    pub description: Option<String>,
    pub school_id: String,
    pub user_id: String,
    pub created_at: String,
}

pub const REVIEW_COLUMNS: &str =
    "id, title, degree, rating, description, school_id, user_id, created_at";

impl Review {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Review {
            id: row.get(0)?,
            title: row.get(1)?,
            degree: row.get(2)?,
            rating: row.get(3)?,
            description: row.get(4)?,
            school_id: row.get(5)?,
            user_id: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    pub fn by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<Review>> {
        conn.query_row(
            &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?1"),
            [id],
            Self::from_row,
        )
        .optional()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inquiry {
    pub id: String,
    pub name: String,
    pub email: String,
    pub inquiry: Option<String>,
    pub is_replied: bool,
    pub is_registered_user: bool,
    pub user_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: String,
    pub created_at: String,
}

/// Degree categories a review must pick from.
pub const DEGREES: &[&str] = &[
    "Certificate (1 year)",
    "Diploma (2 years)",
    "Advanced Diploma (3 years)",
    "Bachelor (4 years)",
    "Master",
    "Doctor",
    "Other",
];

pub const SCHOOL_TYPES: &[&str] = &["College", "University", "Language School", "Other"];

pub const STUDENT_TYPES: &[&str] = &[
    "High School Student",
    "College Student",
    "University Student",
    "Graduate School Student",
    "Worker",
    "Other",
];

pub fn is_valid_degree(degree: &str) -> bool {
    DEGREES.contains(&degree)
}

/// Human-readable form of a SQLite `datetime('now')` timestamp.
pub fn format_date(raw: &str) -> String {
    match chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        Ok(date) => date.format("%b %-d, %Y").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Lowercased, hyphen-separated routing key derived from a name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true; // suppress a leading dash
    for c in name.chars() {
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                slug.push(lower);
            }
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
