//! Owner-or-admin authorization for mutating actions.
//!
//! The guard resolves the target resource from its routing key and fails
//! closed: a principal may mutate a school, review, or profile only when
//! they own it or carry the admin flag. Denied and not-found are distinct
//! outcomes; callers turn Denied into a flash + redirect, NotFound into 404.

use crate::db::models::{Review, School, User};
use crate::error::AppError;
use crate::extractors::CurrentUser;
use crate::state::DbPool;

#[derive(Debug, Clone, Copy)]
pub struct Principal<'a> {
    pub id: &'a str,
    pub is_admin: bool,
}

impl<'a> From<&'a CurrentUser> for Principal<'a> {
    fn from(user: &'a CurrentUser) -> Self {
        Principal {
            id: &user.id,
            is_admin: user.is_admin,
        }
    }
}

/// Routing key for the resource being mutated.
#[derive(Debug, Clone, Copy)]
pub enum ResourceRef<'a> {
    School { slug: &'a str },
    Review { id: &'a str },
    Profile { slug: &'a str },
}

/// The resolved resource, returned on success so callers need not re-fetch.
#[derive(Debug, Clone)]
pub enum Resource {
    School(School),
    Review(Review),
    Profile(User),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("resource not found")]
    NotFound,
    #[error("You are not authorized to do that")]
    Denied,
    #[error(transparent)]
    App(#[from] AppError),
}

impl From<rusqlite::Error> for AuthzError {
    fn from(e: rusqlite::Error) -> Self {
        AuthzError::App(e.into())
    }
}

impl From<r2d2::Error> for AuthzError {
    fn from(e: r2d2::Error) -> Self {
        AuthzError::App(e.into())
    }
}

pub fn authorize(
    pool: &DbPool,
    resource: ResourceRef<'_>,
    principal: Principal<'_>,
) -> Result<Resource, AuthzError> {
    let conn = pool.get().map_err(AppError::from)?;

    let (owner_id, resource) = match resource {
        ResourceRef::School { slug } => {
            let school = School::by_slug(&conn, slug)?.ok_or(AuthzError::NotFound)?;
            (school.user_id.clone(), Resource::School(school))
        }
        ResourceRef::Review { id } => {
            let review = Review::by_id(&conn, id)?.ok_or(AuthzError::NotFound)?;
            (review.user_id.clone(), Resource::Review(review))
        }
        ResourceRef::Profile { slug } => {
            let user = User::by_slug(&conn, slug)?.ok_or(AuthzError::NotFound)?;
            (user.id.clone(), Resource::Profile(user))
        }
    };

    if owner_id == principal.id || principal.is_admin {
        Ok(resource)
    } else {
        Err(AuthzError::Denied)
    }
}

/// Typed wrapper: resolve and authorize a school by slug.
pub fn authorize_school(
    pool: &DbPool,
    slug: &str,
    principal: Principal<'_>,
) -> Result<School, AuthzError> {
    match authorize(pool, ResourceRef::School { slug }, principal)? {
        Resource::School(school) => Ok(school),
        _ => Err(AppError::Internal("authorize returned wrong resource kind".into()).into()),
    }
}

/// Typed wrapper: resolve and authorize a review by id.
pub fn authorize_review(
    pool: &DbPool,
    id: &str,
    principal: Principal<'_>,
) -> Result<Review, AuthzError> {
    match authorize(pool, ResourceRef::Review { id }, principal)? {
        Resource::Review(review) => Ok(review),
        _ => Err(AppError::Internal("authorize returned wrong resource kind".into()).into()),
    }
}

/// Typed wrapper: resolve and authorize a user profile by slug.
pub fn authorize_profile(
    pool: &DbPool,
    slug: &str,
    principal: Principal<'_>,
) -> Result<User, AuthzError> {
    match authorize(pool, ResourceRef::Profile { slug }, principal)? {
        Resource::Profile(user) => Ok(user),
        _ => Err(AppError::Internal("authorize returned wrong resource kind".into()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::state::DbPool;
    use crate::testutil::{insert_admin, insert_review, insert_school, insert_user};

    fn setup() -> (DbPool, String, String, String) {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let owner = insert_user(&pool, "owner");
        let other = insert_user(&pool, "other");
        let admin = insert_admin(&pool, "admin");
        (pool, owner, other, admin)
    }

    #[test]
    fn owner_may_mutate_their_school() {
        let (pool, owner, _, _) = setup();
        insert_school(&pool, "Foo College", &owner);

        let result = authorize(
            &pool,
            ResourceRef::School { slug: "foo-college" },
            Principal { id: &owner, is_admin: false },
        );
        assert!(matches!(result, Ok(Resource::School(_))));
    }

    #[test]
    fn non_owner_is_denied() {
        let (pool, owner, other, _) = setup();
        insert_school(&pool, "Foo College", &owner);

        let result = authorize(
            &pool,
            ResourceRef::School { slug: "foo-college" },
            Principal { id: &other, is_admin: false },
        );
        assert!(matches!(result, Err(AuthzError::Denied)));
    }

    #[test]
    fn admin_may_mutate_anything() {
        let (pool, owner, _, admin) = setup();
        let school = insert_school(&pool, "Foo College", &owner);
        let review = insert_review(&pool, &school, &owner, 4);

        let result = authorize(
            &pool,
            ResourceRef::Review { id: &review },
            Principal { id: &admin, is_admin: true },
        );
        assert!(matches!(result, Ok(Resource::Review(_))));
    }

    #[test]
    fn review_author_passes_non_author_fails() {
        let (pool, owner, other, _) = setup();
        let school = insert_school(&pool, "Foo College", &owner);
        let review = insert_review(&pool, &school, &other, 5);

        assert!(matches!(
            authorize(
                &pool,
                ResourceRef::Review { id: &review },
                Principal { id: &other, is_admin: false },
            ),
            Ok(Resource::Review(_))
        ));
        assert!(matches!(
            authorize(
                &pool,
                ResourceRef::Review { id: &review },
                Principal { id: &owner, is_admin: false },
            ),
            Err(AuthzError::Denied)
        ));
    }

    #[test]
    fn profile_is_owned_by_its_own_identity() {
        let (pool, owner, other, _) = setup();

        assert!(matches!(
            authorize(
                &pool,
                ResourceRef::Profile { slug: "owner" },
                Principal { id: &owner, is_admin: false },
            ),
            Ok(Resource::Profile(_))
        ));
        assert!(matches!(
            authorize(
                &pool,
                ResourceRef::Profile { slug: "owner" },
                Principal { id: &other, is_admin: false },
            ),
            Err(AuthzError::Denied)
        ));
    }

    #[test]
    fn missing_resource_is_not_found_not_denied() {
        let (pool, owner, _, _) = setup();

        let result = authorize(
            &pool,
            ResourceRef::School { slug: "no-such-school" },
            Principal { id: &owner, is_admin: false },
        );
        assert!(matches!(result, Err(AuthzError::NotFound)));
    }
}
