mod common;

use common::*;
use studyabroad::authz::{self, AuthzError, Principal};
use studyabroad::reviews::{self, ReviewInput};
use studyabroad::toggles::{self, Relation, ToggleError};

#[test]
fn favorite_twice_returns_the_set_to_empty() {
    let (_tmp, pool) = test_db();
    let alice = seed_user(&pool, "alice");
    let school = seed_school(&pool, "Foo College", &alice);

    // A favorites X: likes = [A]
    assert!(toggles::toggle(&pool, Relation::Favorite, &alice, &school).unwrap());
    assert_eq!(
        toggles::members_of(&pool, Relation::Favorite, &school).unwrap(),
        vec![alice.clone()]
    );

    // A favorites again: likes = []
    assert!(!toggles::toggle(&pool, Relation::Favorite, &alice, &school).unwrap());
    assert!(toggles::members_of(&pool, Relation::Favorite, &school)
        .unwrap()
        .is_empty());
}

#[test]
fn self_follow_never_lands_in_the_followed_set() {
    let (_tmp, pool) = test_db();
    let alice = seed_user(&pool, "alice");

    for _ in 0..3 {
        assert!(matches!(
            toggles::toggle(&pool, Relation::Follow, &alice, &alice),
            Err(ToggleError::SelfReference)
        ));
    }
    assert!(toggles::members_of(&pool, Relation::Follow, &alice)
        .unwrap()
        .is_empty());
}

#[test]
fn non_owner_mutations_are_denied_and_apply_nothing() {
    let (_tmp, pool) = test_db();
    let owner = seed_user(&pool, "owner");
    let intruder = seed_user(&pool, "intruder");
    let school = seed_school(&pool, "Foo College", &owner);

    let review = reviews::create(
        &pool,
        &owner,
        &school,
        &ReviewInput {
            title: "Mine".to_string(),
            degree: "Other".to_string(),
            rating: 4,
            description: None,
        },
    )
    .unwrap();

    let intruder_principal = Principal { id: &intruder, is_admin: false };

    assert!(matches!(
        authz::authorize_school(&pool, "foo-college", intruder_principal),
        Err(AuthzError::Denied)
    ));
    assert!(matches!(
        authz::authorize_review(&pool, &review.id, intruder_principal),
        Err(AuthzError::Denied)
    ));
    assert!(matches!(
        authz::authorize_profile(&pool, "owner", intruder_principal),
        Err(AuthzError::Denied)
    ));

    // nothing was mutated along the way
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM reviews WHERE id = ?1", &review.id),
        1
    );
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM schools WHERE id = ?1", &school),
        1
    );
}

#[test]
fn admin_passes_every_guard() {
    let (_tmp, pool) = test_db();
    let owner = seed_user(&pool, "owner");
    let admin = seed_admin(&pool, "admin");
    seed_school(&pool, "Foo College", &owner);

    let admin_principal = Principal { id: &admin, is_admin: true };
    assert!(authz::authorize_school(&pool, "foo-college", admin_principal).is_ok());
    assert!(authz::authorize_profile(&pool, "owner", admin_principal).is_ok());
}

#[test]
fn guards_distinguish_missing_resources_from_denied_ones() {
    let (_tmp, pool) = test_db();
    let user = seed_user(&pool, "alice");

    let principal = Principal { id: &user, is_admin: false };
    assert!(matches!(
        authz::authorize_school(&pool, "ghost-school", principal),
        Err(AuthzError::NotFound)
    ));
    assert!(matches!(
        authz::authorize_review(&pool, "no-such-id", principal),
        Err(AuthzError::NotFound)
    ));
    assert!(matches!(
        authz::authorize_profile(&pool, "ghost-user", principal),
        Err(AuthzError::NotFound)
    ));
}
