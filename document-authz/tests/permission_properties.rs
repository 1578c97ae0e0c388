//! For-all properties of the permission model, driven by proptest

use document_authz::repository::InMemoryTupleStore;
use document_authz::*;
use proptest::prelude::*;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn facade() -> PermissionFacade {
    PermissionFacade::new(Arc::new(AuthorizationEngine::new(Arc::new(
        InMemoryTupleStore::new(),
    ))))
}

fn arb_id() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,12}"
}

fn arb_relation() -> impl Strategy<Value = Relation> {
    prop::sample::select(Relation::ALL.to_vec())
}

fn arb_shareable() -> impl Strategy<Value = PermissionKind> {
    prop::sample::select(vec![PermissionKind::Read, PermissionKind::Write])
}

proptest! {
    /// Ownership alone satisfies owner, reader, writer and can_share
    #[test]
    fn owner_holds_every_relation(user in arb_id(), doc in arb_id()) {
        let facade = facade();
        let subject = Subject::user(&user);
        let object = ObjectRef::document(&doc);

        let checks = runtime().block_on(async {
            facade.grant_ownership(&subject, &object).await.unwrap();
            let mut checks = Vec::new();
            for relation in Relation::ALL {
                checks.push(facade.engine().check(&subject, &object, relation).await.unwrap());
            }
            checks
        });

        prop_assert!(checks.into_iter().all(|allowed| allowed));
    }

    /// Nothing is allowed before any tuple exists
    #[test]
    fn empty_store_denies(user in arb_id(), doc in arb_id(), relation in arb_relation()) {
        let facade = facade();
        let allowed = runtime().block_on(
            facade.engine().check(&Subject::user(&user), &ObjectRef::document(&doc), relation),
        ).unwrap();

        prop_assert!(!allowed);
    }

    /// Granting ownership twice stores the same tuple set as granting it once
    #[test]
    fn grant_ownership_is_idempotent(user in arb_id(), doc in arb_id()) {
        let facade = facade();
        let subject = Subject::user(&user);
        let object = ObjectRef::document(&doc);

        let (once, twice) = runtime().block_on(async {
            facade.grant_ownership(&subject, &object).await.unwrap();
            let once = facade.engine().read_tuples(&TupleFilter::default()).await.unwrap();
            facade.grant_ownership(&subject, &object).await.unwrap();
            let twice = facade.engine().read_tuples(&TupleFilter::default()).await.unwrap();
            (once, twice)
        });

        prop_assert_eq!(once.len(), 1);
        prop_assert_eq!(once, twice);
    }

    /// Share followed by revoke leaves a non-owner without the relation
    #[test]
    fn share_then_revoke_denies(
        owner in arb_id(),
        user in arb_id(),
        doc in arb_id(),
        kind in arb_shareable(),
    ) {
        prop_assume!(owner != user);
        let facade = facade();
        let owner = Subject::user(&owner);
        let subject = Subject::user(&user);
        let object = ObjectRef::document(&doc);

        let (granted, revoked) = runtime().block_on(async {
            facade.grant_ownership(&owner, &object).await.unwrap();
            facade.share_with(&subject, &object, kind).await.unwrap();
            let granted = facade.check_permission(&subject, &object, kind).await.is_allowed();
            facade.revoke(&subject, &object, kind).await.unwrap();
            let revoked = facade.check_permission(&subject, &object, kind).await.is_allowed();
            (granted, revoked)
        });

        prop_assert!(granted);
        prop_assert!(!revoked);
    }

    /// After RevokeAll no subject holds any relation on the object
    #[test]
    fn revoke_all_clears_object(
        grants in prop::collection::vec((arb_id(), arb_relation()), 1..16),
        doc in arb_id(),
        outsider in arb_id(),
    ) {
        let facade = facade();
        let object = ObjectRef::document(&doc);

        let (remaining, allowed) = runtime().block_on(async {
            let tuples = grants
                .iter()
                .map(|(user, relation)| Tuple::new(Subject::user(user), *relation, object.clone()))
                .collect();
            facade.engine().write_tuples(tuples).await.unwrap();
            facade.revoke_all(&object).await.unwrap();

            let remaining = facade
                .engine()
                .read_tuples(&TupleFilter::object(&object))
                .await
                .unwrap();
            let mut allowed = false;
            for user in grants.iter().map(|(user, _)| user).chain(std::iter::once(&outsider)) {
                for relation in Relation::ALL {
                    allowed |= facade
                        .engine()
                        .check(&Subject::user(user), &object, relation)
                        .await
                        .unwrap();
                }
            }
            (remaining, allowed)
        });

        prop_assert!(remaining.is_empty());
        prop_assert!(!allowed);
    }
}
