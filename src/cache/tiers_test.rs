#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::cache::{CacheTiers, InMemoryGroupCache};
    use crate::model::{Folder, Owner, Session};

    fn tiers() -> CacheTiers {
        CacheTiers::new(Arc::new(InMemoryGroupCache::new(100)), "0")
    }

    #[test]
    fn test_global_flag_selects_tier() {
        let tiers = tiers();
        let session = Session::new(3, 1);

        tiers.put(Arc::new(Folder::new("10", "0")), "0", &session, false);
        assert_eq!(tiers.tiers_holding("0", "10", &session), (true, false));

        // Same key turning user scoped moves to the session tier.
        tiers.put(Arc::new(Folder::new("10", "0").user_scoped()), "0", &session, false);
        assert_eq!(tiers.tiers_holding("0", "10", &session), (false, true));

        tiers.put(Arc::new(Folder::new("10", "0")), "0", &session, false);
        assert_eq!(tiers.tiers_holding("0", "10", &session), (true, false));
    }

    #[test]
    fn test_uncacheable_is_never_stored() {
        let tiers = tiers();
        let session = Session::new(3, 1);
        tiers.put(Arc::new(Folder::new("10", "0").uncacheable()), "0", &session, false);
        assert!(!tiers.contains("0", "10", &session));
    }

    #[test]
    fn test_foreign_owner_is_a_miss() {
        let tiers = tiers();
        let session = Session::new(3, 1);
        let folder = Folder::new("10", "0").user_scoped().with_owner(Owner::new(7, 1));
        tiers.put(Arc::new(folder), "0", &session, false);

        assert!(tiers.get_ref("0", "10", &session).is_none());
        let stats = tiers.stats();
        assert_eq!((stats.hits, stats.misses), (0, 1));
    }

    #[test]
    fn test_put_under_other_tree_readdresses() {
        let tiers = tiers();
        let session = Session::new(3, 1);
        tiers.put(Arc::new(Folder::new("10", "1")), "0", &session, false);

        let mirrored = tiers.get_ref("0", "10", &session).unwrap();
        assert_eq!(mirrored.tree_id, "0");
        assert!(!tiers.contains("1", "10", &session));
    }

    #[test]
    fn test_cascade_evicts_parent_in_both_trees() {
        let tiers = tiers();
        let session = Session::new(3, 1);
        for tree in ["0", "1"] {
            tiers.put(Arc::new(Folder::new("5", tree)), tree, &session, false);
            tiers.put(Arc::new(Folder::new("10", tree).with_parent("5")), tree, &session, false);
        }

        let removed = tiers.evict("10", "1", &session, true);
        assert_eq!(removed, 4);
        for tree in ["0", "1"] {
            assert!(!tiers.contains(tree, "10", &session));
            assert!(!tiers.contains(tree, "5", &session));
        }
        assert_eq!(tiers.stats().evictions, 4);
    }

    #[test]
    fn test_evict_without_cascade_keeps_parent() {
        let tiers = tiers();
        let session = Session::new(3, 1);
        tiers.put(Arc::new(Folder::new("5", "0")), "0", &session, false);
        tiers.put(Arc::new(Folder::new("10", "0").with_parent("5")), "0", &session, false);

        assert_eq!(tiers.evict("10", "0", &session, false), 1);
        assert!(tiers.contains("0", "5", &session));
    }

    #[test]
    fn test_replace_with_new_parent_evicts_old_parent() {
        let tiers = tiers();
        let session = Session::new(3, 1);
        tiers.put(Arc::new(Folder::new("5", "0")), "0", &session, false);
        tiers.put(Arc::new(Folder::new("7", "0")), "0", &session, false);
        tiers.put(Arc::new(Folder::new("10", "0").with_parent("5")), "0", &session, false);

        tiers.put(Arc::new(Folder::new("10", "0").with_parent("7")), "0", &session, true);
        assert!(!tiers.contains("0", "5", &session));
        assert!(tiers.contains("0", "7", &session));
        assert_eq!(
            tiers.get_ref("0", "10", &session).unwrap().parent_id.as_deref(),
            Some("7")
        );
    }

    #[test]
    fn test_clear_user_and_context() {
        let tiers = tiers();
        let alice = Session::new(3, 1);
        let bob = Session::new(4, 1);
        tiers.put(Arc::new(Folder::new("10", "0")), "0", &alice, false);
        tiers.put(Arc::new(Folder::new("11", "0").user_scoped()), "0", &alice, false);
        tiers.put(Arc::new(Folder::new("12", "0").user_scoped()), "0", &bob, false);

        assert_eq!(tiers.clear_user(3, 1), 1);
        assert!(tiers.contains("0", "10", &bob));
        assert_eq!(tiers.clear_context(1), 2);
        assert!(!tiers.contains("0", "10", &bob));
        assert!(!tiers.contains("0", "12", &bob));
    }

    #[test]
    fn test_evict_reaches_other_users_but_evict_for_user_does_not() {
        let tiers = tiers();
        let alice = Session::new(3, 1);
        let bob = Session::new(4, 1);
        for session in [&alice, &bob] {
            tiers.put(Arc::new(Folder::new("10", "0").user_scoped()), "0", session, false);
            tiers.put(Arc::new(Folder::new("11", "0").user_scoped()), "0", session, false);
        }

        assert_eq!(tiers.evict_for_user("11", "0", &alice, false), 1);
        assert!(tiers.contains("0", "11", &bob));

        assert_eq!(tiers.evict("10", "0", &alice, false), 2);
        assert!(!tiers.contains("0", "10", &alice));
        assert!(!tiers.contains("0", "10", &bob));
    }
}
