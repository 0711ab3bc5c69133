// Scenario tests for moving and renaming folders.

use crate::error::FolderError;
use crate::model::Folder;
use crate::support::harness::REAL;
use crate::support::Harness;

/// Test that a move refreshes the folder and both parent listings.
#[test]
fn test_move_refreshes_both_parents() {
    let h = Harness::new();
    for id in ["5", "7", "10"] {
        h.get(REAL, id);
    }

    let moved = Folder::clone(&h.get(REAL, "10")).with_parent("7");
    h.cache.update_folder(&moved, &mut h.params()).unwrap();

    assert_eq!(h.get(REAL, "10").parent_id.as_deref(), Some("7"));
    assert_eq!(h.get(REAL, "5").subfolder_ids, Some(vec![]));
    assert_eq!(h.get(REAL, "7").subfolder_ids, Some(vec!["10".to_string()]));
    assert_eq!(h.subfolder_ids(REAL, "7"), vec!["10"]);
    assert!(h.subfolder_ids(REAL, "5").is_empty());
}

#[test]
fn test_move_keeps_subtree_reachable() {
    let h = Harness::new();
    h.get(REAL, "11");

    let moved = Folder::clone(&h.get(REAL, "10")).with_parent("7");
    h.cache.update_folder(&moved, &mut h.params()).unwrap();

    assert_eq!(h.get(REAL, "11").parent_id.as_deref(), Some("10"));
    assert_eq!(h.subfolder_ids(REAL, "10"), vec!["11", "12"]);
}

#[test]
fn test_move_below_own_subtree_fails() {
    let h = Harness::new();
    h.get(REAL, "10");
    let mut params = h.params();

    let cyclic = Folder::clone(&h.get(REAL, "10")).with_parent("11");
    let err = h.cache.update_folder(&cyclic, &mut params).unwrap_err();

    assert!(matches!(err, FolderError::InvalidFolder(_)));
    assert!(params.check_duplicates());
    assert_eq!(h.get(REAL, "10").parent_id.as_deref(), Some("5"));
}

/// Test that renames are not checked for sibling duplicates and the
/// caller's duplicate check setting survives the update.
#[test]
fn test_rename_skips_duplicate_check() {
    let h = Harness::new();
    let mut params = h.params();

    let renamed = Folder::clone(&h.get(REAL, "11")).with_name("Q2");
    h.cache.update_folder(&renamed, &mut params).unwrap();

    assert!(params.check_duplicates());
    assert_eq!(h.get(REAL, "11").name, "Q2");
    assert_eq!(h.get(REAL, "12").name, "Q2");
}
