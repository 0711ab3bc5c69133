#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::error::FolderError;
    use crate::model::ContentType;
    use crate::storage::{FolderKind, FolderStorage, MemoryFolderStorage, StoragePriority, StorageRegistry, ALL_TREES};

    fn storage(id: &str, kind: FolderKind) -> Arc<dyn FolderStorage> {
        Arc::new(MemoryFolderStorage::new(id, kind))
    }

    #[test]
    fn test_resolve_by_folder_id() {
        let registry = StorageRegistry::new();
        assert!(registry.register("0", storage("db", FolderKind::Database)).unwrap());
        assert!(registry
            .register("0", storage("mail", FolderKind::mail_account("default")))
            .unwrap());

        assert_eq!(registry.resolve("0", "10").unwrap().id(), "db");
        assert_eq!(registry.resolve("0", "default1/INBOX").unwrap().id(), "mail");
        assert!(registry.resolve("0", "unknown").is_none());
        assert!(registry.resolve("5", "10").is_none());

        let err = registry.storage_for("0", "unknown").err().unwrap();
        assert!(matches!(err, FolderError::NoBackendForId { .. }));
    }

    #[test]
    fn test_wildcard_storage_wins_for_its_tree() {
        let registry = StorageRegistry::new();
        registry.register("1", storage("db-virtual", FolderKind::Database)).unwrap();
        registry
            .register(ALL_TREES, storage("virtual", FolderKind::Tree { tree_id: "1".to_string() }))
            .unwrap();

        assert_eq!(registry.resolve("1", "10").unwrap().id(), "virtual");
        assert!(registry.resolve("0", "10").is_none());

        let all = registry.resolve_all_for_tree("1");
        let ids: Vec<&str> = all.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["virtual", "db-virtual"]);
    }

    #[test]
    fn test_highest_priority_and_duplicates_are_skipped() {
        let registry = StorageRegistry::new();
        let top: Arc<dyn FolderStorage> =
            Arc::new(MemoryFolderStorage::new("top", FolderKind::Database).with_priority(StoragePriority::Highest));
        assert!(!registry.register("0", top).unwrap());

        assert!(registry.register("0", storage("db", FolderKind::Database)).unwrap());
        assert!(!registry.register("0", storage("db", FolderKind::Database)).unwrap());
    }

    #[test]
    fn test_priority_orders_resolution() {
        let registry = StorageRegistry::new();
        registry.register("0", storage("low", FolderKind::Database)).unwrap();
        let high: Arc<dyn FolderStorage> =
            Arc::new(MemoryFolderStorage::new("high", FolderKind::Database).with_priority(StoragePriority::High));
        registry.register("0", high).unwrap();

        assert_eq!(registry.resolve("0", "10").unwrap().id(), "high");
    }

    #[test]
    fn test_duplicate_content_type_leaves_registry_untouched() {
        let registry = StorageRegistry::new();
        let mail: Arc<dyn FolderStorage> = Arc::new(
            MemoryFolderStorage::new("mail", FolderKind::mail_account("default"))
                .with_content_types(vec![ContentType::mail()]),
        );
        let other: Arc<dyn FolderStorage> = Arc::new(
            MemoryFolderStorage::new("other-mail", FolderKind::mail_account("imap"))
                .with_content_types(vec![ContentType::new("tasks"), ContentType::mail()]),
        );

        registry.register("0", mail).unwrap();
        let err = registry.register("0", other).unwrap_err();
        assert!(matches!(err, FolderError::DuplicateContentType { .. }));

        assert_eq!(
            registry.storage_for_content_type("0", &ContentType::mail()).unwrap().id(),
            "mail"
        );
        assert!(registry.resolve("0", "imap1").is_none());
        assert!(registry
            .resolve_by_content_type("0", &ContentType::new("tasks"))
            .is_none());
    }

    #[test]
    fn test_content_type_falls_back_to_general_storage() {
        let registry = StorageRegistry::new();
        registry.register("0", storage("db", FolderKind::Database)).unwrap();

        let resolved = registry
            .resolve_by_content_type("0", &ContentType::new("calendar"))
            .unwrap();
        assert_eq!(resolved.id(), "db");

        let err = registry
            .storage_for_content_type("9", &ContentType::mail())
            .err()
            .unwrap();
        assert!(matches!(err, FolderError::NoBackendForContentType { .. }));
    }

    #[test]
    fn test_resolve_all_for_parent_includes_mail_below_private() {
        let registry = StorageRegistry::new();
        registry.register("0", storage("db", FolderKind::Database)).unwrap();
        registry
            .register("0", storage("mail", FolderKind::mail_account("default")))
            .unwrap();

        let ids: Vec<String> = registry
            .resolve_all_for_parent("0", "1")
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        assert_eq!(ids, vec!["db", "mail"]);

        let ids: Vec<String> = registry
            .resolve_all_for_parent("0", "10")
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        assert_eq!(ids, vec!["db"]);
    }

    #[test]
    fn test_unregister() {
        let registry = StorageRegistry::new();
        let mail: Arc<dyn FolderStorage> = Arc::new(
            MemoryFolderStorage::new("mail", FolderKind::mail_account("default"))
                .with_content_types(vec![ContentType::mail()]),
        );
        registry.register("0", mail).unwrap();

        assert!(registry.unregister("0", "mail"));
        assert!(!registry.unregister("0", "mail"));
        assert!(registry.resolve("0", "default1").is_none());
        assert!(registry.resolve_by_content_type("0", &ContentType::mail()).is_none());
    }
}
