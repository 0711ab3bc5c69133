// Scenario test harness.
//
// Real tree "0" is served by a database-like storage (numeric ids) and a
// mail storage (prefixed account ids); virtual tree "1" by a wildcard
// storage mirroring part of the real tree.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::recording::RecordingStorage;
use crate::cache::InMemoryGroupCache;
use crate::config::{self, Config, ConfigTrait};
use crate::executor::BoundedExecutor;
use crate::folder::CacheFolderStorage;
use crate::model::{ContentType, Folder, FolderType, Owner, Session, StorageType, PRIVATE_FOLDER_ID};
use crate::storage::{FolderKind, MemoryFolderStorage, StorageParameters, StorageRegistry, ALL_TREES};

pub const REAL: &str = "0";
pub const VIRTUAL: &str = "1";

pub struct Harness {
    pub cfg: Config,
    pub registry: Arc<StorageRegistry>,
    pub db: Arc<RecordingStorage>,
    pub mail: Arc<RecordingStorage>,
    pub virtual_tree: Arc<RecordingStorage>,
    pub executor: Arc<BoundedExecutor>,
    pub cache: Arc<CacheFolderStorage>,
    pub session: Session,
}

impl Harness {
    /// Harness without background warm-up.
    pub fn new() -> Self {
        let mut cfg = config::new_test_config();
        cfg.folders.warmup = None;
        Self::with_config(cfg)
    }

    /// Harness with the test config's account warm-up enabled.
    pub fn with_warmup() -> Self {
        Self::with_config(config::new_test_config())
    }

    pub fn with_config(cfg: Config) -> Self {
        let owner = Session::with_id("harness", 3, 1);

        let db = MemoryFolderStorage::new("db", FolderKind::Database).with_spanning_listing(PRIVATE_FOLDER_ID);
        db.insert(Folder::new("0", REAL).with_name("root"));
        db.insert(Folder::new("1", REAL).with_parent("0").with_name("private"));
        db.insert(Folder::new("5", REAL).with_parent("1").with_name("Projects"));
        db.insert(Folder::new("7", REAL).with_parent("1").with_name("Archive"));
        db.insert(Folder::new("10", REAL).with_parent("5").with_name("Report"));
        db.insert(Folder::new("11", REAL).with_parent("10").with_name("Q1"));
        db.insert(Folder::new("12", REAL).with_parent("10").with_name("Q2"));
        db.insert(Folder::new("13", REAL).with_parent("11").with_name("Drafts"));
        db.insert(
            Folder::new("20", REAL)
                .with_parent("1")
                .with_name("Personal")
                .with_folder_type(FolderType::Private)
                .with_owner(owner.owner())
                .user_scoped(),
        );
        db.insert(
            Folder::new("30", REAL)
                .with_parent("1")
                .with_name("Live")
                .uncacheable(),
        );

        let mail = MemoryFolderStorage::new("mail", FolderKind::mail_account("default"))
            .with_content_types(vec![ContentType::mail()]);
        for account in ["1", "2"] {
            let root = format!("default{}", account);
            mail.insert(
                Folder::new(root.as_str(), REAL)
                    .with_parent(PRIVATE_FOLDER_ID)
                    .with_name(format!("Account {}", account))
                    .with_content_type(ContentType::mail()),
            );
            for name in ["INBOX", "Sent"] {
                mail.insert(
                    Folder::new(format!("{}/{}", root, name), REAL)
                        .with_parent(root.as_str())
                        .with_name(name)
                        .with_content_type(ContentType::mail())
                        .with_folder_type(FolderType::Private)
                        .with_owner(Owner::new(3, 1)),
                );
            }
        }

        let virtual_tree = MemoryFolderStorage::new(
            "virtual",
            FolderKind::Tree {
                tree_id: VIRTUAL.to_string(),
            },
        );
        virtual_tree.insert(Folder::new("0", VIRTUAL).with_name("root"));
        virtual_tree.insert(Folder::new("1", VIRTUAL).with_parent("0").with_name("private"));
        virtual_tree.insert(Folder::new("5", VIRTUAL).with_parent("1").with_name("Projects"));
        virtual_tree.insert(Folder::new("10", VIRTUAL).with_parent("5").with_name("Report"));
        virtual_tree.insert(Folder::new("11", VIRTUAL).with_parent("10").with_name("Q1"));

        let db = Arc::new(RecordingStorage::new(db));
        let mail = Arc::new(RecordingStorage::new(mail));
        let virtual_tree = Arc::new(RecordingStorage::new(virtual_tree));

        let registry = Arc::new(StorageRegistry::new());
        registry.register(REAL, db.clone()).unwrap();
        registry.register(REAL, mail.clone()).unwrap();
        registry.register(ALL_TREES, virtual_tree.clone()).unwrap();

        let executor = Arc::new(BoundedExecutor::from_config(&cfg).unwrap());
        let group = Arc::new(InMemoryGroupCache::new(cfg.group_capacity()));
        let cache = Arc::new(CacheFolderStorage::new(&cfg, registry.clone(), group, executor.clone()));

        Self {
            cfg,
            registry,
            db,
            mail,
            virtual_tree,
            executor,
            cache,
            session: owner,
        }
    }

    pub fn params(&self) -> StorageParameters {
        StorageParameters::new(self.session.clone())
    }

    pub fn params_for(&self, session: &Session) -> StorageParameters {
        StorageParameters::new(session.clone())
    }

    pub fn get(&self, tree_id: &str, folder_id: &str) -> Arc<Folder> {
        self.cache
            .get_folder(tree_id, folder_id, StorageType::Working, &mut self.params())
            .unwrap()
    }

    /// Whether the acting session would get a cache hit.
    pub fn cached(&self, tree_id: &str, folder_id: &str) -> bool {
        self.cache.tiers().contains(tree_id, folder_id, &self.session)
    }

    /// Group tier and session tier occupancy of a key.
    pub fn tiers_holding(&self, tree_id: &str, folder_id: &str) -> (bool, bool) {
        self.cache.tiers().tiers_holding(tree_id, folder_id, &self.session)
    }

    pub fn subfolder_ids(&self, tree_id: &str, parent_id: &str) -> Vec<String> {
        self.cache
            .get_subfolders(tree_id, parent_id, &mut self.params())
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.executor.shutdown();
    }
}

/// Polls `check` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}
