// Stress driver for the folder cache.
//
// Seeds in-memory storages, runs reader and writer threads against one
// CacheFolderStorage until the duration elapses or ctrl-c arrives, then
// reports cache statistics.

mod metrics_runtime;

use foldercache::cache::InMemoryGroupCache;
use foldercache::config::{Config, ConfigTrait};
use foldercache::executor::BoundedExecutor;
use foldercache::model::{ContentType, Folder, FolderType, Session, StorageType, PRIVATE_FOLDER_ID};
use foldercache::storage::{FolderKind, MemoryFolderStorage, StorageParameters, StorageRegistry};
use foldercache::{CacheFolderStorage, FolderError};

use anyhow::{Context, Result};
use clap::Parser;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "cfg/foldercache.cfg.yaml";
const CONTEXT_ID: i32 = 1;

/// foldercache - folder cache stress driver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, value_name = "FILE")]
    cfg: Option<PathBuf>,

    /// Reader threads
    #[arg(long, default_value_t = 4)]
    readers: usize,

    /// Writer threads
    #[arg(long, default_value_t = 1)]
    writers: usize,

    /// How long to run, e.g. "30s" or "2m"
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    duration: Duration,

    /// Number of seeded database folders
    #[arg(long, default_value_t = 200)]
    folders: usize,

    /// Print the Prometheus metrics text on exit
    #[arg(long)]
    metrics: bool,
}

/// Config given by `--cfg`, else the bundled default.
fn load_cfg(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config from {}", path.display()))
}

/// Compact output for local runs, JSON in prod. `RUST_LOG` overrides the
/// configured level.
fn configure_logger(cfg: &Config) {
    let level = cfg
        .logs()
        .and_then(|logs| logs.level.clone())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true);
    if cfg.is_prod() {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

/// Operation outcomes shared by all driver threads.
#[derive(Default)]
struct Tally {
    reads: AtomicU64,
    writes: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

impl Tally {
    fn record(&self, op: &'static str, result: Result<(), FolderError>, counter: &AtomicU64) {
        match result {
            Ok(()) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_retryable() => {
                self.retries.fetch_add(1, Ordering::Relaxed);
                debug!(component = "stress", event = "retryable", op, error = %e, "operation timed out");
            }
            // Writers race each other on the same folders.
            Err(e) if e.is_not_found() || matches!(e, FolderError::InvalidFolder(_)) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(component = "stress", event = "op_failed", op, error = %e, "operation failed");
            }
        }
    }
}

/// Builds the database and mail storages of the real tree and seeds them.
fn seed_registry(cfg: &Config, folders: usize) -> Result<(Arc<StorageRegistry>, Vec<String>)> {
    let real = cfg.real_tree_id();
    let db = MemoryFolderStorage::new("db", FolderKind::Database).with_spanning_listing(PRIVATE_FOLDER_ID);
    db.insert(Folder::new("0", real).with_name("root"));
    db.insert(Folder::new(PRIVATE_FOLDER_ID, real).with_parent("0").with_name("private"));

    let mut rng = rand::thread_rng();
    let mut ids: Vec<String> = Vec::with_capacity(folders);
    for n in 0..folders {
        let id = (100 + n).to_string();
        let parent = if ids.len() < 8 {
            PRIVATE_FOLDER_ID.to_string()
        } else {
            ids[rng.gen_range(0..ids.len())].clone()
        };
        let mut folder = Folder::new(id.as_str(), real)
            .with_parent(parent)
            .with_name(format!("folder-{}", n));
        if n % 10 == 0 {
            folder = folder
                .with_folder_type(FolderType::Private)
                .with_owner(Session::new(1 + (n % 3) as i32, CONTEXT_ID).owner())
                .user_scoped();
        }
        db.insert(folder);
        ids.push(id);
    }

    let (prefix, accounts) = match cfg.warmup() {
        Some(warmup) => (warmup.account_prefix().to_string(), warmup.accounts.clone()),
        None => ("default".to_string(), vec!["1".to_string()]),
    };
    let mail = MemoryFolderStorage::new("mail", FolderKind::mail_account(prefix.as_str()))
        .with_content_types(vec![ContentType::mail()]);
    for account in &accounts {
        let root = format!("{}{}", prefix, account);
        mail.insert(
            Folder::new(root.as_str(), real)
                .with_parent(PRIVATE_FOLDER_ID)
                .with_name(format!("Account {}", account))
                .with_content_type(ContentType::mail()),
        );
        for name in ["INBOX", "Sent", "Trash"] {
            let id = format!("{}/{}", root, name);
            mail.insert(
                Folder::new(id.as_str(), real)
                    .with_parent(root.as_str())
                    .with_name(name)
                    .with_content_type(ContentType::mail()),
            );
            ids.push(id);
        }
    }

    let registry = Arc::new(StorageRegistry::new());
    registry
        .register(real, Arc::new(db))
        .context("register database storage")?;
    registry
        .register(real, Arc::new(mail))
        .context("register mail storage")?;
    info!(
        component = "stress",
        event = "seeded",
        folders = ids.len(),
        accounts = accounts.len(),
        "storages seeded"
    );
    Ok((registry, ids))
}

fn spawn_reader(
    n: usize,
    cache: Arc<CacheFolderStorage>,
    ids: Arc<Vec<String>>,
    tally: Arc<Tally>,
    token: CancellationToken,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(format!("reader-{}", n))
        .spawn(move || {
            let mut rng = rand::thread_rng();
            let tree = cache.real_tree_id().to_string();
            while !token.is_cancelled() {
                let session = Session::new(rng.gen_range(1..=3), CONTEXT_ID);
                let mut params = StorageParameters::new(session);
                let Some(id) = ids.choose(&mut rng) else {
                    return;
                };
                let result = if rng.gen_bool(0.2) {
                    cache.get_subfolders(&tree, id, &mut params).map(|_| ())
                } else {
                    cache
                        .get_folder(&tree, id, StorageType::Working, &mut params)
                        .map(|_| ())
                };
                tally.record("read", result, &tally.reads);
            }
        })
        .context("spawn reader thread")?;
    Ok(handle)
}

fn spawn_writer(
    n: usize,
    cache: Arc<CacheFolderStorage>,
    ids: Arc<Vec<String>>,
    tally: Arc<Tally>,
    token: CancellationToken,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(format!("writer-{}", n))
        .spawn(move || {
            let mut rng = rand::thread_rng();
            let tree = cache.real_tree_id().to_string();
            let mut created: Vec<String> = Vec::new();
            let mut round = 0u64;
            while !token.is_cancelled() {
                round += 1;
                let mut params = StorageParameters::new(Session::new(1, CONTEXT_ID));
                let Some(target) = ids.choose(&mut rng) else {
                    return;
                };
                let result = match rng.gen_range(0..3) {
                    0 => cache
                        .get_folder(&tree, target, StorageType::Working, &mut params)
                        .and_then(|folder| {
                            let renamed = Folder::clone(&folder).with_name(format!("w{}-{}", n, round));
                            cache.update_folder(&renamed, &mut params)
                        }),
                    1 => {
                        let draft = Folder::new("", tree.as_str())
                            .with_parent(target.as_str())
                            .with_name(format!("new-{}-{}", n, round));
                        cache.create_folder(&draft, &mut params).map(|id| created.push(id))
                    }
                    _ => match created.pop() {
                        Some(id) => cache.delete_folder(&tree, &id, &mut params),
                        None => Ok(()),
                    },
                };
                tally.record("write", result, &tally.writes);
            }
        })
        .context("spawn writer thread")?;
    Ok(handle)
}

fn main() -> Result<()> {
    let args = Args::parse();

    // The recorder must be installed before any counter is touched.
    if let Err(e) = metrics_runtime::init_metrics() {
        eprintln!("Warning: {}", e);
    }

    tokio::runtime::Runtime::new()
        .context("failed to create tokio runtime")?
        .block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    let cfg_path = args.cfg.clone().unwrap_or_else(|| PathBuf::from(CONFIG_PATH));
    let cfg = load_cfg(&cfg_path)?;
    configure_logger(&cfg);
    info!(component = "config", event = "loaded", path = %cfg_path.display(), "config loaded");

    let (registry, ids) = seed_registry(&cfg, args.folders)?;
    let executor = Arc::new(BoundedExecutor::from_config(&cfg).context("start storage executor")?);
    let group = Arc::new(InMemoryGroupCache::new(cfg.group_capacity()));
    let cache = Arc::new(CacheFolderStorage::new(&cfg, registry, group, executor.clone()));
    info!(
        component = "main",
        event = "started",
        workers = executor.workers(),
        lock_timeout = ?cfg.lock_timeout(),
        readers = args.readers,
        writers = args.writers,
        "folder cache started"
    );

    let mut admin = StorageParameters::new(Session::new(1, CONTEXT_ID));
    cache
        .check_consistency(cache.real_tree_id(), &mut admin)
        .context("initial consistency check")?;

    let token = CancellationToken::new();
    let tally = Arc::new(Tally::default());
    let ids = Arc::new(ids);
    let mut handles = Vec::with_capacity(args.readers + args.writers);
    for n in 0..args.readers {
        handles.push(spawn_reader(n, cache.clone(), ids.clone(), tally.clone(), token.clone())?);
    }
    for n in 0..args.writers {
        handles.push(spawn_writer(n, cache.clone(), ids.clone(), tally.clone(), token.clone())?);
    }

    tokio::select! {
        _ = tokio::time::sleep(args.duration) => {
            info!(component = "main", event = "duration_elapsed", "stress run finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!(component = "main", event = "interrupted", "stress run interrupted");
        }
    }
    token.cancel();

    tokio::task::spawn_blocking(move || {
        for handle in handles {
            if handle.join().is_err() {
                warn!(component = "main", event = "thread_panicked", "driver thread panicked");
            }
        }
    })
    .await
    .context("join driver threads")?;

    cache
        .check_consistency(cache.real_tree_id(), &mut admin)
        .context("final consistency check")?;

    let stats = cache.stats();
    info!(
        component = "main",
        event = "summary",
        reads = tally.reads.load(Ordering::Relaxed),
        writes = tally.writes.load(Ordering::Relaxed),
        retries = tally.retries.load(Ordering::Relaxed),
        failures = tally.failures.load(Ordering::Relaxed),
        hits = stats.hits,
        misses = stats.misses,
        evictions = stats.evictions,
        hit_rate = stats.hit_rate(),
        "stress summary"
    );
    executor.shutdown();

    if args.metrics {
        if let Some(text) = metrics_runtime::scrape_prometheus_text() {
            println!("{}", text);
        }
    }
    Ok(())
}
