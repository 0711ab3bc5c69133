use super::{Cache, Config, Executor, Folders, FoldersBox, Lock, Logs, Trees, Warmup};
use std::time::Duration;

/// Creates a new test configuration.
pub fn new_test_config() -> Config {
    Folders {
        folders: FoldersBox {
            env: super::TEST.to_string(),
            logs: Some(Logs {
                level: Some("debug".to_string()),
            }),
            trees: Some(Trees {
                real: "0".to_string(),
            }),
            lock: Some(Lock {
                max_request_time: Some(Duration::from_secs(5)),
                timeout: None,
            }),
            executor: Some(Executor {
                workers: Some(4),
                queue: Some(64),
                await_timeout: Some(Duration::from_secs(5)),
            }),
            cache: Some(Cache {
                group_capacity: Some(10_000),
            }),
            warmup: Some(Warmup {
                enabled: true,
                accounts: vec!["1".to_string(), "2".to_string()],
                account_prefix: Some("default".to_string()),
            }),
        },
    }
}
