//! File-backed derivation cache.
//!
//! One JSON object per partition, `{"44'/5'/0'/0/0": "X…", …}`, stored as
//! `bip32cache_<partition root>.json`.  A partition is read from disk the
//! first time it is referenced in a run; a missing or unreadable file is
//! treated as empty.  Writes stay in memory until [`PathCache::flush`].
//!
//! Cache I/O never fails the caller: errors are logged at `debug` and
//! otherwise ignored, since every entry can be derived again.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use mnode_core::Bip32Path;
use tracing::debug;

use crate::application::resolve_paths::PathCache;

type Partition = BTreeMap<String, String>;

pub struct FileAddressCache {
    dir: PathBuf,
    partitions: HashMap<String, Partition>,
}

impl FileAddressCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            partitions: HashMap::new(),
        }
    }

    fn file_for(&self, root: &str) -> PathBuf {
        self.dir.join(format!("bip32cache_{root}.json"))
    }

    fn partition(&mut self, root: &str) -> &mut Partition {
        if !self.partitions.contains_key(root) {
            let loaded = self.load(root);
            self.partitions.insert(root.to_string(), loaded);
        }
        self.partitions.entry(root.to_string()).or_default()
    }

    fn load(&self, root: &str) -> Partition {
        let path = self.file_for(root);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no address cache loaded");
                return Partition::new();
            }
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            debug!(path = %path.display(), error = %e, "address cache unreadable, starting empty");
            Partition::new()
        })
    }
}

impl PathCache for FileAddressCache {
    fn get(&mut self, partition_root: &str, path: &Bip32Path) -> Option<String> {
        self.partition(partition_root).get(&path.to_string()).cloned()
    }

    fn put(&mut self, partition_root: &str, path: &Bip32Path, address: &str) {
        self.partition(partition_root)
            .insert(path.to_string(), address.to_string());
    }

    fn flush(&mut self, partition_root: &str) {
        let Some(map) = self.partitions.get(partition_root) else {
            return;
        };
        let path = self.file_for(partition_root);
        let result = serde_json::to_string_pretty(map)
            .map_err(std::io::Error::other)
            .and_then(|json| {
                std::fs::create_dir_all(&self.dir)?;
                std::fs::write(&path, json)
            });
        match result {
            Ok(()) => debug!(path = %path.display(), entries = map.len(), "address cache written"),
            Err(e) => debug!(path = %path.display(), error = %e, "address cache not written"),
        }
    }
}
