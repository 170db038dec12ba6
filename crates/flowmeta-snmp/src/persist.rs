//! Cache snapshotting.
//!
//! The snapshot is a versioned bincode blob holding every entry with its
//! original timestamps (flattened to epoch milliseconds), so a restored
//! entry that already outlived its expiry is evicted by the first scan
//! after restart. Anything that does not decode as the expected magic and
//! version is reported as corrupted and the caller starts cold.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use flowmeta_core::{ExporterKey, Interface};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheEntry, InterfaceCache};
use crate::error::SnapshotError;

const SNAPSHOT_MAGIC: u64 = 0x464c_4f57_4d45_5441; // "FLOWMETA"
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    magic: u64,
    version: u32,
    entries: Vec<PersistedEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    exporter: [u8; 16],
    if_index: u32,
    exporter_name: String,
    interface_name: String,
    interface_description: String,
    interface_speed: u32,
    created_at_ms: i64,
    last_access_ms: i64,
    expires_at_ms: i64,
}

impl InterfaceCache {
    /// Serialize every entry. Returns the number of entries written.
    pub(crate) fn save<W: Write>(&self, writer: &mut W) -> Result<usize, SnapshotError> {
        let entries: Vec<PersistedEntry> = self
            .dump()
            .into_iter()
            .map(|((exporter, if_index), entry)| PersistedEntry {
                exporter: exporter.octets(),
                if_index,
                exporter_name: entry.exporter_name,
                interface_name: entry.interface.name,
                interface_description: entry.interface.description,
                interface_speed: entry.interface.speed,
                created_at_ms: entry.created_at.timestamp_millis(),
                last_access_ms: entry.last_access.timestamp_millis(),
                expires_at_ms: entry.expires_at.timestamp_millis(),
            })
            .collect();
        let count = entries.len();
        let snapshot = Snapshot {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            entries,
        };
        let encoded =
            bincode::serialize(&snapshot).map_err(|e| SnapshotError::Corrupted(e.to_string()))?;
        writer.write_all(&encoded)?;
        Ok(count)
    }

    /// Restore entries from a snapshot, keeping their timestamps. Returns
    /// the number of entries loaded.
    pub(crate) fn load<R: Read>(&self, reader: &mut R) -> Result<usize, SnapshotError> {
        let mut encoded = Vec::new();
        reader.read_to_end(&mut encoded)?;
        let snapshot: Snapshot = bincode::deserialize(&encoded)
            .map_err(|e| SnapshotError::Corrupted(e.to_string()))?;
        if snapshot.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::Corrupted("unrecognized file".to_string()));
        }
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Corrupted(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }

        let mut restored = Vec::with_capacity(snapshot.entries.len());
        for entry in snapshot.entries {
            let key = (ExporterKey::from_octets(entry.exporter), entry.if_index);
            restored.push((
                key,
                CacheEntry {
                    exporter_name: entry.exporter_name,
                    interface: Interface {
                        name: entry.interface_name,
                        description: entry.interface_description,
                        speed: entry.interface_speed,
                    },
                    created_at: timestamp(entry.created_at_ms)?,
                    last_access: timestamp(entry.last_access_ms)?,
                    expires_at: timestamp(entry.expires_at_ms)?,
                },
            ));
        }
        let count = restored.len();
        self.restore(restored);
        Ok(count)
    }

    /// Save to a file, atomically: write a sibling temp file, then rename
    /// over the target.
    pub(crate) fn save_file(&self, path: &Path) -> Result<usize, SnapshotError> {
        let tmp = match path.file_name() {
            Some(name) => {
                let mut tmp_name = name.to_os_string();
                tmp_name.push(".tmp");
                path.with_file_name(tmp_name)
            }
            None => path.with_file_name("snapshot.tmp"),
        };
        let mut file = fs::File::create(&tmp)?;
        let count = match self.save(&mut file) {
            Ok(count) => count,
            Err(error) => {
                drop(file);
                let _ = fs::remove_file(&tmp);
                return Err(error);
            }
        };
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)?;
        Ok(count)
    }

    pub(crate) fn load_file(&self, path: &Path) -> Result<usize, SnapshotError> {
        let mut file = fs::File::open(path)?;
        self.load(&mut file)
    }
}

fn timestamp(ms: i64) -> Result<DateTime<Utc>, SnapshotError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| SnapshotError::Corrupted(format!("timestamp {ms} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use chrono::TimeZone;
    use std::time::Duration;

    fn cache() -> InterfaceCache {
        InterfaceCache::new(
            Duration::from_secs(30 * 60),
            Duration::from_secs(25 * 60),
            Metrics::new(),
        )
    }

    fn key(addr: &str, if_index: u32) -> crate::CacheKey {
        (ExporterKey::new(addr.parse().unwrap()), if_index)
    }

    #[test]
    fn test_save_load_round_trip_preserves_everything() {
        let source = cache();
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        source.put(
            t0,
            key("127.0.0.1", 765),
            "127_0_0_1".to_string(),
            Interface {
                name: "Gi0/0/765".to_string(),
                description: "Interface 765".to_string(),
                speed: 1000,
            },
        );
        source.put(
            t0 + chrono::Duration::minutes(3),
            key("2001:db8::1", 999),
            "core1".to_string(),
            Interface::default(),
        );
        // A later hit moves last_access away from created_at.
        source.get(t0 + chrono::Duration::minutes(5), key("127.0.0.1", 765));

        let mut buffer = Vec::new();
        assert_eq!(source.save(&mut buffer).unwrap(), 2);

        let target = cache();
        assert_eq!(target.load(&mut buffer.as_slice()).unwrap(), 2);

        let mut original = source.dump();
        let mut restored = target.dump();
        original.sort_by_key(|(k, _)| *k);
        restored.sort_by_key(|(k, _)| *k);
        assert_eq!(original, restored);
    }

    #[test]
    fn test_load_garbage_is_corrupted() {
        let target = cache();
        let mut garbage: &[u8] = b"not a snapshot at all";
        assert!(matches!(
            target.load(&mut garbage),
            Err(SnapshotError::Corrupted(_))
        ));
        assert_eq!(target.len(), 0);
    }

    #[test]
    fn test_load_wrong_version_is_corrupted() {
        let snapshot = Snapshot {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION + 1,
            entries: Vec::new(),
        };
        let encoded = bincode::serialize(&snapshot).unwrap();
        let target = cache();
        assert!(matches!(
            target.load(&mut encoded.as_slice()),
            Err(SnapshotError::Corrupted(_))
        ));
    }

    #[test]
    fn test_load_wrong_magic_is_corrupted() {
        let snapshot = Snapshot {
            magic: 0xdead_beef,
            version: SNAPSHOT_VERSION,
            entries: Vec::new(),
        };
        let encoded = bincode::serialize(&snapshot).unwrap();
        let target = cache();
        assert!(matches!(
            target.load(&mut encoded.as_slice()),
            Err(SnapshotError::Corrupted(_))
        ));
    }

    #[test]
    fn test_save_file_then_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");

        let source = cache();
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        source.put(
            t0,
            key("192.0.2.1", 1),
            "edge1".to_string(),
            Interface {
                name: "xe-0/0/1".to_string(),
                description: "peering".to_string(),
                speed: 10_000,
            },
        );
        assert_eq!(source.save_file(&path).unwrap(), 1);
        // No temp file left behind.
        assert!(!path.with_file_name("cache.tmp").exists());

        let target = cache();
        assert_eq!(target.load_file(&path).unwrap(), 1);
        assert_eq!(target.dump(), source.dump());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = cache();
        assert!(matches!(
            target.load_file(&dir.path().join("absent")),
            Err(SnapshotError::Io(_))
        ));
    }
}
