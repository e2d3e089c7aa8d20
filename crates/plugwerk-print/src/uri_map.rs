// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent devpath -> device-URI map.
//
// The map lets a remove event find the queues of a device that can no longer
// be queried.  One line per entry:
//
//     devpath<TAB>uri1<TAB>uri2...
//
// The whole file is held under an exclusive `flock` from `open_for_update`
// until `commit` (or drop), so concurrent add and remove events for the same
// device serialize on it.

use std::collections::BTreeMap;
use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use rustix::fs::{FlockOperation, flock};
use tracing::{debug, info, instrument, warn};

use plugwerk_core::error::{PlugwerkError, Result};
use plugwerk_core::types::DeviceUriList;

/// The map, loaded and locked for one read-modify-write transaction.
///
/// Dropping it without calling [`commit`](Self::commit) discards changes and
/// releases the lock.
#[derive(Debug)]
pub struct UriMap {
    path: PathBuf,
    file: File,
    entries: BTreeMap<String, DeviceUriList>,
}

impl UriMap {
    /// Lock and load the map at `path`, creating the file and its directory
    /// if needed.  Blocks until the lock is available.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open_for_update(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            DirBuilder::new()
                .recursive(true)
                .mode(0o755)
                .create(dir)
                .map_err(|e| PlugwerkError::UriMap(format!("create {}: {e}", dir.display())))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(path)
            .map_err(|e| PlugwerkError::UriMap(format!("open {}: {e}", path.display())))?;

        lock_exclusive(&file)
            .map_err(|e| PlugwerkError::UriMap(format!("lock {}: {e}", path.display())))?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        let entries = parse(&contents);
        debug!(entries = entries.len(), "URI map loaded");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            entries,
        })
    }

    pub fn lookup(&self, devpath: &str) -> Option<&DeviceUriList> {
        self.entries.get(devpath)
    }

    pub fn contains(&self, devpath: &str) -> bool {
        self.entries.contains_key(devpath)
    }

    /// The entry for `devpath`, or for its nearest mapped ancestor.
    ///
    /// Child nodes of a device (interfaces, usblp nodes) fire their own
    /// remove events; they resolve to the device's entry.
    pub fn find_ancestor(&self, devpath: &str) -> Option<&str> {
        if let Some((key, _)) = self.entries.get_key_value(devpath) {
            return Some(key);
        }
        self.entries
            .keys()
            .filter(|key| {
                devpath
                    .strip_prefix(key.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|key| key.len())
            .map(String::as_str)
    }

    pub fn insert_or_replace(&mut self, devpath: impl Into<String>, uris: DeviceUriList) {
        let devpath = devpath.into();
        debug!(devpath = %devpath, uris = %uris, "recording device URIs");
        self.entries.insert(devpath, uris);
    }

    pub fn remove(&mut self, devpath: &str) -> Option<DeviceUriList> {
        self.entries.remove(devpath)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Truncate the file, write the current entries and release the lock.
    #[instrument(skip(self), fields(path = %self.path.display(), entries = self.entries.len()))]
    pub fn commit(mut self) -> Result<()> {
        let contents = serialize(&self.entries);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.set_len(0)?;
        self.file.write_all(contents.as_bytes())?;
        self.file.sync_all()?;
        info!("URI map written");
        Ok(())
    }
}

/// Released when the descriptor is closed.
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    flock(file, FlockOperation::LockExclusive)?;
    Ok(())
}

/// Lines that are not UTF-8 or lack a devpath or URI are skipped.
fn parse(contents: &[u8]) -> BTreeMap<String, DeviceUriList> {
    let mut entries = BTreeMap::new();
    for (lineno, raw) in contents.split(|&b| b == b'\n').enumerate() {
        let Ok(line) = std::str::from_utf8(raw) else {
            warn!(line = lineno + 1, "skipping URI map line that is not UTF-8");
            continue;
        };
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let devpath = fields.next().unwrap_or_default();
        let uris: DeviceUriList = fields.filter(|f| !f.is_empty()).collect();
        if devpath.is_empty() || uris.is_empty() {
            warn!(line = lineno + 1, "skipping malformed URI map line");
            continue;
        }
        entries.insert(devpath.to_string(), uris);
    }
    entries
}

fn serialize(entries: &BTreeMap<String, DeviceUriList>) -> String {
    let mut out = String::new();
    for (devpath, uris) in entries {
        out.push_str(devpath);
        for uri in uris {
            out.push('\t');
            out.push_str(uri);
        }
        out.push('\n');
    }
    out
}
