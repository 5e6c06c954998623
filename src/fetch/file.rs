//! File-backed map source.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::data::MapKind;
use crate::error::Result;
use crate::fetch::READ_BUF;
use crate::session::FetchSession;

/// A `file://` map source with its modification-time gate.
pub struct FileSource {
    path: PathBuf,
    /// Modification time recorded at the last check.
    mtime: Option<SystemTime>,
}

impl FileSource {
    /// Create the source, recording the file's current modification time.
    /// The file must be readable at configuration time.
    pub fn open(path: PathBuf) -> Result<Self> {
        // Reject unreadable files here; the registry drops the map
        File::open(&path)?;
        let mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        Ok(Self { path, mtime })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file into a fresh session, unconditionally.
    /// Used for the mandatory startup load.
    pub fn load(&self, kind: MapKind) -> Result<FetchSession> {
        read_file(&self.path, kind)
    }

    /// Periodic refresh: re-read only when the modification time advanced
    /// since the last check. `Ok(None)` means the cycle was a no-op.
    pub fn refresh(&mut self, kind: MapKind) -> Result<Option<FetchSession>> {
        let mtime = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("cannot stat file '{}': {}", self.path.display(), e);
                return Ok(None);
            }
        };
        match self.mtime {
            Some(prev) if mtime <= prev => return Ok(None),
            _ => self.mtime = Some(mtime),
        }
        log::info!("rereading map file {}", self.path.display());
        read_file(&self.path, kind).map(Some)
    }
}

/// Block-read a file through the scanner chain.
fn read_file(path: &Path, kind: MapKind) -> Result<FetchSession> {
    let mut file = File::open(path)?;
    let mut session = FetchSession::new(kind);
    let mut buf = [0u8; READ_BUF];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        session.feed(&buf[..n]);
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MapHandle;
    use std::io::Write;

    #[test]
    fn test_load_reads_whole_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "127.0.0.1 #localhost").unwrap();
        writeln!(f, "10.0.0.0/8").unwrap();
        writeln!(f, "# full comment").unwrap();
        f.flush().unwrap();

        let source = FileSource::open(f.path().to_path_buf()).unwrap();
        let handle = MapHandle::new();
        let session = source.load(MapKind::IpList).unwrap();
        assert_eq!(session.commit(&handle), 2);
        assert!(handle.contains_ip("10.9.9.9".parse().unwrap()));
        assert!(handle.contains_ip("127.0.0.1".parse().unwrap()));
        assert!(!handle.contains_ip("127.0.0.2".parse().unwrap()));
    }

    #[test]
    fn test_refresh_noop_when_unchanged() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "a.example.com").unwrap();
        f.flush().unwrap();

        let mut source = FileSource::open(f.path().to_path_buf()).unwrap();
        assert!(source.refresh(MapKind::HostList).unwrap().is_none());
    }

    #[test]
    fn test_refresh_rereads_when_mtime_advances() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "a.example.com").unwrap();
        f.flush().unwrap();

        let mut source = FileSource::open(f.path().to_path_buf()).unwrap();

        // Push the recorded mtime into the past instead of sleeping
        source.mtime = Some(SystemTime::UNIX_EPOCH);

        let handle = MapHandle::new();
        let session = source.refresh(MapKind::HostList).unwrap().unwrap();
        session.commit(&handle);
        assert!(handle.contains_host("a.example.com"));

        // Second refresh sees the stored mtime again
        assert!(source.refresh(MapKind::HostList).unwrap().is_none());
    }

    #[test]
    fn test_missing_file_rejected_at_open() {
        assert!(FileSource::open(PathBuf::from("/nonexistent/mapwatch-test")).is_err());
    }
}
