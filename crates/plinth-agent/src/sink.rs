use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::NamedTempFile;

// Sink files are `cmd-<random>.log` inside the scratch directory; the
// startup sweep only ever touches files matching this shape.
const SINK_PREFIX: &str = "cmd-";
const SINK_SUFFIX: &str = ".log";

// Merged stdout/stderr capture for one command. Dropping the sink closes and
// removes the backing file, so every exit path (reap, forced termination,
// drain) releases it.
#[derive(Debug)]
pub struct OutputSink {
    file: NamedTempFile,
}

impl OutputSink {
    pub fn create(dir: &Path) -> io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(SINK_PREFIX)
            .suffix(SINK_SUFFIX)
            .tempfile_in(dir)?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn stdio_pair(&self) -> io::Result<(Stdio, Stdio)> {
        // The stderr handle is a dup of the stdout one, so both streams share
        // a file offset and interleave the way a terminal would show them.
        let out = self.file.reopen()?;
        let err = out.try_clone()?;
        Ok((Stdio::from(out), Stdio::from(err)))
    }

    pub async fn snapshot(&self) -> String {
        read_snapshot(self.path()).await
    }
}

// Best-effort: an unreadable file comes back as empty output. Commands may
// emit arbitrary bytes, so non-UTF-8 sequences are replaced, never dropped.
pub async fn read_snapshot(path: &Path) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "sink read failed");
            String::new()
        }
    }
}

// Remove sink files left behind by a previous run. Runs once at startup,
// before any handle of this run exists.
pub fn sweep_stale(dir: &Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "scratch dir not readable, skipping sweep");
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(SINK_PREFIX) || !name.ends_with(SINK_SUFFIX) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(err) => {
                tracing::warn!(path = %entry.path().display(), error = %err, "stale sink not removed");
            }
        }
    }
    removed
}

pub fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("plinth-agent")
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn sink_file_has_recognizable_name() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::create(dir.path()).unwrap();
        let name = sink.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(SINK_PREFIX));
        assert!(name.ends_with(SINK_SUFFIX));
    }

    #[tokio::test]
    async fn snapshot_returns_written_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::create(dir.path()).unwrap();

        let mut writer = sink.file.reopen().unwrap();
        writer.write_all(b"line one\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(sink.snapshot().await, "line one\n");
    }

    #[tokio::test]
    async fn snapshot_keeps_non_utf8_bytes_readable() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::create(dir.path()).unwrap();

        // 0xC3 opens a two-byte sequence that 0x28 cannot finish.
        let mut writer = sink.file.reopen().unwrap();
        writer.write_all(b"ok \xc3\x28 end\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(sink.snapshot().await, "ok \u{FFFD}( end\n");
    }

    #[test]
    fn drop_removes_the_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::create(dir.path()).unwrap();
        let path = sink.path().to_path_buf();
        assert!(path.exists());
        drop(sink);
        assert!(!path.exists());
    }

    #[test]
    fn sweep_removes_only_sink_shaped_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cmd-stale1.log"), "a").unwrap();
        std::fs::write(dir.path().join("cmd-stale2.log"), "b").unwrap();
        std::fs::write(dir.path().join("keep.txt"), "c").unwrap();
        std::fs::write(dir.path().join("cmd-not-a-log"), "d").unwrap();

        let removed = sweep_stale(dir.path());

        assert_eq!(removed, 2);
        assert!(dir.path().join("keep.txt").exists());
        assert!(dir.path().join("cmd-not-a-log").exists());
        assert!(!dir.path().join("cmd-stale1.log").exists());
    }

    #[test]
    fn sweep_of_missing_dir_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("nope");
        assert_eq!(sweep_stale(&gone), 0);
    }
}
