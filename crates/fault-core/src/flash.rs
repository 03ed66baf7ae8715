//! Flash image download via an external reader (BOSSA's `bossac`).

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum FlashError {
    #[error("Failed to find {name} executable, did you install BOSSA?")]
    ToolNotFound { name: String },

    #[error("Invalid flash tool path: {}", .0.display())]
    InvalidToolPath(PathBuf),

    #[error("Failed to launch {}: {source}", .tool.display())]
    Spawn {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download from flash failed ({})", exit_code_text(.code))]
    DownloadFailed { code: Option<i32> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_code_text(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "terminated by signal".to_string(),
    }
}

/// Something that can dump a board's flash into a file.
pub trait FlashReader {
    /// Display name for logs.
    fn name(&self) -> String;

    /// Read flash from the board on `port` into `dest`.
    fn download(&self, port: &str, dest: &Path) -> Result<(), FlashError>;
}

/// The external reader executable.
#[derive(Debug, Clone)]
pub struct FlashTool {
    path: PathBuf,
    read_offset: u32,
}

impl FlashTool {
    /// Use `explicit` if given (it must exist), else search `PATH` for `name`.
    #[instrument(level = "debug")]
    pub fn discover(explicit: Option<&Path>, name: &str) -> Result<PathBuf, FlashError> {
        match explicit {
            Some(path) if path.is_file() => Ok(path.to_path_buf()),
            Some(path) => Err(FlashError::InvalidToolPath(path.to_path_buf())),
            None => which::which(name).map_err(|e| {
                debug!(error = %e, "Tool lookup failed");
                FlashError::ToolNotFound {
                    name: name.to_string(),
                }
            }),
        }
    }

    pub fn new(path: PathBuf, read_offset: u32) -> Self {
        Self { path, read_offset }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Arguments for reading from `read_offset` to the end of flash.
    pub fn read_args(&self, port: &str, dest: &Path) -> Vec<String> {
        vec![
            format!("--port={}", port),
            format!("--offset=0x{:X}", self.read_offset),
            "-r".to_string(),
            dest.display().to_string(),
        ]
    }
}

impl FlashReader for FlashTool {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    #[instrument(skip(self), fields(tool = %self.path.display()))]
    fn download(&self, port: &str, dest: &Path) -> Result<(), FlashError> {
        let args = self.read_args(port, dest);
        info!(args = ?args, "Running flash reader");

        // Reader output goes straight to the terminal.
        let status = Command::new(&self.path)
            .args(&args)
            .status()
            .map_err(|source| FlashError::Spawn {
                tool: self.path.clone(),
                source,
            })?;

        if !status.success() {
            return Err(FlashError::DownloadFailed {
                code: status.code(),
            });
        }
        Ok(())
    }
}

/// Temporary flash image on disk. The file is deleted on drop.
pub struct FlashImage {
    path: PathBuf,
}

impl FlashImage {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole image into memory.
    pub fn load(&self) -> Result<Vec<u8>, FlashError> {
        Ok(std::fs::read(&self.path)?)
    }
}

impl Drop for FlashImage {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed flash image"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove flash image"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_args() {
        let tool = FlashTool::new(PathBuf::from("bossac"), 0x2000);
        let args = tool.read_args("/dev/ttyACM0", Path::new("./flash.bin"));
        assert_eq!(
            args,
            vec!["--port=/dev/ttyACM0", "--offset=0x2000", "-r", "./flash.bin"]
        );
    }

    #[test]
    fn test_discover_explicit() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let found = FlashTool::discover(Some(file.path()), "bossac").unwrap();
        assert_eq!(found, file.path());

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            FlashTool::discover(Some(missing.as_path()), "bossac"),
            Err(FlashError::InvalidToolPath(_))
        ));
    }

    #[test]
    fn test_discover_not_on_path() {
        let err = FlashTool::discover(None, "no-such-flash-reader-4e1f").unwrap_err();
        assert!(matches!(err, FlashError::ToolNotFound { .. }));
        assert!(err.to_string().contains("BOSSA"));
    }

    #[cfg(unix)]
    #[test]
    fn test_download_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("flash.bin");

        let ok = FlashTool::new(which::which("true").unwrap(), 0x2000);
        ok.download("/dev/null", &dest).unwrap();

        let failing = FlashTool::new(which::which("false").unwrap(), 0x2000);
        match failing.download("/dev/null", &dest) {
            Err(FlashError::DownloadFailed { code: Some(1) }) => {}
            other => panic!("expected download failure, got {:?}", other),
        }
    }

    #[test]
    fn test_image_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.bin");
        {
            let image = FlashImage::new(&path);
            std::fs::write(image.path(), [1u8, 2, 3]).unwrap();
            assert_eq!(image.load().unwrap(), vec![1, 2, 3]);
        }
        assert!(!path.exists());

        // Never written: drop is quiet
        drop(FlashImage::new(dir.path().join("absent.bin")));
    }
}
