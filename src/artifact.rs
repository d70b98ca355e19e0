use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

/// Where a finished artifact can be retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactHandle {
    pub path: PathBuf,
    /// `false` when the sink failed and `path` is the local render output.
    pub published: bool,
}

/// Destination for finished renders: a directory, a bucket, a CDN.
pub trait ArtifactSink: Send + Sync {
    fn name(&self) -> &str;
    fn publish(&self, local: &Path) -> Result<PathBuf>;
}

/// Copies artifacts into a directory.
#[derive(Debug, Clone)]
pub struct LocalDirSink {
    dir: PathBuf,
}

impl LocalDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ArtifactSink for LocalDirSink {
    fn name(&self) -> &str {
        "local-dir"
    }

    fn publish(&self, local: &Path) -> Result<PathBuf> {
        let file_name = local
            .file_name()
            .with_context(|| format!("artifact path {} has no file name", local.display()))?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let target = self.dir.join(file_name);
        fs::copy(local, &target).with_context(|| {
            format!("failed to copy {} to {}", local.display(), target.display())
        })?;
        Ok(target)
    }
}

/// Hand the artifact to `sink`. A sink failure is not a job failure: the
/// handle then points at the local file.
pub fn publish_or_keep_local(sink: Option<&dyn ArtifactSink>, local: &Path) -> ArtifactHandle {
    let Some(sink) = sink else {
        return ArtifactHandle {
            path: local.to_path_buf(),
            published: false,
        };
    };
    match sink.publish(local) {
        Ok(path) => {
            info!(sink = sink.name(), path = %path.display(), "artifact published");
            ArtifactHandle {
                path,
                published: true,
            }
        }
        Err(error) => {
            warn!(
                sink = sink.name(),
                error = %format!("{error:#}"),
                "publish failed; keeping local artifact"
            );
            ArtifactHandle {
                path: local.to_path_buf(),
                published: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSink;

    impl ArtifactSink for BrokenSink {
        fn name(&self) -> &str {
            "broken"
        }

        fn publish(&self, _local: &Path) -> Result<PathBuf> {
            anyhow::bail!("upload refused")
        }
    }

    #[test]
    fn local_dir_sink_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("out.mp4");
        fs::write(&local, b"video").unwrap();
        let sink = LocalDirSink::new(dir.path().join("published"));

        let handle = publish_or_keep_local(Some(&sink), &local);
        assert!(handle.published);
        assert_eq!(fs::read(&handle.path).unwrap(), b"video");
    }

    #[test]
    fn sink_failure_keeps_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("out.mp4");
        fs::write(&local, b"video").unwrap();

        let handle = publish_or_keep_local(Some(&BrokenSink), &local);
        assert!(!handle.published);
        assert_eq!(handle.path, local);
    }
}
