//! Raw dataset acquisition.
//!
//! A [`DatasetSource`] places the Kaggle "Formula 1 Race Data" CSV files in
//! the raw directory. Sources differ only in where the files come from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, SourceKind};
use crate::dataset::{ensure_dir, known_files, list_csv_files};
use crate::error::{Error, Result};

/// Outcome of a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    /// Name of the source that produced the files.
    pub source: &'static str,
    /// Directory the files were written to.
    pub destination: PathBuf,
    /// File names written, sorted.
    pub files: Vec<String>,
    /// Total bytes written.
    pub bytes: u64,
}

/// Something that can deliver the raw dataset files.
#[async_trait]
pub trait DatasetSource: Send + Sync + std::fmt::Debug {
    /// The name of this source (for logging/reporting).
    fn name(&self) -> &'static str;

    /// Write the dataset's CSV files into `dest`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatasetNotFound`] if the source holds no CSV files,
    /// or an I/O or download error if copying fails.
    async fn fetch(&self, dest: &Path) -> Result<FetchReport>;
}

/// Build the source selected by configuration.
///
/// # Errors
///
/// Returns an error if the selected source is missing its settings.
pub fn source_from_config(config: &Config) -> Result<Box<dyn DatasetSource>> {
    let source: Box<dyn DatasetSource> = match config.dataset.source {
        SourceKind::KaggleCache => Box::new(KaggleCacheSource::new(
            config.kaggle_cache_dir(),
            &config.dataset.handle,
        )),
        SourceKind::Directory => {
            let dir = config.dataset.source_dir.clone().ok_or_else(|| {
                Error::ConfigValidation {
                    message: "the directory source requires dataset.source_dir".to_string(),
                }
            })?;
            Box::new(DirectorySource::new(dir))
        }
        SourceKind::Http => {
            let url = config.dataset.mirror_url.clone().ok_or_else(|| {
                Error::ConfigValidation {
                    message: "the http source requires dataset.mirror_url".to_string(),
                }
            })?;
            Box::new(HttpMirrorSource::new(url, config.http_timeout()))
        }
    };
    Ok(source)
}

/// Copies CSV files from a local directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    /// Create a source reading from `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DatasetSource for DirectorySource {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn fetch(&self, dest: &Path) -> Result<FetchReport> {
        let (source, src, dest) = (self.name(), self.dir.clone(), dest.to_path_buf());
        blocking(move || copy_csv_files(source, &src, &dest)).await
    }
}

/// Copies the newest cached version of a dataset from the KaggleHub cache.
///
/// KaggleHub stores downloads under
/// `<cache>/datasets/<owner>/<slug>/versions/<n>/`.
#[derive(Debug, Clone)]
pub struct KaggleCacheSource {
    cache_dir: PathBuf,
    handle: String,
}

impl KaggleCacheSource {
    /// Create a source for `handle` (`owner/slug`) under `cache_dir`.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>, handle: impl Into<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            handle: handle.into(),
        }
    }

    /// Directory holding all cached versions of the dataset.
    #[must_use]
    pub fn versions_dir(&self) -> PathBuf {
        let mut dir = self.cache_dir.join("datasets");
        for part in self.handle.split('/') {
            dir.push(part);
        }
        dir.join("versions")
    }

    /// The highest numbered cached version, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the versions directory exists but cannot be read.
    pub fn latest_version_dir(&self) -> Result<Option<PathBuf>> {
        let versions = self.versions_dir();
        if !versions.is_dir() {
            return Ok(None);
        }

        let mut latest: Option<(u64, PathBuf)> = None;
        for entry in std::fs::read_dir(&versions)? {
            let path = entry?.path();
            let Some(number) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u64>().ok())
            else {
                continue;
            };
            if path.is_dir() && latest.as_ref().map_or(true, |(best, _)| number > *best) {
                latest = Some((number, path));
            }
        }
        Ok(latest.map(|(_, path)| path))
    }
}

#[async_trait]
impl DatasetSource for KaggleCacheSource {
    fn name(&self) -> &'static str {
        "kaggle_cache"
    }

    async fn fetch(&self, dest: &Path) -> Result<FetchReport> {
        let lookup = self.clone();
        let Some(version_dir) = blocking(move || lookup.latest_version_dir()).await? else {
            return Err(Error::DatasetNotFound {
                source_name: self.name(),
                message: format!(
                    "no cached versions of {} under {}",
                    self.handle,
                    self.versions_dir().display()
                ),
            });
        };
        info!(version = %version_dir.display(), "using cached dataset version");
        let (source, dest) = (self.name(), dest.to_path_buf());
        blocking(move || copy_csv_files(source, &version_dir, &dest)).await
    }
}

/// Downloads each known dataset file from `<base_url>/<file>`.
#[derive(Debug, Clone)]
pub struct HttpMirrorSource {
    base_url: String,
    timeout: Duration,
}

impl HttpMirrorSource {
    /// Create a source for the mirror at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }

    /// URL of a dataset file on the mirror.
    #[must_use]
    pub fn file_url(&self, file: &str) -> String {
        format!("{}/{file}", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl DatasetSource for HttpMirrorSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, dest: &Path) -> Result<FetchReport> {
        let dir = dest.to_path_buf();
        blocking(move || ensure_dir(&dir)).await?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|source| Error::Download {
                url: self.base_url.clone(),
                source,
            })?;

        let mut files = Vec::new();
        let mut bytes = 0u64;
        for file in known_files() {
            let url = self.file_url(file);
            debug!(%url, "downloading");

            let response = client
                .get(&url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);
            let response = match response {
                Ok(response) => response,
                Err(source) if source.status() == Some(reqwest::StatusCode::NOT_FOUND) => {
                    warn!(%url, "file not on mirror, skipping");
                    continue;
                }
                Err(source) => return Err(Error::Download { url, source }),
            };

            let body = response
                .bytes()
                .await
                .map_err(|source| Error::Download {
                    url: url.clone(),
                    source,
                })?;
            tokio::fs::write(dest.join(file), &body).await?;
            bytes += body.len() as u64;
            files.push(file.to_string());
        }

        if files.is_empty() {
            return Err(Error::DatasetNotFound {
                source_name: self.name(),
                message: format!("{} served none of the dataset files", self.base_url),
            });
        }

        info!(files = files.len(), bytes, "dataset downloaded");
        Ok(FetchReport {
            source: self.name(),
            destination: dest.to_path_buf(),
            files,
            bytes,
        })
    }
}

/// Run blocking filesystem work on the blocking thread pool.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::internal(format!("filesystem task failed: {e}")))?
}

/// Copy every CSV file in `src` into `dest`, overwriting existing files.
fn copy_csv_files(source: &'static str, src: &Path, dest: &Path) -> Result<FetchReport> {
    let found = list_csv_files(src)?;
    if found.is_empty() {
        return Err(Error::DatasetNotFound {
            source_name: source,
            message: format!("{} contains no CSV files", src.display()),
        });
    }

    ensure_dir(dest)?;

    let mut files = Vec::with_capacity(found.len());
    let mut bytes = 0u64;
    for path in found {
        let Some(name) = path.file_name() else {
            continue;
        };
        bytes += std::fs::copy(&path, dest.join(name))?;
        files.push(name.to_string_lossy().into_owned());
    }

    info!(
        source,
        files = files.len(),
        bytes,
        destination = %dest.display(),
        "dataset copied"
    );
    Ok(FetchReport {
        source,
        destination: dest.to_path_buf(),
        files,
        bytes,
    })
}
