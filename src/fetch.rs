//! Registry acquisition.
//!
//! The registry document is downloaded once and cached at the configured
//! path. An existing file is never refreshed.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to download {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: ureq::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Makes sure `path` holds the registry. Returns `true` when it was
/// downloaded by this call.
pub fn ensure_registry(path: &Path, url: &str) -> Result<bool, FetchError> {
    if path.exists() {
        debug!("Registry present at {}", path.display());
        return Ok(false);
    }

    info!("Downloading {} to {}", url, path.display());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| FetchError::Io { path: parent.to_path_buf(), source })?;
    }

    let response = ureq::get(url).call().map_err(|source| FetchError::Http {
        url: url.to_string(),
        source,
    })?;

    // write beside the target first so an interrupted download is not cached
    let partial = path.with_extension("part");
    let bytes = write_partial(response.into_body().into_reader(), &partial)?;
    fs::rename(&partial, path).map_err(|source| FetchError::Io { path: path.to_path_buf(), source })?;

    info!("Downloaded {} bytes", bytes);
    Ok(true)
}

/// Copies `source` into `partial`. The file is removed again when the copy
/// fails.
fn write_partial<R: Read>(mut source: R, partial: &Path) -> Result<u64, FetchError> {
    let io_err = |source| FetchError::Io { path: partial.to_path_buf(), source };
    let mut file = fs::File::create(partial).map_err(io_err)?;
    match io::copy(&mut source, &mut file) {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            drop(file);
            if let Err(cleanup) = fs::remove_file(partial) {
                warn!("Failed to remove {}: {}", partial.display(), cleanup);
            }
            Err(io_err(e))
        }
    }
}
