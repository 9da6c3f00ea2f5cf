//! Upload storage
//!
//! Each build owns a directory `<root>/<build id>/` holding the APK, the
//! keystore and, once packaged, the generated bundle. Any other uploaded part
//! goes to `<root>/<build id>/inputs/`, so it can never take the place of one
//! of those three files.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// Multipart field carrying the APK
pub const APK_FIELD: &str = "apkFile";
/// Multipart field carrying the signing keystore
pub const KEYSTORE_FIELD: &str = "keyStoreFile";

const APK_FILE_NAME: &str = "app.apk";
const KEYSTORE_FILE_NAME: &str = "keystore.jks";
const OUTPUT_FILE_NAME: &str = "app.aab";
const EXTRA_DIR_NAME: &str = "inputs";

/// A binary payload received with a submission
#[derive(Debug, Clone)]
pub struct InputArtifact {
    /// Multipart field name
    pub field: String,
    /// Client-side file name, if one was sent
    pub file_name: Option<String>,
    pub data: Vec<u8>,
}

impl InputArtifact {
    pub fn new(field: impl Into<String>, file_name: Option<String>, data: Vec<u8>) -> Self {
        Self {
            field: field.into(),
            file_name,
            data,
        }
    }
}

/// Where a build's inputs were written
#[derive(Debug, Clone)]
pub struct BuildInputs {
    pub dir: PathBuf,
    pub apk: PathBuf,
    pub keystore: Option<PathBuf>,
    pub extra: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Filesystem area for build inputs and outputs
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory owned by one build
    pub fn build_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Writes every input into the build directory
    ///
    /// The APK and keystore get fixed names; any other part keeps a
    /// sanitized version of its file name under `inputs/`, suffixed when two
    /// parts share a name. The directory is removed again if any write fails.
    pub async fn save_inputs(&self, id: Uuid, inputs: &[InputArtifact]) -> io::Result<BuildInputs> {
        let dir = self.build_dir(id);
        tokio::fs::create_dir_all(&dir).await?;

        match Self::write_inputs(&dir, inputs).await {
            Ok(saved) => Ok(saved),
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&dir).await;
                Err(e)
            }
        }
    }

    async fn write_inputs(dir: &Path, inputs: &[InputArtifact]) -> io::Result<BuildInputs> {
        let mut apk = None;
        let mut keystore = None;
        let mut extra = Vec::new();
        let mut taken = HashSet::new();
        let extra_dir = dir.join(EXTRA_DIR_NAME);

        for (index, input) in inputs.iter().enumerate() {
            let path = match input.field.as_str() {
                APK_FIELD => {
                    let path = dir.join(APK_FILE_NAME);
                    apk = Some(path.clone());
                    path
                }
                KEYSTORE_FIELD => {
                    let path = dir.join(KEYSTORE_FILE_NAME);
                    keystore = Some(path.clone());
                    path
                }
                _ => {
                    let name = input
                        .file_name
                        .as_deref()
                        .map(sanitize_file_name)
                        .filter(|name| !name.is_empty())
                        .unwrap_or_else(|| format!("input-{}", index));
                    if taken.is_empty() {
                        tokio::fs::create_dir_all(&extra_dir).await?;
                    }
                    let path = extra_dir.join(unique_name(name, &mut taken));
                    extra.push(path.clone());
                    path
                }
            };

            tokio::fs::write(&path, &input.data).await?;
            debug!("Saved {} bytes to {}", input.data.len(), path.display());
        }

        let apk = apk.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "no APK among the inputs")
        })?;

        Ok(BuildInputs {
            dir: dir.to_path_buf(),
            apk,
            keystore,
            extra,
            output: dir.join(OUTPUT_FILE_NAME),
        })
    }

    /// Removes a build directory; a missing directory is not an error
    pub async fn remove(&self, id: Uuid) -> io::Result<()> {
        match tokio::fs::remove_dir_all(self.build_dir(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to remove upload directory for build {}: {}", id, e);
                Err(e)
            }
        }
    }
}

/// Keeps only the final path component, restricted to a safe alphabet
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

/// `name`, or `name` with a `-<n>` suffix before the extension if taken
fn unique_name(name: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.clone()) {
        return name;
    }

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name.as_str(), ""),
    };

    let mut n = 1;
    loop {
        let candidate = format!("{}-{}{}", stem, n, ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
