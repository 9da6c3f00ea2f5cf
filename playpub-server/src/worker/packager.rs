//! Packagers
//!
//! The packager is the opaque external step that turns the uploaded APK and
//! keystore into a signed bundle. It either produces an artifact or an
//! [`ExecutionError`], which the executor records in the build.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use playpub_core::domain::config::BuildConfig;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::storage::BuildInputs;

/// Lines of tool output kept in an error message
const ERROR_TAIL_LINES: usize = 5;

/// Failure while producing the bundle
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to run packager: {0}")]
    Io(#[from] std::io::Error),

    #[error("packager exited with status {code}: {output}")]
    Failed { code: i32, output: String },

    #[error("packager was terminated by a signal")]
    Terminated,

    #[error("packager did not produce {0}")]
    MissingOutput(PathBuf),
}

/// Everything a packager needs for one build
///
/// `config` is the unredacted configuration; it only lives in memory for the
/// duration of the build.
#[derive(Debug, Clone)]
pub struct PackageRequest {
    pub build_id: Uuid,
    pub config: BuildConfig,
    pub inputs: BuildInputs,
}

/// Result of a successful packaging run
#[derive(Debug, Clone, Default)]
pub struct PackageOutput {
    pub artifact: PathBuf,
    /// Tool output worth showing in the build log
    pub log: Vec<String>,
}

#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(&self, request: &PackageRequest) -> Result<PackageOutput, ExecutionError>;
}

/// Writes a placeholder bundle without invoking any tool
#[derive(Debug, Clone, Default)]
pub struct SimulatedPackager;

#[async_trait]
impl Packager for SimulatedPackager {
    async fn package(&self, request: &PackageRequest) -> Result<PackageOutput, ExecutionError> {
        let config = &request.config;
        let contents = format!(
            "Simulated AAB for {} {} ({})\n",
            config.app_name, config.version_name, config.version_code
        );

        tokio::fs::write(&request.inputs.output, contents).await?;
        debug!(
            "Simulated bundle written to {}",
            request.inputs.output.display()
        );

        Ok(PackageOutput {
            artifact: request.inputs.output.clone(),
            log: Vec::new(),
        })
    }
}

/// Runs an external executable (for example a bundletool wrapper)
///
/// The build is described to the tool through `PLAYPUB_*` environment
/// variables; the tool must write the bundle to `PLAYPUB_OUTPUT`. Its working
/// directory is the build directory.
#[derive(Debug, Clone)]
pub struct CommandPackager {
    program: String,
    args: Vec<String>,
}

impl CommandPackager {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn environment(request: &PackageRequest) -> Vec<(&'static str, String)> {
        let config = &request.config;
        let inputs = &request.inputs;
        let optional = |value: Option<String>| value.unwrap_or_default();

        vec![
            ("PLAYPUB_BUILD_ID", request.build_id.to_string()),
            ("PLAYPUB_APK", inputs.apk.display().to_string()),
            (
                "PLAYPUB_KEYSTORE",
                optional(inputs.keystore.as_ref().map(|p| p.display().to_string())),
            ),
            ("PLAYPUB_OUTPUT", inputs.output.display().to_string()),
            ("PLAYPUB_APP_NAME", config.app_name.clone()),
            ("PLAYPUB_PACKAGE_NAME", config.package_name.clone()),
            ("PLAYPUB_VERSION_NAME", config.version_name.clone()),
            ("PLAYPUB_VERSION_CODE", config.version_code.to_string()),
            ("PLAYPUB_KEY_ALIAS", config.key_alias.clone()),
            ("PLAYPUB_KEY_PASSWORD", optional(config.key_password.clone())),
            ("PLAYPUB_STORE_PASSWORD", optional(config.store_password.clone())),
            ("PLAYPUB_MIN_SDK", optional(config.min_sdk.map(|v| v.to_string()))),
            ("PLAYPUB_TARGET_SDK", optional(config.target_sdk.map(|v| v.to_string()))),
            (
                "PLAYPUB_BUILD_TOOLS_VERSION",
                optional(config.build_tools_version.clone()),
            ),
        ]
    }
}

#[async_trait]
impl Packager for CommandPackager {
    async fn package(&self, request: &PackageRequest) -> Result<PackageOutput, ExecutionError> {
        info!(
            "Running packager {} for build {}",
            self.program, request.build_id
        );

        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .envs(Self::environment(request))
            .current_dir(&request.inputs.dir)
            .stdin(Stdio::null())
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let code = output.status.code().ok_or(ExecutionError::Terminated)?;
            let text = if stderr.trim().is_empty() { &stdout } else { &stderr };
            return Err(ExecutionError::Failed {
                code,
                output: tail(text, ERROR_TAIL_LINES),
            });
        }

        if !tokio::fs::try_exists(&request.inputs.output).await? {
            return Err(ExecutionError::MissingOutput(request.inputs.output.clone()));
        }

        Ok(PackageOutput {
            artifact: request.inputs.output.clone(),
            log: stdout
                .lines()
                .map(str::trim_end)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }
}

/// Last `n` non-empty lines of `text`, joined with " | "
fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{APK_FIELD, InputArtifact, UploadStore};

    async fn request(root: &std::path::Path) -> PackageRequest {
        let store = UploadStore::new(root);
        let build_id = Uuid::new_v4();
        let inputs = store
            .save_inputs(build_id, &[InputArtifact::new(APK_FIELD, None, b"apk".to_vec())])
            .await
            .unwrap();

        PackageRequest {
            build_id,
            config: BuildConfig::new("Demo", 4),
            inputs,
        }
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        assert_eq!(tail("a\n\nb\nc\n", 2), "b | c");
        assert_eq!(tail("only", 5), "only");
        assert_eq!(tail("", 5), "");
    }

    #[tokio::test]
    async fn test_simulated_packager_writes_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let request = request(tmp.path()).await;

        let output = SimulatedPackager.package(&request).await.unwrap();

        assert_eq!(output.artifact, request.inputs.output);
        let contents = std::fs::read_to_string(&output.artifact).unwrap();
        assert!(contents.contains("Demo"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_packager_success() {
        let tmp = tempfile::tempdir().unwrap();
        let request = request(tmp.path()).await;
        let packager = CommandPackager::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"echo "packing $PLAYPUB_APP_NAME $PLAYPUB_VERSION_CODE"; printf bundle > "$PLAYPUB_OUTPUT""#
                    .to_string(),
            ],
        );

        let output = packager.package(&request).await.unwrap();

        assert_eq!(output.log, vec!["packing Demo 4"]);
        assert_eq!(std::fs::read(&output.artifact).unwrap(), b"bundle");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_packager_failure_reports_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        let request = request(tmp.path()).await;
        let packager = CommandPackager::new(
            "sh",
            vec!["-c".to_string(), "echo 'keystore was tampered with' >&2; exit 3".to_string()],
        );

        let err = packager.package(&request).await.unwrap_err();

        match err {
            ExecutionError::Failed { code, output } => {
                assert_eq!(code, 3);
                assert_eq!(output, "keystore was tampered with");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_packager_requires_output() {
        let tmp = tempfile::tempdir().unwrap();
        let request = request(tmp.path()).await;
        let packager = CommandPackager::new("sh", vec!["-c".to_string(), "true".to_string()]);

        let err = packager.package(&request).await.unwrap_err();
        assert!(matches!(err, ExecutionError::MissingOutput(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_uploaded_bundle_does_not_count_as_output() {
        let tmp = tempfile::tempdir().unwrap();
        let store = UploadStore::new(tmp.path());
        let build_id = Uuid::new_v4();
        let inputs = store
            .save_inputs(
                build_id,
                &[
                    InputArtifact::new(APK_FIELD, None, b"apk".to_vec()),
                    InputArtifact::new("bundle", Some("app.aab".to_string()), b"stale".to_vec()),
                ],
            )
            .await
            .unwrap();
        let request = PackageRequest {
            build_id,
            config: BuildConfig::new("Demo", 4),
            inputs,
        };
        let packager = CommandPackager::new("sh", vec!["-c".to_string(), "true".to_string()]);

        let err = packager.package(&request).await.unwrap_err();
        assert!(matches!(err, ExecutionError::MissingOutput(_)));
    }

    #[tokio::test]
    async fn test_command_packager_missing_program() {
        let tmp = tempfile::tempdir().unwrap();
        let request = request(tmp.path()).await;
        let packager = CommandPackager::new("/nonexistent/playpub-packager", Vec::new());

        let err = packager.package(&request).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Io(_)));
    }
}
