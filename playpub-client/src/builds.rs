//! Build-related API endpoints

use playpub_core::domain::build::BuildJob;
use playpub_core::domain::config::BuildConfig;
use playpub_core::dto::build::{BuildList, BuildSummary, MessageResponse, SubmitBuildResponse};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use uuid::Uuid;

use crate::PublisherClient;
use crate::error::{ClientError, Result};

/// A file sent with a build submission
#[derive(Debug, Clone)]
pub struct BuildUpload {
    pub file_name: String,
    pub data: Vec<u8>,
}

impl BuildUpload {
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            data,
        }
    }

    fn into_part(self) -> Part {
        Part::bytes(self.data).file_name(self.file_name)
    }
}

/// The bundle of a completed build
#[derive(Debug, Clone)]
pub struct Artifact {
    /// File name suggested by the server
    pub file_name: String,
    pub data: Vec<u8>,
}

const CONFIG_FIELD: &str = "config";
const APK_FIELD: &str = "apkFile";
const KEYSTORE_FIELD: &str = "keyStoreFile";

impl PublisherClient {
    /// Submit a build
    ///
    /// `extra` holds additional input files as `(field name, file)` pairs.
    /// The server answers immediately with the new build id; the build itself
    /// runs in the background.
    pub async fn submit_build(
        &self,
        config: &BuildConfig,
        apk: BuildUpload,
        keystore: Option<BuildUpload>,
        extra: Vec<(String, BuildUpload)>,
    ) -> Result<SubmitBuildResponse> {
        let config = serde_json::to_string(config)
            .map_err(|e| ClientError::InvalidRequest(format!("Failed to encode config: {}", e)))?;

        let mut form = Form::new()
            .text(CONFIG_FIELD, config)
            .part(APK_FIELD, apk.into_part());
        if let Some(keystore) = keystore {
            form = form.part(KEYSTORE_FIELD, keystore.into_part());
        }
        for (field, upload) in extra {
            if field.is_empty() || [CONFIG_FIELD, APK_FIELD, KEYSTORE_FIELD].contains(&field.as_str()) {
                return Err(ClientError::InvalidRequest(format!(
                    "'{}' cannot be used as an extra input field",
                    field
                )));
            }
            form = form.part(field, upload.into_part());
        }

        let url = format!("{}/api/generate-aab", self.base_url);
        tracing::debug!("Submitting build to {}", url);
        let response = self.client.post(&url).multipart(form).send().await?;

        self.handle_response(response).await
    }

    /// Get the current snapshot of a build
    pub async fn get_build(&self, build_id: Uuid) -> Result<BuildJob> {
        let url = format!("{}/api/build/{}", self.base_url, build_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List all builds, most recent first
    pub async fn list_builds(&self) -> Result<Vec<BuildSummary>> {
        let url = format!("{}/api/builds", self.base_url);
        let response = self.client.get(&url).send().await?;

        let list: BuildList = self.handle_response(response).await?;
        Ok(list.builds)
    }

    /// Download the bundle of a completed build
    ///
    /// Builds that are not `COMPLETED` answer 400.
    pub async fn download_artifact(&self, build_id: Uuid) -> Result<Artifact> {
        let url = format!("{}/api/build/{}/artifact", self.base_url, build_id);
        let response = self.check_status(self.client.get(&url).send().await?).await?;

        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(attachment_file_name)
            .unwrap_or_else(|| format!("{}.aab", build_id));
        let data = response.bytes().await?.to_vec();

        tracing::debug!("Downloaded {} bytes for build {}", data.len(), build_id);
        Ok(Artifact { file_name, data })
    }

    /// Cancel a build; finished builds are returned unchanged
    pub async fn cancel_build(&self, build_id: Uuid) -> Result<BuildJob> {
        let url = format!("{}/api/build/{}/cancel", self.base_url, build_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Delete a build and its files
    pub async fn delete_build(&self, build_id: Uuid) -> Result<String> {
        let url = format!("{}/api/build/{}", self.base_url, build_id);
        let response = self.client.delete(&url).send().await?;

        let body: MessageResponse = self.handle_response(response).await?;
        Ok(body.message)
    }
}

/// File name from an `attachment; filename="..."` header, without any path
fn attachment_file_name(header: &str) -> Option<String> {
    let value = header
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("filename="))?;
    let name = value.trim_matches('"');
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);

    (!name.is_empty() && name != "." && name != "..").then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_file_name() {
        assert_eq!(
            attachment_file_name("attachment; filename=\"Demo.aab\"").as_deref(),
            Some("Demo.aab")
        );
        assert_eq!(
            attachment_file_name("attachment; filename=plain.aab").as_deref(),
            Some("plain.aab")
        );
        assert_eq!(
            attachment_file_name("attachment; filename=\"../../etc/x.aab\"").as_deref(),
            Some("x.aab")
        );
        assert_eq!(attachment_file_name("attachment"), None);
        assert_eq!(attachment_file_name("attachment; filename=\"\""), None);
    }
}
