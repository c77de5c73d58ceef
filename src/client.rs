use crate::config::Credentials;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::time::Duration;

const API_BASE: &str = "https://api.minimaxi.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneAccepted {
    pub status_message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("missing MiniMax credentials")]
    MissingCredentials,
    #[error("failed to read {}: {source}", .path.display())]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} failed: status {status}, body: {body}")]
    Status {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("failed to decode {operation} response: {source}")]
    Decode {
        operation: &'static str,
        source: serde_json::Error,
    },
    #[error("minimax {operation} failed: {code} {message}")]
    Remote {
        operation: &'static str,
        code: i64,
        message: String,
    },
}

/// The two remote calls a clone job needs.
pub trait VoiceService: Send + Sync {
    fn upload(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<UploadedFile, ClientError>> + Send;

    fn clone_voice(
        &self,
        file_id: i64,
        voice_id: &str,
    ) -> impl Future<Output = Result<CloneAccepted, ClientError>> + Send;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BaseResp {
    status_code: i64,
    status_msg: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    file: Option<UploadedFileBody>,
    #[serde(default)]
    base_resp: BaseResp,
}

#[derive(Debug, Deserialize)]
struct UploadedFileBody {
    file_id: i64,
}

#[derive(Debug, Deserialize)]
struct CloneResponse {
    #[serde(default)]
    base_resp: BaseResp,
}

#[derive(Debug, Serialize)]
struct CloneRequest<'a> {
    file_id: i64,
    voice_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct MinimaxClient {
    http: reqwest::Client,
    credentials: Credentials,
    base_url: String,
}

impl MinimaxClient {
    pub fn new(credentials: Credentials) -> Result<Self, ClientError> {
        Self::with_base_url(credentials, API_BASE)
    }

    pub fn with_base_url(
        credentials: Credentials,
        base_url: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            credentials,
            base_url: base_url.into(),
        })
    }

    fn bearer(&self) -> Result<String, ClientError> {
        if !self.credentials.is_complete() {
            return Err(ClientError::MissingCredentials);
        }
        Ok(format!("Bearer {}", self.credentials.secret.trim()))
    }
}

impl VoiceService for MinimaxClient {
    async fn upload(&self, path: &Path) -> Result<UploadedFile, ClientError> {
        let bearer = self.bearer()?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let form = Form::new()
            .text("purpose", "voice_clone")
            .part("file", Part::bytes(bytes).file_name(file_name));

        let response = self
            .http
            .post(format!("{}/files/upload", self.base_url))
            .header(reqwest::header::AUTHORIZATION, bearer)
            .multipart(form)
            .send()
            .await?;
        let parsed: UploadResponse = decode("upload", response).await?;
        check_base("upload", &parsed.base_resp)?;
        let file = parsed.file.ok_or_else(|| ClientError::Remote {
            operation: "upload",
            code: parsed.base_resp.status_code,
            message: "response carried no file".to_string(),
        })?;
        Ok(UploadedFile {
            file_id: file.file_id,
        })
    }

    async fn clone_voice(&self, file_id: i64, voice_id: &str) -> Result<CloneAccepted, ClientError> {
        let bearer = self.bearer()?;
        let response = self
            .http
            .post(format!("{}/voice_clone", self.base_url))
            .query(&[("GroupId", self.credentials.group_id.trim())])
            .header(reqwest::header::AUTHORIZATION, bearer)
            .json(&CloneRequest { file_id, voice_id })
            .send()
            .await?;
        let parsed: CloneResponse = decode("clone", response).await?;
        check_base("clone", &parsed.base_resp)?;
        Ok(CloneAccepted {
            status_message: parsed.base_resp.status_msg,
        })
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await?;
    if status != StatusCode::OK {
        return Err(ClientError::Status {
            operation,
            status,
            body,
        });
    }
    serde_json::from_str(&body).map_err(|source| ClientError::Decode { operation, source })
}

fn check_base(operation: &'static str, base: &BaseResp) -> Result<(), ClientError> {
    if base.status_code != 0 {
        return Err(ClientError::Remote {
            operation,
            code: base.status_code,
            message: base.status_msg.clone(),
        });
    }
    Ok(())
}
