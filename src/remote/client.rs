use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::TaskRemote;
use crate::config::Config;
use crate::error::{Operation, SyncError};
use crate::task::{CreateTaskInput, StatusPatch, Task, TaskId, TaskStatus};

/// HTTP client for the task service.
#[derive(Clone)]
pub struct HttpTaskClient {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTaskClient {
  pub fn new(config: &Config) -> color_eyre::Result<Self> {
    Self::with_timeout(&config.server.url, config.server.timeout())
  }

  pub fn with_timeout(base_url: &str, timeout: Duration) -> color_eyre::Result<Self> {
    let base_url = normalize_base(base_url)?;
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| color_eyre::eyre::eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }

  /// URL for `segments` below the base. Each segment is percent-encoded
  /// as a single path segment, so ids cannot add path, query or fragment
  /// parts of their own.
  fn endpoint(&self, operation: Operation, segments: &[&str]) -> Result<Url, SyncError> {
    let mut url = self.base_url.clone();
    if segments.is_empty() {
      return Ok(url);
    }
    url
      .path_segments_mut()
      .map_err(|_| {
        SyncError::remote(operation, format!("base URL '{}' cannot have a path", self.base_url))
      })?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  async fn send(
    &self,
    operation: Operation,
    request: reqwest::RequestBuilder,
  ) -> Result<Response, SyncError> {
    let response = request
      .send()
      .await
      .map_err(|e| SyncError::remote(operation, e.to_string()))?;

    check_status(operation, response.status())?;
    Ok(response)
  }
}

/// Make sure the base URL ends with a slash; the list and create calls go to
/// the base itself.
fn normalize_base(base_url: &str) -> color_eyre::Result<Url> {
  let mut raw = base_url.trim().to_string();
  if !raw.ends_with('/') {
    raw.push('/');
  }
  Url::parse(&raw).map_err(|e| color_eyre::eyre::eyre!("Invalid server URL '{}': {}", base_url, e))
}

fn check_status(operation: Operation, status: StatusCode) -> Result<(), SyncError> {
  if status.is_success() {
    Ok(())
  } else {
    Err(SyncError::remote(operation, status.to_string()))
  }
}

async fn decode<T: DeserializeOwned>(operation: Operation, response: Response) -> Result<T, SyncError> {
  response.json::<T>().await.map_err(|e| SyncError::Decode {
    operation,
    message: e.to_string(),
  })
}

impl TaskRemote for HttpTaskClient {
  async fn list(&self) -> Result<Vec<Task>, SyncError> {
    let url = self.endpoint(Operation::List, &[])?;
    let response = self.send(Operation::List, self.client.get(url)).await?;
    decode(Operation::List, response).await
  }

  async fn create(&self, input: &CreateTaskInput) -> Result<Task, SyncError> {
    let url = self.endpoint(Operation::Create, &[])?;
    let response = self
      .send(Operation::Create, self.client.post(url).json(input))
      .await?;
    decode(Operation::Create, response).await
  }

  async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<Task, SyncError> {
    let url = self.endpoint(Operation::UpdateStatus, &[id.as_str(), "status"])?;
    let response = self
      .send(
        Operation::UpdateStatus,
        self.client.patch(url).json(&StatusPatch { status }),
      )
      .await?;
    decode(Operation::UpdateStatus, response).await
  }

  async fn delete(&self, id: &TaskId) -> Result<(), SyncError> {
    let url = self.endpoint(Operation::Delete, &[id.as_str()])?;
    self.send(Operation::Delete, self.client.delete(url)).await?;
    Ok(())
  }
}
