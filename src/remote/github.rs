use super::RemoteStore;
use crate::codec;
use crate::errors::RemoteError;
use crate::models::{Credentials, RemoteDocument, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_DATA_PATH: &str = "body-tracker.json";

const USER_AGENT: &str = concat!("body-tracker/", env!("CARGO_PKG_VERSION"));
const COMMIT_MESSAGE: &str = "Update body tracker data";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: Option<ContentRef>,
}

#[derive(Debug, Deserialize)]
struct ContentRef {
    sha: String,
}

/// Snapshot stored as a JSON file in a GitHub repository. The blob sha is
/// the version token.
pub struct GithubStore {
    client: Client,
    api_url: String,
    owner: String,
    repo: String,
    path: String,
    token: String,
}

impl GithubStore {
    pub fn new(
        api_url: impl Into<String>,
        path: impl Into<String>,
        credentials: &Credentials,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| RemoteError::Client(err.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            owner: credentials.owner.clone(),
            repo: credentials.repo.clone(),
            path: path.into().trim_start_matches('/').to_string(),
            token: credentials.token.clone(),
        })
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url, self.owner, self.repo, self.path
        )
    }

    fn commits_url(&self) -> String {
        format!("{}/repos/{}/{}/commits", self.api_url, self.owner, self.repo)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/vnd.github+json")
    }
}

#[async_trait]
impl RemoteStore for GithubStore {
    async fn fetch(&self) -> Result<Option<RemoteDocument>, RemoteError> {
        let response = self.authorized(self.client.get(self.contents_url())).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(path = %self.path, "remote document does not exist yet");
            return Ok(None);
        }
        let response = check_status(response).await?;
        let body: ContentsResponse = response.json().await?;
        let snapshot = codec::decode_content(&body.content)?;
        Ok(Some(RemoteDocument {
            snapshot,
            version: Some(body.sha),
        }))
    }

    async fn store(
        &self,
        snapshot: &Snapshot,
        version: Option<&str>,
    ) -> Result<Option<String>, RemoteError> {
        let payload = PutContentsRequest {
            message: COMMIT_MESSAGE,
            content: codec::encode_content(snapshot)?,
            sha: version,
        };
        let response = self
            .authorized(self.client.put(self.contents_url()))
            .json(&payload)
            .send()
            .await?;
        // 409: sha no longer matches; 422: file exists but no sha was sent.
        if matches!(
            response.status(),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            return Err(RemoteError::Conflict);
        }
        let response = check_status(response).await?;
        let body: PutContentsResponse = response.json().await?;
        Ok(body.content.map(|content| content.sha))
    }

    async fn commits_since(&self, since: DateTime<Utc>) -> Result<u64, RemoteError> {
        let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let response = self
            .authorized(self.client.get(self.commits_url()))
            .query(&[("since", since.as_str()), ("per_page", "1")])
            .send()
            .await?;
        let response = check_status(response).await?;

        let last_page = response
            .headers()
            .get(header::LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(last_page_number);
        if let Some(count) = last_page {
            return Ok(count);
        }
        let page: Vec<serde_json::Value> = response.json().await?;
        Ok(page.len() as u64)
    }
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(RemoteError::Unauthorized);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

/// With one item per page, the `page` of the `rel="last"` link is the total.
fn last_page_number(link: &str) -> Option<u64> {
    link.split(',')
        .find(|part| part.contains(r#"rel="last""#))
        .and_then(|part| {
            let start = part.find('<')? + 1;
            let end = part.find('>')?;
            Url::parse(part.get(start..end)?).ok()
        })
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "page")
                .and_then(|(_, value)| value.parse().ok())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_page_is_read_from_link_header() {
        let link = concat!(
            r#"<https://api.github.com/repositories/1/commits?per_page=1&page=2>; rel="next", "#,
            r#"<https://api.github.com/repositories/1/commits?per_page=1&page=14>; rel="last""#,
        );
        assert_eq!(last_page_number(link), Some(14));
    }

    #[test]
    fn link_without_last_has_no_count() {
        let link = r#"<https://api.github.com/repositories/1/commits?page=1>; rel="prev""#;
        assert_eq!(last_page_number(link), None);
    }

    #[test]
    fn urls_are_built_from_credentials() {
        let creds = Credentials {
            token: "t".to_string(),
            owner: "octo".to_string(),
            repo: "health".to_string(),
            connected: true,
        };
        let store = GithubStore::new("http://localhost:9000/", "/data/log.json", &creds).unwrap();
        assert_eq!(
            store.contents_url(),
            "http://localhost:9000/repos/octo/health/contents/data/log.json"
        );
        assert_eq!(store.commits_url(), "http://localhost:9000/repos/octo/health/commits");
    }
}
