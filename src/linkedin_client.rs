use std::fs;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::post::{validate_image, PostContent, Visibility};

pub const LINKEDIN_VERSION: &str = "202504";
const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";
const POST_URL_PREFIX: &str = "https://www.linkedin.com/feed/update/";

pub fn build_http_client(timeout: Duration) -> AppResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("linkedin-post/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(AppError::from)
}

pub fn post_url(post_id: &str) -> String {
    format!("{}{}/", POST_URL_PREFIX, post_id)
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeUploadRequest<'a> {
    initialize_upload_request: UploadOwner<'a>,
}

#[derive(Serialize)]
struct UploadOwner<'a> {
    owner: &'a str,
}

#[derive(Deserialize)]
struct InitializeUploadResponse {
    value: UploadTarget,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadTarget {
    upload_url: String,
    image: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SharePayload<'a> {
    author: String,
    lifecycle_state: &'static str,
    visibility: Visibility,
    commentary: &'a str,
    distribution: Distribution,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<ShareContent<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Distribution {
    feed_distribution: &'static str,
    target_entities: Vec<String>,
    third_party_distribution_channels: Vec<String>,
}

#[derive(Serialize, Debug)]
struct ShareContent<'a> {
    media: Media<'a>,
}

#[derive(Serialize, Debug)]
struct Media<'a> {
    id: &'a str,
}

impl<'a> SharePayload<'a> {
    pub(crate) fn new(author: String, post: &'a PostContent, image_urn: Option<&'a str>) -> Self {
        Self {
            author,
            lifecycle_state: "PUBLISHED",
            visibility: post.visibility,
            commentary: &post.text,
            distribution: Distribution {
                feed_distribution: "MAIN_FEED",
                target_entities: Vec::new(),
                third_party_distribution_channels: Vec::new(),
            },
            content: image_urn.map(|id| ShareContent { media: Media { id } }),
        }
    }
}

/// Authenticated client for the LinkedIn REST API.
pub struct LinkedInClient {
    http: Client,
    base_url: String,
    access_token: String,
    user_id: Option<String>,
}

impl LinkedInClient {
    pub fn new(http: Client, base_url: &str, access_token: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            user_id: None,
        }
    }

    /// The member id (`sub` claim) behind the token. Doubles as the token
    /// validity check, so a 401 here means the cached token is dead.
    pub fn user_id(&mut self) -> AppResult<String> {
        if let Some(user_id) = &self.user_id {
            return Ok(user_id.clone());
        }

        let response = self
            .http
            .get(format!("{}/v2/userinfo", self.base_url))
            .bearer_auth(&self.access_token)
            .send()?;
        let info: UserInfo = check_status(response)?.json()?;

        log::debug!("Resolved LinkedIn member id");
        self.user_id = Some(info.sub.clone());
        Ok(info.sub)
    }

    fn author_urn(&mut self) -> AppResult<String> {
        Ok(format!("urn:li:person:{}", self.user_id()?))
    }

    /// Registers the upload, then PUTs the bytes. Returns the image URN.
    pub fn upload_image(&mut self, path: &Path) -> AppResult<String> {
        let content_type = validate_image(path)?;
        let owner = self.author_urn()?;

        let request = InitializeUploadRequest {
            initialize_upload_request: UploadOwner { owner: &owner },
        };
        let response = self
            .rest(self.http.post(format!(
                "{}/rest/images?action=initializeUpload",
                self.base_url
            )))
            .json(&request)
            .send()?;
        let target = check_status(response)?.json::<InitializeUploadResponse>()?.value;

        log::info!("Uploading {}", path.display());
        let bytes = fs::read(path)?;
        let response = self
            .http
            .put(&target.upload_url)
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()?;
        check_status(response)?;

        Ok(target.image)
    }

    /// Creates the share and returns its URN.
    pub fn publish(&mut self, post: &PostContent, image_urn: Option<&str>) -> AppResult<String> {
        let payload = SharePayload::new(self.author_urn()?, post, image_urn);
        log::debug!("Publishing {:?} post", post.visibility);

        let response = self
            .rest(self.http.post(format!("{}/rest/posts", self.base_url)))
            .json(&payload)
            .send()?;
        let response = check_status(response)?;

        let post_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if post_id.is_empty() {
            log::warn!("Share created but the response carried no x-restli-id header");
        }
        Ok(post_id)
    }

    fn rest(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.access_token)
            .header("LinkedIn-Version", LINKEDIN_VERSION)
            .header("X-Restli-Protocol-Version", RESTLI_PROTOCOL_VERSION)
    }
}

fn check_status(response: Response) -> AppResult<Response> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(AppError::Unauthorized);
    }
    if !status.is_success() {
        let body = response
            .text()
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(AppError::ProviderRejected {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
