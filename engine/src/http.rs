//! HTTP adapters for the fieldsync document server.
//!
//! [`HttpRemote`] implements [`RemoteStore`] and [`HttpAttachmentStore`]
//! implements [`AttachmentStore`] against the REST API served by
//! `fieldsync-server`:
//!
//! | Call        | Request                                                   |
//! |-------------|-----------------------------------------------------------|
//! | add         | `POST  /users/{uid}/collections/{collection}`             |
//! | update      | `PUT   /users/{uid}/collections/{collection}/{docId}`     |
//! | merge       | `PATCH /users/{uid}/collections/{collection}/{docId}`     |
//! | updated_at  | `GET   /users/{uid}/collections/{collection}/{docId}`     |
//! | upload      | `PUT   /attachments/{path}`                               |

use crate::attachments::AttachmentStore;
use crate::remote::RemoteStore;
use crate::{error::Result, DocId, Error, Payload, Timestamp};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

/// Response body of `add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddResponse {
    pub id: DocId,
}

/// A document as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: DocId,
    pub fields: Payload,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Response body of an attachment upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Debug, Clone)]
struct Endpoint {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl Endpoint {
    fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Remote document store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    endpoint: Endpoint,
}

impl HttpRemote {
    pub fn new(base_url: &str) -> Self {
        Self {
            endpoint: Endpoint::new(base_url),
        }
    }

    /// Send `token` as a bearer token on every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.endpoint.token = Some(token.into());
        self
    }

    /// URL of a collection in a user's namespace.
    pub fn collection_url(&self, user_id: &str, collection: &str) -> String {
        format!(
            "{}/users/{}/collections/{}",
            self.endpoint.base_url, user_id, collection
        )
    }

    /// URL of a single document.
    pub fn document_url(&self, user_id: &str, collection: &str, doc_id: &str) -> String {
        format!("{}/{}", self.collection_url(user_id, collection), doc_id)
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn add(&self, user_id: &str, collection: &str, payload: Payload) -> Result<DocId> {
        let request = self
            .endpoint
            .client
            .post(self.collection_url(user_id, collection))
            .json(&payload);
        let response = self
            .endpoint
            .authorize(request)
            .send()
            .await?
            .error_for_status()?;
        let body: AddResponse = response.json().await?;
        Ok(body.id)
    }

    async fn update(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
        payload: Payload,
    ) -> Result<()> {
        let request = self
            .endpoint
            .client
            .put(self.document_url(user_id, collection, doc_id))
            .json(&payload);
        let response = self.endpoint.authorize(request).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::DocumentNotFound {
                collection: collection.into(),
                doc_id: doc_id.into(),
            });
        }
        response.error_for_status()?;
        Ok(())
    }

    async fn merge(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
        payload: Payload,
    ) -> Result<()> {
        let request = self
            .endpoint
            .client
            .patch(self.document_url(user_id, collection, doc_id))
            .json(&payload);
        self.endpoint
            .authorize(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn updated_at(
        &self,
        user_id: &str,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<Timestamp>> {
        let request = self
            .endpoint
            .client
            .get(self.document_url(user_id, collection, doc_id));
        let response = self.endpoint.authorize(request).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document: DocumentResponse = response.error_for_status()?.json().await?;
        Ok(Some(document.updated_at))
    }
}

/// Attachment store reached over HTTP; reads local files from disk.
#[derive(Debug, Clone)]
pub struct HttpAttachmentStore {
    endpoint: Endpoint,
}

impl HttpAttachmentStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            endpoint: Endpoint::new(base_url),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.endpoint.token = Some(token.into());
        self
    }

    /// Upload URL for a remote path.
    pub fn upload_url(&self, remote_path: &str) -> String {
        format!(
            "{}/attachments/{}",
            self.endpoint.base_url,
            remote_path.trim_start_matches('/')
        )
    }
}

/// Filesystem path behind a local reference (plain path or `file://` URI).
pub fn local_path(local_ref: &str) -> &str {
    local_ref.strip_prefix("file://").unwrap_or(local_ref)
}

#[async_trait]
impl AttachmentStore for HttpAttachmentStore {
    async fn upload(&self, remote_path: &str, local_ref: &str) -> Result<String> {
        let bytes = tokio::fs::read(local_path(local_ref))
            .await
            .map_err(|e| Error::Attachment {
                field: remote_path.into(),
                reason: e.to_string(),
            })?;
        let request = self
            .endpoint
            .client
            .put(self.upload_url(remote_path))
            .body(bytes);
        let response = self
            .endpoint
            .authorize(request)
            .send()
            .await?
            .error_for_status()?;
        let body: UploadResponse = response.json().await?;
        Ok(body.url)
    }
}
