use crate::error::EngineError;
use crate::models::{EngineDocument, EngineHit, EngineIndex};
use crate::progress::ProgressSink;
use crate::traits::IndexEngine;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

const BACKEND: &str = "index-service";

/// Client for a multimodal index service that embeds page images
/// (ColPali-style) and serves late-interaction search over them.
///
/// Builds go through a staging area on the service: documents are uploaded
/// into it one by one and only the final commit replaces the live index, so
/// a build that fails part-way leaves the previous index searchable.
pub struct HttpIndexEngine {
    client: Client,
    endpoint: Url,
}

impl HttpIndexEngine {
    pub fn new(endpoint: &str) -> Result<Self, EngineError> {
        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            client: Client::new(),
            endpoint,
        })
    }

    fn index_url(&self, name: &str, suffix: &str) -> Result<Url, EngineError> {
        Ok(self.endpoint.join(&format!("indexes/{name}{suffix}"))?)
    }

    async fn open_staging(&self, name: &str) -> Result<String, EngineError> {
        let response = self
            .client
            .post(self.index_url(name, "/staging")?)
            .json(&json!({}))
            .send()
            .await?;
        let opened = check_status(response).await?.json::<Value>().await?;
        opened
            .pointer("/staging_id")
            .and_then(value_to_ref)
            .ok_or_else(|| EngineError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("no staging_id returned for index {name}"),
            })
    }

    async fn stage_documents(
        &self,
        name: &str,
        staging_id: &str,
        documents: &[EngineDocument],
        progress: &dyn ProgressSink,
    ) -> Result<Vec<String>, EngineError> {
        let documents_url = self.index_url(name, &format!("/staging/{staging_id}/documents"))?;
        let mut document_refs = Vec::with_capacity(documents.len());

        for (position, document) in documents.iter().enumerate() {
            let path = document.path.to_string_lossy().to_string();
            progress.report(position + 1, documents.len(), &path);

            let pages: Vec<String> = document.pages.iter().map(|page| page.to_base64()).collect();
            let response = self
                .client
                .post(documents_url.clone())
                .json(&json!({
                    "path": path,
                    "pages": pages,
                    "store_collection_with_index": true,
                }))
                .send()
                .await?;
            let added = check_status(response).await?.json::<Value>().await?;

            let document_ref = added
                .pointer("/document_ref")
                .and_then(value_to_ref)
                .ok_or_else(|| EngineError::BackendResponse {
                    backend: BACKEND.to_string(),
                    details: format!("no document_ref returned for {path}"),
                })?;
            debug!(path = %path, document_ref = %document_ref, pages = pages.len(), "document staged");
            document_refs.push(document_ref);
        }

        Ok(document_refs)
    }

    async fn commit(&self, name: &str, staging_id: &str, overwrite: bool) -> Result<(), EngineError> {
        let response = self
            .client
            .post(self.index_url(name, "/commit")?)
            .json(&json!({ "staging_id": staging_id, "overwrite": overwrite }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Best effort: the service is free to expire abandoned staging areas.
    async fn discard_staging(&self, name: &str, staging_id: &str) {
        let url = match self.index_url(name, &format!("/staging/{staging_id}")) {
            Ok(url) => url,
            Err(error) => {
                warn!(staging_id, error = %error, "cannot address staging area");
                return;
            }
        };

        let outcome = match self.client.delete(url).send().await {
            Ok(response) => check_status(response).await.map(drop),
            Err(error) => Err(error.into()),
        };
        if let Err(error) = outcome {
            warn!(staging_id, error = %error, "failed to discard staging area");
        }
    }
}

#[async_trait]
impl IndexEngine for HttpIndexEngine {
    async fn build_index(
        &self,
        name: &str,
        documents: &[EngineDocument],
        overwrite: bool,
        progress: &dyn ProgressSink,
    ) -> Result<EngineIndex, EngineError> {
        let staging_id = self.open_staging(name).await?;

        let staged = match self
            .stage_documents(name, &staging_id, documents, progress)
            .await
        {
            Ok(refs) => self.commit(name, &staging_id, overwrite).await.map(|()| refs),
            Err(error) => Err(error),
        };

        match staged {
            Ok(document_refs) => {
                debug!(index = name, staging_id = %staging_id, documents = document_refs.len(), "index committed");
                Ok(EngineIndex {
                    id: name.to_string(),
                    document_refs,
                })
            }
            Err(error) => {
                self.discard_staging(name, &staging_id).await;
                Err(error)
            }
        }
    }

    async fn search(
        &self,
        index: &EngineIndex,
        query: &str,
        k: usize,
    ) -> Result<Vec<EngineHit>, EngineError> {
        let response = self
            .client
            .post(self.index_url(&index.id, "/search")?)
            .json(&json!({ "query": query, "k": k }))
            .send()
            .await?;
        let parsed = check_status(response).await?.json::<Value>().await?;
        parse_search_results(&parsed)
    }
}

async fn check_status(response: Response) -> Result<Response, EngineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(EngineError::BackendResponse {
        backend: BACKEND.to_string(),
        details: format!("{status}: {}", body.trim()),
    })
}

/// Document refs may come back as strings or as integer ids.
fn value_to_ref(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Entries missing a ref, an integral page number or a score are skipped,
/// the same way unresolvable hits are dropped after the search.
fn parse_search_results(parsed: &Value) -> Result<Vec<EngineHit>, EngineError> {
    let results = parsed
        .pointer("/results")
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "search response has no results array".to_string(),
        })?;

    let mut hits = Vec::with_capacity(results.len());
    for result in results {
        let document_ref = result
            .pointer("/doc_ref")
            .or_else(|| result.pointer("/doc_id"))
            .and_then(value_to_ref);
        let page_number = result
            .pointer("/page_num")
            .and_then(Value::as_u64)
            .and_then(|page| u32::try_from(page).ok());
        let score = result.pointer("/score").and_then(Value::as_f64);

        let (Some(document_ref), Some(page_number), Some(score)) = (document_ref, page_number, score)
        else {
            warn!(result = %result, "skipping malformed search result");
            continue;
        };

        hits.push(EngineHit {
            document_ref,
            page_number,
            score,
            page_image: result
                .pointer("/base64")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }

    Ok(hits)
}
