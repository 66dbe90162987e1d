use crate::sink::{BatchResponse, SinkError, StreamSink};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenSearch sink: each destination stream is an index.
///
/// Batches go through the `_bulk` API, whose per-item statuses tell the
/// hook exactly which records were rejected.
#[derive(Clone)]
pub struct OpenSearchSink {
    client: Client,
    /// Base URL of the OpenSearch cluster, e.g. "http://localhost:9200".
    base_url: String,
}

impl OpenSearchSink {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(OpenSearchSink {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn doc_url(&self, index: &str) -> String {
        format!("{}/{}/_doc", self.base_url, urlencoding::encode(index))
    }

    fn bulk_url(&self) -> String {
        format!("{}/_bulk", self.base_url)
    }
}

/// NDJSON body for the `_bulk` API: an index action line followed by
/// the document for every record.
pub fn bulk_body(index: &str, records: &[Vec<u8>]) -> Result<Vec<u8>, serde_json::Error> {
    let action = serde_json::to_vec(&serde_json::json!({ "index": { "_index": index } }))?;
    let mut body = Vec::new();
    for record in records {
        body.extend_from_slice(&action);
        body.push(b'\n');
        body.extend_from_slice(trim_newline(record));
        body.push(b'\n');
    }
    Ok(body)
}

fn trim_newline(data: &[u8]) -> &[u8] {
    data.strip_suffix(b"\n").unwrap_or(data)
}

#[derive(Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Deserialize)]
struct BulkItem {
    status: u16,
}

/// Read the indices of rejected documents out of a `_bulk` response.
pub fn parse_bulk_response(body: &[u8]) -> Result<BatchResponse, serde_json::Error> {
    let resp: BulkResponse = serde_json::from_slice(body)?;
    if !resp.errors {
        return Ok(BatchResponse::success());
    }
    let failed = resp
        .items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.values().any(|op| op.status >= 300))
        .map(|(idx, _)| idx)
        .collect();
    Ok(BatchResponse::from_failed_indices(failed))
}

#[async_trait]
impl StreamSink for OpenSearchSink {
    async fn put_record(&self, destination: &str, data: &[u8]) -> Result<(), SinkError> {
        let resp = self
            .client
            .post(self.doc_url(destination))
            .header("Content-Type", "application/json")
            .body(trim_newline(data).to_vec())
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(format!("OpenSearch index failed with status {}: {}", status, text).into())
        }
    }

    async fn put_record_batch(
        &self,
        destination: &str,
        records: &[Vec<u8>],
    ) -> Result<BatchResponse, SinkError> {
        let body = bulk_body(destination, records)?;
        let resp = self
            .client
            .post(self.bulk_url())
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(format!("OpenSearch bulk insert failed with status {}: {}", status, text).into());
        }
        Ok(parse_bulk_response(&bytes)?)
    }
}
