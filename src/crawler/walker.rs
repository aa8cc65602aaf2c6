//! Tree walker - discovery of Notion children, rows and metadata
//!
//! All calls go through the rate-limited transport, so a 429 never surfaces
//! here. Every other failure is returned to the caller, which decides whether
//! it is fatal (unresolvable root) or recorded and skipped (any other node).

use crate::crawler::parser::{
    first_result, parse_children_page, parse_collection_title, parse_metadata, parse_rows_page,
    ChildRef, RawMetadata,
};
use crate::state::Watermark;
use crate::transport::{ApiRequest, RateLimitedClient};
use crate::{HarvestError, Result};
use serde_json::{json, Value};

/// What an opaque Notion id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Page,
    Collection,
    Unresolved,
}

/// Watermarks of a resolved node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMetadata {
    pub id: String,
    pub kind: NodeKind,
    pub created_at: Watermark,
    pub modified_at: Watermark,
}

impl NodeMetadata {
    fn from_raw(id: &str, kind: NodeKind, raw: RawMetadata) -> Self {
        Self {
            id: id.to_string(),
            kind,
            created_at: raw.created_time.map_or(Watermark::Unknown, Watermark::At),
            modified_at: raw.last_edited_time.map_or(Watermark::Unknown, Watermark::At),
        }
    }
}

/// Paginated discovery over the Notion API
#[derive(Debug, Clone)]
pub struct TreeWalker {
    client: RateLimitedClient,
    page_size: u32,
}

impl TreeWalker {
    /// Creates a walker
    ///
    /// # Arguments
    ///
    /// * `client` - The rate-limited Notion transport
    /// * `page_size` - Items requested per page (Notion caps this at 100)
    pub fn new(client: RateLimitedClient, page_size: u32) -> Self {
        Self { client, page_size }
    }

    /// Lists the immediate children of a page
    ///
    /// Follows `next_cursor` until exhausted.
    ///
    /// # Returns
    ///
    /// `(sub_pages, sub_collections)` in the order Notion returned them
    pub async fn list_children(&self, node_id: &str) -> Result<(Vec<ChildRef>, Vec<ChildRef>)> {
        let mut sub_pages = Vec::new();
        let mut sub_collections = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = ApiRequest::get(format!("blocks/{}/children", node_id))
                .with_query("page_size", self.page_size);
            if let Some(cursor) = &cursor {
                request = request.with_query("start_cursor", cursor);
            }

            let body = self.client.send_json(&request).await?;
            let page = parse_children_page(&body).map_err(|e| self.protocol_error(&request, e))?;

            sub_pages.extend(page.sub_pages);
            sub_collections.extend(page.sub_collections);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::debug!(
            "{} has {} sub-pages and {} sub-collections",
            node_id,
            sub_pages.len(),
            sub_collections.len()
        );

        Ok((sub_pages, sub_collections))
    }

    /// Lists the ids of every page row in a collection
    pub async fn list_collection_rows(&self, collection_id: &str) -> Result<Vec<String>> {
        let mut rows = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut payload = json!({ "page_size": self.page_size });
            if let Some(cursor) = &cursor {
                payload["start_cursor"] = json!(cursor);
            }
            let request = ApiRequest::post(format!("databases/{}/query", collection_id), payload);

            let body = self.client.send_json(&request).await?;
            let page = parse_rows_page(&body).map_err(|e| self.protocol_error(&request, e))?;
            rows.extend(page.row_ids);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::debug!("Collection {} has {} rows", collection_id, rows.len());
        Ok(rows)
    }

    /// Classifies an id by probing the page endpoint, then the database endpoint
    pub async fn resolve(&self, id: &str) -> NodeKind {
        match self.probe(id).await {
            Some((kind, _)) => kind,
            None => NodeKind::Unresolved,
        }
    }

    /// Resolves an id and returns its watermark pair
    ///
    /// # Returns
    ///
    /// `HarvestError::UnresolvedId` when neither endpoint answers successfully
    pub async fn fetch_metadata(&self, id: &str) -> Result<NodeMetadata> {
        let (kind, body) = self
            .probe(id)
            .await
            .ok_or_else(|| HarvestError::UnresolvedId(id.to_string()))?;

        let raw = parse_metadata(&body).map_err(|e| HarvestError::Protocol {
            url: self.client.url_for(&endpoint_for(kind, id)),
            message: e.to_string(),
        })?;

        Ok(NodeMetadata::from_raw(id, kind, raw))
    }

    /// Probes the database endpoint, returning its watermarks on success
    pub async fn probe_collection(&self, id: &str) -> Option<NodeMetadata> {
        let body = self.try_get(&endpoint_for(NodeKind::Collection, id)).await?;
        let raw = parse_metadata(&body).ok()?;
        Some(NodeMetadata::from_raw(id, NodeKind::Collection, raw))
    }

    /// Returns true if the database endpoint answers successfully
    pub async fn is_valid_collection(&self, id: &str) -> bool {
        self.probe_collection(id).await.is_some()
    }

    /// Fetches the plain-text title of a collection
    pub async fn collection_title(&self, id: &str) -> Result<String> {
        let body = self
            .client
            .send_json(&ApiRequest::get(endpoint_for(NodeKind::Collection, id)))
            .await?;
        Ok(parse_collection_title(&body))
    }

    /// Fetches the first row object of a collection
    pub async fn first_collection_row(&self, id: &str) -> Result<Option<Value>> {
        let request = ApiRequest::post(format!("databases/{}/query", id), json!({ "page_size": 1 }));
        let body = self.client.send_json(&request).await?;
        Ok(first_result(&body))
    }

    async fn probe(&self, id: &str) -> Option<(NodeKind, Value)> {
        for kind in [NodeKind::Page, NodeKind::Collection] {
            if let Some(body) = self.try_get(&endpoint_for(kind, id)).await {
                return Some((kind, body));
            }
        }
        None
    }

    async fn try_get(&self, path: &str) -> Option<Value> {
        match self.client.send_json(&ApiRequest::get(path)).await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::debug!("Probe {} failed: {}", path, e);
                None
            }
        }
    }

    fn protocol_error(&self, request: &ApiRequest, error: serde_json::Error) -> HarvestError {
        HarvestError::Protocol {
            url: self.client.url_for(&request.path),
            message: error.to_string(),
        }
    }
}

fn endpoint_for(kind: NodeKind, id: &str) -> String {
    match kind {
        NodeKind::Collection => format!("databases/{}", id),
        _ => format!("pages/{}", id),
    }
}
