use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::auth::FirebaseAuth;

const BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Largest page the REST API hands out for a list call.
const MAX_PAGE_SIZE: u32 = 300;

#[derive(Clone)]
pub struct FirestoreClient {
    client: Client,
    auth: FirebaseAuth,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub name: String,
    pub fields: Option<Map<String, Value>>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

impl Document {
    /// Last path segment of the document name.
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    documents: Option<Vec<Document>>,
    next_page_token: Option<String>,
}

impl FirestoreClient {
    pub fn new(auth: FirebaseAuth) -> Self {
        Self {
            client: Client::new(),
            auth,
        }
    }

    fn documents_base(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            BASE_URL,
            self.auth.config().project_id
        )
    }

    /// Fetch one document. A missing document is `Ok(None)`.
    pub async fn get_document(&self, path: &str) -> Result<Option<Document>> {
        let token = self.auth.get_id_token().await?;
        let url = format!("{}/{}", self.documents_base(), path);

        let resp = self.client.get(&url).bearer_auth(&token).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!(path, "document not found");
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("GET {} failed: {} - {}", path, status, body));
        }

        Ok(Some(resp.json().await?))
    }

    pub async fn list_documents(
        &self,
        collection_path: &str,
        page_size: Option<u32>,
        page_token: Option<&str>,
    ) -> Result<(Vec<Document>, Option<String>)> {
        let token = self.auth.get_id_token().await?;
        let url = format!("{}/{}", self.documents_base(), collection_path);

        let mut req = self.client.get(&url).bearer_auth(&token);

        if let Some(size) = page_size {
            req = req.query(&[("pageSize", size.to_string())]);
        }
        if let Some(pt) = page_token {
            req = req.query(&[("pageToken", pt)]);
        }

        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "LIST {} failed: {} - {}",
                collection_path,
                status,
                body
            ));
        }

        let list_resp: ListDocumentsResponse = resp.json().await?;
        Ok((
            list_resp.documents.unwrap_or_default(),
            list_resp.next_page_token.filter(|pt| !pt.is_empty()),
        ))
    }

    /// Follow page tokens until the whole collection has been read.
    /// An empty or absent collection yields no documents.
    pub async fn list_all_documents(&self, collection_path: &str) -> Result<Vec<Document>> {
        let mut all = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let (docs, next) = self
                .list_documents(collection_path, Some(MAX_PAGE_SIZE), page_token.as_deref())
                .await?;
            all.extend(docs);

            match next {
                Some(pt) => page_token = Some(pt),
                None => break,
            }
        }

        Ok(all)
    }
}

/// Parse a Firestore typed value into a plain `serde_json::Value`.
pub fn parse_firestore_value(val: &Value) -> Value {
    let Some((kind, inner)) = val.as_object().and_then(|obj| obj.iter().next()) else {
        return val.clone();
    };

    match kind.as_str() {
        "nullValue" => Value::Null,
        // Firestore sends 64-bit integers as strings
        "integerValue" => match inner.as_str().and_then(|s| s.parse::<i64>().ok()) {
            Some(n) => json!(n),
            None => inner.clone(),
        },
        "stringValue" | "doubleValue" | "booleanValue" | "timestampValue" | "referenceValue"
        | "geoPointValue" | "bytesValue" => inner.clone(),
        "mapValue" => inner
            .get("fields")
            .map(parse_firestore_fields)
            .unwrap_or_else(|| json!({})),
        "arrayValue" => match inner.get("values").and_then(|v| v.as_array()) {
            Some(values) => Value::Array(values.iter().map(parse_firestore_value).collect()),
            None => json!([]),
        },
        _ => val.clone(),
    }
}

/// Parse Firestore document fields into a flat JSON object.
pub fn parse_firestore_fields(fields: &Value) -> Value {
    match fields.as_object() {
        Some(map) => Value::Object(
            map.iter()
                .map(|(key, val)| (key.clone(), parse_firestore_value(val)))
                .collect(),
        ),
        None => Value::Null,
    }
}

/// Parse a document's fields into a JSON object. Documents with no
/// fields become an empty object.
pub fn parse_document(doc: &Document) -> Map<String, Value> {
    doc.fields
        .iter()
        .flatten()
        .map(|(key, val)| (key.clone(), parse_firestore_value(val)))
        .collect()
}
