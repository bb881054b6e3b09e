use serde::Serialize;

/// Either the upload endpoint's response parsed as JSON, or its raw text
/// if it wasn't valid JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum UploadResponse {
    Json(serde_json::Value),
    Text(String),
}

/// Per-leg outcome. Field names (including the `uploaded_byes` misspelling)
/// match the external contract verbatim.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub upload_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub size: u64,
    #[serde(rename = "uploadedByes")]
    pub uploaded_byes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_bytes_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<UploadResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reported when `SessionConfig::save_to_local_path` is set.
#[derive(Debug, Clone, Serialize)]
pub struct LocalSaveResult {
    pub path: String,
    pub size: u64,
}

/// The aggregate result of a `Transload::run` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransloadResult {
    pub url: String,
    pub size: u64,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalSaveResult>,
    pub uploads: Vec<UploadResult>,
}
