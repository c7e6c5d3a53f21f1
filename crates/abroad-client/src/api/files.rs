//! File upload

use crate::backend::parse_json;
use crate::error::Result;
use crate::request::AuthorizedClient;
use abroad_core::{AbroadError, UploadedFile};
use reqwest::multipart::{Form, Part};

pub const UPLOAD_PATH: &str = "/api/v1/files/upload";

/// Multipart field carrying the file
pub const FILE_FIELD: &str = "file";

#[derive(Clone)]
pub struct FileApi {
    client: AuthorizedClient,
}

impl FileApi {
    pub fn new(client: AuthorizedClient) -> Self {
        Self { client }
    }

    /// Upload `data` as `filename`
    pub async fn upload(&self, filename: &str, data: Vec<u8>, mime: &str) -> Result<UploadedFile> {
        if filename.trim().is_empty() {
            return Err(AbroadError::ValidationError("filename is required".to_string()).into());
        }
        // Reject a bad content type before the first attempt.
        Part::bytes(Vec::new()).mime_str(mime)?;

        let url = self.client.url(UPLOAD_PATH);
        let size = data.len();
        let response = self
            .client
            .send(|http| {
                let form = Form::new().part(FILE_FIELD, file_part(&data, filename, mime));
                http.post(&url).multipart(form)
            })
            .await?;

        let uploaded: UploadedFile = parse_json(response).await?;
        tracing::info!(file_id = %uploaded.id, size, "File uploaded");
        Ok(uploaded)
    }
}

/// Forms are consumed on send, so each attempt builds its own part
fn file_part(data: &[u8], filename: &str, mime: &str) -> Part {
    let part = Part::bytes(data.to_vec()).file_name(filename.to_string());
    match part.mime_str(mime) {
        Ok(part) => part,
        Err(_) => Part::bytes(data.to_vec()).file_name(filename.to_string()),
    }
}
