// THEORY:
// `HttpUploader` is the network side of the upload handoff. Clips and photo
// snapshots both go to the same intake endpoint as a multipart form with a
// single file part named `file`; any 2xx status counts as success.
//
// Nothing here retries. A failed upload is reported to the caller once and the
// recorder deletes the local clip regardless.

use crate::core_modules::frame::Frame;
use crate::core_modules::recorder::{ArtifactRef, UploadTarget};
use crate::endpoint::EndpointStore;
use crate::error::UploadError;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use reqwest::multipart::{Form, Part};
use tracing::{debug, info};

pub const FILE_FIELD: &str = "file";
pub const PHOTO_FILE_NAME: &str = "photo.jpg";
pub const PHOTO_QUALITY: u8 = 90;

pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: EndpointStore,
}

impl HttpUploader {
    pub fn new(client: reqwest::Client, endpoint: EndpointStore) -> Self {
        Self { client, endpoint }
    }

    async fn post_file(&self, file_name: String, mime_type: &str, bytes: Vec<u8>) -> Result<(), UploadError> {
        let url = self.endpoint.upload_url().ok_or(UploadError::NoServer)?;
        let size = bytes.len();

        let part = Part::bytes(bytes).file_name(file_name.clone()).mime_str(mime_type)?;
        let form = Form::new().part(FILE_FIELD, part);

        debug!(%url, %file_name, size, "posting upload");
        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected(status.as_u16()));
        }

        info!(%file_name, status = status.as_u16(), "upload accepted");
        Ok(())
    }
}

#[async_trait]
impl UploadTarget for HttpUploader {
    async fn upload_artifact(&self, artifact: &ArtifactRef) -> Result<(), UploadError> {
        // Bail before touching the file if there is nowhere to send it.
        if self.endpoint.host().is_none() {
            return Err(UploadError::NoServer);
        }
        let bytes = tokio::fs::read(&artifact.path).await?;
        self.post_file(artifact.file_name(), artifact.mime_type, bytes).await
    }

    async fn upload_photo(&self, jpeg: Vec<u8>) -> Result<(), UploadError> {
        self.post_file(PHOTO_FILE_NAME.to_string(), "image/jpeg", jpeg).await
    }
}

/// Encodes a frame as the JPEG snapshot sent by `upload_photo`.
pub fn encode_photo(frame: &Frame) -> Result<Vec<u8>, UploadError> {
    let rgb = RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let [red, green, blue, _] = frame.image.get_pixel(x, y).0;
        Rgb([red, green, blue])
    });
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, PHOTO_QUALITY).encode_image(&rgb)?;
    Ok(jpeg)
}
