use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};

use crate::error::GatewayError;
use crate::types::requests::image_from_fields;
use crate::upstream::types::ImageSource;

/// Multipart field names that may carry a page image, in precedence order.
pub const IMAGE_FIELDS: [&str; 3] = ["pageImage", "image", "file"];

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Request body gathered without a fixed schema.
///
/// JSON objects and multipart forms both end up as a field map; multipart
/// parts that carry a filename are kept aside as files. An empty body is an
/// empty map.
#[derive(Debug, Clone, Default)]
pub struct LooseBody {
    pub fields: Map<String, Value>,
    pub files: Vec<UploadedFile>,
}

impl LooseBody {
    /// Remove and return the first file found under `names`, in that order.
    pub fn take_file(&mut self, names: &[&str]) -> Option<UploadedFile> {
        let idx = names
            .iter()
            .find_map(|name| self.files.iter().position(|f| f.field == *name))?;
        Some(self.files.remove(idx))
    }

    /// Page image: an uploaded image part first, else `imageBase64` /
    /// `imageUrl` from the fields.
    pub fn take_image(&mut self) -> Result<Option<ImageSource>, GatewayError> {
        if let Some(file) = self.take_file(&IMAGE_FIELDS) {
            let is_image = file
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("image/"));
            if !is_image {
                return Err(GatewayError::BadRequest(
                    "Only image files are allowed".to_string(),
                ));
            }
            return Ok(Some(ImageSource::Bytes(file.data)));
        }
        Ok(image_from_fields(&self.fields))
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
        .into_response()
}

impl<S> FromRequest<S> for LooseBody
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            return read_multipart(multipart).await;
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(fields)) => Ok(Self {
                fields,
                files: Vec::new(),
            }),
            Ok(_) => Err(bad_request("JSON body must be an object")),
            Err(e) => Err(bad_request(format!("Invalid JSON body: {e}"))),
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<LooseBody, Response> {
    let mut body = LooseBody::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(IntoResponse::into_response)?
    {
        let name = field.name().unwrap_or_default().to_string();
        if field.file_name().is_some() {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.map_err(IntoResponse::into_response)?;
            body.files.push(UploadedFile {
                field: name,
                file_name,
                content_type,
                data,
            });
        } else {
            let text = field.text().await.map_err(IntoResponse::into_response)?;
            body.fields.insert(name, Value::String(text));
        }
    }
    Ok(body)
}
