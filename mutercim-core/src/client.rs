use std::time::Duration;

use reqwest::blocking::multipart;
use thiserror::Error;

/// Upload endpoint of the translation service.
pub const API_URL: &str = "https://api.toriitranslate.com/api/upload";

/// The service rate-limits on its side; one request may take this long.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Any non-success answer from the service: HTTP failure, timeout, or a
/// response without the `success: true` marker. The batch layer treats all
/// of these the same way.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("translation failed (code {code}): {message}")]
pub struct TranslationError {
    pub code: u16,
    pub message: String,
}

impl TranslationError {
    pub fn transport(message: impl Into<String>) -> Self {
        TranslationError {
            code: 0,
            message: message.into(),
        }
    }
}

/// Seam between the batch processor and the remote service. Tests plug in
/// stubs; production uses [`ToriiClient`].
pub trait Translate: Send + Sync {
    fn translate(
        &self,
        image: &[u8],
        file_name: &str,
    ) -> std::result::Result<Vec<u8>, TranslationError>;
}

/// Blocking HTTP client for the translation service. Language, model and
/// credential are fixed per instance; every page upload reuses them.
pub struct ToriiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
    target_lang: String,
    font: String,
}

impl ToriiClient {
    pub fn new(api_key: &str, model: &str, target_lang: &str) -> crate::error::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| std::io::Error::other(e))?;
        Ok(ToriiClient {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            target_lang: target_lang.to_string(),
            font: "wildwords".to_string(),
        })
    }
}

impl Translate for ToriiClient {
    fn translate(
        &self,
        image: &[u8],
        file_name: &str,
    ) -> std::result::Result<Vec<u8>, TranslationError> {
        let part = multipart::Part::bytes(image.to_vec())
            .file_name(file_name.to_string())
            .mime_str("image/jpeg")
            .map_err(|e| TranslationError::transport(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .header("target_lang", &self.target_lang)
            .header("translator", &self.model)
            .header("font", &self.font)
            .multipart(form)
            .send()
            .map_err(|e| TranslationError::transport(e.to_string()))?;

        let status = response.status().as_u16();
        let ok = response
            .headers()
            .get("success")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "true")
            .unwrap_or(false);

        let body = response
            .bytes()
            .map_err(|e| TranslationError::transport(e.to_string()))?;

        if ok {
            Ok(body.to_vec())
        } else {
            Err(TranslationError {
                code: status,
                message: String::from_utf8_lossy(&body).into_owned(),
            })
        }
    }
}
