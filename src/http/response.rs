//! Response side of the handler contract.

use bytes::Bytes;

use crate::error::{GeowsError, Result};

/// What a handler can write to a response.
///
/// Headers are appended in call order. The body is written exactly once and
/// completes the response; nothing can be written after it.
pub trait HttpResponse: Send {
    fn add_header(&mut self, key: &str, value: &str) -> Result<()>;

    fn set_content(&mut self, content: &[u8]) -> Result<()>;
}

/// Response collected in memory and handed to the transport once the handler
/// returns.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    content: Option<Bytes>,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            content: None,
        }
    }

    /// Plain-text error response with body `Error: {message}`
    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            headers: vec![(
                "Content-Type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            content: Some(Bytes::from(format!("Error: {}", message))),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header value with the given name, case-insensitive
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.content.is_some()
    }

    /// Header appended by the transport after the handler finished
    pub(crate) fn push_header(&mut self, key: &str, value: &str) {
        self.headers.push((key.to_string(), value.to_string()));
    }

    pub fn into_parts(self) -> (u16, Vec<(String, String)>, Bytes) {
        (self.status, self.headers, self.content.unwrap_or_default())
    }
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponse for BufferedResponse {
    fn add_header(&mut self, key: &str, value: &str) -> Result<()> {
        if self.is_complete() {
            return Err(GeowsError::ContentAlreadySet);
        }
        self.headers.push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn set_content(&mut self, content: &[u8]) -> Result<()> {
        if self.is_complete() {
            return Err(GeowsError::ContentAlreadySet);
        }
        self.content = Some(Bytes::copy_from_slice(content));
        Ok(())
    }
}
