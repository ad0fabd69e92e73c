//! Binary attachments (images and documents) carried on user messages

use serde::{Deserialize, Serialize};

/// Marker content type for attachments that reference a URL instead of inline data
pub const URL_CONTENT_TYPE: &str = "url";

/// Kind of attached payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// Image (png, jpeg, webp, ...)
    Image,
    /// Document (pdf, plain text, ...)
    Document,
}

/// An inlined (base64) or URL-referenced payload
///
/// Attachments are immutable once built. Encoding the raw bytes to base64
/// is the caller's concern; `data` is stored as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Base64 data, or the URL when `content_type` is `"url"`
    pub data: String,
    /// Image or document
    pub kind: AttachmentKind,
    /// MIME type of the inline data, or `"url"`
    pub content_type: String,
}

impl Attachment {
    /// Inline base64 image
    pub fn image(data: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            kind: AttachmentKind::Image,
            content_type: content_type.into(),
        }
    }

    /// Inline base64 document
    pub fn document(data: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            kind: AttachmentKind::Document,
            content_type: content_type.into(),
        }
    }

    /// Image referenced by URL
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::image(url, URL_CONTENT_TYPE)
    }

    /// Document referenced by URL
    pub fn document_url(url: impl Into<String>) -> Self {
        Self::document(url, URL_CONTENT_TYPE)
    }

    /// True iff the attachment references a URL
    pub fn is_url(&self) -> bool {
        self.content_type == URL_CONTENT_TYPE
    }

    pub fn is_image(&self) -> bool {
        self.kind == AttachmentKind::Image
    }

    pub fn is_document(&self) -> bool {
        self.kind == AttachmentKind::Document
    }

    /// The URL for URL attachments, otherwise a `data:` URL for the inline payload
    pub fn data_url(&self) -> String {
        if self.is_url() {
            self.data.clone()
        } else {
            format!("data:{};base64,{}", self.content_type, self.data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_detection() {
        let url = Attachment::image_url("https://example.com/cat.png");
        assert!(url.is_url());
        assert!(url.is_image());
        assert_eq!(url.data_url(), "https://example.com/cat.png");

        let inline = Attachment::document("JVBERi0=", "application/pdf");
        assert!(!inline.is_url());
        assert!(inline.is_document());
        assert_eq!(inline.data_url(), "data:application/pdf;base64,JVBERi0=");
    }
}
