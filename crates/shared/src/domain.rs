use serde::{Deserialize, Serialize};

/// Extensions (including the leading dot) rendered inline as images.
pub const IMAGE_EXTENSIONS: [&str; 4] = [".png", ".jpg", ".jpeg", ".webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    TextMessage,
    ImageTransfer,
    FileTransfer,
}

impl EntryKind {
    /// Case-sensitive suffix match of a reported file type against
    /// [`IMAGE_EXTENSIONS`]. A missing type is never an image.
    pub fn classify_transfer(file_type: Option<&str>) -> Self {
        match file_type {
            Some(file_type) if IMAGE_EXTENSIONS.iter().any(|ext| file_type.ends_with(ext)) => {
                Self::ImageTransfer
            }
            _ => Self::FileTransfer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRef {
    pub filename: String,
    /// Directly renderable locator; only images carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_locator: Option<String>,
}

/// One unit of the conversation log.
///
/// Fields are private so the kind/transfer pairing cannot drift after
/// construction: text entries never hold a [`TransferRef`], transfer entries
/// always do. The stored wire shape lives in [`crate::protocol::StoredEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    author: String,
    body: String,
    kind: EntryKind,
    timestamp: String,
    transfer_ref: Option<TransferRef>,
}

impl ConversationEntry {
    pub fn text(
        author: impl Into<String>,
        body: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
            kind: EntryKind::TextMessage,
            timestamp: timestamp.into(),
            transfer_ref: None,
        }
    }

    pub fn image(
        author: impl Into<String>,
        filename: impl Into<String>,
        resource_locator: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        let filename = filename.into();
        Self {
            author: author.into(),
            body: format!("Sent an image: {filename}"),
            kind: EntryKind::ImageTransfer,
            timestamp: timestamp.into(),
            transfer_ref: Some(TransferRef {
                filename,
                resource_locator: Some(resource_locator.into()),
            }),
        }
    }

    pub fn file(
        author: impl Into<String>,
        filename: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        let filename = filename.into();
        Self {
            author: author.into(),
            body: format!("Sent a file: {filename}"),
            kind: EntryKind::FileTransfer,
            timestamp: timestamp.into(),
            transfer_ref: Some(TransferRef {
                filename,
                resource_locator: None,
            }),
        }
    }

    /// Rebuilds a transfer entry with a body that was stored elsewhere.
    pub(crate) fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn transfer_ref(&self) -> Option<&TransferRef> {
        self.transfer_ref.as_ref()
    }
}
