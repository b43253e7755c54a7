use serde::{Deserialize, Serialize};

/// An inbound video upload plus the caller-supplied metadata.
#[derive(Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub owner_id: String,
    pub channel_id: String,
    /// Original client-side file name, used for the extension and default title.
    pub file_name: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub duration: Option<f64>,
}

impl UploadRequest {
    pub fn new(
        owner_id: impl Into<String>,
        channel_id: impl Into<String>,
        file_name: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            channel_id: channel_id.into(),
            file_name: file_name.into(),
            data,
            title: None,
            description: None,
            tags: Vec::new(),
            duration: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("owner_id", &self.owner_id)
            .field("channel_id", &self.channel_id)
            .field("file_name", &self.file_name)
            .field("size_bytes", &self.data.len())
            .field("title", &self.title)
            .field("tags", &self.tags)
            .finish()
    }
}
