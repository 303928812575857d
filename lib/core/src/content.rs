use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

pub type ContentId = Uuid;

/// Kind of content a decoder produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    Audio,
    Binary,
}

/// A decoded media payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Content {
    Text(String),
    /// Packed RGB pixels, row-major
    Image {
        width: u32,
        height: u32,
        pixels: Vec<[u8; 3]>,
    },
    /// Interleaved PCM samples
    Audio {
        channels: u16,
        sample_rate: u32,
        samples: Vec<i16>,
    },
    Binary {
        mime_type: String,
        data: Vec<u8>,
    },
}

impl Content {
    pub fn content_type(&self) -> ContentType {
        match self {
            Content::Text(_) => ContentType::Text,
            Content::Image { .. } => ContentType::Image,
            Content::Audio { .. } => ContentType::Audio,
            Content::Binary { .. } => ContentType::Binary,
        }
    }
}

/// A content payload with its own identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentElement {
    pub id: ContentId,
    pub content: Content,
}

impl ContentElement {
    #[inline]
    #[must_use]
    pub fn new(content: Content) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
        }
    }

    #[inline]
    pub fn content_type(&self) -> ContentType {
        self.content.content_type()
    }

    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Media type of a raw source, as detected by an enumerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Text,
    Image,
    Video,
    Audio,
    Mesh,
    Unknown,
}

impl MediaType {
    /// Guesses the media type from a file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "md" | "csv" | "json" => MediaType::Text,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "tif" | "tiff" => MediaType::Image,
            "mp4" | "mkv" | "avi" | "mov" | "webm" => MediaType::Video,
            "mp3" | "wav" | "flac" | "ogg" | "m4a" => MediaType::Audio,
            "obj" | "stl" | "glb" | "gltf" | "ply" => MediaType::Mesh,
            _ => MediaType::Unknown,
        }
    }
}

/// Where raw media came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceLocation {
    Path(PathBuf),
    Inline(Vec<u8>),
}

/// A raw media source handed from an enumerator to a decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub media_type: MediaType,
    pub location: SourceLocation,
}

impl Source {
    pub fn from_path(path: PathBuf) -> Self {
        let media_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map(MediaType::from_extension)
            .unwrap_or(MediaType::Unknown);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            name,
            media_type,
            location: SourceLocation::Path(path),
        }
    }

    pub fn inline(name: impl Into<String>, media_type: MediaType, data: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            media_type,
            location: SourceLocation::Inline(data),
        }
    }

    /// Size of the raw source in bytes, if it can be determined.
    pub fn size(&self) -> Option<u64> {
        match &self.location {
            SourceLocation::Path(path) => std::fs::metadata(path).ok().map(|m| m.len()),
            SourceLocation::Inline(data) => Some(data.len() as u64),
        }
    }

    /// Reads the full source into memory.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        match &self.location {
            SourceLocation::Path(path) => std::fs::read(path),
            SourceLocation::Inline(data) => Ok(data.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_from_extension() {
        assert_eq!(MediaType::from_extension("PNG"), MediaType::Image);
        assert_eq!(MediaType::from_extension("txt"), MediaType::Text);
        assert_eq!(MediaType::from_extension("xyz"), MediaType::Unknown);
    }

    #[test]
    fn test_inline_source() {
        let source = Source::inline("note", MediaType::Text, b"hello".to_vec());
        assert_eq!(source.size(), Some(5));
        assert_eq!(source.read().unwrap(), b"hello");
    }
}
