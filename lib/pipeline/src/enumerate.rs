//! Enumerators: the first stage of an ingest pipeline.

use mediax_core::retrievable::SOURCE_TYPE;
use mediax_core::{Enumerator, MediaType, Operator, Retrievable, RetrievableAttribute, RetrievableStream, Source};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Emits a fixed list of retrievables.
pub struct ListEnumerator {
    name: String,
    items: Vec<Retrievable>,
}

impl ListEnumerator {
    pub fn new(name: impl Into<String>, items: Vec<Retrievable>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }
}

impl Operator for ListEnumerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn into_stream(self: Box<Self>) -> RetrievableStream {
        Box::pin(futures::stream::iter(self.items))
    }
}

impl Enumerator for ListEnumerator {}

/// Builds a source retrievable whose id is the source id.
pub fn source_retrievable(source: Source) -> Retrievable {
    let mut retrievable = Retrievable::with_identity(source.id, Some(SOURCE_TYPE.to_string()), false);
    retrievable.add_attribute(RetrievableAttribute::Source(source));
    retrievable
}

/// Walks a directory tree and emits one source retrievable per file.
///
/// Files are visited in name order so repeated runs enumerate identically.
pub struct FileSystemEnumerator {
    name: String,
    root: PathBuf,
    depth: usize,
    media_types: Vec<MediaType>,
    skip: usize,
    limit: Option<usize>,
}

impl FileSystemEnumerator {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            depth: usize::MAX,
            media_types: Vec::new(),
            skip: 0,
            limit: None,
        }
    }

    /// Maximum directory depth below the root; `0` lists only the root itself.
    #[must_use]
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Restricts enumeration to the given media types. Empty means every known type.
    #[must_use]
    pub fn with_media_types(mut self, media_types: Vec<MediaType>) -> Self {
        self.media_types = media_types;
        self
    }

    #[must_use]
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn accepts(&self, media_type: MediaType) -> bool {
        if self.media_types.is_empty() {
            media_type != MediaType::Unknown
        } else {
            self.media_types.contains(&media_type)
        }
    }
}

fn walk(dir: &Path, depth: usize, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot list {}: {}", dir.display(), e);
            return;
        }
    };
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    paths.sort();
    for path in paths {
        if path.is_dir() {
            if depth > 0 {
                walk(&path, depth - 1, files);
            }
        } else if path.is_file() {
            files.push(path);
        }
    }
}

impl Operator for FileSystemEnumerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn into_stream(self: Box<Self>) -> RetrievableStream {
        Box::pin(async_stream::stream! {
            let root = self.root.clone();
            let depth = self.depth;
            let listing = tokio::task::spawn_blocking(move || {
                let mut files = Vec::new();
                if root.is_file() {
                    files.push(root);
                } else {
                    walk(&root, depth, &mut files);
                }
                files
            })
            .await;
            let files = match listing {
                Ok(files) => files,
                Err(e) => {
                    error!("Enumeration of {} failed: {}", self.root.display(), e);
                    return;
                }
            };

            let accepted = files
                .into_iter()
                .map(Source::from_path)
                .filter(|s| self.accepts(s.media_type))
                .skip(self.skip)
                .take(self.limit.unwrap_or(usize::MAX));
            for source in accepted {
                debug!("{} enumerated '{}'", self.name, source.name);
                yield source_retrievable(source);
            }
        })
    }
}

impl Enumerator for FileSystemEnumerator {}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::write(dir.path().join("b.png"), [0u8; 4]).unwrap();
        fs::write(dir.path().join("c.bin"), [1u8; 2]).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("d.txt"), "delta").unwrap();
        dir
    }

    async fn names(enumerator: FileSystemEnumerator) -> Vec<String> {
        Box::new(enumerator)
            .into_stream()
            .map(|r| r.source().unwrap().name.clone())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_enumerates_known_media_in_order() {
        let dir = tree();
        let found = names(FileSystemEnumerator::new("fs", dir.path())).await;
        assert_eq!(found, vec!["a.txt", "b.png", "d.txt"]);
    }

    #[tokio::test]
    async fn test_depth_and_media_filter() {
        let dir = tree();
        let shallow = names(FileSystemEnumerator::new("fs", dir.path()).with_depth(0)).await;
        assert_eq!(shallow, vec!["a.txt", "b.png"]);

        let text = names(FileSystemEnumerator::new("fs", dir.path()).with_media_types(vec![MediaType::Text])).await;
        assert_eq!(text, vec!["a.txt", "d.txt"]);
    }

    #[tokio::test]
    async fn test_skip_and_limit() {
        let dir = tree();
        let page = names(FileSystemEnumerator::new("fs", dir.path()).with_skip(1).with_limit(1)).await;
        assert_eq!(page, vec!["b.png"]);
    }

    #[tokio::test]
    async fn test_source_retrievable_identity() {
        let dir = tree();
        let retrievables: Vec<_> = Box::new(FileSystemEnumerator::new("fs", dir.path().join("a.txt")))
            .into_stream()
            .collect()
            .await;
        assert_eq!(retrievables.len(), 1);
        let r = &retrievables[0];
        assert_eq!(r.kind(), Some(SOURCE_TYPE));
        assert_eq!(r.id(), r.source().unwrap().id);
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let found = names(FileSystemEnumerator::new("fs", "/definitely/not/here")).await;
        assert!(found.is_empty());
    }
}
