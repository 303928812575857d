use futures::StreamExt;
use mediax_core::{
    Content, ContentElement, Decoder, MediaType, Operator, RetrievableAttribute, RetrievableStream,
};
use tracing::{debug, warn};

/// Decodes text sources into a single text content element.
///
/// Invalid UTF-8 is replaced rather than rejected. Retrievables without a
/// source pass through unchanged; sources of other media types are dropped.
pub struct TextDecoder {
    name: String,
    input: Box<dyn Operator>,
}

impl TextDecoder {
    pub fn new(name: impl Into<String>, input: Box<dyn Operator>) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }
}

impl Operator for TextDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn into_stream(self: Box<Self>) -> RetrievableStream {
        let TextDecoder { name, input } = *self;
        Box::pin(async_stream::stream! {
            let mut input = input.into_stream();
            while let Some(mut retrievable) = input.next().await {
                let Some(source) = retrievable.source().cloned() else {
                    debug!("{} passing through {} without source", name, retrievable.id());
                    yield retrievable;
                    continue;
                };
                if source.media_type != MediaType::Text {
                    warn!("{} skipping '{}' of media type {:?}", name, source.name, source.media_type);
                    continue;
                }
                let bytes = match tokio::task::spawn_blocking(move || source.read()).await {
                    Ok(Ok(bytes)) => bytes,
                    Ok(Err(e)) => {
                        warn!("{} cannot read source of {}: {}", name, retrievable.id(), e);
                        continue;
                    }
                    Err(e) => {
                        warn!("{} read task failed: {}", name, e);
                        continue;
                    }
                };
                let element = ContentElement::new(Content::Text(String::from_utf8_lossy(&bytes).into_owned()));
                retrievable.add_attribute(RetrievableAttribute::ContentAuthor {
                    content_id: element.id,
                    author: name.clone(),
                });
                retrievable.add_content(element);
                yield retrievable;
            }
        })
    }
}

impl Decoder for TextDecoder {
    fn supports(&self, media_type: MediaType) -> bool {
        media_type == MediaType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate::{source_retrievable, ListEnumerator};
    use mediax_core::{Retrievable, Source};

    #[tokio::test]
    async fn test_decodes_text_and_skips_other_media() {
        let text = source_retrievable(Source::inline("note", MediaType::Text, b"hello world".to_vec()));
        let image = source_retrievable(Source::inline("pic", MediaType::Image, vec![0, 1, 2]));
        let plain = Retrievable::new(None);
        let text_id = text.id();
        let plain_id = plain.id();

        let input = ListEnumerator::new("list", vec![text, image, plain]);
        let decoder = TextDecoder::new("text", Box::new(input));
        assert!(decoder.supports(MediaType::Text));
        assert!(!decoder.supports(MediaType::Image));

        let out: Vec<_> = Box::new(decoder).into_stream().collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id(), text_id);
        let element = &out[0].content()[0];
        assert_eq!(element.as_text(), Some("hello world"));
        assert_eq!(out[0].content_author(element.id), Some("text"));
        assert_eq!(out[1].id(), plain_id);
        assert!(out[1].content().is_empty());
    }
}
