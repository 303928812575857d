use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::content::{ContentElement, ContentId, Source};
use crate::descriptor::Descriptor;

pub type RetrievableId = Uuid;

/// Type tag of retrievables created by enumerators.
pub const SOURCE_TYPE: &str = "SOURCE";

/// Opaque metadata attached to a retrievable while it moves through a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetrievableAttribute {
    /// Distance to a proximity query; smaller is closer
    Distance(f32),
    /// Relevance score; larger is better
    Score(f32),
    /// The raw source a retrievable was enumerated from
    Source(Source),
    /// Which operator produced a content element
    ContentAuthor { content_id: ContentId, author: String },
    /// Marks a content element derived from other content
    Derived { name: String, content_id: ContentId },
    Property(BTreeMap<String, String>),
    /// Parts that could not be persisted, see [`crate::Error::PartialWrite`]
    WriteFailed(Vec<String>),
}

/// A directed, predicate-labelled edge between two retrievables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub subject: RetrievableId,
    pub predicate: String,
    pub object: RetrievableId,
}

impl Relationship {
    #[inline]
    #[must_use]
    pub fn new(subject: RetrievableId, predicate: impl Into<String>, object: RetrievableId) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }
}

/// The unit of ingestion and retrieval.
///
/// Cloning preserves the id; use [`Retrievable::with_id`] to override it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retrievable {
    id: RetrievableId,
    kind: Option<String>,
    content: Vec<ContentElement>,
    descriptors: Vec<Descriptor>,
    attributes: Vec<RetrievableAttribute>,
    relationships: Vec<Relationship>,
    transient: bool,
}

impl Retrievable {
    #[inline]
    #[must_use]
    pub fn new(kind: Option<String>) -> Self {
        Self::with_identity(Uuid::new_v4(), kind, false)
    }

    #[inline]
    #[must_use]
    pub fn with_identity(id: RetrievableId, kind: Option<String>, transient: bool) -> Self {
        Self {
            id,
            kind,
            content: Vec::new(),
            descriptors: Vec::new(),
            attributes: Vec::new(),
            relationships: Vec::new(),
            transient,
        }
    }

    /// Creates a transient retrievable, never persisted.
    #[inline]
    #[must_use]
    pub fn transient(kind: Option<String>) -> Self {
        Self::with_identity(Uuid::new_v4(), kind, true)
    }

    #[inline]
    pub fn id(&self) -> RetrievableId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    #[inline]
    pub fn content(&self) -> &[ContentElement] {
        &self.content
    }

    #[inline]
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    #[inline]
    pub fn attributes(&self) -> &[RetrievableAttribute] {
        &self.attributes
    }

    #[inline]
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: RetrievableId) -> Self {
        self.id = id;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn add_content(&mut self, element: ContentElement) {
        self.content.push(element);
    }

    /// Attaches a descriptor, binding it to this retrievable's id.
    pub fn add_descriptor(&mut self, descriptor: Descriptor) {
        let descriptor = if descriptor.retrievable_id() == Some(self.id) {
            descriptor
        } else {
            descriptor.with_retrievable_id(self.id)
        };
        self.descriptors.push(descriptor);
    }

    pub fn add_attribute(&mut self, attribute: RetrievableAttribute) {
        self.attributes.push(attribute);
    }

    pub fn add_relationship(&mut self, relationship: Relationship) {
        if !self.relationships.contains(&relationship) {
            self.relationships.push(relationship);
        }
    }

    /// Descriptors attached for a particular field.
    pub fn descriptors_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a Descriptor> + 'a {
        self.descriptors.iter().filter(move |d| d.field() == Some(field))
    }

    /// The smallest distance attribute, if any.
    pub fn distance(&self) -> Option<f32> {
        self.attributes
            .iter()
            .filter_map(|a| match a {
                RetrievableAttribute::Distance(d) => Some(*d),
                _ => None,
            })
            .fold(None, |acc: Option<f32>, d| Some(acc.map_or(d, |a| a.min(d))))
    }

    /// The largest score attribute, if any.
    pub fn score(&self) -> Option<f32> {
        self.attributes
            .iter()
            .filter_map(|a| match a {
                RetrievableAttribute::Score(s) => Some(*s),
                _ => None,
            })
            .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))))
    }

    pub fn source(&self) -> Option<&Source> {
        self.attributes.iter().find_map(|a| match a {
            RetrievableAttribute::Source(s) => Some(s),
            _ => None,
        })
    }

    /// Parts that could not be persisted, empty when every write succeeded.
    pub fn failed_writes(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .filter_map(|a| match a {
                RetrievableAttribute::WriteFailed(parts) => Some(parts),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Name of the operator that authored a content element.
    pub fn content_author(&self, content_id: ContentId) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            RetrievableAttribute::ContentAuthor { content_id: id, author } if *id == content_id => {
                Some(author.as_str())
            }
            _ => None,
        })
    }

    /// Merges the descriptors, attributes and relationships of another copy of
    /// the same retrievable into this one.
    pub fn merge(&mut self, other: Retrievable) {
        for descriptor in other.descriptors {
            if !self.descriptors.iter().any(|d| d.id() == descriptor.id()) {
                self.descriptors.push(descriptor);
            }
        }
        for attribute in other.attributes {
            if !self.attributes.contains(&attribute) {
                self.attributes.push(attribute);
            }
        }
        for relationship in other.relationships {
            self.add_relationship(relationship);
        }
        for element in other.content {
            if !self.content.iter().any(|c| c.id == element.id) {
                self.content.push(element);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Content;
    use crate::value::Value;

    #[test]
    fn test_clone_preserves_id() {
        let r = Retrievable::new(Some("IMAGE".into()));
        let copy = r.clone();
        assert_eq!(copy.id(), r.id());
        let other = Uuid::new_v4();
        assert_eq!(r.with_id(other).id(), other);
    }

    #[test]
    fn test_add_descriptor_binds_retrievable_id() {
        let mut r = Retrievable::new(None);
        let d = Descriptor::scalar(Uuid::new_v4(), None, Value::Int(3), Some("n".into()));
        r.add_descriptor(d);
        assert_eq!(r.descriptors()[0].retrievable_id(), Some(r.id()));
        assert_eq!(r.descriptors_for("n").count(), 1);
    }

    #[test]
    fn test_distance_is_minimum() {
        let mut r = Retrievable::new(None);
        assert_eq!(r.distance(), None);
        r.add_attribute(RetrievableAttribute::Distance(0.5));
        r.add_attribute(RetrievableAttribute::Distance(0.2));
        assert_eq!(r.distance(), Some(0.2));
    }

    #[test]
    fn test_merge_deduplicates() {
        let mut a = Retrievable::new(None);
        let element = ContentElement::new(Content::Text("x".into()));
        a.add_content(element.clone());
        a.add_attribute(RetrievableAttribute::Distance(0.3));
        let mut b = a.clone();
        b.add_attribute(RetrievableAttribute::Distance(0.1));
        b.add_relationship(Relationship::new(a.id(), "partOf", Uuid::new_v4()));
        a.merge(b);
        assert_eq!(a.content().len(), 1);
        assert_eq!(a.attributes().len(), 2);
        assert_eq!(a.relationships().len(), 1);
        assert_eq!(a.distance(), Some(0.1));
    }
}
