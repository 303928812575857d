//! Schema and field registry.

use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::analyser::{Analyser, Parameters};
use crate::content::ContentElement;
use crate::context::Context;
use crate::database::{Connection, DescriptorReader, DescriptorWriter, Initializer};
use crate::descriptor::{Descriptor, Layout};
use crate::error::{Error, Result};
use crate::operators::{Extractor, Operator, Retriever};

pub type FieldName = String;

/// Names become table identifiers, so they are restricted to `[A-Za-z0-9_]`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("names must not be empty".into()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidArgument(format!(
            "'{}' may only contain ASCII letters, digits and underscores",
            name
        )));
    }
    Ok(())
}

/// A named feature slot of a schema, bound to one analyser.
///
/// The field is the only factory for the extractors, retrievers, readers and
/// writers of its descriptors.
pub struct Field {
    name: FieldName,
    analyser: Arc<dyn Analyser>,
    parameters: Parameters,
    layout: Layout,
    connection: Arc<dyn Connection>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("analyser", &self.analyser.name())
            .field("parameters", &self.parameters)
            .field("layout", &self.layout)
            .finish()
    }
}

impl Field {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn analyser(&self) -> &Arc<dyn Analyser> {
        &self.analyser
    }

    #[inline]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn get_extractor(
        self: &Arc<Self>,
        input: Box<dyn Operator>,
        context: &Context,
        persisting: bool,
    ) -> Result<Box<dyn Extractor>> {
        self.analyser
            .new_extractor(Arc::clone(self), input, context, persisting)
    }

    pub fn get_retriever_for_descriptors(
        self: &Arc<Self>,
        descriptors: Vec<Descriptor>,
        context: &Context,
    ) -> Result<Box<dyn Retriever>> {
        for descriptor in &descriptors {
            self.layout.check(descriptor)?;
        }
        self.analyser
            .new_retriever_for_descriptors(Arc::clone(self), descriptors, context)
    }

    pub fn get_retriever_for_content(
        self: &Arc<Self>,
        content: Vec<ContentElement>,
        context: &Context,
    ) -> Result<Box<dyn Retriever>> {
        self.analyser
            .new_retriever_for_content(Arc::clone(self), content, context)
    }

    pub fn get_reader(&self) -> Result<Box<dyn DescriptorReader>> {
        self.connection.descriptor_reader(&self.name, &self.layout)
    }

    pub fn get_writer(&self) -> Result<Box<dyn DescriptorWriter>> {
        self.connection.descriptor_writer(&self.name, &self.layout)
    }

    pub fn get_initializer(&self) -> Result<Box<dyn Initializer>> {
        self.connection.descriptor_initializer(&self.name, &self.layout)
    }
}

/// An ordered set of fields sharing one connection.
pub struct Schema {
    name: String,
    connection: Arc<dyn Connection>,
    fields: Vec<Arc<Field>>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("connection", &self.connection.description())
            .field("fields", &self.fields)
            .finish()
    }
}

impl Schema {
    pub fn new(name: impl Into<String>, connection: Arc<dyn Connection>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            connection,
            fields: Vec::new(),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Registers a field. Duplicate names and invalid parameters are rejected.
    pub fn add_field(
        &mut self,
        name: impl Into<FieldName>,
        analyser: Arc<dyn Analyser>,
        parameters: Parameters,
    ) -> Result<Arc<Field>> {
        let name = name.into();
        validate_name(&name)?;
        if self.fields.iter().any(|f| f.name.eq_ignore_ascii_case(&name)) {
            return Err(Error::FieldExists(name));
        }
        let layout = analyser.layout(&parameters)?;
        let field = Arc::new(Field {
            name,
            analyser,
            parameters,
            layout,
            connection: Arc::clone(&self.connection),
        });
        self.fields.push(Arc::clone(&field));
        Ok(field)
    }

    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    /// Looks a field up by name, ignoring ASCII case like [`Schema::add_field`].
    pub fn get(&self, name: &str) -> Option<&Arc<Field>> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn field(&self, name: &str) -> Result<&Arc<Field>> {
        self.get(name)
            .ok_or_else(|| Error::FieldNotFound(name.to_string()))
    }

    pub fn field_at(&self, index: usize) -> Option<&Arc<Field>> {
        self.fields.get(index)
    }

    /// Creates the retrievable table and every field's descriptor table.
    ///
    /// A failing field does not stop the others. Fatal failures are collected
    /// into [`Error::Initialization`] once every field was attempted.
    pub async fn initialize(&self) -> Result<()> {
        let mut failed = Vec::new();
        if let Err(e) = self.connection.retrievable_initializer().initialize().await {
            error!("Failed to initialize retrievable entity of schema '{}': {}", self.name, e);
            failed.push(crate::database::RETRIEVABLE_ENTITY.to_string());
        }
        for field in &self.fields {
            let result = match field.get_initializer() {
                Ok(initializer) => initializer.initialize().await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                error!("Failed to initialize field '{}': {}", field.name, e);
                failed.push(field.name.clone());
            }
        }
        if failed.is_empty() {
            info!("Schema '{}' initialized ({} fields)", self.name, self.fields.len());
            Ok(())
        } else {
            Err(Error::Initialization(failed))
        }
    }

    /// Drops every table created by [`Schema::initialize`].
    pub async fn deinitialize(&self) -> Result<()> {
        let mut failed = Vec::new();
        for field in &self.fields {
            let result = match field.get_initializer() {
                Ok(initializer) => initializer.deinitialize().await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!("Failed to deinitialize field '{}': {}", field.name, e);
                failed.push(field.name.clone());
            }
        }
        if let Err(e) = self.connection.retrievable_initializer().deinitialize().await {
            warn!("Failed to deinitialize retrievable entity: {}", e);
            failed.push(crate::database::RETRIEVABLE_ENTITY.to_string());
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::Initialization(failed))
        }
    }

    /// Deletes all stored data while keeping tables.
    pub async fn truncate(&self) -> Result<()> {
        let mut failed = Vec::new();
        for field in &self.fields {
            let result = match field.get_initializer() {
                Ok(initializer) => initializer.truncate().await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!("Failed to truncate field '{}': {}", field.name, e);
                failed.push(field.name.clone());
            }
        }
        if let Err(e) = self.connection.retrievable_initializer().truncate().await {
            warn!("Failed to truncate retrievable entity: {}", e);
            failed.push(crate::database::RETRIEVABLE_ENTITY.to_string());
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::Initialization(failed))
        }
    }

    /// Whether the retrievable table and every descriptor table exist.
    pub async fn is_initialized(&self) -> bool {
        if !self.connection.retrievable_initializer().is_initialized().await {
            return false;
        }
        for field in &self.fields {
            match field.get_initializer() {
                Ok(initializer) if initializer.is_initialized().await => {}
                _ => return false,
            }
        }
        true
    }

    pub async fn close(&self) {
        info!("Closing schema '{}'", self.name);
        self.connection.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("avg_color2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("drop table;").is_err());
        assert!(validate_name("größe").is_err());
    }
}
