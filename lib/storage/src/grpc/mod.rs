//! Backend for vector-native stores speaking the `mediax.store` gRPC protocol.
//!
//! Every descriptor field maps to one entity `descriptor_<field>` inside the
//! schema. Similarity search and fulltext matching are delegated to the store.

mod descriptor;
pub mod proto;
mod retrievable;
mod translate;

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use mediax_core::{
    descriptor_entity, Connection, DescriptorReader, DescriptorWriter, Error, Initializer, Layout,
    Parameters, Result, RetrievableReader, RetrievableWriter,
};
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Response, Status};
use tracing::{debug, error, info};

pub use descriptor::{GrpcDescriptorInitializer, GrpcDescriptorReader, GrpcDescriptorWriter};
pub use retrievable::{GrpcRetrievableInitializer, GrpcRetrievableReader, GrpcRetrievableWriter};

use crate::registry::{parsed, ConnectionProvider};

pub type StoreClient = proto::store_client::StoreClient<Channel>;

pub const BACKEND_NAME: &str = "grpc";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 1865;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// One entity of the store, addressed through a shared channel.
#[derive(Clone)]
pub(crate) struct Entity {
    pub client: StoreClient,
    pub schema: String,
    pub name: String,
}

impl Entity {
    pub fn new(client: &StoreClient, schema: &str, name: impl Into<String>) -> Self {
        Self {
            client: client.clone(),
            schema: schema.to_string(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> proto::EntityName {
        translate::entity_name(&self.schema, &self.name)
    }

    pub fn client(&self) -> StoreClient {
        self.client.clone()
    }

    /// Streams the rows of a query page by page, together with the page's
    /// column names. Errors end the stream.
    pub fn rows(&self, request: proto::QueryRequest) -> BoxStream<'static, (Arc<Vec<String>>, proto::Row)> {
        let mut client = self.client();
        let entity = self.name.clone();
        Box::pin(stream! {
            let mut pages = match client.query(request).await {
                Ok(response) => response.into_inner(),
                Err(status) => {
                    error!("Query on '{}' failed: {}", entity, status);
                    return;
                }
            };
            loop {
                match pages.message().await {
                    Ok(Some(page)) => {
                        let columns = Arc::new(page.columns);
                        for row in page.rows {
                            yield (Arc::clone(&columns), row);
                        }
                    }
                    Ok(None) => break,
                    Err(status) => {
                        error!("Query on '{}' aborted: {}", entity, status);
                        break;
                    }
                }
            }
        })
    }

    /// Number of rows matching `predicate`; `0` when the call fails.
    pub async fn count(&self, predicate: Option<proto::Predicate>) -> u64 {
        let request = proto::QueryRequest {
            entity: Some(self.name()),
            r#where: predicate,
            count: true,
            ..Default::default()
        };
        let mut client = self.client();
        let mut pages = match client.query(request).await {
            Ok(response) => response.into_inner(),
            Err(status) => {
                error!("Count on '{}' failed: {}", self.name, status);
                return 0;
            }
        };
        match pages.message().await {
            Ok(Some(page)) => page
                .rows
                .first()
                .and_then(|row| row.values.first())
                .and_then(|literal| match literal.data {
                    Some(proto::literal::Data::LongData(n)) => u64::try_from(n).ok(),
                    _ => None,
                })
                .unwrap_or(0),
            Ok(None) => 0,
            Err(status) => {
                error!("Count on '{}' failed: {}", self.name, status);
                0
            }
        }
    }

    pub async fn create_index(&self, column: &str, index: proto::IndexType) -> Result<()> {
        let request = proto::CreateIndexRequest {
            entity: Some(self.name()),
            column: column.to_string(),
            r#type: index as i32,
            if_not_exists: true,
        };
        tolerate(
            self.client().create_index(request).await,
            Code::AlreadyExists,
            &format!("create index on {}.{}", self.name, column),
        )
    }

    pub async fn drop_entity(&self) -> Result<()> {
        let request = proto::DropEntityRequest {
            entity: Some(self.name()),
        };
        tolerate(
            self.client().drop_entity(request).await,
            Code::NotFound,
            &format!("drop entity {}", self.name),
        )
    }

    pub async fn truncate(&self) -> Result<()> {
        let request = proto::TruncateEntityRequest {
            entity: Some(self.name()),
        };
        tolerate(
            self.client().truncate_entity(request).await,
            Code::NotFound,
            &format!("truncate entity {}", self.name),
        )
    }

    /// Whether the schema lists this entity.
    pub async fn exists(&self) -> bool {
        list_entities(&self.client, &self.schema)
            .await
            .map_or(false, |names| names.contains(&self.name))
    }
}

pub(crate) async fn create_schema(client: &StoreClient, schema: &str) -> Result<()> {
    let request = proto::CreateSchemaRequest {
        schema: schema.to_string(),
        if_not_exists: true,
    };
    tolerate(
        client.clone().create_schema(request).await,
        Code::AlreadyExists,
        &format!("create schema {}", schema),
    )
}

pub(crate) async fn list_entities(client: &StoreClient, schema: &str) -> Option<Vec<String>> {
    let request = proto::ListEntitiesRequest {
        schema: schema.to_string(),
    };
    match client.clone().list_entities(request).await {
        Ok(response) => Some(response.into_inner().entities.into_iter().map(|e| e.name).collect()),
        Err(status) if status.code() == Code::NotFound => Some(Vec::new()),
        Err(status) => {
            error!("Failed to list entities of schema '{}': {}", schema, status);
            None
        }
    }
}

/// Maps a DDL status to a result. The `tolerated` code counts as success.
pub(crate) fn tolerate<T>(result: std::result::Result<Response<T>, Status>, tolerated: Code, action: &str) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(status) if status.code() == tolerated => {
            debug!("Skipped {}: {}", action, status.message());
            Ok(())
        }
        Err(status) => {
            error!("Failed to {}: {}", action, status);
            Err(Error::Backend(format!("failed to {}: {}", action, status.message())))
        }
    }
}

/// Maps a write status to the writer contract: failures are logged and
/// reported as `false`.
pub(crate) fn acknowledged(result: std::result::Result<Response<proto::Ack>, Status>, action: &str) -> bool {
    match result {
        Ok(response) => {
            debug!("{} affected {} rows", action, response.get_ref().affected);
            true
        }
        Err(status) => {
            error!("Failed to {}: {}", action, status);
            false
        }
    }
}

pub struct GrpcConnection {
    schema: String,
    uri: String,
    client: StoreClient,
}

impl GrpcConnection {
    /// Opens a lazily connected channel; the first call establishes it.
    pub fn connect(schema: impl Into<String>, host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let uri = format!("http://{}:{}", host, port);
        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| Error::InvalidArgument(format!("invalid store address '{}': {}", uri, e)))?
            .connect_timeout(timeout)
            .timeout(timeout);
        Ok(Self {
            schema: schema.into(),
            uri,
            client: StoreClient::new(endpoint.connect_lazy()),
        })
    }
}

#[async_trait]
impl Connection for GrpcConnection {
    fn backend(&self) -> &'static str {
        BACKEND_NAME
    }

    fn schema_name(&self) -> &str {
        &self.schema
    }

    fn description(&self) -> String {
        format!("{}/{}", self.uri, self.schema)
    }

    fn descriptor_initializer(&self, field: &str, layout: &Layout) -> Result<Box<dyn Initializer>> {
        Ok(Box::new(GrpcDescriptorInitializer {
            entity: Entity::new(&self.client, &self.schema, descriptor_entity(field)),
            layout: layout.clone(),
        }))
    }

    fn descriptor_reader(&self, field: &str, layout: &Layout) -> Result<Box<dyn DescriptorReader>> {
        Ok(Box::new(GrpcDescriptorReader {
            field: field.to_string(),
            entity: Entity::new(&self.client, &self.schema, descriptor_entity(field)),
            layout: layout.clone(),
        }))
    }

    fn descriptor_writer(&self, field: &str, layout: &Layout) -> Result<Box<dyn DescriptorWriter>> {
        Ok(Box::new(GrpcDescriptorWriter {
            field: field.to_string(),
            entity: Entity::new(&self.client, &self.schema, descriptor_entity(field)),
            layout: layout.clone(),
        }))
    }

    fn retrievable_initializer(&self) -> Box<dyn Initializer> {
        Box::new(GrpcRetrievableInitializer::new(&self.client, &self.schema))
    }

    fn retrievable_reader(&self) -> Box<dyn RetrievableReader> {
        Box::new(GrpcRetrievableReader::new(&self.client, &self.schema))
    }

    fn retrievable_writer(&self) -> Box<dyn RetrievableWriter> {
        Box::new(GrpcRetrievableWriter::new(&self.client, &self.schema))
    }

    async fn close(&self) {
        // Channels close when the last client clone is dropped.
        info!("Closing gRPC connection to {}", self.uri);
    }
}

/// Registers the gRPC backend under `grpc`.
///
/// Parameters: `host` (default `127.0.0.1`), `port` (default `1865`) and
/// `timeout_ms` (default `30000`).
pub struct GrpcConnectionProvider;

impl ConnectionProvider for GrpcConnectionProvider {
    fn database_name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn open_connection(&self, schema: &str, parameters: &Parameters) -> Result<Arc<dyn Connection>> {
        let host = parameters.get("host").map_or(DEFAULT_HOST, String::as_str);
        let port = parsed(parameters, "port", DEFAULT_PORT)?;
        let timeout = Duration::from_millis(parsed(parameters, "timeout_ms", DEFAULT_TIMEOUT_MS)?);
        Ok(Arc::new(GrpcConnection::connect(schema, host, port, timeout)?))
    }
}
