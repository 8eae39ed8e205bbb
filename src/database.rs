//! Database metadata source.
//!
//! The server never talks to the database itself. The editor owns the
//! connection and answers the custom `dos/*` requests below; every failure
//! surfaces as [`Error::Database`] and is turned into "no data" by the
//! metadata cache.

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::request::Request;

use crate::error::{Error, Result};

/// A table addressed either through the catalog hierarchy or by database path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TableHandle {
    Catalog {
        catalog: String,
        schema: String,
        table: String,
    },
    Database {
        database: String,
        table: String,
    },
}

impl TableHandle {
    pub fn table(&self) -> &str {
        match self {
            TableHandle::Catalog { table, .. } | TableHandle::Database { table, .. } => table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[tower_lsp::async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn list_catalogs(&self) -> Result<Vec<String>>;
    async fn list_databases(&self) -> Result<Vec<String>>;
    async fn list_tables(&self, database: &str) -> Result<Vec<String>>;
    async fn get_schema(&self, table: &TableHandle) -> Result<Vec<Column>>;
    async fn get_schemas_by_catalog(&self, catalog: &str) -> Result<Vec<String>>;
    async fn get_tables_by_catalog_and_schema(&self, catalog: &str, schema: &str) -> Result<Vec<String>>;
}

/// A client with no connection: every listing is empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDatabase;

#[tower_lsp::async_trait]
impl DatabaseClient for NullDatabase {
    async fn list_catalogs(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn list_tables(&self, _database: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn get_schema(&self, _table: &TableHandle) -> Result<Vec<Column>> {
        Ok(Vec::new())
    }

    async fn get_schemas_by_catalog(&self, _catalog: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn get_tables_by_catalog_and_schema(&self, _catalog: &str, _schema: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseParams {
    pub database: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogParams {
    pub catalog: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSchemaParams {
    pub catalog: String,
    pub schema: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaParams {
    pub table: TableHandle,
}

pub enum ListCatalogs {}

impl Request for ListCatalogs {
    type Params = ();
    type Result = Vec<String>;
    const METHOD: &'static str = "dos/listCatalogs";
}

pub enum ListDatabases {}

impl Request for ListDatabases {
    type Params = ();
    type Result = Vec<String>;
    const METHOD: &'static str = "dos/listDatabases";
}

pub enum ListTables {}

impl Request for ListTables {
    type Params = DatabaseParams;
    type Result = Vec<String>;
    const METHOD: &'static str = "dos/listTables";
}

pub enum GetSchema {}

impl Request for GetSchema {
    type Params = SchemaParams;
    type Result = Vec<Column>;
    const METHOD: &'static str = "dos/getSchema";
}

pub enum GetSchemasByCatalog {}

impl Request for GetSchemasByCatalog {
    type Params = CatalogParams;
    type Result = Vec<String>;
    const METHOD: &'static str = "dos/getSchemasByCatalog";
}

pub enum GetTablesByCatalogAndSchema {}

impl Request for GetTablesByCatalogAndSchema {
    type Params = CatalogSchemaParams;
    type Result = Vec<String>;
    const METHOD: &'static str = "dos/getTablesByCatalogAndSchema";
}

/// Forwards metadata queries to the editor over the language server channel.
#[derive(Debug, Clone)]
pub struct EditorDatabase {
    client: tower_lsp::Client,
}

impl EditorDatabase {
    pub fn new(client: tower_lsp::Client) -> Self {
        Self { client }
    }

    async fn request<R: Request>(&self, params: R::Params) -> Result<R::Result> {
        self.client
            .send_request::<R>(params)
            .await
            .map_err(|err| Error::Database {
                method: R::METHOD,
                message: err.to_string(),
            })
    }
}

#[tower_lsp::async_trait]
impl DatabaseClient for EditorDatabase {
    async fn list_catalogs(&self) -> Result<Vec<String>> {
        self.request::<ListCatalogs>(()).await
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        self.request::<ListDatabases>(()).await
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        self.request::<ListTables>(DatabaseParams {
            database: database.to_string(),
        })
        .await
    }

    async fn get_schema(&self, table: &TableHandle) -> Result<Vec<Column>> {
        self.request::<GetSchema>(SchemaParams {
            table: table.clone(),
        })
        .await
    }

    async fn get_schemas_by_catalog(&self, catalog: &str) -> Result<Vec<String>> {
        self.request::<GetSchemasByCatalog>(CatalogParams {
            catalog: catalog.to_string(),
        })
        .await
    }

    async fn get_tables_by_catalog_and_schema(&self, catalog: &str, schema: &str) -> Result<Vec<String>> {
        self.request::<GetTablesByCatalogAndSchema>(CatalogSchemaParams {
            catalog: catalog.to_string(),
            schema: schema.to_string(),
        })
        .await
    }
}
