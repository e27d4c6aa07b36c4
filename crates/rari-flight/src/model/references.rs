use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use super::{Model, ObjectId};
use crate::error::FlightError;

struct ClientReferenceInner {
    id: ObjectId,
    module: String,
    export: String,
}

/// Opaque handle for code that runs on the client, identified by module path and export name.
#[derive(Clone)]
pub struct ClientReference(Arc<ClientReferenceInner>);

impl ClientReference {
    pub fn new(module: impl Into<String>, export: impl Into<String>) -> Self {
        Self(Arc::new(ClientReferenceInner {
            id: ObjectId::next(),
            module: module.into(),
            export: export.into(),
        }))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn module(&self) -> &str {
        &self.0.module
    }

    pub fn export(&self) -> &str {
        &self.0.export
    }

    /// Dedup key. Two handles to the same export share one import row.
    pub fn key(&self) -> String {
        format!("{}#{}", self.module(), self.export())
    }
}

impl std::fmt::Debug for ClientReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClientReference({})", self.key())
    }
}

impl From<ClientReference> for Model {
    fn from(reference: ClientReference) -> Self {
        Model::ClientReference(reference)
    }
}

struct ServerReferenceInner {
    id: ObjectId,
    reference_id: String,
    bound: Option<Vec<Model>>,
}

/// Opaque handle for a server action, optionally with pre-bound arguments.
#[derive(Clone)]
pub struct ServerReference(Arc<ServerReferenceInner>);

impl ServerReference {
    pub fn new(reference_id: impl Into<String>) -> Self {
        Self(Arc::new(ServerReferenceInner { id: ObjectId::next(), reference_id: reference_id.into(), bound: None }))
    }

    pub fn bind(&self, args: impl IntoIterator<Item = Model>) -> Self {
        let mut bound = self.0.bound.clone().unwrap_or_default();
        bound.extend(args);
        Self(Arc::new(ServerReferenceInner {
            id: ObjectId::next(),
            reference_id: self.0.reference_id.clone(),
            bound: Some(bound),
        }))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn reference_id(&self) -> &str {
        &self.0.reference_id
    }

    pub fn bound(&self) -> Option<&[Model]> {
        self.0.bound.as_deref()
    }
}

impl std::fmt::Debug for ServerReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ServerReference({})", self.reference_id())
    }
}

impl From<ServerReference> for Model {
    fn from(reference: ServerReference) -> Self {
        Model::ServerReference(reference)
    }
}

/// Maps reference handles to the metadata the client needs to load them.
pub trait ReferenceResolver: Send + Sync {
    fn resolve_client_reference_metadata(&self, reference: &ClientReference) -> Result<Value, FlightError>;

    fn server_reference_id(&self, reference: &ServerReference) -> Result<String, FlightError> {
        Ok(reference.reference_id().to_string())
    }

    fn server_reference_bound_arguments(&self, reference: &ServerReference) -> Option<Vec<Model>> {
        reference.bound().map(<[Model]>::to_vec)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientModuleEntry {
    pub id: String,
    #[serde(default)]
    pub chunks: Vec<String>,
    pub name: String,
    #[serde(default)]
    pub r#async: bool,
}

/// Bundler output: module path, then export name, then loading metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientManifest {
    modules: FxHashMap<String, FxHashMap<String, ClientModuleEntry>>,
}

impl ClientManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, FlightError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn insert(&mut self, module: impl Into<String>, export: impl Into<String>, entry: ClientModuleEntry) {
        self.modules.entry(module.into()).or_default().insert(export.into(), entry);
    }

    pub fn get(&self, module: &str, export: &str) -> Option<&ClientModuleEntry> {
        self.modules.get(module)?.get(export)
    }
}

impl ReferenceResolver for ClientManifest {
    fn resolve_client_reference_metadata(&self, reference: &ClientReference) -> Result<Value, FlightError> {
        let entry = self.get(reference.module(), reference.export()).ok_or_else(|| {
            FlightError::resolver(format!(
                "Could not find the module \"{}\" in the React Client Manifest.",
                reference.key()
            ))
        })?;

        if entry.r#async {
            Ok(json!([entry.id, entry.chunks, entry.name, 1]))
        } else {
            Ok(json!([entry.id, entry.chunks, entry.name]))
        }
    }
}
