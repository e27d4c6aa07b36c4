use chrono::{DateTime, Utc};
use num_bigint_dig::BigInt;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod binary;
pub mod element;
pub mod references;
pub mod symbol;
pub mod thenable;

pub use binary::{TypedArray, TypedArrayKind};
pub use element::{Component, Element, Lazy};
pub use references::{
    ClientManifest, ClientModuleEntry, ClientReference, ReferenceResolver, ServerReference,
};
pub use symbol::Symbol;
pub use thenable::{Thenable, ThenableStatus};

use crate::context::ServerContext;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Surrogate identity of a heap value, assigned once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// A value that can be encoded onto the wire.
#[derive(Clone)]
pub enum Model {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    BigInt(BigInt),
    Date(DateTime<Utc>),
    Symbol(Symbol),
    Array(Array),
    Object(Object),
    Map(ModelMap),
    Set(ModelSet),
    TypedArray(TypedArray),
    Element(Element),
    Lazy(Lazy),
    Thenable(Thenable),
    ClientReference(ClientReference),
    ServerReference(ServerReference),
    Component(Component),
    Provider(ServerContext),
    Instance(Instance),
}

impl Model {
    pub fn string(value: impl AsRef<str>) -> Self {
        Model::String(Arc::from(value.as_ref()))
    }

    pub fn array(items: impl IntoIterator<Item = Model>) -> Self {
        Model::Array(Array::new(items))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Model)>) -> Self {
        Model::Object(Object::new(entries))
    }

    pub fn map(entries: impl IntoIterator<Item = (Model, Model)>) -> Self {
        Model::Map(ModelMap::new(entries))
    }

    pub fn set(items: impl IntoIterator<Item = Model>) -> Self {
        Model::Set(ModelSet::new(items))
    }

    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Model::Null,
            JsonValue::Bool(b) => Model::Bool(*b),
            JsonValue::Number(n) => Model::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Model::string(s),
            JsonValue::Array(items) => Model::array(items.iter().map(Model::from_json)),
            JsonValue::Object(map) => {
                Model::object(map.iter().map(|(k, v)| (k.clone(), Model::from_json(v))))
            }
        }
    }

    /// Identity for values the outliner tracks; `None` for primitives.
    pub fn identity(&self) -> Option<ObjectId> {
        match self {
            Model::Array(a) => Some(a.id()),
            Model::Object(o) => Some(o.id()),
            Model::Map(m) => Some(m.id()),
            Model::Set(s) => Some(s.id()),
            Model::TypedArray(t) => Some(t.id()),
            Model::Element(e) => Some(e.id()),
            Model::Lazy(l) => Some(l.id()),
            Model::Thenable(t) => Some(t.id()),
            Model::ClientReference(r) => Some(r.id()),
            Model::ServerReference(r) => Some(r.id()),
            Model::Component(c) => Some(c.id()),
            Model::Instance(i) => Some(i.id),
            Model::Symbol(s) => Some(s.id()),
            Model::Provider(c) => Some(c.id()),
            Model::Null
            | Model::Undefined
            | Model::Bool(_)
            | Model::Number(_)
            | Model::String(_)
            | Model::BigInt(_)
            | Model::Date(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Model::Null => "null",
            Model::Undefined => "undefined",
            Model::Bool(_) => "boolean",
            Model::Number(_) => "number",
            Model::String(_) => "string",
            Model::BigInt(_) => "bigint",
            Model::Date(_) => "Date",
            Model::Symbol(_) => "symbol",
            Model::Array(_) => "Array",
            Model::Object(_) => "Object",
            Model::Map(_) => "Map",
            Model::Set(_) => "Set",
            Model::TypedArray(t) => t.kind().name(),
            Model::Element(_) => "Element",
            Model::Lazy(_) => "Lazy",
            Model::Thenable(_) => "Promise",
            Model::ClientReference(_) => "ClientReference",
            Model::ServerReference(_) => "ServerReference",
            Model::Component(_) => "function",
            Model::Provider(_) => "Provider",
            Model::Instance(_) => "object",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Model::Undefined)
    }

    /// Property lookup on plain objects; anything else reads as `undefined`.
    pub fn get(&self, key: &str) -> Model {
        match self {
            Model::Object(o) => o.get(key).unwrap_or(Model::Undefined),
            _ => Model::Undefined,
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Null => write!(f, "null"),
            Model::Undefined => write!(f, "undefined"),
            Model::Bool(b) => write!(f, "{b}"),
            Model::Number(n) => write!(f, "{n}"),
            Model::String(s) => write!(f, "{s:?}"),
            Model::BigInt(n) => write!(f, "{n}n"),
            Model::Date(d) => write!(f, "Date({})", d.to_rfc3339()),
            Model::Symbol(s) => write!(f, "{s:?}"),
            Model::Element(e) => write!(f, "{e:?}"),
            Model::Provider(c) => write!(f, "Provider({})", c.name()),
            other => match other.identity() {
                Some(id) => write!(f, "{}#{}", other.type_name(), id.as_u64()),
                None => write!(f, "{}", other.type_name()),
            },
        }
    }
}

impl From<bool> for Model {
    fn from(b: bool) -> Self {
        Model::Bool(b)
    }
}

impl From<f64> for Model {
    fn from(n: f64) -> Self {
        Model::Number(n)
    }
}

impl From<i32> for Model {
    fn from(n: i32) -> Self {
        Model::Number(f64::from(n))
    }
}

impl From<&str> for Model {
    fn from(s: &str) -> Self {
        Model::string(s)
    }
}

impl From<String> for Model {
    fn from(s: String) -> Self {
        Model::String(Arc::from(s))
    }
}

impl From<BigInt> for Model {
    fn from(n: BigInt) -> Self {
        Model::BigInt(n)
    }
}

impl From<DateTime<Utc>> for Model {
    fn from(d: DateTime<Utc>) -> Self {
        Model::Date(d)
    }
}

impl From<Vec<Model>> for Model {
    fn from(items: Vec<Model>) -> Self {
        Model::array(items)
    }
}

impl<T: Into<Model>> From<Option<T>> for Model {
    fn from(value: Option<T>) -> Self {
        value.map_or(Model::Null, Into::into)
    }
}

struct ArrayNode {
    id: ObjectId,
    items: RwLock<Vec<Model>>,
}

#[derive(Clone)]
pub struct Array(Arc<ArrayNode>);

impl Array {
    pub fn new(items: impl IntoIterator<Item = Model>) -> Self {
        Self(Arc::new(ArrayNode {
            id: ObjectId::next(),
            items: RwLock::new(items.into_iter().collect()),
        }))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn push(&self, value: Model) {
        self.0.items.write().push(value);
    }

    pub fn len(&self) -> usize {
        self.0.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.items.read().is_empty()
    }

    /// Snapshot of the current items.
    pub fn items(&self) -> Vec<Model> {
        self.0.items.read().clone()
    }
}

struct ObjectNode {
    id: ObjectId,
    entries: RwLock<Vec<(String, Model)>>,
}

/// Plain data object. Keys keep insertion order.
#[derive(Clone)]
pub struct Object(Arc<ObjectNode>);

impl Object {
    pub fn new<K: Into<String>>(entries: impl IntoIterator<Item = (K, Model)>) -> Self {
        let object = Self(Arc::new(ObjectNode {
            id: ObjectId::next(),
            entries: RwLock::new(Vec::new()),
        }));
        for (key, value) in entries {
            object.insert(key, value);
        }
        object
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn insert(&self, key: impl Into<String>, value: Model) {
        let key = key.into();
        let mut entries = self.0.entries.write();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Model> {
        self.0.entries.read().iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    pub fn len(&self) -> usize {
        self.0.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.entries.read().is_empty()
    }

    pub fn entries(&self) -> Vec<(String, Model)> {
        self.0.entries.read().clone()
    }
}

struct MapNode {
    id: ObjectId,
    entries: RwLock<Vec<(Model, Model)>>,
}

#[derive(Clone)]
pub struct ModelMap(Arc<MapNode>);

impl ModelMap {
    pub fn new(entries: impl IntoIterator<Item = (Model, Model)>) -> Self {
        Self(Arc::new(MapNode {
            id: ObjectId::next(),
            entries: RwLock::new(entries.into_iter().collect()),
        }))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn insert(&self, key: Model, value: Model) {
        self.0.entries.write().push((key, value));
    }

    pub fn entries(&self) -> Vec<(Model, Model)> {
        self.0.entries.read().clone()
    }
}

struct SetNode {
    id: ObjectId,
    items: RwLock<Vec<Model>>,
}

#[derive(Clone)]
pub struct ModelSet(Arc<SetNode>);

impl ModelSet {
    pub fn new(items: impl IntoIterator<Item = Model>) -> Self {
        Self(Arc::new(SetNode { id: ObjectId::next(), items: RwLock::new(items.into_iter().collect()) }))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn insert(&self, value: Model) {
        self.0.items.write().push(value);
    }

    pub fn items(&self) -> Vec<Model> {
        self.0.items.read().clone()
    }
}

/// An object that is not plain data: a class instance or a null-prototype object.
#[derive(Debug, Clone)]
pub struct Instance {
    id: ObjectId,
    pub class_name: Option<String>,
}

impl Instance {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self { id: ObjectId::next(), class_name: Some(class_name.into()) }
    }

    pub fn null_prototype() -> Self {
        Self { id: ObjectId::next(), class_name: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_ids_are_unique() {
        let a = Model::object([("x", Model::from(1))]);
        let b = Model::object([("x", Model::from(1))]);
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.identity(), a.clone().identity());
    }

    #[test]
    fn test_primitives_have_no_identity() {
        assert!(Model::Null.identity().is_none());
        assert!(Model::from("text").identity().is_none());
        assert!(Model::Number(1.5).identity().is_none());
    }

    #[test]
    fn test_object_insert_keeps_order_and_replaces() {
        let object = Object::new([("b", Model::from(1)), ("a", Model::from(2))]);
        object.insert("b", Model::from(3));
        let keys: Vec<String> = object.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert!(matches!(object.get("b"), Some(Model::Number(n)) if n == 3.0));
    }

    #[test]
    fn test_from_json() {
        let model = Model::from_json(&json!({"list": [1, "two", null], "flag": true}));
        let Model::Object(object) = model else { panic!("expected object") };
        assert_eq!(object.len(), 2);
        let Some(Model::Array(list)) = object.get("list") else { panic!("expected array") };
        assert_eq!(list.len(), 3);
        assert!(matches!(object.get("flag"), Some(Model::Bool(true))));
    }

    #[test]
    fn test_cyclic_array() {
        let array = Array::new([]);
        array.push(Model::Array(array.clone()));
        let Model::Array(inner) = &array.items()[0] else { panic!("expected array") };
        assert_eq!(inner.id(), array.id());
    }

    #[test]
    fn test_get_on_non_object_is_undefined() {
        assert!(Model::from(1).get("x").is_undefined());
        assert!(Model::object([("x", Model::Null)]).get("y").is_undefined());
    }
}
