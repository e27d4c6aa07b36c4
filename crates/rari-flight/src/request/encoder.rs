use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use super::Request;
use crate::context::ServerContext;
use crate::error::FlightError;
use crate::model::Model;
use crate::wire_format::{LARGE_STRING_THRESHOLD, tokens, utf16_len};

static EVENT_HANDLER_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^on[A-Z]").expect("Valid regex pattern"));

/// Outcome of resolving server components in one slot.
pub(crate) enum Resolved {
    Model(Model),
    ClientElement(ClientElement),
    /// An array returned by a server component, each entry resolved on its own.
    List(Vec<Resolved>),
}

/// An element left for the client to render: `["$", type, key, props]` on the wire.
pub(crate) struct ClientElement {
    pub ty: Model,
    pub key: Option<String>,
    pub props: Model,
    /// Set for provider elements. The value is visible to the children while they encode.
    pub provider: Option<ServerContext>,
}

impl Request {
    pub(super) fn encode_resolved(&mut self, key: &str, resolved: Resolved) -> Result<Value, FlightError> {
        match resolved {
            Resolved::Model(model) => self.encode(key, &model),
            Resolved::ClientElement(element) => self.encode_client_element(element),
            Resolved::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    out.push(self.encode_resolved(&index.to_string(), item)?);
                }
                Ok(Value::Array(out))
            }
        }
    }

    /// Encodes `value` found under `key` of its parent container.
    pub(super) fn encode(&mut self, key: &str, value: &Model) -> Result<Value, FlightError> {
        match value {
            Model::Null => Ok(Value::Null),
            Model::Undefined => Ok(Value::from(tokens::UNDEFINED)),
            Model::Bool(b) => Ok(Value::Bool(*b)),
            Model::Number(n) => Ok(tokens::number(*n)),
            Model::String(s) => self.encode_string(s),
            Model::BigInt(n) => {
                self.taint.check_bigint(n)?;
                Ok(Value::from(tokens::bigint(n)))
            }
            Model::Date(date) => Ok(Value::from(tokens::date(date))),
            Model::Symbol(symbol) => self.serialize_symbol(symbol),
            Model::Element(_) | Model::Lazy(_) => self.resolve_slot(key, value),
            Model::Thenable(thenable) => {
                self.taint.check_object(thenable.id())?;
                self.serialize_promise(thenable)
            }
            Model::ClientReference(reference) => {
                self.taint.check_object(reference.id())?;
                self.serialize_client_reference(reference, false)
            }
            Model::ServerReference(reference) => {
                self.taint.check_object(reference.id())?;
                self.serialize_server_reference(reference)
            }
            Model::Provider(context) => self.serialize_provider(context),
            Model::Component(component) => {
                self.taint.check_object(component.id())?;
                if EVENT_HANDLER_KEY.is_match(key) {
                    Err(FlightError::EventHandlerInProps(key.to_string()))
                } else {
                    Err(FlightError::FunctionInProps(key.to_string()))
                }
            }
            Model::Instance(instance) => Err(FlightError::ClassInstance(instance.class_name.clone())),
            Model::Array(_) | Model::Object(_) | Model::Map(_) | Model::Set(_) | Model::TypedArray(_) => {
                self.encode_object(value)
            }
        }
    }

    fn encode_string(&mut self, text: &str) -> Result<Value, FlightError> {
        self.taint.check_text(text)?;
        if utf16_len(text) >= LARGE_STRING_THRESHOLD {
            return Ok(Value::from(self.serialize_large_text(text)));
        }
        Ok(Value::from(tokens::escape_string(text)))
    }

    fn encode_object(&mut self, value: &Model) -> Result<Value, FlightError> {
        let Some(id) = value.identity() else {
            return Err(FlightError::UnsupportedType(value.type_name().to_string()));
        };
        self.taint.check_object(id)?;
        if let Some(reference) = self.dedup(value, id)? {
            return Ok(reference);
        }

        match value {
            Model::Array(array) => {
                let items = array.items();
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    out.push(self.encode(&index.to_string(), item)?);
                }
                Ok(Value::Array(out))
            }
            Model::Object(object) => {
                let mut out = Map::new();
                for (key, item) in object.entries() {
                    let encoded = self.encode(&key, &item)?;
                    out.insert(key, encoded);
                }
                Ok(Value::Object(out))
            }
            Model::Map(map) => self.serialize_map(map),
            Model::Set(set) => self.serialize_set(set),
            Model::TypedArray(array) => self.serialize_typed_array(array),
            other => Err(FlightError::UnsupportedType(other.type_name().to_string())),
        }
    }

    fn encode_client_element(&mut self, element: ClientElement) -> Result<Value, FlightError> {
        let ty = match &element.ty {
            Model::ClientReference(reference) => {
                self.taint.check_object(reference.id())?;
                self.serialize_client_reference(reference, true)?
            }
            other => self.encode("1", other)?,
        };
        let key = match &element.key {
            Some(key) => Value::from(tokens::escape_string(key)),
            None => Value::Null,
        };
        let props = match &element.provider {
            Some(context) => self.encode_provider_props(context, &element.props)?,
            None => self.encode("3", &element.props)?,
        };
        Ok(Value::Array(vec![Value::from(tokens::ELEMENT), ty, key, props]))
    }

    /// Encodes `{value, children}` with the provided value pushed for the children.
    fn encode_provider_props(&mut self, context: &ServerContext, props: &Model) -> Result<Value, FlightError> {
        let value = props.get("value");
        let children = props.get("children");
        let saved = self.active_context.clone();
        self.active_context = saved.push(context.clone(), value.clone());
        let encoded = self.encode("value", &value).and_then(|value| {
            let children = self.encode("children", &children)?;
            Ok((value, children))
        });
        self.active_context = saved;
        let (value, children) = encoded?;

        let mut out = Map::new();
        out.insert("value".to_string(), value);
        out.insert("children".to_string(), children);
        Ok(Value::Object(out))
    }
}
