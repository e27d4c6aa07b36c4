use serde_json::Value;

use super::{Request, Written};
use crate::context::ServerContext;
use crate::error::FlightError;
use crate::model::{
    ClientReference, Model, ModelMap, ModelSet, ObjectId, ServerReference, Symbol, Thenable, ThenableStatus,
    TypedArray,
};
use crate::wire_format::{ChunkId, row, tokens};

impl Request {
    /// First sighting inlines and marks the value seen. The second outlines it into its
    /// own row; later ones reference that row.
    pub(super) fn dedup(&mut self, value: &Model, id: ObjectId) -> Result<Option<Value>, FlightError> {
        match self.written_objects.get(&id).copied() {
            Some(Written::Seen) => {
                let outlined = self.outline_model(value.clone())?;
                Ok(Some(Value::from(tokens::by_value(outlined))))
            }
            Some(Written::Outlined(_)) if self.model_root == Some(id) => {
                self.model_root = None;
                Ok(None)
            }
            Some(Written::Outlined(existing)) => Ok(Some(Value::from(tokens::by_value(existing)))),
            None => {
                self.written_objects.insert(id, Written::Seen);
                Ok(None)
            }
        }
    }

    /// Gives `value` its own row, encoded right away.
    pub(super) fn outline_model(&mut self, value: Model) -> Result<ChunkId, FlightError> {
        self.outbox.pending_chunks += 1;
        let id = self.create_task(value, None);
        self.retry_task(id)?;
        Ok(id)
    }

    pub(super) fn serialize_promise(&mut self, thenable: &Thenable) -> Result<Value, FlightError> {
        match self.written_objects.get(&thenable.id()).copied() {
            Some(Written::Outlined(_)) if self.model_root == Some(thenable.id()) => self.model_root = None,
            Some(Written::Outlined(existing)) => return Ok(Value::from(tokens::promise(existing))),
            Some(Written::Seen) | None => {}
        }
        let id = self.serialize_thenable(thenable)?;
        self.written_objects.insert(thenable.id(), Written::Outlined(id));
        Ok(Value::from(tokens::promise(id)))
    }

    fn serialize_thenable(&mut self, thenable: &Thenable) -> Result<ChunkId, FlightError> {
        self.outbox.pending_chunks += 1;
        match thenable.status() {
            ThenableStatus::Fulfilled(value) => {
                let id = self.create_task(value, None);
                self.ready.push_back(id);
                Ok(id)
            }
            ThenableStatus::Rejected(reason) => {
                let id = self.outbox.allocate_id();
                self.emit_rejection(id, &reason)?;
                Ok(id)
            }
            ThenableStatus::Pending => {
                let id = self.create_task(Model::Undefined, None);
                if let Some(task) = self.tasks.get_mut(&id) {
                    task.waiting_on = Some(thenable.clone());
                }
                self.subscribe(thenable, id);
                Ok(id)
            }
        }
    }

    /// Object keys are marked seen first so they are always outlined.
    fn mark_keys_seen<'a>(&mut self, keys: impl IntoIterator<Item = &'a Model>) {
        for key in keys {
            if let Some(id) = key.identity()
                && !matches!(key, Model::Symbol(_))
            {
                self.written_objects.entry(id).or_insert(Written::Seen);
            }
        }
    }

    pub(super) fn serialize_map(&mut self, map: &ModelMap) -> Result<Value, FlightError> {
        let entries = map.entries();
        self.mark_keys_seen(entries.iter().map(|(key, _)| key));
        let pairs = Model::array(entries.into_iter().map(|(key, value)| Model::array([key, value])));
        let id = self.outline_model(pairs)?;
        Ok(Value::from(tokens::map(id)))
    }

    pub(super) fn serialize_set(&mut self, set: &ModelSet) -> Result<Value, FlightError> {
        let items = set.items();
        self.mark_keys_seen(items.iter());
        let id = self.outline_model(Model::array(items))?;
        Ok(Value::from(tokens::set(id)))
    }

    pub(super) fn serialize_typed_array(&mut self, array: &TypedArray) -> Result<Value, FlightError> {
        self.taint.check_binary(array)?;
        self.outbox.pending_chunks += 2;
        let id = self.outbox.allocate_id();
        self.outbox.regular.extend(row::binary_rows(id, array.kind(), array.bytes()));
        Ok(Value::from(tokens::by_value(id)))
    }

    pub(super) fn serialize_large_text(&mut self, text: &str) -> String {
        self.outbox.pending_chunks += 2;
        let id = self.outbox.allocate_id();
        self.emit_text_chunk(id, text);
        tokens::by_value(id)
    }

    pub(super) fn serialize_symbol(&mut self, symbol: &Symbol) -> Result<Value, FlightError> {
        if let Some(&existing) = self.written_symbols.get(&symbol.id()) {
            return Ok(Value::from(tokens::by_value(existing)));
        }
        if !symbol.is_registered() {
            return Err(FlightError::NonGlobalSymbol(symbol.description().to_string()));
        }
        self.outbox.pending_chunks += 1;
        let id = self.outbox.allocate_id();
        self.emit_symbol_chunk(id, symbol.description())?;
        self.written_symbols.insert(symbol.id(), id);
        Ok(Value::from(tokens::by_value(id)))
    }

    pub(super) fn serialize_provider(&mut self, context: &ServerContext) -> Result<Value, FlightError> {
        if let Some(&existing) = self.written_providers.get(context.name()) {
            return Ok(Value::from(tokens::by_value(existing)));
        }
        self.outbox.pending_chunks += 1;
        let id = self.outbox.allocate_id();
        self.written_providers.insert(context.name().to_string(), id);
        self.emit_provider_chunk(id, context.name())?;
        Ok(Value::from(tokens::by_value(id)))
    }

    /// Import row for a client reference. In an element's type slot the reference is lazy
    /// so the client can suspend on the module instead of the parent.
    pub(super) fn serialize_client_reference(
        &mut self,
        reference: &ClientReference,
        type_slot: bool,
    ) -> Result<Value, FlightError> {
        let token = |id| if type_slot { tokens::lazy(id) } else { tokens::by_value(id) };

        let key = reference.key();
        if let Some(&existing) = self.written_client_references.get(&key) {
            return Ok(Value::from(token(existing)));
        }

        match self.resolver.resolve_client_reference_metadata(reference) {
            Ok(metadata) => {
                self.outbox.pending_chunks += 1;
                let id = self.outbox.allocate_id();
                self.emit_import_chunk(id, &metadata)?;
                self.written_client_references.insert(key, id);
                Ok(Value::from(token(id)))
            }
            Err(error) => {
                self.outbox.pending_chunks += 1;
                let id = self.outbox.allocate_id();
                let digest = self.log_recoverable_error(&error);
                self.emit_error_chunk(id, &digest, &error)?;
                Ok(Value::from(tokens::by_value(id)))
            }
        }
    }

    /// Outlines `{id, bound}` for a server reference. Bound arguments travel as a promise.
    pub(super) fn serialize_server_reference(&mut self, reference: &ServerReference) -> Result<Value, FlightError> {
        if let Some(&existing) = self.written_server_references.get(&reference.id()) {
            return Ok(Value::from(tokens::server_reference(existing)));
        }

        let bound = match self.resolver.server_reference_bound_arguments(reference) {
            Some(args) => Model::Thenable(Thenable::fulfilled(Model::array(args))),
            None => Model::Null,
        };
        let metadata = Model::object([
            ("id", Model::string(self.resolver.server_reference_id(reference)?)),
            ("bound", bound),
        ]);
        let id = self.outline_model(metadata)?;
        self.written_server_references.insert(reference.id(), id);
        Ok(Value::from(tokens::server_reference(id)))
    }
}
