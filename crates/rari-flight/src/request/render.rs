use serde_json::Value;

use super::encoder::{ClientElement, Resolved};
use super::task::{Task, ThenableState};
use super::{Request, Written};
use crate::context::ServerContext;
use crate::error::{FlightError, Interrupt, Step};
use crate::model::{Component, Element, Lazy, Model, Thenable, ThenableStatus};
use crate::wire_format::tokens;

/// Key after rendering one server component in a slot or task.
fn slot_key(parent: Option<&str>, key: Option<&str>) -> String {
    match (parent, key) {
        (None, None) => "0".to_string(),
        (None, Some(key)) => format!("0,{key}"),
        (Some(parent), None) => format!("{parent},0"),
        (Some(parent), Some(key)) => format!("{parent},{key}"),
    }
}

/// Key after rendering one server component at `index` of a returned array.
fn list_key(parent: Option<&str>, key: Option<&str>, index: usize) -> String {
    match (parent, key) {
        (None, None) => index.to_string(),
        (None, Some(key)) => key.to_string(),
        (Some(parent), None) => format!("{parent},{index}"),
        (Some(parent), Some(key)) => format!("{parent},{key}"),
    }
}

/// Key of an element handed to the client below server components.
fn client_element_key(parent: Option<&str>, key: Option<&str>, child_index: Option<usize>) -> Option<String> {
    let Some(parent) = parent else {
        return key.map(str::to_string);
    };
    Some(match key {
        Some(key) => format!("{parent},{key}"),
        None => format!("{parent},{}", child_index.unwrap_or(0)),
    })
}

impl Request {
    /// Resolves server components in a data slot, then encodes the result.
    /// Interrupts are confined to the slot: it becomes a lazy reference.
    pub(super) fn resolve_slot(&mut self, key: &str, value: &Model) -> Result<Value, FlightError> {
        let mut current = Resolved::Model(value.clone());
        let mut parent_key: Option<String> = None;

        while let Resolved::Model(model) = &current {
            let model = model.clone();
            let step = match &model {
                Model::Element(element) => {
                    if let Some(reference) = self.dedup(&model, element.id())? {
                        return Ok(reference);
                    }
                    self.render_element(parent_key.as_deref(), element, None, None).map(|next| {
                        parent_key = Some(slot_key(parent_key.as_deref(), element.key()));
                        next
                    })
                }
                Model::Lazy(lazy) => lazy.init().map(Resolved::Model),
                _ => break,
            };
            match step {
                Ok(next) => current = next,
                Err(interrupt) => return self.handle_render_interrupt(model, parent_key, interrupt),
            }
        }

        self.encode_resolved(key, current)
    }

    fn handle_render_interrupt(
        &mut self,
        model: Model,
        parent_key: Option<String>,
        interrupt: Interrupt,
    ) -> Result<Value, FlightError> {
        self.outbox.pending_chunks += 1;
        match interrupt {
            Interrupt::Suspend(thenable) => {
                let id = self.create_task(model, parent_key);
                let state = self.suspended_thenable_state.take().unwrap_or_default();
                if let Some(task) = self.tasks.get_mut(&id) {
                    task.thenable_state = state;
                }
                self.subscribe(&thenable, id);
                Ok(Value::from(tokens::lazy(id)))
            }
            Interrupt::Postpone(postpone) => {
                let id = self.outbox.allocate_id();
                self.log_postpone(&postpone.reason);
                self.emit_postpone_chunk(id, &postpone)?;
                Ok(Value::from(tokens::lazy(id)))
            }
            Interrupt::Error(error) => {
                let id = self.outbox.allocate_id();
                let digest = self.log_recoverable_error(&error);
                self.emit_error_chunk(id, &digest, &error)?;
                Ok(Value::from(tokens::lazy(id)))
            }
        }
    }

    /// Runs the server components at the root of a task. The task keeps the element
    /// being rendered so a suspension retries from there.
    pub(super) fn resolve_task_model(&mut self, task: &mut Task) -> Step<Resolved> {
        let mut current = Resolved::Model(task.model.clone());
        let mut parent_key = task.parent_key.clone();
        let mut prev_state = Some(std::mem::take(&mut task.thenable_state));

        while let Resolved::Model(model) = &current {
            let model = model.clone();
            match &model {
                Model::Element(element) => {
                    self.written_objects.insert(element.id(), Written::Outlined(task.id));
                    task.model = model.clone();
                    task.parent_key = parent_key.clone();
                    current = self.render_element(parent_key.as_deref(), element, prev_state.take(), None)?;
                    parent_key = Some(slot_key(parent_key.as_deref(), element.key()));
                }
                Model::Lazy(lazy) => {
                    task.model = model.clone();
                    task.parent_key = parent_key.clone();
                    prev_state = None;
                    current = Resolved::Model(lazy.init()?);
                }
                _ => break,
            }
        }
        Ok(current)
    }

    fn render_element(
        &mut self,
        parent_key: Option<&str>,
        element: &Element,
        prev_state: Option<ThenableState>,
        child_index: Option<usize>,
    ) -> Step<Resolved> {
        if element.ref_().is_some() {
            return Err(FlightError::RefInServerComponent.into());
        }
        self.render_type(parent_key, element.ty().clone(), element.key(), element.props(), prev_state, child_index)
    }

    fn render_type(
        &mut self,
        parent_key: Option<&str>,
        ty: Model,
        key: Option<&str>,
        props: &Model,
        prev_state: Option<ThenableState>,
        child_index: Option<usize>,
    ) -> Step<Resolved> {
        let client_element = |ty: Model, provider: Option<ServerContext>| -> Step<Resolved> {
            Ok(Resolved::ClientElement(ClientElement {
                ty,
                key: client_element_key(parent_key, key, child_index),
                props: props.clone(),
                provider,
            }))
        };

        match ty {
            Model::Component(component) => {
                let result = self.render_component(&component, props, prev_state)?;
                match result {
                    Model::Thenable(thenable) => match thenable.status() {
                        ThenableStatus::Fulfilled(value) => self.wrap(parent_key, value),
                        _ => self.wrap(parent_key, Model::Lazy(Lazy::from_thenable(thenable))),
                    },
                    other => self.wrap(parent_key, other),
                }
            }
            Model::ClientReference(_) | Model::String(_) => client_element(ty, None),
            Model::Symbol(symbol) if symbol.is_fragment() => self.wrap(parent_key, props.get("children")),
            Model::Symbol(_) => client_element(ty, None),
            Model::Lazy(lazy) => {
                let inner = lazy.init()?;
                self.render_type(parent_key, inner, key, props, prev_state, child_index)
            }
            Model::Provider(context) => client_element(Model::Provider(context.clone()), Some(context)),
            other => Err(FlightError::UnsupportedElementType(format!("{other:?}")).into()),
        }
    }

    fn render_component(
        &mut self,
        component: &Component,
        props: &Model,
        prev_state: Option<ThenableState>,
    ) -> Step<Model> {
        let mut scope = ComponentScope { request: self, thenable_state: prev_state.unwrap_or_default(), index: 0 };
        let result = component.call(&mut scope, props);
        let state = scope.thenable_state;
        if matches!(result, Err(Interrupt::Suspend(_))) {
            self.suspended_thenable_state = Some(state);
        }
        result
    }

    /// Splits an array returned by a server component so each entry is resolved with
    /// its own composite key. Arrays nested below that are left as data.
    fn wrap(&mut self, parent_key: Option<&str>, result: Model) -> Step<Resolved> {
        let Model::Array(array) = &result else {
            return Ok(Resolved::Model(result));
        };
        if self.in_array {
            return Ok(Resolved::Model(result));
        }

        self.in_array = true;
        let items = self.wrap_items(parent_key, array.items());
        self.in_array = false;
        if matches!(items, Err(Interrupt::Suspend(_))) {
            // The retry starts over from the component that returned the array, so the
            // state saved by an item's component does not belong to it.
            self.suspended_thenable_state = None;
        }
        Ok(Resolved::List(items?))
    }

    fn wrap_items(&mut self, parent_key: Option<&str>, items: Vec<Model>) -> Step<Vec<Resolved>> {
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let mut item_key = parent_key.map(str::to_string);
            let mut current = Resolved::Model(item);
            loop {
                current = match current {
                    Resolved::Model(Model::Element(element)) => {
                        let next = self.render_element(item_key.as_deref(), &element, None, Some(index))?;
                        item_key = Some(list_key(item_key.as_deref(), element.key(), index));
                        next
                    }
                    Resolved::Model(Model::Lazy(lazy)) => Resolved::Model(lazy.init()?),
                    done => {
                        out.push(done);
                        break;
                    }
                };
            }
        }
        Ok(out)
    }
}

/// What a server component can reach while it renders.
pub struct ComponentScope<'a> {
    request: &'a mut Request,
    thenable_state: ThenableState,
    index: usize,
}

impl ComponentScope<'_> {
    /// Reads a thenable. On a retry after suspending, the thenable used at the same
    /// call position in the previous attempt is read instead of `thenable`.
    pub fn use_thenable(&mut self, thenable: &Thenable) -> Step<Model> {
        let index = self.index;
        self.index += 1;
        let tracked = match self.thenable_state.get(index) {
            Some(previous) => previous.clone(),
            None => {
                self.thenable_state.push(thenable.clone());
                thenable.clone()
            }
        };
        tracked.read()
    }

    pub fn read_context(&self, context: &ServerContext) -> Model {
        self.request.active_context.read(context)
    }

    /// Unique id for this request: `:<prefix>S<base32 counter>:`.
    pub fn use_id(&mut self) -> String {
        let id = self.request.identifier_count;
        self.request.identifier_count += 1;
        format!(":{}S{}:", self.request.identifier_prefix, to_base32(id))
    }

    pub fn emit_hint(&mut self, code: &str, model: &Value) {
        self.request.emit_hint(code, model);
    }
}

fn to_base32(mut n: u64) -> String {
    const DIGITS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 32) as usize]);
        n /= 32;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
