use dashmap::DashMap;
use std::sync::{Arc, LazyLock};

use crate::model::{Model, ObjectId};

static SERVER_CONTEXTS: LazyLock<DashMap<String, ServerContext>> = LazyLock::new(DashMap::new);

struct ServerContextInner {
    id: ObjectId,
    name: String,
    default_value: Model,
}

/// An ambient value that providers set for a subtree, registered globally by name.
#[derive(Clone)]
pub struct ServerContext(Arc<ServerContextInner>);

impl ServerContext {
    /// Registers a context. A name that is already registered returns the existing context.
    pub fn create(name: &str, default_value: Model) -> Self {
        SERVER_CONTEXTS
            .entry(name.to_string())
            .or_insert_with(|| {
                Self(Arc::new(ServerContextInner {
                    id: ObjectId::next(),
                    name: name.to_string(),
                    default_value,
                }))
            })
            .clone()
    }

    pub fn get(name: &str) -> Option<Self> {
        SERVER_CONTEXTS.get(name).map(|entry| entry.clone())
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn default_value(&self) -> &Model {
        &self.0.default_value
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ServerContext({})", self.name())
    }
}

impl From<ServerContext> for Model {
    fn from(context: ServerContext) -> Self {
        Model::Provider(context)
    }
}

struct Frame {
    context: ServerContext,
    value: Model,
    parent: Option<Arc<Frame>>,
}

/// Immutable stack of provided values. Cloning is cheap and snapshots the stack.
#[derive(Clone, Default)]
pub struct ContextSnapshot(Option<Arc<Frame>>);

impl ContextSnapshot {
    pub fn root() -> Self {
        Self(None)
    }

    pub fn push(&self, context: ServerContext, value: Model) -> Self {
        Self(Some(Arc::new(Frame { context, value, parent: self.0.clone() })))
    }

    pub fn pop(&self) -> Self {
        Self(self.0.as_ref().and_then(|frame| frame.parent.clone()))
    }

    /// Innermost provided value, or the context's default.
    pub fn read(&self, context: &ServerContext) -> Model {
        let mut frame = self.0.as_deref();
        while let Some(current) = frame {
            if current.context.id() == context.id() {
                return current.value.clone();
            }
            frame = current.parent.as_deref();
        }
        context.default_value().clone()
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut frame = self.0.as_deref();
        while let Some(current) = frame {
            depth += 1;
            frame = current.parent.as_deref();
        }
        depth
    }
}

/// Builds the root snapshot from `(name, value)` pairs, registering unknown names.
pub fn import_server_contexts(contexts: &[(String, Model)]) -> ContextSnapshot {
    contexts.iter().fold(ContextSnapshot::root(), |snapshot, (name, value)| {
        snapshot.push(ServerContext::create(name, Model::Undefined), value.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_falls_back_to_default() {
        let theme = ServerContext::create("ctx-test-theme", Model::from("light"));
        let snapshot = ContextSnapshot::root();
        assert!(matches!(snapshot.read(&theme), Model::String(s) if &*s == "light"));
    }

    #[test]
    fn test_push_shadows_and_pop_restores() {
        let theme = ServerContext::create("ctx-test-shadow", Model::from("light"));
        let outer = ContextSnapshot::root().push(theme.clone(), Model::from("dark"));
        let inner = outer.push(theme.clone(), Model::from("blue"));
        assert!(matches!(inner.read(&theme), Model::String(s) if &*s == "blue"));
        assert!(matches!(inner.pop().read(&theme), Model::String(s) if &*s == "dark"));
        assert_eq!(inner.depth(), 2);
        assert_eq!(outer.depth(), 1);
    }

    #[test]
    fn test_create_is_idempotent() {
        let a = ServerContext::create("ctx-test-same", Model::from(1));
        let b = ServerContext::create("ctx-test-same", Model::from(2));
        assert_eq!(a.id(), b.id());
        assert!(ServerContext::get("ctx-test-same").is_some());
    }

    #[test]
    fn test_import_server_contexts() {
        let snapshot = import_server_contexts(&[("ctx-test-locale".to_string(), Model::from("fr"))]);
        let locale = ServerContext::get("ctx-test-locale").unwrap();
        assert!(matches!(snapshot.read(&locale), Model::String(s) if &*s == "fr"));
    }
}
