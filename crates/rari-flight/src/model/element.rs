use std::fmt;
use std::sync::Arc;

use super::{Model, ObjectId, Thenable};
use crate::error::Step;
use crate::request::ComponentScope;

type RenderFn = dyn Fn(&mut ComponentScope<'_>, &Model) -> Step<Model> + Send + Sync;

struct ComponentInner {
    id: ObjectId,
    name: String,
    render: Box<RenderFn>,
}

/// A function evaluated on the server when it appears as an element type.
#[derive(Clone)]
pub struct Component(Arc<ComponentInner>);

impl Component {
    pub fn new<F>(name: impl Into<String>, render: F) -> Self
    where
        F: Fn(&mut ComponentScope<'_>, &Model) -> Step<Model> + Send + Sync + 'static,
    {
        Self(Arc::new(ComponentInner { id: ObjectId::next(), name: name.into(), render: Box::new(render) }))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub(crate) fn call(&self, scope: &mut ComponentScope<'_>, props: &Model) -> Step<Model> {
        (self.0.render)(scope, props)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.name())
    }
}

struct ElementInner {
    id: ObjectId,
    ty: Model,
    key: Option<String>,
    ref_: Option<Model>,
    props: Model,
}

/// A renderable unit: a type, an optional key, an optional ref and props.
#[derive(Clone)]
pub struct Element(Arc<ElementInner>);

impl Element {
    pub fn new(ty: impl Into<Model>, props: Model) -> Self {
        Self::build(ty.into(), None, None, props)
    }

    pub fn keyed(ty: impl Into<Model>, key: impl Into<String>, props: Model) -> Self {
        Self::build(ty.into(), Some(key.into()), None, props)
    }

    /// Same element with a ref attached. Refs are rejected when the element is rendered.
    pub fn with_ref(&self, ref_: Model) -> Self {
        Self::build(self.ty().clone(), self.0.key.clone(), Some(ref_), self.props().clone())
    }

    /// Fragment wrapping `children`.
    pub fn fragment(children: impl IntoIterator<Item = Model>) -> Self {
        Self::new(Model::Symbol(super::Symbol::fragment()), Model::object([("children", Model::array(children))]))
    }

    fn build(ty: Model, key: Option<String>, ref_: Option<Model>, props: Model) -> Self {
        Self(Arc::new(ElementInner { id: ObjectId::next(), ty, key, ref_, props }))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn ty(&self) -> &Model {
        &self.0.ty
    }

    pub fn key(&self) -> Option<&str> {
        self.0.key.as_deref()
    }

    pub fn ref_(&self) -> Option<&Model> {
        self.0.ref_.as_ref().filter(|r| !matches!(r, Model::Null | Model::Undefined))
    }

    pub fn props(&self) -> &Model {
        &self.0.props
    }

    pub fn children(&self) -> Model {
        self.0.props.get("children")
    }
}

impl From<Element> for Model {
    fn from(element: Element) -> Self {
        Model::Element(element)
    }
}

impl From<Component> for Model {
    fn from(component: Component) -> Self {
        Model::Component(component)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element").field("type", self.ty()).field("key", &self.key()).finish()
    }
}

struct LazyInner {
    id: ObjectId,
    init: Box<dyn Fn() -> Step<Model> + Send + Sync>,
}

/// A value computed on demand. The initializer may suspend and is called again on retry.
#[derive(Clone)]
pub struct Lazy(Arc<LazyInner>);

impl Lazy {
    pub fn new<F>(init: F) -> Self
    where
        F: Fn() -> Step<Model> + Send + Sync + 'static,
    {
        Self(Arc::new(LazyInner { id: ObjectId::next(), init: Box::new(init) }))
    }

    pub fn from_thenable(thenable: Thenable) -> Self {
        Self::new(move || thenable.read())
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn init(&self) -> Step<Model> {
        (self.0.init)()
    }
}

impl From<Lazy> for Model {
    fn from(lazy: Lazy) -> Self {
        Model::Lazy(lazy)
    }
}

impl From<Thenable> for Model {
    fn from(thenable: Thenable) -> Self {
        Model::Thenable(thenable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Interrupt;

    #[test]
    fn test_element_accessors() {
        let element = Element::keyed("div", "a", Model::object([("children", Model::from("hi"))]));
        assert_eq!(element.key(), Some("a"));
        assert!(matches!(element.ty(), Model::String(s) if &**s == "div"));
        assert!(matches!(element.children(), Model::String(s) if &*s == "hi"));
        assert!(element.ref_().is_none());
        assert!(element.with_ref(Model::object([("current", Model::Null)])).ref_().is_some());
    }

    #[test]
    fn test_null_ref_is_ignored() {
        let element = Element::new("div", Model::object::<&str>([])).with_ref(Model::Null);
        assert!(element.ref_().is_none());
    }

    #[test]
    fn test_lazy_from_thenable() {
        let thenable = Thenable::pending();
        let lazy = Lazy::from_thenable(thenable.clone());
        assert!(matches!(lazy.init(), Err(Interrupt::Suspend(_))));
        thenable.resolve("ready");
        assert!(matches!(lazy.init(), Ok(Model::String(s)) if &*s == "ready"));
    }
}
