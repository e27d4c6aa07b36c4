use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use super::ObjectId;

pub const FRAGMENT_SYMBOL: &str = "react.fragment";

static GLOBAL_SYMBOLS: LazyLock<DashMap<String, Symbol>> = LazyLock::new(DashMap::new);

struct SymbolInner {
    id: ObjectId,
    description: String,
}

/// A symbol value. Only symbols obtained through [`Symbol::for_name`] can be encoded.
#[derive(Clone)]
pub struct Symbol(Arc<SymbolInner>);

impl Symbol {
    /// Returns the registered symbol for `name`, creating it on first use.
    pub fn for_name(name: &str) -> Self {
        GLOBAL_SYMBOLS
            .entry(name.to_string())
            .or_insert_with(|| Self::new(name))
            .clone()
    }

    /// A fresh symbol that is not part of the global registry.
    pub fn new(description: impl Into<String>) -> Self {
        Self(Arc::new(SymbolInner { id: ObjectId::next(), description: description.into() }))
    }

    pub fn fragment() -> Self {
        Self::for_name(FRAGMENT_SYMBOL)
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn description(&self) -> &str {
        &self.0.description
    }

    pub fn is_registered(&self) -> bool {
        GLOBAL_SYMBOLS.get(self.description()).is_some_and(|global| global.id() == self.id())
    }

    pub fn is_fragment(&self) -> bool {
        self.description() == FRAGMENT_SYMBOL && self.is_registered()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Symbol {}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_name_returns_same_symbol() {
        let a = Symbol::for_name("app.marker");
        let b = Symbol::for_name("app.marker");
        assert_eq!(a, b);
        assert!(a.is_registered());
    }

    #[test]
    fn test_local_symbol_is_not_registered() {
        let global = Symbol::for_name("app.local");
        let local = Symbol::new("app.local");
        assert_ne!(global, local);
        assert!(!local.is_registered());
    }

    #[test]
    fn test_fragment() {
        assert!(Symbol::fragment().is_fragment());
        assert!(!Symbol::new(FRAGMENT_SYMBOL).is_fragment());
    }
}
