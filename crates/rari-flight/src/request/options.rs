use std::sync::Arc;

use crate::error::FlightError;
use crate::model::{ClientManifest, Model, ReferenceResolver};
use crate::taint::TaintRegistry;

/// Called for every recoverable error. The returned digest is sent in place of the error.
pub type ErrorHandler = Arc<dyn Fn(&FlightError) -> Option<String> + Send + Sync>;

pub type PostponeHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
pub struct RequestOptions {
    pub identifier_prefix: String,
    pub debug: bool,
    pub contexts: Vec<(String, Model)>,
    pub on_error: Option<ErrorHandler>,
    pub on_postpone: Option<PostponeHandler>,
    pub taint: Arc<TaintRegistry>,
    pub resolver: Arc<dyn ReferenceResolver>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            identifier_prefix: String::new(),
            debug: false,
            contexts: Vec::new(),
            on_error: None,
            on_postpone: None,
            taint: Arc::new(TaintRegistry::new()),
            resolver: Arc::new(ClientManifest::new()),
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identifier_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.identifier_prefix = prefix.into();
        self
    }

    /// Include messages, stacks and postpone reasons in error and postpone rows.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_context(mut self, name: impl Into<String>, value: Model) -> Self {
        self.contexts.push((name.into(), value));
        self
    }

    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&FlightError) -> Option<String> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub fn with_postpone_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_postpone = Some(Arc::new(handler));
        self
    }

    pub fn with_taint_registry(mut self, taint: Arc<TaintRegistry>) -> Self {
        self.taint = taint;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ReferenceResolver>) -> Self {
        self.resolver = resolver;
        self
    }
}

pub(crate) fn default_error_handler() -> ErrorHandler {
    Arc::new(|error: &FlightError| {
        tracing::error!(code = error.code(), "{}", error);
        None
    })
}

pub(crate) fn default_postpone_handler() -> PostponeHandler {
    Arc::new(|_reason: &str| {})
}
