pub mod config;
pub mod context;
pub mod destination;
pub mod error;
pub mod model;
pub mod request;
pub mod streaming;
pub mod taint;
pub mod wire_format;

pub use config::{FlightConfig, Mode, StreamConfig};
pub use context::{ContextSnapshot, ServerContext};
pub use destination::{BufferDestination, Destination, IoDestination};
pub use error::{FlightError, Interrupt, Postpone, Rejection, Step};
pub use model::{
    Array, ClientManifest, ClientModuleEntry, ClientReference, Component, Element, Instance, Lazy, Model, ModelMap,
    ModelSet, Object, ReferenceResolver, ServerReference, Symbol, Thenable, ThenableStatus, TypedArray,
    TypedArrayKind,
};
pub use request::{ComponentScope, Request, RequestOptions, RequestStatus};
pub use streaming::{AbortHandle, FlightStream, render_to_stream};
pub use taint::{TaintKey, TaintRegistry};
