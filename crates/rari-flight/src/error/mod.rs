use thiserror::Error as ThisError;

use crate::model::Thenable;

#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum FlightError {
    #[error("Type {0} is not supported in Client Component props.")]
    UnsupportedType(String),

    #[error(
        "Only plain objects, and a few built-ins, can be passed to Client Components from Server Components. Classes or null prototypes are not supported."
    )]
    ClassInstance(Option<String>),

    #[error(
        "Only global symbols received from Symbol.for(...) can be passed to Client Components. The symbol Symbol.for({0}) cannot be found among global symbols."
    )]
    NonGlobalSymbol(String),

    #[error(
        "Functions cannot be passed directly to Client Components unless you explicitly expose it by marking it with \"use server\". Found at key `{0}`."
    )]
    FunctionInProps(String),

    #[error(
        "Event handlers cannot be passed to Client Component props. Found at key `{0}`.\nIf you need interactivity, consider converting part of this to a Client Component."
    )]
    EventHandlerInProps(String),

    #[error("Refs cannot be used in Server Components, nor passed to Client Components.")]
    RefInServerComponent,

    #[error("Unsupported Server Component type: {0}")]
    UnsupportedElementType(String),

    #[error("{0}")]
    TaintViolation(String),

    #[error("{0}")]
    InvalidTaint(String),

    #[error("{message}")]
    Component { message: String, stack: Option<String> },

    #[error("Failed to resolve reference: {0}")]
    Resolver(String),

    #[error("Destination error: {0}")]
    Destination(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("The render was aborted by the server without a reason.")]
    Aborted,
}

impl From<serde_json::Error> for FlightError {
    fn from(e: serde_json::Error) -> Self {
        FlightError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for FlightError {
    fn from(e: toml::de::Error) -> Self {
        FlightError::Config(e.to_string())
    }
}

impl From<std::io::Error> for FlightError {
    fn from(e: std::io::Error) -> Self {
        FlightError::Destination(e.to_string())
    }
}

impl FlightError {
    pub fn component(message: impl Into<String>) -> Self {
        Self::Component { message: message.into(), stack: None }
    }

    pub fn component_with_stack(message: impl Into<String>, stack: impl Into<String>) -> Self {
        Self::Component { message: message.into(), stack: Some(stack.into()) }
    }

    pub fn resolver(message: impl Into<String>) -> Self {
        Self::Resolver(message.into())
    }

    pub fn destination(message: impl Into<String>) -> Self {
        Self::Destination(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            Self::ClassInstance(_) => "CLASS_INSTANCE",
            Self::NonGlobalSymbol(_) => "NON_GLOBAL_SYMBOL",
            Self::FunctionInProps(_) => "FUNCTION_IN_PROPS",
            Self::EventHandlerInProps(_) => "EVENT_HANDLER_IN_PROPS",
            Self::RefInServerComponent => "REF_IN_SERVER_COMPONENT",
            Self::UnsupportedElementType(_) => "UNSUPPORTED_ELEMENT_TYPE",
            Self::TaintViolation(_) => "TAINT_VIOLATION",
            Self::InvalidTaint(_) => "INVALID_TAINT",
            Self::Component { .. } => "COMPONENT_ERROR",
            Self::Resolver(_) => "RESOLVER_ERROR",
            Self::Destination(_) => "DESTINATION_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Aborted => "ABORTED",
        }
    }

    /// Stack trace attached by the code that raised the error, if any.
    pub fn stack(&self) -> Option<&str> {
        match self {
            Self::Component { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedType(_)
                | Self::ClassInstance(_)
                | Self::NonGlobalSymbol(_)
                | Self::FunctionInProps(_)
                | Self::EventHandlerInProps(_)
                | Self::RefInServerComponent
                | Self::UnsupportedElementType(_)
                | Self::TaintViolation(_)
        )
    }
}

/// An intentional "cannot produce this subtree now" signal. Not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Postpone {
    pub reason: String,
    pub stack: Option<String>,
}

impl Postpone {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), stack: None }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// What a thenable can be rejected with, and what an abort can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Error(FlightError),
    Postpone(Postpone),
}

impl From<FlightError> for Rejection {
    fn from(e: FlightError) -> Self {
        Rejection::Error(e)
    }
}

impl From<Postpone> for Rejection {
    fn from(p: Postpone) -> Self {
        Rejection::Postpone(p)
    }
}

/// Non-value outcome of one encode or render step.
#[derive(Debug, Clone)]
pub enum Interrupt {
    Suspend(Thenable),
    Postpone(Postpone),
    Error(FlightError),
}

impl From<FlightError> for Interrupt {
    fn from(e: FlightError) -> Self {
        Interrupt::Error(e)
    }
}

impl From<Postpone> for Interrupt {
    fn from(p: Postpone) -> Self {
        Interrupt::Postpone(p)
    }
}

impl From<Rejection> for Interrupt {
    fn from(r: Rejection) -> Self {
        match r {
            Rejection::Error(e) => Interrupt::Error(e),
            Rejection::Postpone(p) => Interrupt::Postpone(p),
        }
    }
}

impl From<serde_json::Error> for Interrupt {
    fn from(e: serde_json::Error) -> Self {
        Interrupt::Error(e.into())
    }
}

pub type Step<T> = Result<T, Interrupt>;
