use serde_json::{json, Value};
use std::borrow::Cow;

/// An expected, addressable failure reported back to whoever made the request.
///
/// Equality only looks at `code`, so a constant compares equal to the same
/// error carrying a request id.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} ({code})")]
pub struct ProtocolError {
    code: i32,
    message: Cow<'static, str>,
    id: Option<String>,
}

macro_rules! protocol_errors {
    ($($name:ident = ($code:expr, $message:expr);)*) => {
        impl ProtocolError {
            $(
                pub const $name: ProtocolError = ProtocolError {
                    code: $code,
                    message: Cow::Borrowed($message),
                    id: None,
                };
            )*
        }
    };
}

protocol_errors! {
    INVALID_REQUEST = (-32600, "Invalid Request");
    METHOD_NOT_FOUND = (-32601, "Method not found");
    ILLEGAL_NAME = (-2, "Illegal name");
    NAME_EXISTS = (-3, "Target with the name already exists");
    SCRIPT_NOT_FOUND = (-5, "Script cannot be found");
    ILLEGAL_ARGUMENT = (-6, "Illegal argument");
    SCRIPT_INTERNAL_ERROR = (-7, "Script internal error");
    EVENT_NOT_FOUND = (-8, "Event cannot be found");
    EVENT_CALLBACK_ALREADY_REGISTERED = (-9, "Event callback is already registered");
    EVENT_CALLBACK_NOT_REGISTERED = (-10, "Event callback is not registered");
}

impl ProtocolError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Cow::Owned(message.into()),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Render as a JSON-RPC 2.0 error response
    pub fn to_response(&self) -> Value {
        json!({
            "jsonrpc": "2.0",
            "error": {
                "code": self.code,
                "message": self.message.as_ref(),
            },
            "id": self.id,
        })
    }

    /// Parse the error out of a JSON-RPC 2.0 error response.
    ///
    /// Returns `None` if the response has no well-formed `error` member.
    pub fn from_response(response: &Value) -> Option<Self> {
        let error = response.get("error")?;
        let code = error.get("code")?.as_i64()?;
        let message = error.get("message")?.as_str()?;
        let id = response_id(response);
        Some(Self {
            code: i32::try_from(code).ok()?,
            message: Cow::Owned(message.to_string()),
            id,
        })
    }
}

impl PartialEq for ProtocolError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for ProtocolError {}

impl From<rcutil_events::UnknownEvent> for ProtocolError {
    fn from(_: rcutil_events::UnknownEvent) -> Self {
        ProtocolError::EVENT_NOT_FOUND
    }
}

/// Failure of a single transport invocation
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The script answered with an error response
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Anything else: I/O failure, malformed response, defect
    #[error("transport fault: {0:#}")]
    Fault(#[from] anyhow::Error),
}

/// The `id` member of a JSON-RPC message, string or number
pub(crate) fn response_id(message: &Value) -> Option<String> {
    match message.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
