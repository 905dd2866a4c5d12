#[derive(Debug, Clone, PartialEq)]
pub enum BspError {
    /// Misuse of the single-use methods of a `ComputeContext`.
    ProtocolViolation { origin: Option<String>, message: &'static str },
    /// A message was sent to a key that is not part of the vertex set.
    UnroutableMessage { superstep: usize, target: String },
    /// A fault raised by client code (compute, hooks or a step transition).
    UserCodeFault { origin: Option<String>, message: String },
    DuplicateVertex(String),
    Configuration(String),
    Timely(String),
    Generic(String),
}

pub fn user_fault<S: Into<String>>(message: S) -> BspError {
    BspError::UserCodeFault { origin: None, message: message.into() }
}

pub fn configuration_error<S: Into<String>>(message: S) -> BspError {
    BspError::Configuration(message.into())
}

pub(crate) fn protocol_violation(message: &'static str) -> BspError {
    BspError::ProtocolViolation { origin: None, message }
}

impl BspError {
    /// Attaches the invocation that raised a client-side fault, keeping any origin that was
    /// already set closer to the fault.
    pub fn with_origin<F: FnOnce() -> String>(self, origin: F) -> Self {
        match self {
            BspError::ProtocolViolation { origin: None, message } => {
                BspError::ProtocolViolation { origin: Some(origin()), message }
            }
            BspError::UserCodeFault { origin: None, message } => {
                BspError::UserCodeFault { origin: Some(origin()), message }
            }
            other => other,
        }
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, BspError::ProtocolViolation { .. })
    }
}

impl std::fmt::Display for BspError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BspError::ProtocolViolation { origin, message } => {
                write!(f, "[ProtocolViolation] ")?;
                if let Some(origin) = origin {
                    write!(f, "{}: ", origin)?;
                }
                write!(f, "{}", message)?;
            }
            BspError::UnroutableMessage { superstep, target } => write!(
                f,
                "[UnroutableMessage] Message sent in superstep {} to non-existent vertex '{}'",
                superstep, target
            )?,
            BspError::UserCodeFault { origin, message } => {
                write!(f, "[UserCodeFault] ")?;
                if let Some(origin) = origin {
                    write!(f, "{}: ", origin)?;
                }
                write!(f, "{}", message)?;
            }
            BspError::DuplicateVertex(key) => {
                write!(f, "[InputError] Vertex '{}' appears more than once in the input", key)?;
            }
            BspError::Configuration(message) => write!(f, "[ConfigurationError] {}", message)?,
            BspError::Timely(message) => write!(f, "[TimelyError] {}", message)?,
            BspError::Generic(message) => write!(f, "[BspError] {}", message)?,
        }
        Ok(())
    }
}

impl std::error::Error for BspError {}
