use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Classification of a failed IPC call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Required input was missing or malformed. No transaction was opened.
    Validation,
    /// The referenced entity does not exist.
    NotFound,
    /// The store reported an error; owned transactions have been rolled back.
    Internal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        }
    }
}

/// Outcome of an IPC handler.
///
/// Serializes to the `{ status, message, data }` envelope the UI process
/// expects, with `data` set to `null` for failures.
#[derive(Debug, Clone, PartialEq)]
pub enum IpcReply<T> {
    Success { message: String, data: T },
    Failure { kind: FailureKind, message: String },
}

impl<T> IpcReply<T> {
    pub fn success<S: Into<String>>(message: S, data: T) -> Self {
        Self::Success {
            message: message.into(),
            data,
        }
    }

    pub fn failure<S: Into<String>>(kind: FailureKind, message: S) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::failure(FailureKind::Validation, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::failure(FailureKind::NotFound, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::failure(FailureKind::Internal, message)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Success { message, .. } | Self::Failure { message, .. } => message,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Label used for metrics and structured logs.
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "ok",
            Self::Failure { kind, .. } => kind.as_str(),
        }
    }
}

impl<T: Serialize> Serialize for IpcReply<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut envelope = serializer.serialize_struct("IpcReply", 3)?;
        match self {
            Self::Success { message, data } => {
                envelope.serialize_field("status", &true)?;
                envelope.serialize_field("message", message)?;
                envelope.serialize_field("data", data)?;
            }
            Self::Failure { message, .. } => {
                envelope.serialize_field("status", &false)?;
                envelope.serialize_field("message", message)?;
                envelope.serialize_field("data", &Option::<&T>::None)?;
            }
        }
        envelope.end()
    }
}
