//! Uniform outcome of a dispatch or network attempt.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::warn;

/// Coarse outcome category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallResultStatus {
    /// The call went through.
    Success,
    /// A recognized, structured failure.
    Error,
    /// There is no connection.
    NoConnection,
    /// There is no valid authentication.
    NotAuthenticated,
    /// The request timed out.
    TimeOut,
}

impl CallResultStatus {
    // Higher wins when combining.
    fn precedence(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::TimeOut => 1,
            Self::NoConnection => 2,
            Self::NotAuthenticated => 3,
            Self::Error => 4,
        }
    }
}

/// Details of an [`CallResultStatus::Error`] result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResultError {
    code: Option<String>,
    message: Option<String>,
    technical_message: String,
    content: Option<String>,
    causes: Vec<CallResultError>,
}

impl CallResultError {
    /// Creates an error with a technical message and optional code and user-facing message.
    pub fn new(
        code: Option<String>,
        message: Option<String>,
        technical_message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message,
            technical_message: technical_message.into(),
            content: None,
            causes: Vec::new(),
        }
    }

    /// Builds an error from a failure raised while handling a call.
    ///
    /// The message is the outermost context, the technical message the full chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self::new(None, Some(err.to_string()), format!("{err:#}"))
    }

    /// Attaches the raw error body returned by the remote side.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Merges several errors into one, joining their parts with `|`.
    pub fn combine(errors: Vec<CallResultError>) -> Self {
        let code = join_parts(&errors, |e| e.code());
        let message = join_parts(&errors, |e| e.message());
        let technical = join_parts(&errors, |e| Some(e.technical_message()));
        Self {
            code: Some(code),
            message: Some(message),
            technical_message: technical,
            content: None,
            causes: errors,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// User-facing message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Diagnostic message.
    pub fn technical_message(&self) -> &str {
        &self.technical_message
    }

    /// Raw error body, if the remote side sent one.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Constituent errors of a combined error.
    pub fn causes(&self) -> &[CallResultError] {
        &self.causes
    }

    /// Sets `message` only when it is missing or blank.
    pub fn set_fallback_message(&mut self, fallback: impl Into<String>) {
        if self.message.as_deref().is_none_or(|m| m.trim().is_empty()) {
            self.message = Some(fallback.into());
        }
    }

    /// Decodes the raw error body as JSON into `T`.
    ///
    /// Returns `None` for blank content or when decoding fails; the latter is logged.
    pub fn try_error_data<T: DeserializeOwned>(&self) -> Option<T> {
        let content = self.content.as_deref().filter(|c| !c.trim().is_empty())?;
        match serde_json::from_str(content) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(
                    target_type = std::any::type_name::<T>(),
                    error = %err,
                    "error payload deserialization failed"
                );
                None
            }
        }
    }
}

fn join_parts<F>(errors: &[CallResultError], part: F) -> String
where
    F: Fn(&CallResultError) -> Option<&str>,
{
    errors
        .iter()
        .map(|e| part(e).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("|")
}

/// Outcome of a call without typed data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    status: CallResultStatus,
    status_code: Option<u16>,
    error: Option<CallResultError>,
}

impl CallResult {
    fn with_status(status: CallResultStatus) -> Self {
        Self {
            status,
            status_code: None,
            error: None,
        }
    }

    /// Successful result without a transport status code.
    pub fn success() -> Self {
        Self::with_status(CallResultStatus::Success)
    }

    /// Successful result carrying the transport status code.
    pub fn success_with_code(status_code: u16) -> Self {
        Self {
            status_code: Some(status_code),
            ..Self::success()
        }
    }

    /// Error result.
    pub fn error(error: CallResultError) -> Self {
        Self {
            status: CallResultStatus::Error,
            status_code: None,
            error: Some(error),
        }
    }

    /// Error result carrying the transport status code.
    pub fn error_with_code(error: CallResultError, status_code: u16) -> Self {
        Self {
            status_code: Some(status_code),
            ..Self::error(error)
        }
    }

    /// No connectivity.
    pub fn no_connection() -> Self {
        Self::with_status(CallResultStatus::NoConnection)
    }

    /// Missing or rejected credentials.
    pub fn not_authenticated() -> Self {
        Self::with_status(CallResultStatus::NotAuthenticated)
    }

    /// The call timed out.
    pub fn time_out() -> Self {
        Self::with_status(CallResultStatus::TimeOut)
    }

    /// Folds many results into one.
    ///
    /// Any error yields an Error result merging every error in input order.
    /// Otherwise the status with the highest precedence wins:
    /// NotAuthenticated, then NoConnection, then TimeOut, then Success.
    /// An empty input is a success.
    pub fn combine<I>(results: I) -> Self
    where
        I: IntoIterator<Item = CallResult>,
    {
        let mut errors = Vec::new();
        let mut status = CallResultStatus::Success;
        for result in results {
            if let Some(error) = result.error {
                errors.push(error);
            } else if result.status.precedence() > status.precedence() {
                status = result.status;
            }
        }

        match errors.len() {
            0 => Self::with_status(status),
            1 => Self::error(errors.remove(0)),
            _ => Self::error(CallResultError::combine(errors)),
        }
    }

    /// Outcome category.
    pub fn status(&self) -> CallResultStatus {
        self.status
    }

    /// Transport status code, if one was recorded.
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Error details; present iff the status is Error.
    pub fn call_error(&self) -> Option<&CallResultError> {
        self.error.as_ref()
    }

    /// Sets a fallback message on the error, if any.
    pub fn ensure_error_message(&mut self, fallback: impl Into<String>) {
        if let Some(error) = self.error.as_mut() {
            error.set_fallback_message(fallback);
        }
    }

    /// Status is Success.
    pub fn successful(&self) -> bool {
        self.status == CallResultStatus::Success
    }

    /// Status is anything but Success.
    pub fn not_successful(&self) -> bool {
        !self.successful()
    }

    /// Status is Error.
    pub fn errored(&self) -> bool {
        self.status == CallResultStatus::Error
    }

    /// Status is NoConnection.
    pub fn no_connection_status(&self) -> bool {
        self.status == CallResultStatus::NoConnection
    }

    /// Status is NotAuthenticated.
    pub fn not_authenticated_status(&self) -> bool {
        self.status == CallResultStatus::NotAuthenticated
    }

    /// Status is not NotAuthenticated.
    pub fn authenticated(&self) -> bool {
        !self.not_authenticated_status()
    }

    /// Status is TimeOut.
    pub fn timed_out(&self) -> bool {
        self.status == CallResultStatus::TimeOut
    }
}

/// Outcome of a call carrying typed success data and typed error data.
#[derive(Debug, Clone, PartialEq)]
pub struct DataCallResult<T, E = ()> {
    result: CallResult,
    data: Option<T>,
    error_data: Option<E>,
}

impl<T, E> DataCallResult<T, E> {
    /// Successful result with data.
    pub fn success(status_code: u16, data: T) -> Self {
        Self {
            result: CallResult::success_with_code(status_code),
            data: Some(data),
            error_data: None,
        }
    }

    /// Error result with optional typed error data.
    pub fn error(error: CallResultError, error_data: Option<E>) -> Self {
        Self {
            result: CallResult::error(error),
            data: None,
            error_data,
        }
    }

    /// Wraps a data-less result, e.g. NoConnection or TimeOut.
    pub fn from_result(result: CallResult) -> Self {
        Self {
            result,
            data: None,
            error_data: None,
        }
    }

    /// The data-less part of the result.
    pub fn result(&self) -> &CallResult {
        &self.result
    }

    /// Success data.
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Typed error data.
    pub fn error_data(&self) -> Option<&E> {
        self.error_data.as_ref()
    }

    /// Re-types the data while keeping status, status code and error.
    pub fn map<U, F>(self, mapper: F) -> DataCallResult<U, E>
    where
        F: FnOnce(T) -> U,
    {
        DataCallResult {
            result: self.result,
            data: self.data.map(mapper),
            error_data: self.error_data,
        }
    }

    /// Re-types the error data.
    pub fn map_error_data<U, F>(self, mapper: F) -> DataCallResult<T, U>
    where
        F: FnOnce(E) -> U,
    {
        DataCallResult {
            result: self.result,
            data: self.data,
            error_data: self.error_data.map(mapper),
        }
    }

    /// Drops the typed parts.
    pub fn into_result(self) -> CallResult {
        self.result
    }
}

impl<T, E> From<DataCallResult<T, E>> for CallResult {
    fn from(value: DataCallResult<T, E>) -> Self {
        value.into_result()
    }
}
