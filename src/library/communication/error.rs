use crate::library::BoxedError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Failure of the transport between this process and the backing store
///
/// Kept strictly separate from business failures (handlers and work processors
/// returning an error): transport failures are retried indefinitely by the
/// delivery loops while business failures count against the bounded retry
/// budget and eventually dead-letter the message.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The backing store could not be reached or rejected the command
    #[error("message broker is unavailable")]
    Unavailable(#[source] BoxedError),

    /// Data crossing the store boundary could not be interpreted
    #[error("malformed data at the broker boundary: {0}")]
    MalformedReply(String),
}

/// Type erased, serializable error which retains the error chain information
///
/// Delivery failures have to cross the wire as plain text when a message is
/// dead-lettered. This type flattens an arbitrary error and its sources into
/// an ordered list of causes so the resulting string still tells the whole
/// story to whoever inspects the dead-letter queue later.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct CauseChain {
    causes: Vec<String>,
}

impl CauseChain {
    /// Creates a new instance from any error type
    pub fn new<E: Error + 'static>(e: &E) -> Self {
        (e as &(dyn Error + 'static)).into()
    }

    /// Creates a new instance from a boxed error type
    pub fn from_boxed(e: &BoxedError) -> Self {
        (e.as_ref() as &(dyn Error + 'static)).into()
    }
}

impl Display for CauseChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.causes.is_empty() {
            return write!(f, "unknown error");
        }

        write!(f, "{}", self.causes.join(": "))
    }
}

impl From<&(dyn Error + 'static)> for CauseChain {
    fn from(e: &(dyn Error + 'static)) -> Self {
        let mut source: Option<&(dyn Error + 'static)> = Some(e);
        let mut causes = Vec::new();

        while let Some(error) = source {
            causes.push(error.to_string());
            source = error.source();
        }

        Self { causes }
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Error, Debug)]
    #[error("outer failure")]
    struct OuterError(#[source] InnerError);

    #[derive(Error, Debug)]
    #[error("inner failure")]
    struct InnerError;

    #[test]
    fn flatten_the_source_chain() {
        let chain = CauseChain::new(&OuterError(InnerError));
        assert_eq!(chain.to_string(), "outer failure: inner failure");
    }

    #[test]
    fn survive_an_empty_chain() {
        let chain = CauseChain { causes: Vec::new() };
        assert_eq!(chain.to_string(), "unknown error");
    }
}
