//! The errors an authentication attempt can end with.


use crate::handshake::HandshakeState;
use crate::message::{ParsingError, StoringError};
use crate::transport::TransportError;


/// Why an NTLM authentication attempt failed.
///
/// None of these are retried; every one of them ends the attempt. A fresh attempt needs a fresh
/// connection.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The connection to the server failed.
    #[error("connection error: {0}")]
    Connection(#[source] TransportError),

    /// The server replied with a different status code than the one expected at this step.
    #[error("expected status {expected}, server replied {actual}: {text}")]
    UnexpectedStatus { expected: u16, actual: u16, text: String },

    /// The server's NTLM message failed validation.
    #[error("malformed NTLM message: {0}")]
    MalformedMessage(#[from] ParsingError),

    /// The server's reply was not valid base64.
    #[error("protocol error: {0}")]
    Protocol(#[from] base64::DecodeError),

    /// An outgoing NTLM message could not be encoded.
    #[error("failed to encode NTLM message: {0}")]
    Encoding(#[from] StoringError),

    /// Authentication has already succeeded on this connection.
    #[error("already authenticated")]
    AlreadyAuthenticated,

    /// A handshake step was invoked while the handshake was in the wrong state.
    #[error("cannot {step} in state {state:?}")]
    OutOfOrder { step: &'static str, state: HandshakeState },
}
impl From<TransportError> for AuthError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::UnexpectedStatus { expected, actual, text }
                => Self::UnexpectedStatus { expected, actual, text },
            other => Self::Connection(other),
        }
    }
}
