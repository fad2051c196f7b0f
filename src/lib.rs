//! NTLM (version 1) authentication for SMTP.
//!
//! Drives the `AUTH NTLM` exchange (Negotiate, Challenge, Authenticate) over an established SMTP
//! connection, for servers that require Windows domain credentials.
//!
//! Sample usage:
//! ```no_run
//! use smtp_ntlm::{Credentials, SmtpStream, authenticate};
//!
//! fn connect_authenticated(username: &str, password: &str) -> Result<SmtpStream<std::net::TcpStream>, Box<dyn std::error::Error>> {
//!     let mut smtp = SmtpStream::connect("mail.corp.example", 25)?;
//!     smtp.ehlo("ws01.corp.example")?;
//!
//!     let creds = Credentials::new(username, password)
//!         .with_domain("CORP")
//!         .with_hostname("WS01");
//!     let outcome = authenticate(creds, &mut smtp)?;
//!     println!("authenticated against {}", outcome.target_name);
//!
//!     Ok(smtp)
//! }
//! ```
//!
//! The message codec ([`message`]) and the response calculation ([`response`]) are usable on
//! their own, e.g. for NTLM over other protocols.


pub mod config;
pub mod error;
pub mod flags;
pub mod handshake;
pub mod message;
pub mod oem;
pub mod response;
pub mod transport;


pub use crate::config::{ConfigError, NtlmConfig};
pub use crate::error::AuthError;
pub use crate::flags::Flags;
pub use crate::handshake::{Authenticated, Credentials, Handshake, HandshakeState, authenticate};
pub use crate::message::{
    ParsingError, ServerChallenge, StoringError, decode_challenge, encode_authenticate,
    encode_negotiate,
};
pub use crate::response::{NtlmResponse, Password, respond_challenge_ntlm_v1};
pub use crate::transport::{SmtpReply, SmtpStream, Transport, TransportError};
