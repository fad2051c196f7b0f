//! The `AUTH NTLM` exchange with an SMTP server.
//!
//! ```plain
//! C: AUTH NTLM <base64 Negotiate>
//! S: 334 <base64 Challenge>
//! C: <base64 Authenticate>
//! S: 235 Authentication successful
//! ```


use base64::prelude::{BASE64_STANDARD, Engine};
use log::{debug, warn};

use crate::error::AuthError;
use crate::flags::Flags;
use crate::message::{ServerChallenge, decode_challenge, encode_authenticate, encode_negotiate};
use crate::response::{Password, respond_challenge_ntlm_v1};
use crate::transport::Transport;


/// SMTP status asking for the next line of an authentication exchange.
pub const STATUS_CONTINUE: u16 = 334;

/// SMTP status confirming a successful authentication.
pub const STATUS_AUTHENTICATED: u16 = 235;


/// Windows domain credentials.
///
/// Built once before the handshake and not modifiable afterwards. Domain and hostname may be left
/// empty, in which case the server infers them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credentials {
    domain: String,
    hostname: String,
    username: String,
    password: Password,
}
impl Credentials {
    pub fn new<U: Into<String>, P: Into<Password>>(username: U, password: P) -> Self {
        Self {
            domain: String::new(),
            hostname: String::new(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Sets the NT domain to authenticate against.
    pub fn with_domain<D: Into<String>>(mut self, domain: D) -> Self {
        self.domain = domain.into();
        self
    }

    /// Sets the NT hostname of this client.
    pub fn with_hostname<H: Into<String>>(mut self, hostname: H) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &Password {
        &self.password
    }
}


/// The progress of a handshake.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HandshakeState {
    NotStarted,
    NegotiateSent,
    ChallengeReceived,
    AuthenticateSent,
    Authenticated,
    Failed,
}

/// Information about a completed authentication.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Authenticated {
    /// The domain or server name the server reported in its challenge.
    pub target_name: String,

    /// The flags sent in the Authenticate message.
    pub flags: Flags,
}


/// A single NTLM authentication attempt.
///
/// The steps must be taken in order, each exactly once; [`run`](Self::run) does so. Any failure
/// moves the handshake to [`HandshakeState::Failed`], from which there is no way back.
#[derive(Debug)]
pub struct Handshake {
    credentials: Credentials,
    state: HandshakeState,
    challenge: Option<ServerChallenge>,
    auth_flags: Option<Flags>,
}
impl Handshake {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: HandshakeState::NotStarted,
            challenge: None,
            auth_flags: None,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The challenge received from the server, once there is one.
    pub fn server_challenge(&self) -> Option<&ServerChallenge> {
        self.challenge.as_ref()
    }

    /// The flags of the Authenticate message, once it has been sent.
    pub fn authenticate_flags(&self) -> Option<Flags> {
        self.auth_flags
    }

    /// Runs the complete exchange on `transport`.
    pub fn run<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<Authenticated, AuthError> {
        if transport.is_authenticated() {
            return Err(AuthError::AlreadyAuthenticated);
        }

        self.send_negotiate(transport)?;
        self.receive_challenge(transport)?;
        self.send_authenticate(transport)?;
        self.receive_outcome(transport)
    }

    /// Sends `AUTH NTLM` with the Negotiate message.
    pub fn send_negotiate<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), AuthError> {
        self.require("send the negotiate message", HandshakeState::NotStarted)?;

        let result = encode_negotiate(&self.credentials.domain, &self.credentials.hostname, Flags::ntlm_v1())
            .map_err(AuthError::from)
            .and_then(|bytes| {
                let line = format!("AUTH NTLM {}", BASE64_STANDARD.encode(bytes));
                transport.send(&line).map_err(AuthError::from)
            });
        self.advance(result, HandshakeState::NegotiateSent)
    }

    /// Reads the server's `334` reply and decodes the Challenge message it carries.
    pub fn receive_challenge<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), AuthError> {
        self.require("receive the challenge", HandshakeState::NegotiateSent)?;

        let result = transport.expect(STATUS_CONTINUE)
            .map_err(AuthError::from)
            .and_then(|text| Ok(BASE64_STANDARD.decode(text.trim())?))
            .and_then(|bytes| Ok(decode_challenge(&bytes)?));

        let challenge = self.advance(result, HandshakeState::ChallengeReceived)?;
        let unsupported = challenge.flags.unsupported_by_v1();
        if !unsupported.is_empty() {
            warn!("server offered {:?}; continuing with plain NTLMv1", unsupported);
        }
        debug!("received NTLM challenge from {:?} with flags {:?}", challenge.target_name, challenge.flags);
        self.challenge = Some(challenge);
        Ok(())
    }

    /// Computes the responses and sends the Authenticate message as a continuation line.
    pub fn send_authenticate<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), AuthError> {
        self.require("send the authenticate message", HandshakeState::ChallengeReceived)?;
        let challenge = match &self.challenge {
            Some(c) => c,
            None => return Err(AuthError::OutOfOrder { step: "send the authenticate message", state: self.state }),
        };

        let response = respond_challenge_ntlm_v1(challenge.challenge, &self.credentials.password);
        let flags = Flags::for_authenticate(challenge.flags);
        let result = encode_authenticate(
            &self.credentials.username,
            &self.credentials.domain,
            &self.credentials.hostname,
            &response,
            flags,
        )
            .map_err(AuthError::from)
            .and_then(|bytes| transport.send(&BASE64_STANDARD.encode(bytes)).map_err(AuthError::from));

        self.advance(result, HandshakeState::AuthenticateSent)?;
        self.auth_flags = Some(flags);
        Ok(())
    }

    /// Reads the server's verdict, which must be `235`.
    pub fn receive_outcome<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<Authenticated, AuthError> {
        self.require("receive the outcome", HandshakeState::AuthenticateSent)?;

        let result = transport.expect(STATUS_AUTHENTICATED).map_err(AuthError::from);
        self.advance(result, HandshakeState::Authenticated)?;
        transport.set_authenticated();

        Ok(Authenticated {
            target_name: self.challenge.as_ref()
                .map(|c| c.target_name.clone())
                .unwrap_or_default(),
            flags: self.auth_flags.unwrap_or(Flags::empty()),
        })
    }

    fn require(&self, step: &'static str, state: HandshakeState) -> Result<(), AuthError> {
        if self.state == state {
            Ok(())
        } else {
            Err(AuthError::OutOfOrder { step, state: self.state })
        }
    }

    /// Moves to `next` if the step succeeded and to `Failed` otherwise.
    fn advance<R>(&mut self, result: Result<R, AuthError>, next: HandshakeState) -> Result<R, AuthError> {
        self.state = match &result {
            Ok(_) => next,
            Err(e) => {
                debug!("NTLM handshake failed in state {:?}: {}", self.state, e);
                HandshakeState::Failed
            },
        };
        if result.is_ok() {
            debug!("NTLM handshake now in state {:?}", self.state);
        }
        result
    }
}


/// Authenticates on `transport` with the given credentials.
pub fn authenticate<T: Transport + ?Sized>(credentials: Credentials, transport: &mut T) -> Result<Authenticated, AuthError> {
    Handshake::new(credentials).run(transport)
}
