//! The line-oriented SMTP transport the handshake runs over.


use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use log::trace;


/// The line ending for SMTP transactions.
pub const CRLF: &str = "\r\n";

/// Default SMTP port.
pub const SMTP_PORT: u16 = 25;


/// An error raised by a [`Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Reading from or writing to the connection failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The server closed the connection.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// The server sent a line that is not a valid SMTP reply.
    #[error("malformed reply line: {0:?}")]
    MalformedReply(String),

    /// The server replied with a different status code than the expected one.
    #[error("expected status {expected}, server replied {actual}: {text}")]
    UnexpectedStatus { expected: u16, actual: u16, text: String },
}


/// A bidirectional text-line connection to an SMTP server.
///
/// Implementations own the connection; one handshake at a time may use it. Timeouts, if any, are
/// the implementation's business.
pub trait Transport {
    /// Sends one command line; the line ending is appended by the transport.
    fn send(&mut self, line: &str) -> Result<(), TransportError>;

    /// Reads one reply and checks its status code, returning the text of its final line.
    fn expect(&mut self, code: u16) -> Result<String, TransportError>;

    /// Whether an authentication has already succeeded on this connection.
    fn is_authenticated(&self) -> bool;

    /// Records that an authentication has succeeded on this connection.
    fn set_authenticated(&mut self);
}


/// A complete, possibly multi-line, SMTP reply.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}
impl SmtpReply {
    /// The text of the final line of the reply.
    pub fn text(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or("")
    }

    /// The text of all lines, joined by spaces.
    pub fn joined(&self) -> String {
        self.lines.join(" ")
    }

    /// Returns the text of the final line if the reply carries `code`.
    pub fn expect(self, code: u16) -> Result<String, TransportError> {
        if self.code != code {
            return Err(TransportError::UnexpectedStatus { expected: code, actual: self.code, text: self.joined() });
        }
        Ok(self.text().to_owned())
    }
}

/// Splits a reply line into status code, continuation marker and text.
fn parse_reply_line(line: &str) -> Option<(u16, bool, &str)> {
    let code_str = line.get(0..3)?;
    if !code_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code: u16 = code_str.parse().ok()?;
    if !(100..600).contains(&code) {
        return None;
    }

    match line.as_bytes().get(3) {
        None => Some((code, false, "")),
        Some(b' ') => Some((code, false, &line[4..])),
        Some(b'-') => Some((code, true, &line[4..])),
        Some(_) => None,
    }
}

/// Reads one SMTP reply, following `NNN-` continuation lines up to the final `NNN ` line.
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<SmtpReply, TransportError> {
    let mut code = None;
    let mut lines = Vec::new();

    loop {
        let mut raw = String::new();
        if reader.read_line(&mut raw)? == 0 {
            return Err(TransportError::ConnectionClosed);
        }
        let line = raw.trim_end_matches(&['\r', '\n'][..]);
        trace!("S: {}", line);

        let (line_code, more, text) = parse_reply_line(line)
            .ok_or_else(|| TransportError::MalformedReply(line.to_owned()))?;
        if *code.get_or_insert(line_code) != line_code {
            return Err(TransportError::MalformedReply(line.to_owned()));
        }
        lines.push(text.to_owned());

        if !more {
            return Ok(SmtpReply { code: line_code, lines });
        }
    }
}


/// An SMTP connection over any byte stream.
pub struct SmtpStream<S: Read + Write> {
    stream: BufReader<S>,
    authenticated: bool,
}
impl<S: Read + Write> SmtpStream<S> {
    /// Wraps an already connected stream. The server greeting is not consumed.
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            authenticated: false,
        }
    }

    /// Reads the next reply, whatever its status code.
    pub fn read_reply(&mut self) -> Result<SmtpReply, TransportError> {
        read_reply(&mut self.stream)
    }

    /// Sends `EHLO` and returns the lines of the server's `250` reply.
    pub fn ehlo(&mut self, client_name: &str) -> Result<Vec<String>, TransportError> {
        self.send(&format!("EHLO {}", client_name))?;
        let reply = self.read_reply()?;
        if reply.code != 250 {
            return Err(TransportError::UnexpectedStatus { expected: 250, actual: reply.code, text: reply.joined() });
        }
        Ok(reply.lines)
    }

    /// Ends the session politely.
    pub fn quit(&mut self) -> Result<(), TransportError> {
        self.send("QUIT")?;
        self.expect(221).map(|_| ())
    }

    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }

    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}
impl SmtpStream<TcpStream> {
    /// Connects to an SMTP server and consumes its `220` greeting.
    pub fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        let mut smtp = Self::new(TcpStream::connect((host, port))?);
        smtp.expect(220)?;
        Ok(smtp)
    }
}
impl<S: Read + Write> Transport for SmtpStream<S> {
    fn send(&mut self, line: &str) -> Result<(), TransportError> {
        // never the arguments; authentication lines carry credential material
        match line.split_once(' ') {
            Some((verb, _)) => trace!("C: {} <{} bytes>", verb, line.len()),
            None => trace!("C: <{} bytes>", line.len()),
        }

        let writer = self.stream.get_mut();
        writer.write_all(line.as_bytes())?;
        writer.write_all(CRLF.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    fn expect(&mut self, code: u16) -> Result<String, TransportError> {
        self.read_reply()?.expect(code)
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn set_authenticated(&mut self) {
        self.authenticated = true;
    }
}
