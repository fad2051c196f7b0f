use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};

use base64::prelude::{BASE64_STANDARD, Engine};
use hex_literal::hex;

use smtp_ntlm::message::{
    ChallengeMessage, OsVersion, TargetInfoEntry, TargetInfoType, decode_authenticate,
    decode_negotiate, encode_challenge,
};
use smtp_ntlm::{
    AuthError, Credentials, Flags, Handshake, HandshakeState, SmtpStream, Transport,
    TransportError, authenticate,
};


/// A transport replaying canned replies and recording every line sent.
#[derive(Default)]
struct MockTransport {
    replies: VecDeque<(u16, String)>,
    sent: Vec<String>,
    authenticated: bool,
}
impl MockTransport {
    fn new(replies: &[(u16, &str)]) -> Self {
        Self {
            replies: replies.iter().map(|(c, t)| (*c, t.to_string())).collect(),
            ..Default::default()
        }
    }
}
impl Transport for MockTransport {
    fn send(&mut self, line: &str) -> Result<(), TransportError> {
        self.sent.push(line.to_owned());
        Ok(())
    }

    fn expect(&mut self, code: u16) -> Result<String, TransportError> {
        match self.replies.pop_front() {
            None => Err(TransportError::ConnectionClosed),
            Some((actual, text)) if actual != code => Err(TransportError::UnexpectedStatus { expected: code, actual, text }),
            Some((_, text)) => Ok(text),
        }
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn set_authenticated(&mut self) {
        self.authenticated = true;
    }
}


fn challenge_b64(nonce: [u8; 8], flags: Flags) -> String {
    let challenge = ChallengeMessage {
        target_name: "CORP".to_owned(),
        flags,
        challenge: nonce,
        context: (0, 0),
        target_information: vec![
            TargetInfoEntry::from_string(TargetInfoType::NtDomain, "CORP"),
            TargetInfoEntry::from_string(TargetInfoType::NtServer, "MAIL01"),
            TargetInfoEntry { entry_type: TargetInfoType::Terminator, data: Vec::new() },
        ],
        os_version: OsVersion::default(),
    };
    BASE64_STANDARD.encode(encode_challenge(&challenge).unwrap())
}

fn unicode_flags() -> Flags {
    Flags::NEGOTIATE_UNICODE | Flags::NEGOTIATE_NTLM | Flags::TARGET_TYPE_DOMAIN | Flags::NEGOTIATE_TARGET_INFO
}

fn credentials(password: &str) -> Credentials {
    Credentials::new("jdoe", password)
        .with_domain("CORP")
        .with_hostname("WS01")
}


#[test]
fn successful_handshake_reference_vector() {
    let challenge = challenge_b64(hex!("0123456789abcdef"), unicode_flags());
    let mut transport = MockTransport::new(&[
        (334, challenge.as_str()),
        (235, "2.7.0 Authentication successful"),
    ]);

    let outcome = authenticate(credentials("Password"), &mut transport).unwrap();
    assert_eq!(outcome.target_name, "CORP");
    assert!(outcome.flags.contains(Flags::NEGOTIATE_UNICODE));
    assert!(transport.is_authenticated());

    assert_eq!(transport.sent.len(), 2);
    let negotiate_b64 = transport.sent[0].strip_prefix("AUTH NTLM ").unwrap();
    let negotiate = decode_negotiate(&BASE64_STANDARD.decode(negotiate_b64).unwrap()).unwrap();
    assert_eq!(negotiate.supplied_domain, "CORP");
    assert_eq!(negotiate.supplied_workstation, "WS01");
    assert!(negotiate.flags.contains(Flags::NEGOTIATE_NTLM | Flags::NEGOTIATE_DOMAIN_SUPPLIED | Flags::NEGOTIATE_WORKSTATION_SUPPLIED));

    // the second line is a bare continuation
    assert!(!transport.sent[1].contains(' '));
    let auth = decode_authenticate(&BASE64_STANDARD.decode(&transport.sent[1]).unwrap()).unwrap();
    assert_eq!(auth.user_name, "jdoe");
    assert_eq!(auth.domain_name, "CORP");
    assert_eq!(auth.workstation_name, "WS01");
    assert_eq!(auth.ntlm_response, hex!("67c43011f30298a2ad35ece64f16331c44bdbed927841f94"));
    assert_eq!(auth.lm_response, hex!("98def7b87f88aa5dafe2df779688a172def11c7d5ccdef13"));
    assert_eq!(auth.flags, outcome.flags);
}

#[test]
fn successful_handshake_sequential_nonce() {
    let nonce = hex!("0001020304050607");
    let challenge = challenge_b64(nonce, unicode_flags());
    let mut transport = MockTransport::new(&[
        (334, challenge.as_str()),
        (235, "Authentication successful"),
    ]);

    let mut handshake = Handshake::new(credentials("Password123"));
    handshake.run(&mut transport).unwrap();
    assert_eq!(handshake.state(), HandshakeState::Authenticated);
    assert_eq!(handshake.server_challenge().unwrap().challenge, nonce);

    let auth = decode_authenticate(&BASE64_STANDARD.decode(&transport.sent[1]).unwrap()).unwrap();
    assert_eq!(auth.ntlm_response, hex!("4bbbef1d86d92dd69dfe093eb9b5debf2d0be99fb8e4cbc5"));
    assert_eq!(auth.lm_response, hex!("92cbe52cc3dd9e9188103bbdee12a9fb610901ced177fe26"));
    assert_eq!(handshake.authenticate_flags(), Some(auth.flags));
}

#[test]
fn server_without_charset_flags() {
    // bare 32-byte challenge: no target name, only NEGOTIATE_NTLM
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"NTLMSSP\0");
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 8]);
    bytes.extend_from_slice(&Flags::NEGOTIATE_NTLM.bits().to_le_bytes());
    bytes.extend_from_slice(&hex!("0123456789abcdef"));
    let challenge = BASE64_STANDARD.encode(&bytes);

    let mut transport = MockTransport::new(&[
        (334, challenge.as_str()),
        (235, "Authentication successful"),
    ]);
    let outcome = authenticate(credentials("Password"), &mut transport).unwrap();
    assert_eq!(outcome.target_name, "");
    assert!(outcome.flags.contains(Flags::NEGOTIATE_UNICODE));
    assert!(!outcome.flags.contains(Flags::NEGOTIATE_OEM));

    let auth = decode_authenticate(&BASE64_STANDARD.decode(&transport.sent[1]).unwrap()).unwrap();
    assert_eq!(auth.user_name, "jdoe");
    assert_eq!(auth.ntlm_response, hex!("67c43011f30298a2ad35ece64f16331c44bdbed927841f94"));
}

#[test]
fn rejected_negotiate() {
    let mut transport = MockTransport::new(&[(535, "Authentication failed")]);
    let mut handshake = Handshake::new(credentials("Password"));

    match handshake.run(&mut transport) {
        Err(AuthError::UnexpectedStatus { expected, actual, text }) => {
            assert_eq!(expected, 334);
            assert_eq!(actual, 535);
            assert_eq!(text, "Authentication failed");
        },
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(handshake.state(), HandshakeState::Failed);
    assert_eq!(transport.sent.len(), 1);
    assert!(!transport.is_authenticated());
}

#[test]
fn rejected_authenticate() {
    let challenge = challenge_b64(hex!("0123456789abcdef"), unicode_flags());
    let mut transport = MockTransport::new(&[
        (334, challenge.as_str()),
        (535, "5.7.3 Authentication unsuccessful"),
    ]);
    let mut handshake = Handshake::new(credentials("wrong"));

    let err = handshake.run(&mut transport).unwrap_err();
    assert!(matches!(err, AuthError::UnexpectedStatus { expected: 235, actual: 535, .. }));
    assert_eq!(handshake.state(), HandshakeState::Failed);
    assert!(!transport.is_authenticated());
}

#[test]
fn invalid_base64_challenge() {
    let mut transport = MockTransport::new(&[(334, "not*base64!")]);
    let mut handshake = Handshake::new(credentials("Password"));

    assert!(matches!(handshake.run(&mut transport), Err(AuthError::Protocol(_))));
    assert_eq!(handshake.state(), HandshakeState::Failed);
    assert_eq!(transport.sent.len(), 1);
}

#[test]
fn malformed_challenge() {
    let garbage = BASE64_STANDARD.encode(b"definitely not NTLM at all");
    let mut transport = MockTransport::new(&[(334, garbage.as_str())]);
    let mut handshake = Handshake::new(credentials("Password"));

    assert!(matches!(handshake.run(&mut transport), Err(AuthError::MalformedMessage(_))));
    assert_eq!(handshake.state(), HandshakeState::Failed);
    assert_eq!(transport.sent.len(), 1);
}

#[test]
fn dropped_connection() {
    let mut transport = MockTransport::new(&[]);
    let mut handshake = Handshake::new(credentials("Password"));

    assert!(matches!(
        handshake.run(&mut transport),
        Err(AuthError::Connection(TransportError::ConnectionClosed)),
    ));
    assert_eq!(handshake.state(), HandshakeState::Failed);
}

#[test]
fn failed_handshake_stays_failed() {
    let mut transport = MockTransport::new(&[(535, "Authentication failed")]);
    let mut handshake = Handshake::new(credentials("Password"));
    handshake.run(&mut transport).unwrap_err();

    let err = handshake.send_authenticate(&mut transport).unwrap_err();
    assert!(matches!(err, AuthError::OutOfOrder { state: HandshakeState::Failed, .. }));
    let err = handshake.send_negotiate(&mut transport).unwrap_err();
    assert!(matches!(err, AuthError::OutOfOrder { state: HandshakeState::Failed, .. }));
    assert_eq!(transport.sent.len(), 1);
}

#[test]
fn already_authenticated() {
    let challenge = challenge_b64(hex!("0123456789abcdef"), unicode_flags());
    let mut transport = MockTransport::new(&[
        (334, challenge.as_str()),
        (235, "Authentication successful"),
    ]);
    authenticate(credentials("Password"), &mut transport).unwrap();

    let err = authenticate(credentials("Password"), &mut transport).unwrap_err();
    assert!(matches!(err, AuthError::AlreadyAuthenticated));
    assert_eq!(transport.sent.len(), 2);
}

#[test]
fn oem_only_server() {
    let challenge = challenge_b64(hex!("0123456789abcdef"), Flags::NEGOTIATE_OEM | Flags::NEGOTIATE_NTLM);
    let mut transport = MockTransport::new(&[
        (334, challenge.as_str()),
        (235, "Authentication successful"),
    ]);

    let outcome = authenticate(credentials("Password"), &mut transport).unwrap();
    assert!(outcome.flags.contains(Flags::NEGOTIATE_OEM));
    assert!(!outcome.flags.contains(Flags::NEGOTIATE_UNICODE));

    let auth_bytes = BASE64_STANDARD.decode(&transport.sent[1]).unwrap();
    let auth = decode_authenticate(&auth_bytes).unwrap();
    assert_eq!(auth.user_name, "jdoe");
    assert!(auth_bytes.ends_with(b"CORPjdoeWS01"));
}

#[test]
fn extended_session_security_is_not_used() {
    let flags = unicode_flags() | Flags::NEGOTIATE_NTLM2_KEY | Flags::NEGOTIATE_KEY_EXCHANGE;
    let challenge = challenge_b64(hex!("0123456789abcdef"), flags);
    let mut transport = MockTransport::new(&[
        (334, challenge.as_str()),
        (235, "Authentication successful"),
    ]);

    let outcome = authenticate(credentials("Password"), &mut transport).unwrap();
    assert!(!outcome.flags.contains(Flags::NEGOTIATE_NTLM2_KEY));

    let auth = decode_authenticate(&BASE64_STANDARD.decode(&transport.sent[1]).unwrap()).unwrap();
    assert_eq!(auth.ntlm_response, hex!("67c43011f30298a2ad35ece64f16331c44bdbed927841f94"));
}

#[test]
fn anonymous_workstation_negotiate() {
    let challenge = challenge_b64(hex!("0123456789abcdef"), unicode_flags());
    let mut transport = MockTransport::new(&[
        (334, challenge.as_str()),
        (235, "Authentication successful"),
    ]);

    authenticate(Credentials::new("jdoe", "Password"), &mut transport).unwrap();

    let negotiate_b64 = transport.sent[0].strip_prefix("AUTH NTLM ").unwrap();
    let negotiate = decode_negotiate(&BASE64_STANDARD.decode(negotiate_b64).unwrap()).unwrap();
    assert!(!negotiate.flags.intersects(Flags::NEGOTIATE_DOMAIN_SUPPLIED | Flags::NEGOTIATE_WORKSTATION_SUPPLIED));
    assert_eq!(negotiate.supplied_domain, "");
    assert_eq!(negotiate.supplied_workstation, "");
}


/// Server side of an in-memory SMTP connection.
struct ScriptedStream {
    input: Cursor<Vec<u8>>,
    output: Vec<u8>,
}
impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}
impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn handshake_over_smtp_stream() {
    let server = format!(
        "250-mail.corp.example\r\n250-AUTH NTLM\r\n250 8BITMIME\r\n334 {}\r\n235 2.7.0 Authentication successful\r\n",
        challenge_b64(hex!("0123456789abcdef"), unicode_flags()),
    );
    let mut smtp = SmtpStream::new(ScriptedStream {
        input: Cursor::new(server.into_bytes()),
        output: Vec::new(),
    });

    let capabilities = smtp.ehlo("ws01.corp.example").unwrap();
    assert!(capabilities.iter().any(|c| c == "AUTH NTLM"));
    authenticate(credentials("Password"), &mut smtp).unwrap();
    assert!(smtp.is_authenticated());

    let written = String::from_utf8(smtp.into_inner().output).unwrap();
    let lines: Vec<&str> = written.split("\r\n").collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "EHLO ws01.corp.example");
    assert!(lines[1].starts_with("AUTH NTLM TlRMTVNTUAAB"));
    assert!(lines[2].starts_with("TlRMTVNTUAAD"));
    assert_eq!(lines[3], "");
}
