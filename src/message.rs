//! Encoding and decoding of the three NTLM handshake messages.
//!
//! Every message begins with the signature `NTLMSSP\0` and a 32-bit little-endian message type,
//! followed by a fixed-size header. Variable-length fields (strings, responses, target
//! information) are referenced from the header through [`SecurityBuffer`]s and stored after the
//! header, in the order in which their buffers appear.


use log::warn;

use crate::flags::Flags;
use crate::oem::{decode_oem, encode_oem};
use crate::response::NtlmResponse;


/// The magic value at the start of every NTLMSSP data packet.
pub const NTLMSSP_MAGIC: [u8; 8] = *b"NTLMSSP\0";

const NEGOTIATE_TYPE: u32 = 0x0000_0001;
const CHALLENGE_TYPE: u32 = 0x0000_0002;
const AUTHENTICATE_TYPE: u32 = 0x0000_0003;

/// Length of signature and message type.
const PREAMBLE_LEN: usize = 12;

const NEGOTIATE_HEADER_LEN: usize
    = PREAMBLE_LEN
    + 4 // flags
    + 8 // supplied domain secbuffer
    + 8 // supplied workstation secbuffer
    + 8 // version
    ;

/// The part of a Challenge message that every server sends.
const CHALLENGE_MIN_LEN: usize
    = PREAMBLE_LEN
    + 8 // target name secbuffer
    + 4 // flags
    + 8 // challenge
    ;
const CHALLENGE_TARGET_INFO_LEN: usize
    = CHALLENGE_MIN_LEN
    + 8 // context
    + 8 // target information secbuffer
    ;
const CHALLENGE_HEADER_LEN: usize
    = CHALLENGE_TARGET_INFO_LEN
    + 8 // version
    ;

const AUTHENTICATE_MIN_LEN: usize
    = PREAMBLE_LEN
    + 8 // LM response secbuffer
    + 8 // NTLM response secbuffer
    + 8 // domain name secbuffer
    + 8 // user name secbuffer
    + 8 // workstation name secbuffer
    + 8 // session key secbuffer
    + 4 // flags
    ;
const AUTHENTICATE_HEADER_LEN: usize
    = AUTHENTICATE_MIN_LEN
    + 8 // version
    ;


/// An error that may occur while parsing existing NTLM packets.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, thiserror::Error)]
pub enum ParsingError {
    /// The message is shorter than its fixed header.
    #[error("header too short (expected at least {expected_min_len} bytes, obtained {obtained_len})")]
    ShortHeader { expected_min_len: usize, obtained_len: usize },

    /// The magic value does not match the expected one.
    #[error("mismatched magic (expected {:?}, obtained {obtained:?})", NTLMSSP_MAGIC)]
    MagicMismatch { obtained: Vec<u8> },

    /// The message is of a different type than the one expected at this point.
    #[error("wrong message type (expected {expected}, obtained {obtained})")]
    WrongMessageType { expected: u32, obtained: u32 },

    /// The message type is none of Negotiate, Challenge or Authenticate.
    #[error("unknown message type {obtained}")]
    UnknownMessageType { obtained: u32 },

    /// An internal item is shorter than expected.
    #[error("insufficient minimum length for an internal item (expected at least {expected_at_least}, obtained {obtained})")]
    ItemMinLengthMismatch { expected_at_least: usize, obtained: usize },

    /// An internal item's length is not divisible by an expected divisor.
    #[error("item length {obtained_length} not divisible by {expected_divisor}")]
    ItemLengthNotDivisible { expected_divisor: usize, obtained_length: usize },

    /// A byte string cannot be decoded using the current OEM encoding.
    #[error("failed to decode value with the current OEM encoding: {value:?}")]
    InvalidOemEncoding { value: Vec<u8> },

    /// A string of 16-bit characters could not be decoded.
    #[error("failed to decode value as UTF-16: {value:?}")]
    InvalidUtf16 { value: Vec<u16> },

    /// A security buffer starts outside of the message.
    #[error("start ({start}) out of range (message has {length} bytes)")]
    StartOutOfRange { start: usize, length: usize },

    /// A security buffer ends outside of the message.
    #[error("end ({end}) out of range (message has {length} bytes)")]
    EndOutOfRange { end: usize, length: usize },

    /// Neither Unicode nor OEM encoding was selected.
    #[error("neither Unicode nor OEM encoding was selected")]
    NeitherUnicodeNorOem,
}

/// An error that may occur while writing an NTLM packet.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, thiserror::Error)]
pub enum StoringError {
    /// The string cannot be encoded using the OEM encoding.
    #[error("failed to encode {string:?} using OEM encoding")]
    NonOemEncodable { string: String },

    /// A field does not fit into a security buffer.
    #[error("field of {length} bytes is too long for a security buffer")]
    FieldTooLong { length: usize },

    /// Neither Unicode nor OEM encoding was selected.
    #[error("neither Unicode nor OEM encoding was selected")]
    NeitherUnicodeNorOem,
}


/// An NTLM message.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Message {
    Negotiate(NegotiateMessage),
    Challenge(ChallengeMessage),
    Authenticate(AuthenticateMessage),
}
impl Message {
    /// Returns the 32-bit message number identifying the type of this message.
    pub fn message_number(&self) -> u32 {
        match self {
            Self::Negotiate(_) => NEGOTIATE_TYPE,
            Self::Challenge(_) => CHALLENGE_TYPE,
            Self::Authenticate(_) => AUTHENTICATE_TYPE,
        }
    }

    /// Serializes the NTLM message into bytes, including signature and message type.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        match self {
            Message::Negotiate(t1m) => t1m.to_bytes(),
            Message::Challenge(t2m) => t2m.to_bytes(),
            Message::Authenticate(t3m) => t3m.to_bytes(),
        }
    }
}
impl TryFrom<&[u8]> for Message {
    type Error = ParsingError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        match read_preamble(value)? {
            NEGOTIATE_TYPE => NegotiateMessage::parse(value).map(Message::Negotiate),
            CHALLENGE_TYPE => ChallengeMessage::parse(value).map(Message::Challenge),
            AUTHENTICATE_TYPE => AuthenticateMessage::parse(value).map(Message::Authenticate),
            other_type => Err(ParsingError::UnknownMessageType { obtained: other_type }),
        }
    }
}


/// A structure representing the version of an operating system as well as the NTLM revision used.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OsVersion {
    pub major_version: u8,
    pub minor_version: u8,
    pub build_number: u16,
    pub reserved: [u8; 3],
    pub ntlm_revision: u8,
}
impl OsVersion {
    /// Serializes the OS version structure into bytes.
    pub fn to_bytes(&self) -> [u8; 8] {
        let build = self.build_number.to_le_bytes();
        [
            self.major_version, self.minor_version, build[0], build[1],
            self.reserved[0], self.reserved[1], self.reserved[2], self.ntlm_revision,
        ]
    }

    /// Reads an OS version structure at `at`; the caller guarantees that eight bytes are available.
    fn read(message: &[u8], at: usize) -> Self {
        Self {
            major_version: message[at],
            minor_version: message[at + 1],
            build_number: read_u16(message, at + 2),
            reserved: [message[at + 4], message[at + 5], message[at + 6]],
            ntlm_revision: message[at + 7],
        }
    }
}


/// The contents of an NTLM Negotiate message.
///
/// The Negotiate message is the first message in an NTLM challenge-response process and is sent by
/// the client to the server; the server is expected to respond with a Challenge message. Its
/// strings are always in the OEM character set.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NegotiateMessage {
    /// Stores which information has been specified and which NTLM behavior should be negotiated.
    pub flags: Flags,

    /// The domain against which the client wishes to authenticate.
    pub supplied_domain: String,

    /// The NT hostname of the client.
    pub supplied_workstation: String,

    /// Version information about the client's operating system.
    pub os_version: OsVersion,
}

/// The contents of an NTLM Challenge message.
///
/// The Challenge message is sent by the server in response to the client's Negotiate message; the
/// client is expected to respond with an Authenticate message. Only [`challenge`](Self::challenge)
/// is needed to compute an NTLMv1 response; the remaining fields are informational.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChallengeMessage {
    /// The domain or server against which the client is authenticating.
    pub target_name: String,

    /// Stores which NTLM behavior has been accepted by the server from the client's request.
    pub flags: Flags,

    /// The server nonce.
    pub challenge: [u8; 8],

    /// The context value.
    pub context: (u32, u32),

    /// Information about the targets of the authentication.
    pub target_information: Vec<TargetInfoEntry>,

    /// Version information about the server's operating system.
    pub os_version: OsVersion,
}

/// The parsed server challenge, as consumed by the response calculation.
pub type ServerChallenge = ChallengeMessage;

/// The contents of an NTLM Authenticate message.
///
/// The Authenticate message is sent by the client in response to the server's Challenge message;
/// once it is accepted by the server, the authentication has succeeded.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AuthenticateMessage {
    pub lm_response: Vec<u8>,
    pub ntlm_response: Vec<u8>,
    pub domain_name: String,
    pub user_name: String,
    pub workstation_name: String,
    pub session_key: Vec<u8>,
    pub flags: Flags,
    pub os_version: OsVersion,
}

/// An NTLM security buffer, pointing to data contained later in the message.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SecurityBuffer {
    pub length: u16,
    pub capacity: u16,
    pub offset: u32,
}

/// The type of additional target information included in the Challenge message.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TargetInfoType {
    Terminator,
    NtServer,
    NtDomain,
    DnsServer,
    DnsDomain,
    DnsForest,
    Flags,
    Timestamp,
    SingleHost,
    TargetName,
    ChannelBindings,
    Unknown(u16),
}
impl From<TargetInfoType> for u16 {
    fn from(t: TargetInfoType) -> Self {
        match t {
            TargetInfoType::Terminator => 0x0000,
            TargetInfoType::NtServer => 0x0001,
            TargetInfoType::NtDomain => 0x0002,
            TargetInfoType::DnsServer => 0x0003,
            TargetInfoType::DnsDomain => 0x0004,
            TargetInfoType::DnsForest => 0x0005,
            TargetInfoType::Flags => 0x0006,
            TargetInfoType::Timestamp => 0x0007,
            TargetInfoType::SingleHost => 0x0008,
            TargetInfoType::TargetName => 0x0009,
            TargetInfoType::ChannelBindings => 0x000A,
            TargetInfoType::Unknown(w) => w,
        }
    }
}
impl From<u16> for TargetInfoType {
    fn from(w: u16) -> Self {
        match w {
            0x0000 => TargetInfoType::Terminator,
            0x0001 => TargetInfoType::NtServer,
            0x0002 => TargetInfoType::NtDomain,
            0x0003 => TargetInfoType::DnsServer,
            0x0004 => TargetInfoType::DnsDomain,
            0x0005 => TargetInfoType::DnsForest,
            0x0006 => TargetInfoType::Flags,
            0x0007 => TargetInfoType::Timestamp,
            0x0008 => TargetInfoType::SingleHost,
            0x0009 => TargetInfoType::TargetName,
            0x000A => TargetInfoType::ChannelBindings,
            other => TargetInfoType::Unknown(other),
        }
    }
}

/// An entry of additional target information included in the Challenge message.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TargetInfoEntry {
    pub entry_type: TargetInfoType,
    pub data: Vec<u8>,
}


// public entry points


/// Encodes a Negotiate message for the given domain and client hostname.
///
/// The `*_SUPPLIED` bits of `flags` are made to agree with the fields: a non-empty field sets its
/// bit, an empty field clears it and is left out of the message.
pub fn encode_negotiate(domain: &str, hostname: &str, flags: Flags) -> Result<Vec<u8>, StoringError> {
    let mut flags = flags;
    flags.set(Flags::NEGOTIATE_DOMAIN_SUPPLIED, !domain.is_empty());
    flags.set(Flags::NEGOTIATE_WORKSTATION_SUPPLIED, !hostname.is_empty());

    Message::Negotiate(NegotiateMessage {
        flags,
        supplied_domain: domain.to_uppercase(),
        supplied_workstation: hostname.to_uppercase(),
        os_version: OsVersion::default(),
    }).to_bytes()
}

/// Decodes a Challenge message received from the server.
///
/// Only the signature, the message type and the length of the fixed header are validated
/// strictly. The target name and target information are informational; if they cannot be
/// decoded, they are replaced (lossily) or left empty.
pub fn decode_challenge(bytes: &[u8]) -> Result<ServerChallenge, ParsingError> {
    expect_type(bytes, CHALLENGE_TYPE)?;
    ChallengeMessage::parse(bytes)
}

/// Encodes a Challenge message. Clients never send one; this is useful for test fixtures.
pub fn encode_challenge(challenge: &ChallengeMessage) -> Result<Vec<u8>, StoringError> {
    challenge.to_bytes()
}

/// Encodes an Authenticate message carrying the given responses.
///
/// Strings are stored as UTF-16LE if `flags` contains [`Flags::NEGOTIATE_UNICODE`] and in the OEM
/// character set if it contains [`Flags::NEGOTIATE_OEM`].
pub fn encode_authenticate(
    username: &str,
    domain: &str,
    hostname: &str,
    response: &NtlmResponse,
    flags: Flags,
) -> Result<Vec<u8>, StoringError> {
    Message::Authenticate(AuthenticateMessage {
        lm_response: response.lm_response.to_vec(),
        ntlm_response: response.nt_response.to_vec(),
        domain_name: domain.to_owned(),
        user_name: username.to_owned(),
        workstation_name: hostname.to_owned(),
        session_key: Vec::new(),
        flags,
        os_version: OsVersion::default(),
    }).to_bytes()
}

/// Decodes an Authenticate message.
pub fn decode_authenticate(bytes: &[u8]) -> Result<AuthenticateMessage, ParsingError> {
    expect_type(bytes, AUTHENTICATE_TYPE)?;
    AuthenticateMessage::parse(bytes)
}

/// Decodes a Negotiate message.
pub fn decode_negotiate(bytes: &[u8]) -> Result<NegotiateMessage, ParsingError> {
    expect_type(bytes, NEGOTIATE_TYPE)?;
    NegotiateMessage::parse(bytes)
}


// serialization and deserialization code


/// Assembles a message from its fixed header and the data referenced by its security buffers.
struct MessageWriter {
    header: Vec<u8>,
    payload: Vec<u8>,
    next_offset: u32,
}
impl MessageWriter {
    /// Starts a message of the given type whose fixed header (including signature and type) has
    /// `header_len` bytes; payload data is placed right after it.
    fn new(message_type: u32, header_len: usize) -> Self {
        let mut header = Vec::with_capacity(header_len);
        header.extend_from_slice(&NTLMSSP_MAGIC);
        header.extend_from_slice(&message_type.to_le_bytes());
        Self {
            header,
            payload: Vec::new(),
            // header lengths are small constants
            next_offset: header_len as u32,
        }
    }

    fn fixed(&mut self, bytes: &[u8]) {
        self.header.extend_from_slice(bytes);
    }

    /// Appends a security buffer to the header and its data to the payload.
    fn buffer(&mut self, data: &[u8]) -> Result<(), StoringError> {
        let mut sb = SecurityBuffer::for_slice(data)?;
        sb.offset = self.next_offset;
        self.header.extend_from_slice(&sb.to_bytes());
        self.payload.extend_from_slice(data);
        self.next_offset += u32::from(sb.length);
        Ok(())
    }

    /// Appends a string in the character set selected by `flags`.
    fn string(&mut self, flags: Flags, data: &str) -> Result<(), StoringError> {
        let bytes = string_to_ntlm_bytes(flags, data)?;
        self.buffer(&bytes)
    }

    fn oem_string(&mut self, data: &str) -> Result<(), StoringError> {
        let bytes = encode_oem(data)
            .ok_or_else(|| StoringError::NonOemEncodable { string: data.to_owned() })?;
        self.buffer(&bytes)
    }

    fn finish(mut self) -> Vec<u8> {
        self.header.append(&mut self.payload);
        self.header
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_flags(bytes: &[u8], at: usize) -> Flags {
    Flags::from_bits_retain(read_u32(bytes, at))
}

/// Validates signature and message type, returning the latter.
fn read_preamble(message: &[u8]) -> Result<u32, ParsingError> {
    check_len(message, PREAMBLE_LEN)?;
    if message[0..8] != NTLMSSP_MAGIC {
        return Err(ParsingError::MagicMismatch { obtained: message[0..8].to_vec() });
    }
    Ok(read_u32(message, 8))
}

fn expect_type(message: &[u8], expected: u32) -> Result<(), ParsingError> {
    let obtained = read_preamble(message)?;
    if obtained != expected {
        return Err(ParsingError::WrongMessageType { expected, obtained });
    }
    Ok(())
}

fn check_len(message: &[u8], min_len: usize) -> Result<(), ParsingError> {
    if message.len() < min_len {
        Err(ParsingError::ShortHeader { expected_min_len: min_len, obtained_len: message.len() })
    } else {
        Ok(())
    }
}

/// Converts UTF-16 values stored as bytes in little-endian format into a string.
fn utf16_le_bytes_to_string(bytes: &[u8]) -> Result<String, ParsingError> {
    if bytes.len() % 2 != 0 {
        return Err(ParsingError::ItemLengthNotDivisible { expected_divisor: 2, obtained_length: bytes.len() });
    }
    let u16s: Vec<u16> = bytes.chunks_exact(2)
        .map(|chk| u16::from_le_bytes([chk[0], chk[1]]))
        .collect();
    String::from_utf16(&u16s)
        .or(Err(ParsingError::InvalidUtf16 { value: u16s }))
}

fn string_to_utf16_le_bytes(string: &str) -> Vec<u8> {
    string.encode_utf16()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

/// Converts an OEM byte string into a Rust string.
fn oem_bytes_to_string(bytes: &[u8]) -> Result<String, ParsingError> {
    decode_oem(bytes)
        .ok_or_else(|| ParsingError::InvalidOemEncoding { value: bytes.to_vec() })
}

/// Converts NTLM string bytes into a Rust string, using OEM or UTF-16 encoding depending on `flags`.
fn ntlm_bytes_to_string(flags: Flags, bytes: &[u8]) -> Result<String, ParsingError> {
    if flags.contains(Flags::NEGOTIATE_UNICODE) {
        utf16_le_bytes_to_string(bytes)
    } else if flags.contains(Flags::NEGOTIATE_OEM) {
        oem_bytes_to_string(bytes)
    } else {
        Err(ParsingError::NeitherUnicodeNorOem)
    }
}

/// Like [`ntlm_bytes_to_string`], but replaces whatever cannot be decoded. Without either
/// charset flag, the bytes are taken as OEM.
fn ntlm_bytes_to_string_lossy(flags: Flags, bytes: &[u8]) -> String {
    if flags.contains(Flags::NEGOTIATE_UNICODE) {
        let u16s: Vec<u16> = bytes.chunks_exact(2)
            .map(|chk| u16::from_le_bytes([chk[0], chk[1]]))
            .collect();
        String::from_utf16_lossy(&u16s)
    } else {
        decode_oem(bytes)
            .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
    }
}

fn string_to_ntlm_bytes(flags: Flags, string: &str) -> Result<Vec<u8>, StoringError> {
    if flags.contains(Flags::NEGOTIATE_UNICODE) {
        Ok(string_to_utf16_le_bytes(string))
    } else if flags.contains(Flags::NEGOTIATE_OEM) {
        encode_oem(string)
            .ok_or_else(|| StoringError::NonOemEncodable { string: string.to_owned() })
    } else {
        Err(StoringError::NeitherUnicodeNorOem)
    }
}

impl NegotiateMessage {
    /// Serializes the Negotiate message into bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        let mut writer = MessageWriter::new(NEGOTIATE_TYPE, NEGOTIATE_HEADER_LEN);
        writer.fixed(&self.flags.bits().to_le_bytes());
        writer.oem_string(&self.supplied_domain)?;
        writer.oem_string(&self.supplied_workstation)?;
        writer.fixed(&self.os_version.to_bytes());
        Ok(writer.finish())
    }

    fn parse(message: &[u8]) -> Result<Self, ParsingError> {
        // flags and both security buffers; the version is optional
        check_len(message, NEGOTIATE_HEADER_LEN - 8)?;

        let flags = read_flags(message, 12);
        let domain_secbuf = SecurityBuffer::read(message, 16);
        let workstation_secbuf = SecurityBuffer::read(message, 24);
        let os_version = if flags.contains(Flags::NEGOTIATE_VERSION) && message.len() >= NEGOTIATE_HEADER_LEN {
            OsVersion::read(message, 32)
        } else {
            OsVersion::default()
        };

        let supplied_domain = oem_bytes_to_string(domain_secbuf.slice_of(message)?)?;
        let supplied_workstation = oem_bytes_to_string(workstation_secbuf.slice_of(message)?)?;

        Ok(Self {
            flags,
            supplied_domain,
            supplied_workstation,
            os_version,
        })
    }
}

impl ChallengeMessage {
    /// Serializes the Challenge message into bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        let mut writer = MessageWriter::new(CHALLENGE_TYPE, CHALLENGE_HEADER_LEN);
        writer.string(self.flags, &self.target_name)?;
        writer.fixed(&self.flags.bits().to_le_bytes());
        writer.fixed(&self.challenge);
        writer.fixed(&self.context.0.to_le_bytes());
        writer.fixed(&self.context.1.to_le_bytes());
        {
            let mut target_info_bytes = Vec::new();
            for ti in &self.target_information {
                target_info_bytes.append(&mut ti.to_bytes()?);
            }
            writer.buffer(&target_info_bytes)?;
        }
        writer.fixed(&self.os_version.to_bytes());
        Ok(writer.finish())
    }

    fn parse(message: &[u8]) -> Result<Self, ParsingError> {
        check_len(message, CHALLENGE_MIN_LEN)?;

        let target_name_secbuf = SecurityBuffer::read(message, 12);
        let flags = read_flags(message, 20);
        let mut challenge = [0u8; 8];
        challenge.copy_from_slice(&message[24..32]);

        // older servers end the message right after the challenge
        let (context, target_info_secbuf) = if message.len() >= CHALLENGE_TARGET_INFO_LEN {
            let context = (read_u32(message, 32), read_u32(message, 36));
            (context, SecurityBuffer::read(message, 40))
        } else {
            ((0, 0), SecurityBuffer::default())
        };
        let os_version = if flags.contains(Flags::NEGOTIATE_VERSION) && message.len() >= CHALLENGE_HEADER_LEN {
            OsVersion::read(message, 48)
        } else {
            OsVersion::default()
        };

        let target_name = match target_name_secbuf.slice_of(message) {
            Ok(bytes) => ntlm_bytes_to_string_lossy(flags, bytes),
            Err(e) => {
                warn!("ignoring unreadable target name in challenge: {}", e);
                String::new()
            },
        };
        let target_information = Self::read_target_info(message, &target_info_secbuf)
            .unwrap_or_else(|e| {
                warn!("ignoring unreadable target information in challenge: {}", e);
                Vec::new()
            });

        Ok(Self {
            target_name,
            flags,
            challenge,
            context,
            target_information,
            os_version,
        })
    }

    fn read_target_info(message: &[u8], secbuf: &SecurityBuffer) -> Result<Vec<TargetInfoEntry>, ParsingError> {
        let mut target_information = Vec::new();
        let mut target_info_bytes = secbuf.slice_of(message)?;
        while !target_info_bytes.is_empty() {
            let (tie, next) = TargetInfoEntry::try_from_bytes(target_info_bytes)?;
            let done = tie.entry_type == TargetInfoType::Terminator;
            target_information.push(tie);
            if done {
                break;
            }
            target_info_bytes = next;
        }
        Ok(target_information)
    }

    /// Returns the first target information entry of the given type.
    pub fn target_info(&self, entry_type: TargetInfoType) -> Option<&TargetInfoEntry> {
        self.target_information.iter()
            .find(|tie| tie.entry_type == entry_type)
    }
}

impl AuthenticateMessage {
    /// Serializes the Authenticate message into bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        let mut writer = MessageWriter::new(AUTHENTICATE_TYPE, AUTHENTICATE_HEADER_LEN);
        writer.buffer(&self.lm_response)?;
        writer.buffer(&self.ntlm_response)?;
        writer.string(self.flags, &self.domain_name)?;
        writer.string(self.flags, &self.user_name)?;
        writer.string(self.flags, &self.workstation_name)?;
        writer.buffer(&self.session_key)?;
        writer.fixed(&self.flags.bits().to_le_bytes());
        writer.fixed(&self.os_version.to_bytes());
        Ok(writer.finish())
    }

    fn parse(message: &[u8]) -> Result<Self, ParsingError> {
        check_len(message, AUTHENTICATE_MIN_LEN)?;

        let lm_response_secbuf = SecurityBuffer::read(message, 12);
        let ntlm_response_secbuf = SecurityBuffer::read(message, 20);
        let domain_name_secbuf = SecurityBuffer::read(message, 28);
        let user_name_secbuf = SecurityBuffer::read(message, 36);
        let workstation_name_secbuf = SecurityBuffer::read(message, 44);
        let session_key_secbuf = SecurityBuffer::read(message, 52);
        let flags = read_flags(message, 60);
        let os_version = if flags.contains(Flags::NEGOTIATE_VERSION) && message.len() >= AUTHENTICATE_HEADER_LEN {
            OsVersion::read(message, 64)
        } else {
            OsVersion::default()
        };

        Ok(Self {
            lm_response: lm_response_secbuf.slice_of(message)?.to_vec(),
            ntlm_response: ntlm_response_secbuf.slice_of(message)?.to_vec(),
            domain_name: ntlm_bytes_to_string(flags, domain_name_secbuf.slice_of(message)?)?,
            user_name: ntlm_bytes_to_string(flags, user_name_secbuf.slice_of(message)?)?,
            workstation_name: ntlm_bytes_to_string(flags, workstation_name_secbuf.slice_of(message)?)?,
            session_key: session_key_secbuf.slice_of(message)?.to_vec(),
            flags,
            os_version,
        })
    }
}

impl SecurityBuffer {
    /// Generates a security buffer for the given slice of bytes.
    ///
    /// The length and capacity are set to the length of the slice, while the offset is set to 0.
    pub fn for_slice(slice: &[u8]) -> Result<Self, StoringError> {
        let len_u16: u16 = slice.len()
            .try_into()
            .or(Err(StoringError::FieldTooLong { length: slice.len() }))?;
        Ok(Self {
            length: len_u16,
            capacity: len_u16,
            offset: 0,
        })
    }

    /// Serializes the security buffer into bytes.
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut ret = [0u8; 8];
        ret[0..2].copy_from_slice(&self.length.to_le_bytes());
        ret[2..4].copy_from_slice(&self.capacity.to_le_bytes());
        ret[4..8].copy_from_slice(&self.offset.to_le_bytes());
        ret
    }

    /// Reads a security buffer at `at`; the caller guarantees that eight bytes are available.
    fn read(message: &[u8], at: usize) -> Self {
        Self {
            length: read_u16(message, at),
            capacity: read_u16(message, at + 2),
            offset: read_u32(message, at + 4),
        }
    }

    /// Extracts the data this security buffer points to from the complete message.
    pub fn slice_of<'a>(&self, message: &'a [u8]) -> Result<&'a [u8], ParsingError> {
        if self.length == 0 {
            return Ok(&message[0..0]);
        }

        let start = self.offset as usize;
        if start >= message.len() {
            return Err(ParsingError::StartOutOfRange { start, length: message.len() });
        }
        let end = start + usize::from(self.length);
        if end > message.len() {
            return Err(ParsingError::EndOutOfRange { end, length: message.len() });
        }

        Ok(&message[start..end])
    }
}

impl TargetInfoEntry {
    /// Serializes the target info entry into bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        let mut ret = Vec::with_capacity(4 + self.data.len());

        // always Unicode, even if flags claim OEM
        let entry_type_u16: u16 = self.entry_type.into();
        let bytes_len: u16 = self.data.len()
            .try_into()
            .or(Err(StoringError::FieldTooLong { length: self.data.len() }))?;

        ret.extend_from_slice(&entry_type_u16.to_le_bytes());
        ret.extend_from_slice(&bytes_len.to_le_bytes());
        ret.extend_from_slice(&self.data);
        Ok(ret)
    }

    /// Attempts to deserialize a target info entry from the given byte slice. If successful,
    /// returns the deserialized target info entry as well as any bytes remaining in the slice (that
    /// are not part of the freshly deserialized target info entry).
    pub fn try_from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), ParsingError> {
        if bytes.len() < 4 {
            return Err(ParsingError::ItemMinLengthMismatch { expected_at_least: 4, obtained: bytes.len() });
        }

        let entry_type: TargetInfoType = read_u16(bytes, 0).into();
        let length = usize::from(read_u16(bytes, 2));

        if length + 4 > bytes.len() {
            return Err(ParsingError::ItemMinLengthMismatch { expected_at_least: length + 4, obtained: bytes.len() });
        }
        if length % 2 != 0 {
            return Err(ParsingError::ItemLengthNotDivisible { expected_divisor: 2, obtained_length: length });
        }

        let entry = Self {
            entry_type,
            data: bytes[4..4+length].to_vec(),
        };
        Ok((entry, &bytes[4+length..]))
    }

    /// Attempts to convert the data within this target info entry into a string.
    pub fn to_string(&self) -> Result<String, ParsingError> {
        utf16_le_bytes_to_string(&self.data)
    }

    /// Creates a target info entry from an entry type and a string.
    pub fn from_string(entry_type: TargetInfoType, string: &str) -> Self {
        Self {
            entry_type,
            data: string_to_utf16_le_bytes(string),
        }
    }
}
