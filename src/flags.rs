//! NTLMSSP negotiation flags.


use bitflags::bitflags;


bitflags! {
    /// NTLM negotiation flags, as exchanged in all three handshake messages.
    #[derive(Clone, Copy, Debug, Default, Hash, Eq, Ord, PartialEq, PartialOrd)]
    pub struct Flags: u32 {
        const NEGOTIATE_UNICODE = 0x0000_0001;
        const NEGOTIATE_OEM = 0x0000_0002;
        const REQUEST_TARGET = 0x0000_0004;
        const UNKNOWN_8 = 0x0000_0008;
        const NEGOTIATE_SIGN = 0x0000_0010;
        const NEGOTIATE_SEAL = 0x0000_0020;
        const NEGOTIATE_DATAGRAM = 0x0000_0040;
        const NEGOTIATE_LANMAN_KEY = 0x0000_0080;
        const NEGOTIATE_NETWARE = 0x0000_0100;
        const NEGOTIATE_NTLM = 0x0000_0200;
        const UNKNOWN_400 = 0x0000_0400;
        const NEGOTIATE_ANONYMOUS = 0x0000_0800;
        const NEGOTIATE_DOMAIN_SUPPLIED = 0x0000_1000;
        const NEGOTIATE_WORKSTATION_SUPPLIED = 0x0000_2000;
        const NEGOTIATE_LOCAL_CALL = 0x0000_4000;
        const NEGOTIATE_ALWAYS_SIGN = 0x0000_8000;
        const TARGET_TYPE_DOMAIN = 0x0001_0000;
        const TARGET_TYPE_SERVER = 0x0002_0000;
        const TARGET_TYPE_SHARE = 0x0004_0000;
        const NEGOTIATE_NTLM2_KEY = 0x0008_0000;
        const REQUEST_INIT_RESPONSE = 0x0010_0000;
        const REQUEST_ACCEPT_RESPONSE = 0x0020_0000;
        const REQUEST_NON_NT_SESSION_KEY = 0x0040_0000;
        const NEGOTIATE_TARGET_INFO = 0x0080_0000;
        const UNKNOWN_1000000 = 0x0100_0000;
        const NEGOTIATE_VERSION = 0x0200_0000;
        const UNKNOWN_4000000 = 0x0400_0000;
        const UNKNOWN_8000000 = 0x0800_0000;
        const UNKNOWN_10000000 = 0x1000_0000;
        const NEGOTIATE_128BIT = 0x2000_0000;
        const NEGOTIATE_KEY_EXCHANGE = 0x4000_0000;
        const NEGOTIATE_56BIT = 0x8000_0000;
    }
}

impl Flags {
    /// The flags requested in the Negotiate message of an NTLMv1 handshake.
    ///
    /// Both `*_SUPPLIED` bits are included; [`encode_negotiate`](crate::message::encode_negotiate)
    /// clears the bit of each field that turns out to be empty.
    pub fn ntlm_v1() -> Self {
        Self::NEGOTIATE_UNICODE
            | Self::NEGOTIATE_OEM
            | Self::REQUEST_TARGET
            | Self::NEGOTIATE_NTLM
            | Self::NEGOTIATE_ALWAYS_SIGN
            | Self::NEGOTIATE_DOMAIN_SUPPLIED
            | Self::NEGOTIATE_WORKSTATION_SUPPLIED
    }

    /// Derives the flags of the Authenticate message from those the server sent in its Challenge.
    ///
    /// Exactly one character set is selected (Unicode if the server offered it, OEM otherwise).
    /// Session security features and extended session security are never carried over, since
    /// the responses are always plain NTLMv1.
    pub fn for_authenticate(server_flags: Flags) -> Self {
        let kept = Self::REQUEST_TARGET
            | Self::NEGOTIATE_NTLM
            | Self::NEGOTIATE_ALWAYS_SIGN
            | Self::TARGET_TYPE_DOMAIN
            | Self::TARGET_TYPE_SERVER
            | Self::TARGET_TYPE_SHARE;

        let mut flags = (server_flags & kept) | Self::NEGOTIATE_NTLM;
        if server_flags.contains(Self::NEGOTIATE_UNICODE) || !server_flags.contains(Self::NEGOTIATE_OEM) {
            flags |= Self::NEGOTIATE_UNICODE;
        } else {
            flags |= Self::NEGOTIATE_OEM;
        }
        flags
    }

    /// Returns the flags a server may set that this client deliberately does not honour.
    pub fn unsupported_by_v1(self) -> Self {
        self & (Self::NEGOTIATE_NTLM2_KEY
            | Self::NEGOTIATE_KEY_EXCHANGE
            | Self::NEGOTIATE_SIGN
            | Self::NEGOTIATE_SEAL)
    }
}
