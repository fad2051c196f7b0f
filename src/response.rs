//! Calculation of the NTLMv1 responses to a server challenge.
//!
//! Both responses are a pure function of the password and the server nonce: a 16-byte password
//! hash (LM or NT) is zero-padded to 21 bytes, split into three 7-byte DES keys, and each key
//! encrypts the nonce. The three 8-byte ciphertexts form the 24-byte response.


use std::fmt;

use cipher::{BlockEncrypt, KeyInit};
use cipher::generic_array::GenericArray;
use des::Des;
use digest::Digest;
use md4::Md4;
use rand::{CryptoRng, RngCore};

use crate::oem::encode_oem;


/// The plaintext encrypted with the password halves to obtain the LM hash.
const LM_MAGIC: [u8; 8] = *b"KGS!@#$%";

/// The LM hash only considers this many bytes of the password.
const LM_PASSWORD_LEN: usize = 14;


/// A plaintext password.
///
/// The `Debug` output never contains the password itself.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Password(String);
impl Password {
    pub fn new<S: Into<String>>(password: S) -> Self {
        Self(password.into())
    }

    /// Returns the password in plain text.
    pub fn expose(&self) -> &str {
        &self.0
    }
}
impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}
impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
impl From<String> for Password {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// The response to an NTLMv1 challenge.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct NtlmResponse {
    /// The classic LanManager (LM) response.
    pub lm_response: [u8; 24],

    /// The NT LanManager (NTLM) response.
    pub nt_response: [u8; 24],
}


/// Spreads 56 key bits over 8 bytes, leaving the lowest bit of each byte for parity.
///
/// The parity bits are set to odd parity even though DES ignores them.
pub fn expand_des_key(key: &[u8; 7]) -> [u8; 8] {
    let mut expanded = [
        key[0] >> 1,
        ((key[0] & 0x01) << 6) | (key[1] >> 2),
        ((key[1] & 0x03) << 5) | (key[2] >> 3),
        ((key[2] & 0x07) << 4) | (key[3] >> 4),
        ((key[3] & 0x0F) << 3) | (key[4] >> 5),
        ((key[4] & 0x1F) << 2) | (key[5] >> 6),
        ((key[5] & 0x3F) << 1) | (key[6] >> 7),
        key[6] & 0x7F,
    ];
    for b in &mut expanded {
        *b <<= 1;
        if b.count_ones() % 2 == 0 {
            *b |= 0x01;
        }
    }
    expanded
}

/// Encrypts a single block with DES in ECB mode, using a 7-byte key.
fn des_encrypt_block(key: &[u8; 7], block: [u8; 8]) -> [u8; 8] {
    let des = Des::new(&GenericArray::from(expand_des_key(key)));
    let mut buf = GenericArray::from(block);
    des.encrypt_block(&mut buf);

    let mut ret = [0u8; 8];
    ret.copy_from_slice(buf.as_slice());
    ret
}

fn key7(bytes: &[u8]) -> [u8; 7] {
    let mut key = [0u8; 7];
    key.copy_from_slice(&bytes[0..7]);
    key
}


/// Performs the NTLMv1 DES encryption to calculate the response value to the challenge.
pub fn des_long(hash: [u8; 16], data: [u8; 8]) -> [u8; 24] {
    let mut padded = [0u8; 21];
    padded[0..16].copy_from_slice(&hash);

    let mut ret = [0u8; 24];
    for (key_bytes, out) in padded.chunks_exact(7).zip(ret.chunks_exact_mut(8)) {
        out.copy_from_slice(&des_encrypt_block(&key7(key_bytes), data));
    }
    ret
}


/// Derives the LM hash from a password.
///
/// The LMv1 scheme consists of the following:
///
/// ```plain
///            ┌────────────┐  ┌───────────────┐  ┌─────────────┐
/// password ──┤ convert to ├──┤ encode using  ├──┤ truncate or ├──┐
///            │ uppercase  │  │ OEM codepage  │  │ pad to 14 B │  │
///            └────────────┘  └───────────────┘  └─────────────┘  │
///           ┌────────────────────────────────────────────────────┘
///           │┌───────┐
///           └┤ split │           "KGS!@#$%"
///            └─┬───┬─┘               │ input
///         0..7 │   │ 7..14    key ┌──┴──┐ output
///              │   └──────────────┤ DES ├────────────┐
///              │                  └─────┘            │ 8..16
///              │                                  ┌──┴───┐
///              │                 "KGS!@#$%"       │ join ├──── hash
///              │                     │ input      └──┬───┘
///              │              key ┌──┴──┐ output     │ 0..8
///              └──────────────────┤ DES ├────────────┘
///                                 └─────┘
/// ```
///
/// Passwords longer than 14 bytes are truncated, as the legacy scheme demands. A password that
/// cannot be represented in the OEM codepage hashes like the empty password.
pub fn lm_v1_hash(password: &str) -> [u8; 16] {
    let mut password_bytes = encode_oem(&password.to_uppercase())
        .unwrap_or_default();
    password_bytes.resize(LM_PASSWORD_LEN, 0x00);

    let mut output = [0u8; 16];
    let (half0, half1) = output.split_at_mut(8);
    half0.copy_from_slice(&des_encrypt_block(&key7(&password_bytes[0..7]), LM_MAGIC));
    half1.copy_from_slice(&des_encrypt_block(&key7(&password_bytes[7..14]), LM_MAGIC));
    output
}

/// Derives the NT hash from a password.
///
/// The NTLMv1 scheme encodes the password as UTF-16 in little-endian byte order (without the Byte
/// Order Mark) and hashes it using MD4.
pub fn nt_v1_hash(password: &str) -> [u8; 16] {
    let password_bytes: Vec<u8> = password.encode_utf16()
        .flat_map(|p| p.to_le_bytes())
        .collect();
    let mut md4_state = <Md4 as Digest>::new();
    md4_state.update(&password_bytes);

    let mut ret = [0u8; 16];
    ret.copy_from_slice(md4_state.finalize().as_slice());
    ret
}

/// Calculates the NTLMv1 and LMv1 responses to the given server challenge.
pub fn respond_challenge_ntlm_v1(server_challenge: [u8; 8], password: &Password) -> NtlmResponse {
    let nt_hash = nt_v1_hash(password.expose());
    let lm_hash = lm_v1_hash(password.expose());

    NtlmResponse {
        lm_response: des_long(lm_hash, server_challenge),
        nt_response: des_long(nt_hash, server_challenge),
    }
}

/// Generates an 8-byte client nonce.
///
/// Plain NTLMv1 responses depend on the server nonce alone; this is provided for callers that
/// build on the responses and need client-side randomness.
pub fn generate_client_nonce<R: RngCore + CryptoRng>(rng: &mut R) -> [u8; 8] {
    let mut nonce = [0u8; 8];
    rng.fill_bytes(&mut nonce);
    nonce
}


#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const SERVER_CHALLENGE: [u8; 8] = hex!("0123456789abcdef");

    #[test]
    fn lm_hash_reference() {
        assert_eq!(lm_v1_hash("Password"), hex!("e52cac67419a9a224a3b108f3fa6cb6d"));
        // uppercased before hashing
        assert_eq!(lm_v1_hash("password"), lm_v1_hash("PASSWORD"));
    }

    #[test]
    fn nt_hash_reference() {
        assert_eq!(nt_v1_hash("Password"), hex!("a4f49c406510bdcab6824ee7c30fd852"));
        assert_ne!(nt_v1_hash("password"), nt_v1_hash("PASSWORD"));
    }

    #[test]
    fn empty_password_hashes() {
        assert_eq!(lm_v1_hash(""), hex!("aad3b435b51404eeaad3b435b51404ee"));
        assert_eq!(nt_v1_hash(""), hex!("31d6cfe0d16ae931b73c59d7e0c089c0"));
    }

    #[test]
    fn lm_hash_truncates_long_passwords() {
        assert_eq!(lm_v1_hash("ABCDEFGHIJKLMN"), lm_v1_hash("abcdefghijklmnOPQRSTUVWXYZ"));
    }

    #[test]
    fn responses_reference() {
        let response = respond_challenge_ntlm_v1(SERVER_CHALLENGE, &Password::new("Password"));
        assert_eq!(response.nt_response, hex!("67c43011f30298a2ad35ece64f16331c44bdbed927841f94"));
        assert_eq!(response.lm_response, hex!("98def7b87f88aa5dafe2df779688a172def11c7d5ccdef13"));
    }

    #[test]
    fn responses_are_deterministic() {
        let password = Password::new("Password123");
        let nonce = hex!("0001020304050607");
        let first = respond_challenge_ntlm_v1(nonce, &password);
        let second = respond_challenge_ntlm_v1(nonce, &password);
        assert_eq!(first, second);
        assert_ne!(first, respond_challenge_ntlm_v1(SERVER_CHALLENGE, &password));
    }

    #[test]
    fn empty_password_still_responds() {
        let response = respond_challenge_ntlm_v1(SERVER_CHALLENGE, &Password::new(""));
        assert_eq!(response.nt_response, des_long(hex!("31d6cfe0d16ae931b73c59d7e0c089c0"), SERVER_CHALLENGE));
        assert_ne!(response.nt_response, [0u8; 24]);
    }

    #[test]
    fn des_key_expansion() {
        assert_eq!(expand_des_key(&[0u8; 7]), [0x01; 8]);
        assert_eq!(expand_des_key(&[0xFF; 7]), [0xFE; 8]);
        for b in expand_des_key(&hex!("0123456789abcd")) {
            assert_eq!(b.count_ones() % 2, 1);
        }
    }

    #[test]
    fn client_nonce_uses_rng() {
        let a = generate_client_nonce(&mut StdRng::seed_from_u64(7));
        let b = generate_client_nonce(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn password_debug_is_redacted() {
        let shown = format!("{:?}", Password::new("hunter2"));
        assert!(!shown.contains("hunter2"));
    }
}
