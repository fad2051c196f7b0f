//! Conversion between Rust strings and the OEM character set.
//!
//! NTLM falls back to the "OEM" character set whenever Unicode has not been negotiated, and the
//! LM hash is always computed over OEM bytes. On Windows this is the configured ANSI code page,
//! reached through the system conversion functions. Other operating systems have no such concept;
//! practically all of them use UTF-8, so that is used instead.


/// Encodes a string in the OEM character set, or returns `None` if it contains characters the
/// character set cannot represent.
pub fn encode_oem(value: &str) -> Option<Vec<u8>> {
    if value.is_empty() {
        return Some(Vec::new());
    }
    platform::encode(value)
}

/// Decodes bytes in the OEM character set into a string, or returns `None` if they are invalid.
pub fn decode_oem(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return Some(String::new());
    }
    platform::decode(bytes)
}


#[cfg(not(windows))]
mod platform {
    pub(super) fn encode(value: &str) -> Option<Vec<u8>> {
        Some(value.as_bytes().to_vec())
    }

    pub(super) fn decode(bytes: &[u8]) -> Option<String> {
        String::from_utf8(bytes.to_vec()).ok()
    }
}


#[cfg(windows)]
mod platform {
    use windows::Win32::Globalization::{
        CP_ACP, MB_ERR_INVALID_CHARS, MB_PRECOMPOSED, MultiByteToWideChar, WC_COMPOSITECHECK,
        WideCharToMultiByte,
    };

    pub(super) fn encode(value: &str) -> Option<Vec<u8>> {
        let wide: Vec<u16> = value.encode_utf16().collect();

        // first call sizes the buffer, second call fills it
        let needed = unsafe { WideCharToMultiByte(CP_ACP, WC_COMPOSITECHECK, &wide, None, None, None) };
        let mut buf = vec![0u8; positive(needed)?];
        let written = unsafe {
            WideCharToMultiByte(CP_ACP, WC_COMPOSITECHECK, &wide, Some(buf.as_mut_slice()), None, None)
        };
        buf.truncate(positive(written)?);
        Some(buf)
    }

    pub(super) fn decode(bytes: &[u8]) -> Option<String> {
        let conversion = MB_ERR_INVALID_CHARS | MB_PRECOMPOSED;

        let needed = unsafe { MultiByteToWideChar(CP_ACP, conversion, bytes, None) };
        let mut wide = vec![0u16; positive(needed)?];
        let written = unsafe { MultiByteToWideChar(CP_ACP, conversion, bytes, Some(wide.as_mut_slice())) };
        wide.truncate(positive(written)?);

        String::from_utf16(&wide).ok()
    }

    /// The conversion functions signal failure by returning zero.
    fn positive(count: i32) -> Option<usize> {
        match usize::try_from(count) {
            Ok(0) | Err(_) => None,
            Ok(n) => Some(n),
        }
    }
}


#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;

    #[test]
    fn utf8_passthrough() {
        assert_eq!(encode_oem("CORP").as_deref(), Some(&b"CORP"[..]));
        assert_eq!(decode_oem(b"HOST").as_deref(), Some("HOST"));
        assert_eq!(decode_oem(&[0xFF, 0xFE]), None);
    }

    #[test]
    fn empty_strings() {
        assert_eq!(encode_oem(""), Some(Vec::new()));
        assert_eq!(decode_oem(&[]), Some(String::new()));
    }
}
