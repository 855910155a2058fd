use bytes::Buf;
use snafu::{Backtrace, OptionExt, Snafu};
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Snafu, Debug)]
pub enum WireError {
    #[snafu(display("io error: {source}"), context(false))]
    Io {
        source: std::io::Error,
        backtrace: Backtrace,
    },
    /// The peer closed the connection before the requested data arrived.
    #[snafu(display("connection aborted after {received} of {expected} bytes"))]
    ConnectionAborted {
        received: usize,
        expected: usize,
        backtrace: Backtrace,
    },
    /// A VarInt ran past its maximum width of five bytes.
    VarIntTooLong { backtrace: Backtrace },
    #[snafu(display("string is too long ({length} bytes)"))]
    StringTooLong { length: usize, backtrace: Backtrace },
    /// Length prefix or payload did not describe a valid string.
    InvalidString { backtrace: Backtrace },
    /// UTF-16BE payloads must contain an even number of bytes.
    #[snafu(display("truncated UTF-16 payload of {length} bytes"))]
    OddUtf16Length { length: usize, backtrace: Backtrace },
}

/// Encodes `value` as an unsigned LEB128-style VarInt: seven data bits per
/// byte, continuation flag in the high bit, at most five bytes.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Decodes a VarInt from an in-memory buffer.
pub fn read_varint(cursor: &mut Cursor<&[u8]>) -> Result<u32, WireError> {
    let mut value = 0u32;
    for i in 0..5 {
        if !cursor.has_remaining() {
            return InvalidStringSnafu.fail();
        }
        let byte = cursor.get_u8();
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    VarIntTooLongSnafu.fail()
}

/// Decodes a VarInt byte-at-a-time from an async stream.
pub async fn read_varint_stream<R>(stream: &mut R) -> Result<u32, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut value = 0u32;
    for i in 0..5 {
        let byte = stream.read_u8().await?;
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    VarIntTooLongSnafu.fail()
}

/// Reads exactly `n` bytes from the stream. A stream that ends early is
/// reported as an aborted connection, which probes map to an unrecognized
/// protocol rather than an unreachable server.
pub async fn read_exact_bytes<R>(stream: &mut R, n: usize) -> Result<Vec<u8>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; n];
    let mut received = 0;
    while received < n {
        let count = stream.read(&mut buf[received..]).await?;
        if count == 0 {
            return ConnectionAbortedSnafu {
                received,
                expected: n,
            }
            .fail();
        }
        received += count;
    }
    Ok(buf)
}

/// Encodes a string with a VarInt byte-length prefix (modern SLP).
pub fn encode_varint_string(string: &str) -> Result<Vec<u8>, WireError> {
    let len = string.len();
    let mut bytes = Vec::with_capacity(len + 5);
    write_varint(
        &mut bytes,
        u32::try_from(len)
            .ok()
            .context(StringTooLongSnafu { length: len })?,
    );
    bytes.extend_from_slice(string.as_bytes());
    Ok(bytes)
}

/// Decodes a VarInt-length-prefixed UTF-8 string from a buffer.
pub fn decode_varint_string(cursor: &mut Cursor<&[u8]>) -> Result<String, WireError> {
    let len = read_varint(cursor)? as usize;
    let bytes = cursor.chunk();
    if len > bytes.len() {
        return InvalidStringSnafu.fail();
    }
    let string = std::str::from_utf8(bytes.get(..len).context(InvalidStringSnafu)?)
        .ok()
        .context(InvalidStringSnafu)?
        .to_string();
    cursor.advance(len);
    Ok(string)
}

/// Encodes a string as UTF-16BE with no length prefix (legacy SLP family).
pub fn encode_utf16be(string: &str) -> Vec<u8> {
    string
        .encode_utf16()
        .flat_map(|unit| unit.to_be_bytes())
        .collect()
}

pub fn decode_utf16be(bytes: &[u8]) -> Result<String, WireError> {
    if bytes.len() % 2 != 0 {
        return OddUtf16LengthSnafu { length: bytes.len() }.fail();
    }
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect::<Vec<_>>();
    String::from_utf16(&units)
        .ok()
        .context(InvalidStringSnafu)
}

/// Latin-1 maps every byte straight to the code point of the same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| char::from(byte)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: u32) -> (usize, u32) {
        let mut buf = Vec::new();
        write_varint(&mut buf, value);
        let len = buf.len();
        let mut cursor = Cursor::new(buf.as_slice());
        (len, read_varint(&mut cursor).unwrap())
    }

    #[test]
    fn varint_roundtrip_boundaries() {
        for value in [
            0u32,
            1,
            127,
            128,
            16_383,
            16_384,
            2_097_151,
            2_097_152,
            268_435_455,
            268_435_456,
            25_565,
            0x7FFF_FFFF,
        ] {
            let (len, decoded) = roundtrip(value);
            assert_eq!(decoded, value);
            assert!((1..=5).contains(&len), "{value} encoded to {len} bytes");
        }
    }

    #[test]
    fn varint_known_encoding() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 25_565);
        assert_eq!(buf, [0xDD, 0xC7, 0x01]);
    }

    #[test]
    fn varint_rejects_overlong() {
        let data = [0x80u8, 0x80, 0x80, 0x80, 0x80, 0x01];
        let mut cursor = Cursor::new(data.as_slice());
        assert!(matches!(
            read_varint(&mut cursor),
            Err(WireError::VarIntTooLong { .. })
        ));
    }

    #[tokio::test]
    async fn exact_read_reports_aborted_stream() {
        let data = [1u8, 2, 3];
        let mut reader = &data[..];
        let err = read_exact_bytes(&mut reader, 8).await.unwrap_err();
        assert!(matches!(err, WireError::ConnectionAborted { received: 3, .. }));
    }

    #[test]
    fn varint_string_roundtrip() {
        const STRING: &str = "mc.example.com";
        let bytes = encode_varint_string(STRING).unwrap();
        let mut cursor = Cursor::new(bytes.as_slice());
        assert_eq!(decode_varint_string(&mut cursor).unwrap(), STRING);
    }

    #[test]
    fn utf16be_roundtrip_keeps_section_signs() {
        const MOTD: &str = "§1A MOTD §with signs";
        let bytes = encode_utf16be(MOTD);
        assert_eq!(bytes.len(), MOTD.encode_utf16().count() * 2);
        assert_eq!(decode_utf16be(&bytes).unwrap(), MOTD);
    }

    #[test]
    fn utf16be_rejects_odd_length() {
        assert!(matches!(
            decode_utf16be(&[0x00, 0x41, 0x00]),
            Err(WireError::OddUtf16Length { length: 3, .. })
        ));
    }

    #[test]
    fn latin1_is_byte_transparent() {
        assert_eq!(decode_latin1(&[0x41, 0xA7, 0x31]), "A§1");
    }
}
