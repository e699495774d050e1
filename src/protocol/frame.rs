//! WebSocket frame codec.
//!
//! Parses inbound frames from a byte stream and serializes outbound frames.
//! Only whole (final) frames are accepted; fragmented messages are a
//! protocol violation.
//!
//! # Wire Layout
//!
//! ```text
//!  0               1               2               3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |          (16/64 bits)         |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |    Masking-key (0 or 4 bytes) |          Payload Data         |
//! +-------------------------------+-------------------------------+
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// FIN bit in the first header byte.
const FIN_BIT: u8 = 0x80;

/// Opcode bits in the first header byte.
const OPCODE_BITS: u8 = 0x0F;

/// MASK bit in the second header byte.
const MASK_BIT: u8 = 0x80;

/// Length bits in the second header byte.
const LENGTH_BITS: u8 = 0x7F;

/// Largest length carried directly in the 7-bit field.
pub const MAX_LITERAL_LEN: usize = 125;

/// Length marker announcing a 16-bit extension.
const EXTENDED_16: u8 = 126;

/// Length marker announcing a 64-bit extension.
const EXTENDED_64: u8 = 127;

/// Default cap on a single inbound payload (16 MiB).
pub const DEFAULT_MAX_PAYLOAD: u64 = 16 * 1024 * 1024;

// ============================================================================
// Opcode
// ============================================================================

/// Frame type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation,
    /// UTF-8 text payload.
    Text,
    /// Binary payload.
    Binary,
    /// Connection close.
    Close,
    /// Keepalive request.
    Ping,
    /// Keepalive reply.
    Pong,
}

impl Opcode {
    /// Returns the 4-bit wire value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Parses a 4-bit wire value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for reserved opcodes.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(Error::protocol(format!("reserved opcode 0x{other:X}"))),
        }
    }

    /// Returns `true` for close, ping and pong.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

// ============================================================================
// LengthForm
// ============================================================================

/// How a payload length is carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthForm {
    /// 0..=125 in the 7-bit field.
    Literal,
    /// Marker 126 followed by a big-endian `u16`.
    Extended16,
    /// Marker 127 followed by a big-endian `u64`.
    Extended64,
}

impl LengthForm {
    /// Picks the shortest form able to carry `len`.
    #[inline]
    #[must_use]
    pub const fn for_len(len: usize) -> Self {
        if len <= MAX_LITERAL_LEN {
            Self::Literal
        } else if len <= u16::MAX as usize {
            Self::Extended16
        } else {
            Self::Extended64
        }
    }
}

// ============================================================================
// Frame
// ============================================================================

/// One WebSocket frame.
///
/// `payload` is always held unmasked; `mask_key` only records whether and how
/// the frame is masked on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame type.
    pub opcode: Opcode,
    /// Masking key, present on client-to-server frames.
    pub mask_key: Option<[u8; 4]>,
    /// Unmasked payload.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a final, unmasked text frame.
    #[inline]
    #[must_use]
    pub fn text(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Text,
            mask_key: None,
            payload: payload.into(),
        }
    }

    /// Creates a final, unmasked frame of any opcode.
    #[inline]
    #[must_use]
    pub fn new(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode,
            mask_key: None,
            payload: payload.into(),
        }
    }

    /// Sets the masking key, as a client would.
    #[inline]
    #[must_use]
    pub fn masked(mut self, key: [u8; 4]) -> Self {
        self.mask_key = Some(key);
        self
    }

    /// Clears the FIN flag.
    #[inline]
    #[must_use]
    pub fn non_final(mut self) -> Self {
        self.fin = false;
        self
    }

    /// Returns `true` if the frame is masked on the wire.
    #[inline]
    #[must_use]
    pub const fn is_masked(&self) -> bool {
        self.mask_key.is_some()
    }

    /// Returns the payload length.
    #[inline]
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Serializes the frame, masking the payload if a key is set.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.payload.len();
        let mut out = Vec::with_capacity(2 + 8 + 4 + len);

        let first = if self.fin { FIN_BIT } else { 0 } | self.opcode.as_u8();
        out.push(first);
        push_length(&mut out, len, self.is_masked());

        match self.mask_key {
            Some(key) => {
                out.extend_from_slice(&key);
                let start = out.len();
                out.extend_from_slice(&self.payload);
                apply_mask(&mut out[start..], key);
            }
            None => out.extend_from_slice(&self.payload),
        }

        out
    }
}

// ============================================================================
// Masking
// ============================================================================

/// XORs `payload` in place with `key[i % 4]`.
///
/// Applying the same key twice restores the input.
#[inline]
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

// ============================================================================
// Encode
// ============================================================================

/// Encodes `payload` as a final, unmasked text frame.
///
/// Header and payload share one buffer so a single write emits the frame.
#[must_use]
pub fn encode_text(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(10 + payload.len());
    out.push(FIN_BIT | Opcode::Text.as_u8());
    push_length(&mut out, payload.len(), false);
    out.extend_from_slice(payload);
    out
}

/// Appends the length field (and extension) with the mask bit.
fn push_length(out: &mut Vec<u8>, len: usize, masked: bool) {
    let mask = if masked { MASK_BIT } else { 0 };

    match LengthForm::for_len(len) {
        LengthForm::Literal => out.push(mask | len as u8),
        LengthForm::Extended16 => {
            out.push(mask | EXTENDED_16);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        LengthForm::Extended64 => {
            out.push(mask | EXTENDED_64);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
    }
}

// ============================================================================
// Decode
// ============================================================================

/// Reads one complete frame from `reader`, unmasking its payload.
///
/// Blocks until the whole frame has arrived.
///
/// # Errors
///
/// - [`Error::ConnectionClosed`] on EOF before the first header byte
/// - [`Error::Io`] on any other read failure, including a short read
/// - [`Error::Protocol`] if the frame is non-final, uses a reserved opcode,
///   has a malformed 64-bit length, or exceeds `max_payload`
pub async fn read_frame<R>(reader: &mut R, max_payload: u64) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let first = match reader.read_u8().await {
        Ok(byte) => byte,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(Error::ConnectionClosed),
        Err(e) => return Err(e.into()),
    };
    let second = reader.read_u8().await?;

    let fin = first & FIN_BIT != 0;
    let opcode = Opcode::from_u8(first & OPCODE_BITS)?;
    let masked = second & MASK_BIT != 0;

    let payload_len = match second & LENGTH_BITS {
        EXTENDED_16 => u64::from(reader.read_u16().await?),
        EXTENDED_64 => {
            let len = reader.read_u64().await?;
            if len >> 63 != 0 {
                return Err(Error::protocol("malformed 64-bit payload length"));
            }
            len
        }
        literal => u64::from(literal),
    };

    if payload_len > max_payload {
        return Err(Error::protocol(format!(
            "payload too large: {payload_len} > {max_payload}"
        )));
    }

    let mask_key = if masked {
        let mut key = [0u8; 4];
        reader.read_exact(&mut key).await?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; payload_len as usize];
    reader.read_exact(&mut payload).await?;

    if let Some(key) = mask_key {
        apply_mask(&mut payload, key);
    }

    if !fin {
        return Err(Error::protocol("non-final frame unsupported"));
    }

    Ok(Frame {
        fin,
        opcode,
        mask_key,
        payload,
    })
}

// ============================================================================
// Tests
// ============================================================================
