//! SPDY frame decoding.

use bytes::{Buf, Bytes, BytesMut};

use super::error::{FrameError, StatusCode};
use super::types::*;
use super::{
    FRAME_HEADER_SIZE, HEADER_FRAME_FIXED_LEN, MAX_FRAME_SIZE, PROTOCOL_VERSION,
    SYN_STREAM_FIXED_LEN, flags,
};
use crate::header::Decompressor;

/// Frame decoder that parses SPDY frames from a byte buffer.
///
/// The decoder owns the inbound zlib stream, so header blocks must be
/// fed in arrival order: one decoder serves one connection direction.
pub struct FrameDecoder {
    version: Version,
    decompressor: Decompressor,
}

impl FrameDecoder {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            decompressor: Decompressor::new(),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Try to decode a frame from the buffer.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol error.
    ///
    /// Consumed bytes are removed from the buffer. A malformed frame is
    /// consumed in full before its error returns, so the caller can
    /// reset the offending stream and keep decoding.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Length sits at bytes 5..8 for control and data frames alike.
        let length =
            (((buf[5] as u32) << 16) | ((buf[6] as u32) << 8) | (buf[7] as u32)) as usize;
        if buf.len() < FRAME_HEADER_SIZE + length {
            return Ok(None);
        }

        if buf[0] & 0x80 != 0 {
            let version = (((buf[0] & 0x7F) as u16) << 8) | buf[1] as u16;
            let frame_type = ((buf[2] as u16) << 8) | buf[3] as u16;
            let frame_flags = buf[4];
            buf.advance(FRAME_HEADER_SIZE);
            let payload = buf.split_to(length).freeze();

            if version != PROTOCOL_VERSION {
                return Err(FrameError::UnsupportedVersion { version });
            }

            match ControlType::from_u16(frame_type) {
                Some(ControlType::SynStream) => self.parse_syn_stream(frame_flags, payload),
                Some(ControlType::SynReply) => self.parse_syn_reply(frame_flags, payload),
                Some(ControlType::RstStream) => parse_rst_stream(frame_flags, payload),
                Some(ControlType::Settings) => parse_settings(frame_flags, payload),
                Some(ControlType::Ping) => parse_ping(frame_flags, payload),
                Some(ControlType::GoAway) => parse_goaway(frame_flags, payload),
                Some(ControlType::Headers) => self.parse_headers(frame_flags, payload),
                Some(ControlType::WindowUpdate) => parse_window_update(frame_flags, payload),
                None => Err(FrameError::UnknownFrameType { frame_type }),
            }
            .map(Some)
        } else {
            let stream_id = StreamId::new(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]));
            let frame_flags = buf[4];
            buf.advance(FRAME_HEADER_SIZE);
            let data = buf.split_to(length).freeze();

            if frame_flags & !flags::FIN != 0 {
                return Err(FrameError::InvalidFlags {
                    frame: "DATA",
                    flags: frame_flags,
                });
            }
            if stream_id.is_zero() {
                return Err(FrameError::StreamIdZero { frame: "DATA" });
            }

            Ok(Some(Frame::Data(DataFrame {
                stream_id,
                fin: frame_flags & flags::FIN != 0,
                data,
            })))
        }
    }

    fn parse_syn_stream(&mut self, frame_flags: u8, mut payload: Bytes) -> Result<Frame, FrameError> {
        if frame_flags & !(flags::FIN | flags::UNIDIRECTIONAL) != 0 {
            return Err(FrameError::InvalidFlags {
                frame: "SYN_STREAM",
                flags: frame_flags,
            });
        }
        if payload.len() < SYN_STREAM_FIXED_LEN {
            return Err(FrameError::InvalidPayloadLength {
                frame: "SYN_STREAM",
                expected: SYN_STREAM_FIXED_LEN,
                actual: payload.len(),
            });
        }
        if payload.len() > MAX_FRAME_SIZE as usize - 18 {
            return Err(FrameError::FrameTooLarge {
                size: payload.len() as u32,
                max: MAX_FRAME_SIZE - 18,
            });
        }

        let raw_stream_id = payload.get_u32();
        let raw_assoc_id = payload.get_u32();
        let priority = Priority::from_wire(payload.get_u8());
        let slot = payload.get_u8();

        let stream_id = StreamId::new(raw_stream_id);
        if !stream_id.is_valid() {
            return Err(FrameError::StreamIdInvalid {
                stream_id: raw_stream_id,
            });
        }
        if stream_id.is_zero() {
            return Err(FrameError::StreamIdZero {
                frame: "SYN_STREAM",
            });
        }
        let assoc_stream_id = StreamId::new(raw_assoc_id);
        if !assoc_stream_id.is_valid() {
            return Err(FrameError::StreamIdInvalid {
                stream_id: raw_assoc_id,
            });
        }

        let headers = self.decompressor.decompress(&payload)?;

        Ok(Frame::SynStream(SynStreamFrame {
            stream_id,
            assoc_stream_id,
            priority,
            slot: match self.version {
                Version::Spdy3 => slot,
                Version::Spdy31 => 0,
            },
            fin: frame_flags & flags::FIN != 0,
            unidirectional: frame_flags & flags::UNIDIRECTIONAL != 0,
            headers,
        }))
    }

    fn parse_syn_reply(&mut self, frame_flags: u8, mut payload: Bytes) -> Result<Frame, FrameError> {
        if frame_flags & !flags::FIN != 0 {
            return Err(FrameError::InvalidFlags {
                frame: "SYN_REPLY",
                flags: frame_flags,
            });
        }
        if payload.len() < HEADER_FRAME_FIXED_LEN {
            return Err(FrameError::InvalidPayloadLength {
                frame: "SYN_REPLY",
                expected: HEADER_FRAME_FIXED_LEN,
                actual: payload.len(),
            });
        }

        let stream_id = read_stream_id("SYN_REPLY", payload.get_u32())?;
        let headers = self.decompressor.decompress(&payload)?;

        Ok(Frame::SynReply(SynReplyFrame {
            stream_id,
            fin: frame_flags & flags::FIN != 0,
            headers,
        }))
    }

    fn parse_headers(&mut self, frame_flags: u8, mut payload: Bytes) -> Result<Frame, FrameError> {
        if frame_flags & !flags::FIN != 0 {
            return Err(FrameError::InvalidFlags {
                frame: "HEADERS",
                flags: frame_flags,
            });
        }
        if payload.len() < HEADER_FRAME_FIXED_LEN {
            return Err(FrameError::InvalidPayloadLength {
                frame: "HEADERS",
                expected: HEADER_FRAME_FIXED_LEN,
                actual: payload.len(),
            });
        }

        let stream_id = read_stream_id("HEADERS", payload.get_u32())?;
        let headers = self.decompressor.decompress(&payload)?;

        Ok(Frame::Headers(HeadersFrame {
            stream_id,
            fin: frame_flags & flags::FIN != 0,
            headers,
        }))
    }
}

fn parse_rst_stream(frame_flags: u8, mut payload: Bytes) -> Result<Frame, FrameError> {
    if frame_flags != 0 {
        return Err(FrameError::InvalidFlags {
            frame: "RST_STREAM",
            flags: frame_flags,
        });
    }
    if payload.len() != 8 {
        return Err(FrameError::InvalidPayloadLength {
            frame: "RST_STREAM",
            expected: 8,
            actual: payload.len(),
        });
    }

    let stream_id = read_stream_id("RST_STREAM", payload.get_u32())?;
    let status = StatusCode::from_u32(payload.get_u32());

    Ok(Frame::RstStream(RstStreamFrame { stream_id, status }))
}

fn parse_settings(frame_flags: u8, mut payload: Bytes) -> Result<Frame, FrameError> {
    if frame_flags & !flags::CLEAR_SETTINGS != 0 {
        return Err(FrameError::InvalidFlags {
            frame: "SETTINGS",
            flags: frame_flags,
        });
    }
    if payload.len() < 4 {
        return Err(FrameError::InvalidPayloadLength {
            frame: "SETTINGS",
            expected: 4,
            actual: payload.len(),
        });
    }

    let count = payload.get_u32() as usize;
    if payload.len() != count * 8 {
        return Err(FrameError::InvalidPayloadLength {
            frame: "SETTINGS",
            expected: 4 + count * 8,
            actual: 4 + payload.len(),
        });
    }

    let mut settings = Vec::with_capacity(count);
    for _ in 0..count {
        // Entry flags ride in the high byte above the 24-bit ID.
        let word = payload.get_u32();
        let value = payload.get_u32();
        settings.push(Setting {
            flags: (word >> 24) as u8,
            id: SettingId::from_u32(word & 0x00FF_FFFF),
            value,
        });
    }

    Ok(Frame::Settings(SettingsFrame {
        clear_settings: frame_flags & flags::CLEAR_SETTINGS != 0,
        settings,
    }))
}

fn parse_ping(frame_flags: u8, mut payload: Bytes) -> Result<Frame, FrameError> {
    if frame_flags != 0 {
        return Err(FrameError::InvalidFlags {
            frame: "PING",
            flags: frame_flags,
        });
    }
    if payload.len() != 4 {
        return Err(FrameError::InvalidPayloadLength {
            frame: "PING",
            expected: 4,
            actual: payload.len(),
        });
    }

    Ok(Frame::Ping(PingFrame {
        id: payload.get_u32(),
    }))
}

fn parse_goaway(frame_flags: u8, mut payload: Bytes) -> Result<Frame, FrameError> {
    if frame_flags != 0 {
        return Err(FrameError::InvalidFlags {
            frame: "GOAWAY",
            flags: frame_flags,
        });
    }
    if payload.len() != 8 {
        return Err(FrameError::InvalidPayloadLength {
            frame: "GOAWAY",
            expected: 8,
            actual: payload.len(),
        });
    }

    let raw_id = payload.get_u32();
    let last_good_stream_id = StreamId::new(raw_id);
    if !last_good_stream_id.is_valid() {
        return Err(FrameError::StreamIdInvalid { stream_id: raw_id });
    }

    Ok(Frame::GoAway(GoAwayFrame {
        last_good_stream_id,
        status: payload.get_u32(),
    }))
}

fn parse_window_update(frame_flags: u8, mut payload: Bytes) -> Result<Frame, FrameError> {
    if frame_flags != 0 {
        return Err(FrameError::InvalidFlags {
            frame: "WINDOW_UPDATE",
            flags: frame_flags,
        });
    }
    if payload.len() != 8 {
        return Err(FrameError::InvalidPayloadLength {
            frame: "WINDOW_UPDATE",
            expected: 8,
            actual: payload.len(),
        });
    }

    let stream_id = read_stream_id("WINDOW_UPDATE", payload.get_u32())?;
    let delta = payload.get_u32() & 0x7FFF_FFFF;

    Ok(Frame::WindowUpdate(WindowUpdateFrame { stream_id, delta }))
}

fn read_stream_id(frame: &'static str, raw: u32) -> Result<StreamId, FrameError> {
    let stream_id = StreamId::new(raw);
    if !stream_id.is_valid() {
        return Err(FrameError::StreamIdInvalid { stream_id: raw });
    }
    if stream_id.is_zero() {
        return Err(FrameError::StreamIdZero { frame });
    }
    Ok(stream_id)
}
