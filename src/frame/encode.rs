//! SPDY frame encoding.

use bytes::{BufMut, BytesMut};

use super::error::FrameError;
use super::types::*;
use super::{
    FRAME_HEADER_SIZE, HEADER_FRAME_FIXED_LEN, MAX_FRAME_SIZE, PROTOCOL_VERSION,
    SYN_STREAM_FIXED_LEN, flags,
};
use crate::header::Compressor;

/// Frame encoder that writes SPDY frames to a byte buffer.
///
/// The encoder owns the outbound zlib stream, so frames carrying header
/// blocks must be encoded in emission order: one encoder serves one
/// connection direction.
pub struct FrameEncoder {
    version: Version,
    compressor: Compressor,
}

impl FrameEncoder {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            compressor: Compressor::new(),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Encode a frame to the buffer.
    pub fn encode(&mut self, frame: &Frame, buf: &mut BytesMut) -> Result<(), FrameError> {
        match frame {
            Frame::SynStream(f) => self.encode_syn_stream(f, buf),
            Frame::SynReply(f) => self.encode_syn_reply(f, buf),
            Frame::RstStream(f) => encode_rst_stream(f, buf),
            Frame::Settings(f) => encode_settings(f, buf),
            Frame::Ping(f) => encode_ping(f, buf),
            Frame::GoAway(f) => encode_goaway(f, buf),
            Frame::Headers(f) => self.encode_headers(f, buf),
            Frame::WindowUpdate(f) => encode_window_update(f, buf),
            Frame::Data(f) => encode_data(f, buf),
        }
    }

    fn encode_syn_stream(
        &mut self,
        frame: &SynStreamFrame,
        buf: &mut BytesMut,
    ) -> Result<(), FrameError> {
        check_stream_id("SYN_STREAM", frame.stream_id)?;
        if !frame.assoc_stream_id.is_valid() {
            return Err(FrameError::StreamIdInvalid {
                stream_id: frame.assoc_stream_id.value(),
            });
        }

        let block = self.compressor.compress(&frame.headers)?;
        let length = (SYN_STREAM_FIXED_LEN + block.len()) as u32;

        let mut frame_flags = 0u8;
        if frame.fin {
            frame_flags |= flags::FIN;
        }
        if frame.unidirectional {
            frame_flags |= flags::UNIDIRECTIONAL;
        }

        buf.reserve(FRAME_HEADER_SIZE + length as usize);
        write_control_header(buf, ControlType::SynStream, frame_flags, length);
        buf.put_u32(frame.stream_id.value() & 0x7FFF_FFFF);
        buf.put_u32(frame.assoc_stream_id.value() & 0x7FFF_FFFF);
        buf.put_u8(frame.priority.to_wire());
        buf.put_u8(match self.version {
            Version::Spdy3 => frame.slot,
            Version::Spdy31 => 0, // Slot byte is reserved in 3.1
        });
        buf.extend_from_slice(&block);
        Ok(())
    }

    fn encode_syn_reply(
        &mut self,
        frame: &SynReplyFrame,
        buf: &mut BytesMut,
    ) -> Result<(), FrameError> {
        check_stream_id("SYN_REPLY", frame.stream_id)?;

        let block = self.compressor.compress(&frame.headers)?;
        let length = (HEADER_FRAME_FIXED_LEN + block.len()) as u32;

        let frame_flags = if frame.fin { flags::FIN } else { 0 };

        buf.reserve(FRAME_HEADER_SIZE + length as usize);
        write_control_header(buf, ControlType::SynReply, frame_flags, length);
        buf.put_u32(frame.stream_id.value() & 0x7FFF_FFFF);
        buf.extend_from_slice(&block);
        Ok(())
    }

    fn encode_headers(
        &mut self,
        frame: &HeadersFrame,
        buf: &mut BytesMut,
    ) -> Result<(), FrameError> {
        check_stream_id("HEADERS", frame.stream_id)?;

        let block = self.compressor.compress(&frame.headers)?;
        let length = (HEADER_FRAME_FIXED_LEN + block.len()) as u32;

        let frame_flags = if frame.fin { flags::FIN } else { 0 };

        buf.reserve(FRAME_HEADER_SIZE + length as usize);
        write_control_header(buf, ControlType::Headers, frame_flags, length);
        buf.put_u32(frame.stream_id.value() & 0x7FFF_FFFF);
        buf.extend_from_slice(&block);
        Ok(())
    }
}

/// Write a control frame header to the buffer.
#[inline]
fn write_control_header(buf: &mut BytesMut, frame_type: ControlType, frame_flags: u8, length: u32) {
    buf.put_u16(0x8000 | PROTOCOL_VERSION);
    buf.put_u16(frame_type as u16);
    buf.put_u8(frame_flags);
    buf.put_u8((length >> 16) as u8);
    buf.put_u8((length >> 8) as u8);
    buf.put_u8(length as u8);
}

fn encode_rst_stream(frame: &RstStreamFrame, buf: &mut BytesMut) -> Result<(), FrameError> {
    check_stream_id("RST_STREAM", frame.stream_id)?;

    buf.reserve(FRAME_HEADER_SIZE + 8);
    write_control_header(buf, ControlType::RstStream, 0, 8);
    buf.put_u32(frame.stream_id.value() & 0x7FFF_FFFF);
    buf.put_u32(frame.status.to_u32());
    Ok(())
}

fn encode_settings(frame: &SettingsFrame, buf: &mut BytesMut) -> Result<(), FrameError> {
    let length = 4 + (frame.settings.len() * 8) as u32;
    let frame_flags = if frame.clear_settings {
        flags::CLEAR_SETTINGS
    } else {
        0
    };

    buf.reserve(FRAME_HEADER_SIZE + length as usize);
    write_control_header(buf, ControlType::Settings, frame_flags, length);
    buf.put_u32(frame.settings.len() as u32);
    for setting in &frame.settings {
        buf.put_u32(((setting.flags as u32) << 24) | (setting.id.to_u32() & 0x00FF_FFFF));
        buf.put_u32(setting.value);
    }
    Ok(())
}

fn encode_ping(frame: &PingFrame, buf: &mut BytesMut) -> Result<(), FrameError> {
    buf.reserve(FRAME_HEADER_SIZE + 4);
    write_control_header(buf, ControlType::Ping, 0, 4);
    buf.put_u32(frame.id);
    Ok(())
}

fn encode_goaway(frame: &GoAwayFrame, buf: &mut BytesMut) -> Result<(), FrameError> {
    buf.reserve(FRAME_HEADER_SIZE + 8);
    write_control_header(buf, ControlType::GoAway, 0, 8);
    buf.put_u32(frame.last_good_stream_id.value() & 0x7FFF_FFFF);
    buf.put_u32(frame.status);
    Ok(())
}

fn encode_window_update(frame: &WindowUpdateFrame, buf: &mut BytesMut) -> Result<(), FrameError> {
    check_stream_id("WINDOW_UPDATE", frame.stream_id)?;

    buf.reserve(FRAME_HEADER_SIZE + 8);
    write_control_header(buf, ControlType::WindowUpdate, 0, 8);
    buf.put_u32(frame.stream_id.value() & 0x7FFF_FFFF);
    buf.put_u32(frame.delta & 0x7FFF_FFFF);
    Ok(())
}

fn encode_data(frame: &DataFrame, buf: &mut BytesMut) -> Result<(), FrameError> {
    check_stream_id("DATA", frame.stream_id)?;
    if frame.data.len() > MAX_FRAME_SIZE as usize {
        return Err(FrameError::FrameTooLarge {
            size: frame.data.len() as u32,
            max: MAX_FRAME_SIZE,
        });
    }

    let length = frame.data.len() as u32;
    let frame_flags = if frame.fin { flags::FIN } else { 0 };

    buf.reserve(FRAME_HEADER_SIZE + length as usize);
    buf.put_u32(frame.stream_id.value() & 0x7FFF_FFFF);
    buf.put_u8(frame_flags);
    buf.put_u8((length >> 16) as u8);
    buf.put_u8((length >> 8) as u8);
    buf.put_u8(length as u8);
    buf.extend_from_slice(&frame.data);
    Ok(())
}

fn check_stream_id(frame: &'static str, stream_id: StreamId) -> Result<(), FrameError> {
    if !stream_id.is_valid() {
        return Err(FrameError::StreamIdInvalid {
            stream_id: stream_id.value(),
        });
    }
    if stream_id.is_zero() {
        return Err(FrameError::StreamIdZero { frame });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::header::Headers;

    #[test]
    fn test_control_header_layout() {
        let mut buf = BytesMut::new();
        write_control_header(&mut buf, ControlType::SynReply, flags::FIN, 0x0102_03);

        assert_eq!(&buf[..], &[0x80, 0x03, 0x00, 0x02, 0x01, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_data_frame_layout() {
        let mut buf = BytesMut::new();
        let frame = DataFrame {
            stream_id: StreamId::new(1),
            fin: true,
            data: Bytes::from_static(b"hi"),
        };
        encode_data(&frame, &mut buf).unwrap();

        assert_eq!(
            &buf[..],
            &[0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00, 0x02, b'h', b'i']
        );
    }

    #[test]
    fn test_data_frame_control_bit_clear() {
        let mut buf = BytesMut::new();
        let frame = DataFrame {
            stream_id: StreamId::new(0x7FFF_FFFF),
            fin: false,
            data: Bytes::new(),
        };
        encode_data(&frame, &mut buf).unwrap();
        assert_eq!(buf[0] & 0x80, 0);
    }

    #[test]
    fn test_rst_stream_layout() {
        let mut buf = BytesMut::new();
        let frame = RstStreamFrame {
            stream_id: StreamId::new(2),
            status: crate::frame::StatusCode::FlowControlError,
        };
        encode_rst_stream(&frame, &mut buf).unwrap();

        assert_eq!(
            &buf[..],
            &[
                0x80, 0x03, 0x00, 0x03, 0x00, 0x00, 0x00, 0x08, // header
                0x00, 0x00, 0x00, 0x02, // stream 2
                0x00, 0x00, 0x00, 0x07, // FLOW_CONTROL_ERROR
            ]
        );
    }

    #[test]
    fn test_window_update_layout() {
        let mut buf = BytesMut::new();
        let frame = WindowUpdateFrame {
            stream_id: StreamId::new(1),
            delta: 15,
        };
        encode_window_update(&frame, &mut buf).unwrap();

        assert_eq!(
            &buf[..],
            &[
                0x80, 0x03, 0x00, 0x09, 0x00, 0x00, 0x00, 0x08, // header
                0x00, 0x00, 0x00, 0x01, // stream 1
                0x00, 0x00, 0x00, 0x0F, // delta 15
            ]
        );
    }

    #[test]
    fn test_settings_entry_layout() {
        let mut buf = BytesMut::new();
        let frame = SettingsFrame {
            clear_settings: false,
            settings: vec![Setting {
                flags: flags::SETTINGS_PERSIST_VALUE,
                id: SettingId::InitialWindowSize,
                value: 65_536,
            }],
        };
        encode_settings(&frame, &mut buf).unwrap();

        assert_eq!(
            &buf[..],
            &[
                0x80, 0x03, 0x00, 0x04, 0x00, 0x00, 0x00, 0x0C, // header
                0x00, 0x00, 0x00, 0x01, // one entry
                0x01, 0x00, 0x00, 0x07, // persist flag + id 7
                0x00, 0x01, 0x00, 0x00, // 65536
            ]
        );
    }

    #[test]
    fn test_syn_stream_fixed_fields() {
        let mut encoder = FrameEncoder::new(Version::Spdy3);
        let mut buf = BytesMut::new();
        let frame = Frame::SynStream(SynStreamFrame {
            stream_id: StreamId::new(3),
            assoc_stream_id: StreamId::new(1),
            priority: Priority::new(2),
            slot: 4,
            fin: true,
            unidirectional: true,
            headers: Headers::new(),
        });
        encoder.encode(&frame, &mut buf).unwrap();

        assert_eq!(&buf[..4], &[0x80, 0x03, 0x00, 0x01]);
        assert_eq!(buf[4], flags::FIN | flags::UNIDIRECTIONAL);
        assert_eq!(&buf[8..12], &[0, 0, 0, 3]); // stream ID
        assert_eq!(&buf[12..16], &[0, 0, 0, 1]); // associated stream ID
        assert_eq!(buf[16], 0b0100_0000); // priority 2 in high bits
        assert_eq!(buf[17], 4); // slot

        // Length field covers the fixed part plus the compressed block.
        let length = ((buf[5] as usize) << 16) | ((buf[6] as usize) << 8) | buf[7] as usize;
        assert_eq!(length, buf.len() - FRAME_HEADER_SIZE);
        assert!(length >= SYN_STREAM_FIXED_LEN);
    }

    #[test]
    fn test_encode_rejects_stream_id_zero() {
        let mut buf = BytesMut::new();
        let frame = RstStreamFrame {
            stream_id: StreamId::ZERO,
            status: crate::frame::StatusCode::Cancel,
        };
        assert!(matches!(
            encode_rst_stream(&frame, &mut buf),
            Err(FrameError::StreamIdZero {
                frame: "RST_STREAM"
            })
        ));
    }

    #[test]
    fn test_encode_rejects_reserved_bit() {
        let mut buf = BytesMut::new();
        let frame = DataFrame {
            stream_id: StreamId::new(0x8000_0001),
            fin: false,
            data: Bytes::new(),
        };
        assert!(matches!(
            encode_data(&frame, &mut buf),
            Err(FrameError::StreamIdInvalid {
                stream_id: 0x8000_0001
            })
        ));
    }
}
