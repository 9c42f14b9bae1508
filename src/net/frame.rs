use crate::ui::sprite::SpriteId;

use super::{
    attribute::{
        write_attribute,
        TERMINATOR
    },
    blob::{
        ParsedBlob,
        FIRST_BLOB_TYPE,
        LAST_BLOB_TYPE
    },
    data_buffer::DataBuffer,
    ProtocolError
};

/// Leaves room for IP and UDP headers on a typical link.
pub const MAX_DATAGRAM_SIZE: usize = 1400;

pub const HEADER_SIZE: usize = 8;

/// Record codes above the blob type range.
pub mod command {
    pub const REQUEST_WORLD: u8 = 0xFC;
    pub const CLEAR_WORLD: u8 = 0xFD;
    pub const DELETE_SPRITE: u8 = 0xFE;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame: u32,
    pub length: u32,
}

impl FrameHeader {
    pub fn write(&self, buffer: &mut DataBuffer) {
        buffer.write_u32(self.frame);
        buffer.write_u32(self.length);
    }

    pub fn read(buffer: &mut DataBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            frame: buffer.read_u32()?,
            length: buffer.read_u32()?,
        })
    }
}

/// `frame` is `last` or later, allowing for counter wraparound.
pub fn is_current_or_newer(frame: u32, last: u32) -> bool {
    (frame.wrapping_sub(last) as i32) >= 0
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Blob(ParsedBlob),
    DeleteSprite(SpriteId),
    ClearWorld,
    RequestWorld,
}

impl Record {
    pub fn write(&self, buffer: &mut DataBuffer) {
        match self {
            Record::Blob(blob) => {
                buffer.write_u8(blob.blob_type);
                buffer.write_u32(blob.sprite_id);
                for (id, value) in blob.attributes.iter() {
                    write_attribute(buffer, *id, value);
                }
                buffer.write_u8(TERMINATOR);
            },
            Record::DeleteSprite(id) => {
                buffer.write_u8(command::DELETE_SPRITE);
                buffer.write_u32(*id);
            },
            Record::ClearWorld => buffer.write_u8(command::CLEAR_WORLD),
            Record::RequestWorld => buffer.write_u8(command::REQUEST_WORLD),
        }
    }

    pub fn read(buffer: &mut DataBuffer) -> Result<Self, ProtocolError> {
        match buffer.read_u8()? {
            command::DELETE_SPRITE => Ok(Record::DeleteSprite(buffer.read_u32()?)),
            command::CLEAR_WORLD => Ok(Record::ClearWorld),
            command::REQUEST_WORLD => Ok(Record::RequestWorld),
            code @ FIRST_BLOB_TYPE..=LAST_BLOB_TYPE => Ok(Record::Blob(ParsedBlob::read(code, buffer)?)),
            code => Err(ProtocolError::InvalidRecordCode(code)),
        }
    }
}

/// One received datagram: header plus the records that parsed.
#[derive(Debug, PartialEq)]
pub struct Datagram {
    pub header: FrameHeader,
    pub records: Vec<Record>,
    /// Set when parsing stopped early. Records before the fault are kept.
    pub error: Option<ProtocolError>,
}

impl Datagram {
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut buffer = DataBuffer::from_bytes(bytes);
        let header = FrameHeader::read(&mut buffer)?;
        let declared = header.length as usize;
        if declared != buffer.available() {
            return Err(ProtocolError::FrameLengthMismatch {
                declared,
                actual: buffer.available(),
            });
        }

        let mut records = vec![];
        let mut error = None;
        while buffer.available() > 0 {
            match Record::read(&mut buffer) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // Record boundaries are lost after a malformed record.
                    error = Some(e);
                    break;
                },
            }
        }
        Ok(Self { header, records, error })
    }
}

/// Packs records into datagrams of one frame, never splitting a record.
#[derive(Debug)]
pub struct FrameWriter {
    frame: u32,
    max_datagram_size: usize,
    datagrams: Vec<Vec<u8>>,
    payload: DataBuffer,
    record: DataBuffer,
}

impl FrameWriter {
    pub fn new(frame: u32) -> Self {
        Self::with_max_datagram_size(frame, MAX_DATAGRAM_SIZE)
    }

    pub fn with_max_datagram_size(frame: u32, max_datagram_size: usize) -> Self {
        Self {
            frame,
            max_datagram_size: max_datagram_size.max(HEADER_SIZE + 1),
            datagrams: vec![],
            payload: DataBuffer::new(),
            record: DataBuffer::new(),
        }
    }

    /// Scratch buffer for the next record; call [`FrameWriter::commit_record`] after writing.
    pub fn record_buffer(&mut self) -> &mut DataBuffer {
        self.record.clear();
        &mut self.record
    }

    /// Moves the scratch record into the current datagram. A record that cannot fit in an
    /// empty datagram is discarded.
    pub fn commit_record(&mut self) -> Result<(), ProtocolError> {
        let max_payload = self.max_datagram_size - HEADER_SIZE;
        let size = self.record.len();
        if size > max_payload {
            self.record.clear();
            return Err(ProtocolError::RecordTooLarge { size, limit: max_payload });
        }
        if !self.payload.is_empty() && self.payload.len() + size > max_payload {
            self.flush();
        }
        self.payload.write_bytes(self.record.as_bytes());
        self.record.clear();
        Ok(())
    }

    pub fn discard_record(&mut self) {
        self.record.clear();
    }

    pub fn push(&mut self, record: &Record) -> Result<(), ProtocolError> {
        record.write(self.record_buffer());
        self.commit_record()
    }

    fn flush(&mut self) {
        if self.payload.is_empty() {
            return;
        }
        let mut datagram = DataBuffer::with_capacity(HEADER_SIZE + self.payload.len());
        FrameHeader {
            frame: self.frame,
            length: self.payload.len() as u32,
        }.write(&mut datagram);
        datagram.write_bytes(self.payload.as_bytes());
        self.datagrams.push(datagram.into_bytes());
        self.payload.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.datagrams.is_empty() && self.payload.is_empty()
    }

    pub fn finish(mut self) -> Vec<Vec<u8>> {
        self.flush();
        self.datagrams
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::attribute::AttrValue;

    #[test]
    fn test_frame_counter_wraps() {
        assert!(is_current_or_newer(5, 5));
        assert!(is_current_or_newer(6, 5));
        assert!(!is_current_or_newer(4, 5));
        assert!(is_current_or_newer(2, u32::MAX - 1));
        assert!(!is_current_or_newer(u32::MAX - 1, 2));
    }

    #[test]
    fn test_commands_parse_back() {
        let mut writer = FrameWriter::new(9);
        writer.push(&Record::ClearWorld).unwrap();
        writer.push(&Record::DeleteSprite(42)).unwrap();
        let datagrams = writer.finish();
        assert_eq!(datagrams.len(), 1);

        let datagram = Datagram::parse(&datagrams[0]).unwrap();
        assert_eq!(datagram.header.frame, 9);
        assert_eq!(datagram.records, vec![Record::ClearWorld, Record::DeleteSprite(42)]);
        assert!(datagram.error.is_none());
    }

    #[test]
    fn test_large_frame_is_chunked_on_record_boundaries() {
        let mut writer = FrameWriter::with_max_datagram_size(3, 64);
        let blobs: Vec<Record> = (10..30)
            .map(|id| Record::Blob(ParsedBlob {
                blob_type: 1,
                sprite_id: id,
                attributes: vec![(9, AttrValue::F32(0.5))],
            }))
            .collect();
        for blob in blobs.iter() {
            writer.push(blob).unwrap();
        }
        let datagrams = writer.finish();
        assert!(datagrams.len() > 1);

        let mut received = vec![];
        for bytes in datagrams.iter() {
            assert!(bytes.len() <= 64);
            let datagram = Datagram::parse(bytes).unwrap();
            assert_eq!(datagram.header.frame, 3);
            assert!(datagram.error.is_none());
            received.extend(datagram.records);
        }
        assert_eq!(received, blobs);
    }

    #[test]
    fn test_record_larger_than_a_datagram_is_refused() {
        let mut writer = FrameWriter::with_max_datagram_size(4, 64);
        writer.push(&Record::ClearWorld).unwrap();
        let oversized = Record::Blob(ParsedBlob {
            blob_type: 1,
            sprite_id: 10,
            attributes: vec![(40, AttrValue::Str("x".repeat(200)))],
        });
        match writer.push(&oversized) {
            Err(ProtocolError::RecordTooLarge { limit, .. }) => assert_eq!(limit, 64 - HEADER_SIZE),
            other => panic!("unexpected result {other:?}"),
        }
        writer.push(&Record::DeleteSprite(11)).unwrap();

        let datagrams = writer.finish();
        assert_eq!(datagrams.len(), 1);
        assert!(datagrams[0].len() <= 64);
        let datagram = Datagram::parse(&datagrams[0]).unwrap();
        assert_eq!(datagram.records, vec![Record::ClearWorld, Record::DeleteSprite(11)]);
    }

    #[test]
    fn test_length_mismatch_drops_datagram() {
        let mut buffer = DataBuffer::new();
        FrameHeader { frame: 1, length: 10 }.write(&mut buffer);
        buffer.write_u8(command::CLEAR_WORLD);
        assert_eq!(
            Datagram::parse(buffer.as_bytes()),
            Err(ProtocolError::FrameLengthMismatch { declared: 10, actual: 1 })
        );
    }

    #[test]
    fn test_malformed_record_keeps_earlier_records() {
        let mut buffer = DataBuffer::new();
        FrameHeader { frame: 1, length: 2 }.write(&mut buffer);
        buffer.write_u8(command::CLEAR_WORLD);
        buffer.write_u8(0);
        let datagram = Datagram::parse(buffer.as_bytes()).unwrap();
        assert_eq!(datagram.records, vec![Record::ClearWorld]);
        assert_eq!(datagram.error, Some(ProtocolError::InvalidRecordCode(0)));
    }
}
