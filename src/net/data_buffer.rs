/// Byte buffer with a write end and a read cursor. All numbers are little endian.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DataBuffer {
    bytes: Vec<u8>,
    read_position: usize,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum DataBufferError {
    #[error("Buffer underflow, needed='{needed}', available='{available}'")]
    Underflow {
        needed: usize,
        available: usize,
    },

    #[error("Invalid UTF-8, reason='{0}'")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

impl DataBuffer {
    pub const MAX_STRING_LENGTH: usize = u16::MAX as usize;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            read_position: 0,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            read_position: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.read_position = 0;
    }

    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
        self.read_position = self.read_position.min(len);
    }

    pub fn read_position(&self) -> usize {
        self.read_position
    }

    pub fn available(&self) -> usize {
        self.bytes.len() - self.read_position
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// u16 length prefix followed by UTF-8 bytes. Longer strings are cut at a char boundary.
    pub fn write_str(&mut self, value: &str) {
        let mut end = value.len().min(Self::MAX_STRING_LENGTH);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        if end < value.len() {
            log::warn!("String of {} bytes truncated to {end}", value.len());
        }
        self.bytes.extend_from_slice(&(end as u16).to_le_bytes());
        self.bytes.extend_from_slice(&value.as_bytes()[..end]);
    }

    fn take(&mut self, count: usize) -> Result<&[u8], DataBufferError> {
        if self.available() < count {
            return Err(DataBufferError::Underflow {
                needed: count,
                available: self.available(),
            });
        }
        let start = self.read_position;
        self.read_position += count;
        Ok(&self.bytes[start..start + count])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DataBufferError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.bytes.get(self.read_position).copied()
    }

    pub fn read_u8(&mut self) -> Result<u8, DataBufferError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DataBufferError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DataBufferError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, DataBufferError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    pub fn read_string(&mut self) -> Result<String, DataBufferError> {
        let length = usize::from(self.read_u16()?);
        let bytes = self.take(length)?.to_vec();
        Ok(String::from_utf8(bytes)?)
    }

    pub fn skip(&mut self, count: usize) -> Result<(), DataBufferError> {
        self.take(count).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_values_read_back_in_order() {
        let mut buffer = DataBuffer::new();
        buffer.write_u8(7);
        buffer.write_u32(0xDEAD_BEEF);
        buffer.write_f32(-2.5);
        buffer.write_str("żółw");

        assert_eq!(buffer.read_u8(), Ok(7));
        assert_eq!(buffer.read_u32(), Ok(0xDEAD_BEEF));
        assert_eq!(buffer.read_f32(), Ok(-2.5));
        assert_eq!(buffer.read_string().unwrap(), "żółw");
        assert_eq!(buffer.available(), 0);
    }

    #[test]
    fn test_u32_is_little_endian() {
        let mut buffer = DataBuffer::new();
        buffer.write_u32(1);
        assert_eq!(buffer.as_bytes(), &[1, 0, 0, 0]);
    }

    #[test]
    fn test_underflow_keeps_cursor() {
        let mut buffer = DataBuffer::from_bytes(&[1, 2]);
        assert_eq!(buffer.read_u32(), Err(DataBufferError::Underflow { needed: 4, available: 2 }));
        assert_eq!(buffer.read_position(), 0);
        assert_eq!(buffer.read_u8(), Ok(1));
    }

    #[test]
    fn test_invalid_utf8_is_error() {
        let mut buffer = DataBuffer::from_bytes(&[2, 0, 0xFF, 0xFE]);
        assert!(matches!(buffer.read_string(), Err(DataBufferError::InvalidUtf8(_))));
    }
}
