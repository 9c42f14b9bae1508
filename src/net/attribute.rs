use glam::{
    Vec2,
    Vec3
};

use super::{
    data_buffer::DataBuffer,
    ProtocolError
};

/// Ends the attribute list of a blob.
pub const TERMINATOR: u8 = 0;

/// Longest id list a record may carry.
pub const MAX_ID_LIST: usize = 4096;

/// Self describing attribute payload. The tag byte fixes the layout so a reader can
/// skip attributes it does not understand.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    U32(u32),
    F32(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Str(String),
    IdList(Vec<u32>),
}

mod tag {
    pub const BOOL: u8 = 1;
    pub const U32: u8 = 2;
    pub const F32: u8 = 3;
    pub const VEC2: u8 = 4;
    pub const VEC3: u8 = 5;
    pub const STR: u8 = 6;
    pub const ID_LIST: u8 = 7;
}

impl AttrValue {
    fn tag(&self) -> u8 {
        match self {
            AttrValue::Bool(_) => tag::BOOL,
            AttrValue::U32(_) => tag::U32,
            AttrValue::F32(_) => tag::F32,
            AttrValue::Vec2(_) => tag::VEC2,
            AttrValue::Vec3(_) => tag::VEC3,
            AttrValue::Str(_) => tag::STR,
            AttrValue::IdList(_) => tag::ID_LIST,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            AttrValue::U32(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            AttrValue::F32(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<Vec2> {
        match self {
            AttrValue::Vec2(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            AttrValue::Vec3(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_id_list(&self) -> Option<&[u32]> {
        match self {
            AttrValue::IdList(value) => Some(value),
            _ => None,
        }
    }
}

/// Writes one attribute record. An id list longer than [`MAX_ID_LIST`] is left out
/// whole, so a replica keeps its previous value instead of applying part of the list.
pub fn write_attribute(buffer: &mut DataBuffer, id: u8, value: &AttrValue) {
    debug_assert_ne!(id, TERMINATOR);
    if let AttrValue::IdList(ids) = value {
        if ids.len() > MAX_ID_LIST {
            log::warn!("Attribute {id} skipped, reason='{}'", ProtocolError::IdListTooLong(ids.len()));
            return;
        }
    }
    buffer.write_u8(id);
    buffer.write_u8(value.tag());
    match value {
        AttrValue::Bool(value) => buffer.write_u8(u8::from(*value)),
        AttrValue::U32(value) => buffer.write_u32(*value),
        AttrValue::F32(value) => buffer.write_f32(*value),
        AttrValue::Vec2(value) => {
            buffer.write_f32(value.x);
            buffer.write_f32(value.y);
        },
        AttrValue::Vec3(value) => {
            buffer.write_f32(value.x);
            buffer.write_f32(value.y);
            buffer.write_f32(value.z);
        },
        AttrValue::Str(value) => buffer.write_str(value),
        AttrValue::IdList(ids) => {
            buffer.write_u32(ids.len() as u32);
            for id in ids {
                buffer.write_u32(*id);
            }
        },
    }
}

/// Reads one attribute record, `None` at the terminator.
pub fn read_attribute(buffer: &mut DataBuffer) -> Result<Option<(u8, AttrValue)>, ProtocolError> {
    let id = buffer.read_u8()?;
    if id == TERMINATOR {
        return Ok(None);
    }

    let value = match buffer.read_u8()? {
        tag::BOOL => AttrValue::Bool(buffer.read_u8()? != 0),
        tag::U32 => AttrValue::U32(buffer.read_u32()?),
        tag::F32 => AttrValue::F32(buffer.read_f32()?),
        tag::VEC2 => AttrValue::Vec2(Vec2::new(buffer.read_f32()?, buffer.read_f32()?)),
        tag::VEC3 => AttrValue::Vec3(Vec3::new(buffer.read_f32()?, buffer.read_f32()?, buffer.read_f32()?)),
        tag::STR => AttrValue::Str(buffer.read_string()?),
        tag::ID_LIST => {
            let count = buffer.read_u32()? as usize;
            if count > MAX_ID_LIST {
                return Err(ProtocolError::IdListTooLong(count));
            }
            let mut ids = Vec::with_capacity(count);
            for _ in 0..count {
                ids.push(buffer.read_u32()?);
            }
            AttrValue::IdList(ids)
        },
        unknown => return Err(ProtocolError::UnknownAttributeTag { attribute: id, tag: unknown }),
    };
    Ok(Some((id, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_list_until_terminator() {
        let mut buffer = DataBuffer::new();
        write_attribute(&mut buffer, 4, &AttrValue::Vec3(Vec3::new(1.0, 2.0, 3.0)));
        write_attribute(&mut buffer, 40, &AttrValue::Str("hello".to_string()));
        write_attribute(&mut buffer, 10, &AttrValue::IdList(vec![3, 5, 8]));
        buffer.write_u8(TERMINATOR);

        assert_eq!(read_attribute(&mut buffer).unwrap(), Some((4, AttrValue::Vec3(Vec3::new(1.0, 2.0, 3.0)))));
        assert_eq!(read_attribute(&mut buffer).unwrap(), Some((40, AttrValue::Str("hello".to_string()))));
        assert_eq!(read_attribute(&mut buffer).unwrap(), Some((10, AttrValue::IdList(vec![3, 5, 8]))));
        assert_eq!(read_attribute(&mut buffer).unwrap(), None);
    }

    #[test]
    fn test_unknown_tag_is_protocol_error() {
        let mut buffer = DataBuffer::from_bytes(&[4, 99, 0, 0]);
        assert!(matches!(
            read_attribute(&mut buffer),
            Err(ProtocolError::UnknownAttributeTag { attribute: 4, tag: 99 })
        ));
    }

    #[test]
    fn test_truncated_payload_is_protocol_error() {
        let mut buffer = DataBuffer::from_bytes(&[9, tag::F32, 0, 0]);
        assert!(matches!(read_attribute(&mut buffer), Err(ProtocolError::DataBuffer(_))));
    }

    #[test]
    fn test_oversized_id_list_is_left_out() {
        let mut buffer = DataBuffer::new();
        let ids: Vec<u32> = (1..=MAX_ID_LIST as u32 + 1).collect();
        write_attribute(&mut buffer, 10, &AttrValue::IdList(ids));
        write_attribute(&mut buffer, 9, &AttrValue::F32(0.5));
        buffer.write_u8(TERMINATOR);

        assert_eq!(read_attribute(&mut buffer).unwrap(), Some((9, AttrValue::F32(0.5))));
        assert_eq!(read_attribute(&mut buffer).unwrap(), None);
    }

    #[test]
    fn test_value_accessors_reject_other_types() {
        assert_eq!(AttrValue::F32(1.0).as_f32(), Some(1.0));
        assert_eq!(AttrValue::F32(1.0).as_u32(), None);
        assert_eq!(AttrValue::IdList(vec![1]).as_id_list(), Some(&[1u32][..]));
    }
}
