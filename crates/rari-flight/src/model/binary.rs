use bytes::{BufMut, Bytes, BytesMut};

use super::{Model, ObjectId};

/// Element width and signedness of a binary value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypedArrayKind {
    ArrayBuffer,
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
    BigInt64,
    BigUint64,
    DataView,
}

impl TypedArrayKind {
    /// Row tag for this kind. `m` is used for unsigned 64-bit because `n` could start `null`.
    pub fn tag(self) -> char {
        match self {
            Self::ArrayBuffer => 'A',
            Self::Int8 => 'C',
            Self::Uint8 => 'c',
            Self::Uint8Clamped => 'U',
            Self::Int16 => 'S',
            Self::Uint16 => 's',
            Self::Int32 => 'L',
            Self::Uint32 => 'l',
            Self::Float32 => 'F',
            Self::Float64 => 'D',
            Self::BigInt64 => 'N',
            Self::BigUint64 => 'm',
            Self::DataView => 'V',
        }
    }

    pub fn from_tag(tag: char) -> Option<Self> {
        Some(match tag {
            'A' => Self::ArrayBuffer,
            'C' => Self::Int8,
            'c' => Self::Uint8,
            'U' => Self::Uint8Clamped,
            'S' => Self::Int16,
            's' => Self::Uint16,
            'L' => Self::Int32,
            'l' => Self::Uint32,
            'F' => Self::Float32,
            'D' => Self::Float64,
            'N' => Self::BigInt64,
            'm' => Self::BigUint64,
            'V' => Self::DataView,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ArrayBuffer => "ArrayBuffer",
            Self::Int8 => "Int8Array",
            Self::Uint8 => "Uint8Array",
            Self::Uint8Clamped => "Uint8ClampedArray",
            Self::Int16 => "Int16Array",
            Self::Uint16 => "Uint16Array",
            Self::Int32 => "Int32Array",
            Self::Uint32 => "Uint32Array",
            Self::Float32 => "Float32Array",
            Self::Float64 => "Float64Array",
            Self::BigInt64 => "BigInt64Array",
            Self::BigUint64 => "BigUint64Array",
            Self::DataView => "DataView",
        }
    }
}

/// A fixed-width numeric buffer. Elements are stored little-endian.
#[derive(Debug, Clone)]
pub struct TypedArray {
    id: ObjectId,
    kind: TypedArrayKind,
    bytes: Bytes,
}

macro_rules! typed_array_constructor {
    ($name:ident, $ty:ty, $kind:ident) => {
        pub fn $name(values: &[$ty]) -> Self {
            let mut buf = BytesMut::with_capacity(std::mem::size_of_val(values));
            for value in values {
                buf.put_slice(&value.to_le_bytes());
            }
            Self::new(TypedArrayKind::$kind, buf.freeze())
        }
    };
}

impl TypedArray {
    pub fn new(kind: TypedArrayKind, bytes: impl Into<Bytes>) -> Self {
        Self { id: ObjectId::next(), kind, bytes: bytes.into() }
    }

    pub fn array_buffer(bytes: impl Into<Bytes>) -> Self {
        Self::new(TypedArrayKind::ArrayBuffer, bytes)
    }

    pub fn data_view(bytes: impl Into<Bytes>) -> Self {
        Self::new(TypedArrayKind::DataView, bytes)
    }

    pub fn uint8_clamped(values: &[u8]) -> Self {
        Self::new(TypedArrayKind::Uint8Clamped, Bytes::copy_from_slice(values))
    }

    typed_array_constructor!(from_i8, i8, Int8);
    typed_array_constructor!(from_u8, u8, Uint8);
    typed_array_constructor!(from_i16, i16, Int16);
    typed_array_constructor!(from_u16, u16, Uint16);
    typed_array_constructor!(from_i32, i32, Int32);
    typed_array_constructor!(from_u32, u32, Uint32);
    typed_array_constructor!(from_f32, f32, Float32);
    typed_array_constructor!(from_f64, f64, Float64);
    typed_array_constructor!(from_i64, i64, BigInt64);
    typed_array_constructor!(from_u64, u64, BigUint64);

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn kind(&self) -> TypedArrayKind {
        self.kind
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn byte_length(&self) -> usize {
        self.bytes.len()
    }
}

impl From<TypedArray> for Model {
    fn from(array: TypedArray) -> Self {
        Model::TypedArray(array)
    }
}
