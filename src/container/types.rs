//! Type registry: host element types <-> container type tags.
//!
//! Every storable host type implements [`NativeType`], which pins its
//! container tag at compile time. Pod numeric types additionally implement
//! [`Element`] and can be moved through byte views. The mapping is total:
//! anything without a representation maps to [`ContainerType::Unknown`],
//! and callers skip such data instead of failing.

use bytemuck::{Pod, Zeroable};
use num_complex::{Complex32, Complex64};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Native element tags of the container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ContainerType {
    Byte = 0,
    Short = 1,
    Integer = 2,
    Long = 3,
    UnsignedByte = 4,
    UnsignedShort = 5,
    UnsignedInteger = 6,
    UnsignedLong = 7,
    Real = 8,
    Double = 9,
    LongDouble = 10,
    Complex = 11,
    DoubleComplex = 12,
    String = 13,
    /// Sentinel for data without a container representation.
    Unknown = 255,
}

impl ContainerType {
    /// Every tag, sentinel included.
    pub const ALL: [ContainerType; 15] = [
        ContainerType::Byte,
        ContainerType::Short,
        ContainerType::Integer,
        ContainerType::Long,
        ContainerType::UnsignedByte,
        ContainerType::UnsignedShort,
        ContainerType::UnsignedInteger,
        ContainerType::UnsignedLong,
        ContainerType::Real,
        ContainerType::Double,
        ContainerType::LongDouble,
        ContainerType::Complex,
        ContainerType::DoubleComplex,
        ContainerType::String,
        ContainerType::Unknown,
    ];

    /// Bytes per element. Strings count one byte per character; the
    /// sentinel has size zero.
    pub fn size(self) -> usize {
        match self {
            ContainerType::Byte | ContainerType::UnsignedByte | ContainerType::String => 1,
            ContainerType::Short | ContainerType::UnsignedShort => 2,
            ContainerType::Integer | ContainerType::UnsignedInteger | ContainerType::Real => 4,
            ContainerType::Long
            | ContainerType::UnsignedLong
            | ContainerType::Double
            | ContainerType::Complex => 8,
            ContainerType::LongDouble | ContainerType::DoubleComplex => 16,
            ContainerType::Unknown => 0,
        }
    }

    /// Whether the tag names an integral type usable as a dimension.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ContainerType::Byte
                | ContainerType::Short
                | ContainerType::Integer
                | ContainerType::Long
                | ContainerType::UnsignedByte
                | ContainerType::UnsignedShort
                | ContainerType::UnsignedInteger
                | ContainerType::UnsignedLong
        )
    }

    pub fn is_known(self) -> bool {
        self != ContainerType::Unknown
    }
}

/// Byte size of one element of `t`.
pub fn type_size(t: ContainerType) -> usize {
    t.size()
}

/// Host types with a fixed container tag.
pub trait NativeType {
    const CONTAINER_TYPE: ContainerType;
}

/// Plain-old-data host types that can be viewed as bytes.
pub trait Element: NativeType + Pod + Copy + Debug + PartialEq + Send + 'static {}

/// Container tag of a host type, resolved at compile time.
pub fn native_to_container_type<T: NativeType + ?Sized>() -> ContainerType {
    T::CONTAINER_TYPE
}

macro_rules! impl_element {
    ($($t:ty => $tag:ident),* $(,)?) => {
        $(
            impl NativeType for $t {
                const CONTAINER_TYPE: ContainerType = ContainerType::$tag;
            }
            impl Element for $t {}
        )*
    };
}

impl_element! {
    i8 => Byte,
    i16 => Short,
    i32 => Integer,
    i64 => Long,
    u8 => UnsignedByte,
    u16 => UnsignedShort,
    u32 => UnsignedInteger,
    u64 => UnsignedLong,
    f32 => Real,
    f64 => Double,
    Complex32 => Complex,
    Complex64 => DoubleComplex,
}

impl NativeType for String {
    const CONTAINER_TYPE: ContainerType = ContainerType::String;
}

impl NativeType for str {
    const CONTAINER_TYPE: ContainerType = ContainerType::String;
}

/// Byte view of an element slice.
pub fn as_bytes<T: Element>(values: &[T]) -> &[u8] {
    bytemuck::cast_slice(values)
}

/// Copy raw bytes into a freshly allocated element vector.
///
/// The copy sidesteps alignment requirements of the source buffer.
pub fn from_bytes<T: Element>(bytes: &[u8]) -> Vec<T> {
    let n = bytes.len() / std::mem::size_of::<T>();
    let mut out = vec![T::zeroed(); n];
    bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(&bytes[..n * std::mem::size_of::<T>()]);
    out
}

/// Element-type enumeration of the composite object model.
///
/// Discriminants follow the VTK data type ids so that tags written by other
/// tools remain meaningful.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElementType {
    Void = 0,
    Bit = 1,
    Char = 2,
    UnsignedChar = 3,
    Short = 4,
    UnsignedShort = 5,
    Int = 6,
    UnsignedInt = 7,
    Long = 8,
    UnsignedLong = 9,
    Float = 10,
    Double = 11,
    IdType = 12,
    String = 13,
    SignedChar = 15,
    LongLong = 16,
    UnsignedLongLong = 17,
}

impl ElementType {
    /// Container tag used to store arrays of this element type.
    pub fn container_type(self) -> ContainerType {
        match self {
            ElementType::Char | ElementType::SignedChar => ContainerType::Byte,
            ElementType::UnsignedChar => ContainerType::UnsignedByte,
            ElementType::Short => ContainerType::Short,
            ElementType::UnsignedShort => ContainerType::UnsignedShort,
            ElementType::Int => ContainerType::Integer,
            ElementType::UnsignedInt => ContainerType::UnsignedInteger,
            ElementType::Long | ElementType::LongLong | ElementType::IdType => {
                ContainerType::Long
            }
            ElementType::UnsignedLong | ElementType::UnsignedLongLong => {
                ContainerType::UnsignedLong
            }
            ElementType::Float => ContainerType::Real,
            ElementType::Double => ContainerType::Double,
            ElementType::String => ContainerType::String,
            ElementType::Void | ElementType::Bit => ContainerType::Unknown,
        }
    }

    /// Object-model element type for a container tag, if one exists.
    pub fn from_container_type(t: ContainerType) -> Option<ElementType> {
        match t {
            ContainerType::Byte => Some(ElementType::SignedChar),
            ContainerType::UnsignedByte => Some(ElementType::UnsignedChar),
            ContainerType::Short => Some(ElementType::Short),
            ContainerType::UnsignedShort => Some(ElementType::UnsignedShort),
            ContainerType::Integer => Some(ElementType::Int),
            ContainerType::UnsignedInteger => Some(ElementType::UnsignedInt),
            ContainerType::Long => Some(ElementType::LongLong),
            ContainerType::UnsignedLong => Some(ElementType::UnsignedLongLong),
            ContainerType::Real => Some(ElementType::Float),
            ContainerType::Double => Some(ElementType::Double),
            ContainerType::String => Some(ElementType::String),
            ContainerType::LongDouble
            | ContainerType::Complex
            | ContainerType::DoubleComplex
            | ContainerType::Unknown => None,
        }
    }

    pub fn from_id(id: u8) -> Option<ElementType> {
        use ElementType::*;
        [
            Void, Bit, Char, UnsignedChar, Short, UnsignedShort, Int, UnsignedInt, Long,
            UnsignedLong, Float, Double, IdType, String, SignedChar, LongLong, UnsignedLongLong,
        ]
        .into_iter()
        .find(|t| *t as u8 == id)
    }
}
