//! Typed data arrays: a closed union of element vectors plus a component
//! count.

use crate::container::types::{ContainerType, Element, ElementType};

/// Element storage of a [`DataArray`].
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayValues {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    /// Packed bits, eight per byte; `len` counts bits.
    Bit { bits: Vec<u8>, len: usize },
    Str(Vec<String>),
}

/// Run `$body` with `$v` bound to the numeric vector inside `$values`;
/// evaluate `$other` for bit and string arrays.
macro_rules! with_numeric {
    ($values:expr, $v:ident => $body:expr, _ => $other:expr) => {
        match $values {
            $crate::data::array::ArrayValues::I8($v) => $body,
            $crate::data::array::ArrayValues::U8($v) => $body,
            $crate::data::array::ArrayValues::I16($v) => $body,
            $crate::data::array::ArrayValues::U16($v) => $body,
            $crate::data::array::ArrayValues::I32($v) => $body,
            $crate::data::array::ArrayValues::U32($v) => $body,
            $crate::data::array::ArrayValues::I64($v) => $body,
            $crate::data::array::ArrayValues::U64($v) => $body,
            $crate::data::array::ArrayValues::F32($v) => $body,
            $crate::data::array::ArrayValues::F64($v) => $body,
            _ => $other,
        }
    };
}
pub(crate) use with_numeric;

/// Numeric element types that can live in an [`ArrayValues`].
pub trait ArrayElement: Element {
    fn wrap(values: Vec<Self>) -> ArrayValues;
    fn peek(values: &ArrayValues) -> Option<&[Self]>;
}

macro_rules! impl_array_element {
    ($($t:ty => $var:ident),* $(,)?) => {
        $(
            impl ArrayElement for $t {
                fn wrap(values: Vec<Self>) -> ArrayValues {
                    ArrayValues::$var(values)
                }
                fn peek(values: &ArrayValues) -> Option<&[Self]> {
                    match values {
                        ArrayValues::$var(v) => Some(v),
                        _ => None,
                    }
                }
            }

            impl From<Vec<$t>> for ArrayValues {
                fn from(v: Vec<$t>) -> Self {
                    ArrayValues::$var(v)
                }
            }
        )*
    };
}

impl_array_element! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

impl From<Vec<String>> for ArrayValues {
    fn from(v: Vec<String>) -> Self {
        ArrayValues::Str(v)
    }
}

impl ArrayValues {
    /// Number of elements (bits for bit arrays).
    pub fn len(&self) -> usize {
        match self {
            ArrayValues::Bit { len, .. } => *len,
            ArrayValues::Str(v) => v.len(),
            other => with_numeric!(other, v => v.len(), _ => 0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            ArrayValues::I8(_) => ElementType::SignedChar,
            ArrayValues::U8(_) => ElementType::UnsignedChar,
            ArrayValues::I16(_) => ElementType::Short,
            ArrayValues::U16(_) => ElementType::UnsignedShort,
            ArrayValues::I32(_) => ElementType::Int,
            ArrayValues::U32(_) => ElementType::UnsignedInt,
            ArrayValues::I64(_) => ElementType::LongLong,
            ArrayValues::U64(_) => ElementType::UnsignedLongLong,
            ArrayValues::F32(_) => ElementType::Float,
            ArrayValues::F64(_) => ElementType::Double,
            ArrayValues::Bit { .. } => ElementType::Bit,
            ArrayValues::Str(_) => ElementType::String,
        }
    }

    /// Container tag used to store the values; `Unknown` for bit arrays.
    pub fn container_type(&self) -> ContainerType {
        self.element_type().container_type()
    }

    pub fn as_slice<T: ArrayElement>(&self) -> Option<&[T]> {
        T::peek(self)
    }
}

/// Named array of tuples with a fixed number of components.
#[derive(Clone, Debug, PartialEq)]
pub struct DataArray {
    pub name: String,
    pub components: usize,
    pub values: ArrayValues,
}

impl DataArray {
    pub fn new(name: impl Into<String>, components: usize, values: impl Into<ArrayValues>) -> Self {
        Self {
            name: name.into(),
            components,
            values: values.into(),
        }
    }

    /// Number of tuples; zero when there are no components.
    pub fn tuples(&self) -> usize {
        if self.components == 0 {
            0
        } else {
            self.values.len() / self.components
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn element_type(&self) -> ElementType {
        self.values.element_type()
    }
}
