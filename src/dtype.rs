// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Scalar types shared by kernel arguments and typed buffer transfers.
//!
//! ## Why This Module Exists
//!
//! Kernel parameters are positional and typed. Binding an `int` where the
//! kernel declares `float` is a silent corruption on most drivers, so every
//! scalar that crosses the host/device boundary carries its [`ScalarType`].
//!
//! ## Design Decisions
//!
//! - **`bytemuck::Pod` elements**: typed transfers reinterpret `&[T]` as bytes
//!   without copies or `unsafe` at call sites.
//! - **No implicit conversions**: a `ScalarValue` is never widened or narrowed
//!   to fit a parameter; mismatches are reported.

use std::fmt;

/// Scalar element types understood by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// `char`
    I8,
    /// `uchar`
    U8,
    /// `short`
    I16,
    /// `ushort`
    U16,
    /// `int`
    I32,
    /// `uint`
    U32,
    /// `long`
    I64,
    /// `ulong`
    U64,
    /// `float`
    F32,
    /// `double`
    F64,
}

impl ScalarType {
    /// Size of one element in bytes.
    #[must_use]
    pub fn size_in_bytes(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// Check if this is a floating-point type.
    #[must_use]
    pub fn is_floating_point(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Kernel-language spelling of the type.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::I8 => "char",
            Self::U8 => "uchar",
            Self::I16 => "short",
            Self::U16 => "ushort",
            Self::I32 => "int",
            Self::U32 => "uint",
            Self::I64 => "long",
            Self::U64 => "ulong",
            Self::F32 => "float",
            Self::F64 => "double",
        }
    }

    /// Parse a kernel-language type name (`unsigned int` is accepted as one
    /// space-separated name).
    #[must_use]
    pub fn from_kernel_name(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "signed char" => Self::I8,
            "uchar" | "unsigned char" => Self::U8,
            "short" | "signed short" => Self::I16,
            "ushort" | "unsigned short" => Self::U16,
            "int" | "signed int" | "signed" => Self::I32,
            "uint" | "unsigned int" | "unsigned" => Self::U32,
            "long" | "signed long" => Self::I64,
            "ulong" | "unsigned long" => Self::U64,
            "float" => Self::F32,
            "double" => Self::F64,
            _ => return None,
        })
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Host element type that can be copied to and from device memory.
pub trait Element: bytemuck::Pod + Send + Sync + 'static {
    /// Matching scalar type.
    const SCALAR: ScalarType;

    /// Wrap a value as a typed scalar argument.
    fn into_scalar(self) -> ScalarValue;
}

macro_rules! impl_element {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl Element for $ty {
                const SCALAR: ScalarType = ScalarType::$variant;

                fn into_scalar(self) -> ScalarValue {
                    ScalarValue::$variant(self)
                }
            }

            impl From<$ty> for ScalarValue {
                fn from(value: $ty) -> Self {
                    ScalarValue::$variant(value)
                }
            }
        )+
    };
}

impl_element!(
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
);

/// A typed scalar kernel argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    /// `char`
    I8(i8),
    /// `uchar`
    U8(u8),
    /// `short`
    I16(i16),
    /// `ushort`
    U16(u16),
    /// `int`
    I32(i32),
    /// `uint`
    U32(u32),
    /// `long`
    I64(i64),
    /// `ulong`
    U64(u64),
    /// `float`
    F32(f32),
    /// `double`
    F64(f64),
}

impl ScalarValue {
    /// Scalar type of this value.
    #[must_use]
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::I8(_) => ScalarType::I8,
            Self::U8(_) => ScalarType::U8,
            Self::I16(_) => ScalarType::I16,
            Self::U16(_) => ScalarType::U16,
            Self::I32(_) => ScalarType::I32,
            Self::U32(_) => ScalarType::U32,
            Self::I64(_) => ScalarType::I64,
            Self::U64(_) => ScalarType::U64,
            Self::F32(_) => ScalarType::F32,
            Self::F64(_) => ScalarType::F64,
        }
    }

    /// Native-endian bytes of the value, as a driver expects them.
    #[must_use]
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        match *self {
            Self::I8(v) => v.to_ne_bytes().to_vec(),
            Self::U8(v) => v.to_ne_bytes().to_vec(),
            Self::I16(v) => v.to_ne_bytes().to_vec(),
            Self::U16(v) => v.to_ne_bytes().to_vec(),
            Self::I32(v) => v.to_ne_bytes().to_vec(),
            Self::U32(v) => v.to_ne_bytes().to_vec(),
            Self::I64(v) => v.to_ne_bytes().to_vec(),
            Self::U64(v) => v.to_ne_bytes().to_vec(),
            Self::F32(v) => v.to_ne_bytes().to_vec(),
            Self::F64(v) => v.to_ne_bytes().to_vec(),
        }
    }

    /// Extract the value as `T` if the types match exactly.
    #[must_use]
    pub fn get<T: Element>(&self) -> Option<T> {
        if self.scalar_type() != T::SCALAR {
            return None;
        }
        bytemuck::try_pod_read_unaligned(&self.to_ne_bytes()).ok()
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scalar {}", self.scalar_type())
    }
}

/// Number of bytes occupied by `count` elements of `T`.
#[must_use]
pub fn bytes_for<T: Element>(count: usize) -> usize {
    count.saturating_mul(T::SCALAR.size_in_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_in_bytes() {
        assert_eq!(ScalarType::U8.size_in_bytes(), 1);
        assert_eq!(ScalarType::I16.size_in_bytes(), 2);
        assert_eq!(ScalarType::F32.size_in_bytes(), 4);
        assert_eq!(ScalarType::F64.size_in_bytes(), 8);
        assert_eq!(bytes_for::<f32>(32), 128);
    }

    #[test]
    fn test_kernel_names() {
        assert_eq!(ScalarType::from_kernel_name("float"), Some(ScalarType::F32));
        assert_eq!(
            ScalarType::from_kernel_name("unsigned int"),
            Some(ScalarType::U32)
        );
        assert_eq!(ScalarType::from_kernel_name("float4"), None);
        // Device-dependent width, no fixed host type.
        assert_eq!(ScalarType::from_kernel_name("size_t"), None);
        assert_eq!(ScalarType::U64.name(), "ulong");
    }

    #[test]
    fn test_scalar_value_round_trip() {
        let v = ScalarValue::from(2.5f32);
        assert_eq!(v.scalar_type(), ScalarType::F32);
        assert_eq!(v.get::<f32>(), Some(2.5));
        assert_eq!(v.get::<i32>(), None);
        assert_eq!(7i64.into_scalar().get::<i64>(), Some(7));
    }

    #[test]
    fn test_is_floating_point() {
        assert!(ScalarType::F32.is_floating_point());
        assert!(ScalarType::F64.is_floating_point());
        assert!(!ScalarType::I32.is_floating_point());
    }
}
