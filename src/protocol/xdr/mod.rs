//! The XDR (External Data Representation) module defines data structures and methods
//! for serializing/deserializing data according to RFC 1832 standard.
//!
//! XDR provides machine-independent data representation format,
//! which is critical for network protocols like NFS.
//!
//! Serialization and deserialization are split into two traits so that a type can be
//! written without ever being fully constructed (`Serialize`, taking `&self`) and read
//! back into an existing value (`Deserialize`, taking `&mut self`). Most call sites use
//! the free `deserialize::<T>()` helper, which builds the `Default` value for `T` and
//! deserializes into it in one step.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

pub mod mount;
pub mod nfs3;
pub mod portmap;
pub mod rpc;
pub mod utils;

/// Type alias for the standard endianness used in XDR serialization (Big Endian).
pub type XDREndian = byteorder::BigEndian;

/// Serializes a value to XDR wire format.
pub trait Serialize {
    /// Writes `self` to `dest` in XDR wire format.
    fn serialize<R: Write>(&self, dest: &mut R) -> std::io::Result<()>;
}

/// Deserializes a value from XDR wire format into an existing instance.
pub trait Deserialize {
    /// Reads an XDR-encoded value from `src` into `self`.
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()>;
}

/// Reads a `T` from `src`, starting from `T::default()`.
///
/// This is the usual way to decode a value: `deserialize::<nfs3::nfs_fh3>(input)?`.
pub fn deserialize<T: Deserialize + Default>(src: &mut impl Read) -> std::io::Result<T> {
    let mut val = T::default();
    val.deserialize(src)?;
    Ok(val)
}

/// Marker trait for enums serialized as a 4-byte big-endian discriminant via
/// `num_traits::ToPrimitive`. Implement with the `SerializeEnum!` macro, or directly
/// with `impl SerializeEnum for MyEnum {}` when no matching `meta.phases`-style macro
/// call is wanted.
pub trait SerializeEnum: Copy + num_traits::cast::ToPrimitive {}

/// Marker trait for enums deserialized from a 4-byte big-endian discriminant via
/// `num_traits::FromPrimitive`. Implement with the `DeserializeEnum!` macro, or
/// directly with `impl DeserializeEnum for MyEnum {}`.
pub trait DeserializeEnum: Sized + num_traits::cast::FromPrimitive {}

impl<T: SerializeEnum> Serialize for T {
    fn serialize<R: Write>(&self, dest: &mut R) -> std::io::Result<()> {
        self.to_u32().expect("enum discriminant fits in u32").serialize(dest)
    }
}

impl<T: DeserializeEnum> Deserialize for T {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let raw = deserialize::<u32>(src)?;
        match T::from_u32(raw) {
            Some(v) => {
                *self = v;
                Ok(())
            }
            None => Err(utils::invalid_data(&format!(
                "invalid discriminant {} for {}",
                raw,
                std::any::type_name::<T>()
            ))),
        }
    }
}

impl Serialize for bool {
    fn serialize<R: Write>(&self, dest: &mut R) -> std::io::Result<()> {
        dest.write_u32::<XDREndian>(*self as u32)
    }
}
impl Deserialize for bool {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u32::<XDREndian>()? != 0;
        Ok(())
    }
}

impl Serialize for i32 {
    fn serialize<R: Write>(&self, dest: &mut R) -> std::io::Result<()> {
        dest.write_i32::<XDREndian>(*self)
    }
}
impl Deserialize for i32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_i32::<XDREndian>()?;
        Ok(())
    }
}

impl Serialize for i64 {
    fn serialize<R: Write>(&self, dest: &mut R) -> std::io::Result<()> {
        dest.write_i64::<XDREndian>(*self)
    }
}
impl Deserialize for i64 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_i64::<XDREndian>()?;
        Ok(())
    }
}

impl Serialize for u32 {
    fn serialize<R: Write>(&self, dest: &mut R) -> std::io::Result<()> {
        dest.write_u32::<XDREndian>(*self)
    }
}
impl Deserialize for u32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u32::<XDREndian>()?;
        Ok(())
    }
}

impl Serialize for u64 {
    fn serialize<R: Write>(&self, dest: &mut R) -> std::io::Result<()> {
        dest.write_u64::<XDREndian>(*self)
    }
}
impl Deserialize for u64 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u64::<XDREndian>()?;
        Ok(())
    }
}

/// Fixed-size arrays are serialized as their raw bytes without a length prefix.
impl<const N: usize> Serialize for [u8; N] {
    fn serialize<R: Write>(&self, dest: &mut R) -> std::io::Result<()> {
        dest.write_all(self)
    }
}
impl<const N: usize> Deserialize for [u8; N] {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        src.read_exact(self)
    }
}

/// Variable-length opaque data: 4-byte length prefix, raw bytes, padded to a multiple
/// of 4 bytes as required by RFC 1832 section 3.9/3.10.
impl Serialize for Vec<u8> {
    fn serialize<R: Write>(&self, dest: &mut R) -> std::io::Result<()> {
        assert!(self.len() < u32::MAX as usize);
        let length = self.len() as u32;
        length.serialize(dest)?;
        dest.write_all(self)?;
        utils::write_padding(self.len(), dest)
    }
}
impl Deserialize for Vec<u8> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let length = deserialize::<u32>(src)?;
        self.resize(length as usize, 0);
        src.read_exact(self)?;
        utils::read_padding(self.len(), src)
    }
}

/// A length-prefixed array of 32-bit values (e.g. `auth_flavors` in `mountres3_ok`).
impl Serialize for Vec<u32> {
    fn serialize<R: Write>(&self, dest: &mut R) -> std::io::Result<()> {
        assert!(self.len() < u32::MAX as usize);
        (self.len() as u32).serialize(dest)?;
        for i in self {
            i.serialize(dest)?;
        }
        Ok(())
    }
}
impl Deserialize for Vec<u32> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let length = deserialize::<u32>(src)?;
        self.resize(length as usize, 0);
        for i in self {
            i.deserialize(src)?;
        }
        Ok(())
    }
}

/// Implements [`Serialize`]/[`Deserialize`] for a struct by serializing each named
/// field in declaration order.
///
/// ```ignore
/// SerializeStruct!(wcc_attr, size, mtime, ctime);
/// DeserializeStruct!(wcc_attr, size, mtime, ctime);
/// ```
#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! SerializeStruct {
    ($t:ident, $($element:ident),* $(,)?) => {
        impl $crate::protocol::xdr::Serialize for $t {
            fn serialize<R: std::io::Write>(&self, dest: &mut R) -> std::io::Result<()> {
                $(self.$element.serialize(dest)?;)*
                Ok(())
            }
        }
    };
}

#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! DeserializeStruct {
    ($t:ident, $($element:ident),* $(,)?) => {
        impl $crate::protocol::xdr::Deserialize for $t {
            fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                $(self.$element.deserialize(src)?;)*
                Ok(())
            }
        }
    };
}

/// Marks a `Copy + ToPrimitive` enum as XDR-serializable via its discriminant.
#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! SerializeEnum {
    ($t:ident) => {
        impl $crate::protocol::xdr::SerializeEnum for $t {}
    };
}

/// Marks a `FromPrimitive` enum as XDR-deserializable via its discriminant, rejecting
/// unknown values.
#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! DeserializeEnum {
    ($t:ident) => {
        impl $crate::protocol::xdr::DeserializeEnum for $t {}
    };
}

/// Implements an XDR "optional-data" union: a 4-byte boolean discriminant followed,
/// when true, by the wrapped value.
///
/// ```ignore
/// enum pre_op_attr { Void, attributes(wcc_attr) }
/// SerializeBoolUnion!(pre_op_attr, attributes, wcc_attr);
/// DeserializeBoolUnion!(pre_op_attr, attributes, wcc_attr);
/// ```
#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! SerializeBoolUnion {
    ($t:ident, $case:ident, $inner:ty) => {
        impl $crate::protocol::xdr::Serialize for $t {
            fn serialize<R: std::io::Write>(&self, dest: &mut R) -> std::io::Result<()> {
                match self {
                    $t::Void => false.serialize(dest),
                    $t::$case(v) => {
                        true.serialize(dest)?;
                        v.serialize(dest)
                    }
                }
            }
        }
    };
}

#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! DeserializeBoolUnion {
    ($t:ident, $case:ident, $inner:ty) => {
        impl $crate::protocol::xdr::Deserialize for $t {
            fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                if $crate::protocol::xdr::deserialize::<bool>(src)? {
                    *self = $t::$case($crate::protocol::xdr::deserialize::<$inner>(src)?);
                } else {
                    *self = $t::Void;
                }
                Ok(())
            }
        }
    };
}

pub use crate::{
    DeserializeBoolUnion, DeserializeEnum, DeserializeStruct, SerializeBoolUnion, SerializeEnum,
    SerializeStruct,
};
