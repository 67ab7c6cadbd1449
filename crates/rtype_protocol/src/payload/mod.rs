//! # Payload Records
//!
//! One fixed-layout record per packet type.
//!
//! ## Design
//!
//! - Every field is written explicitly in big-endian order; no reliance on
//!   in-memory struct layout
//! - Each record declares its exact byte size and a compile-time assertion
//!   pins it
//! - Variable-count data is a fixed header record followed by N fixed-size
//!   entries, N carried in the header

use crate::codec::{FixedString, WireReader, WireWriter};
use crate::error::ProtocolResult;
use crate::packet_type::PacketType;
use crate::registry::check_payload_size;

/// A single scalar field with a fixed wire width.
pub trait WireField: Sized {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Appends the field.
    fn put(&self, writer: &mut WireWriter);

    /// Reads the field; `name` identifies it in error reports.
    fn get(reader: &mut WireReader<'_>, name: &'static str) -> ProtocolResult<Self>;
}

macro_rules! scalar_field {
    ($ty:ty, $width:literal, $write:ident, $read:ident) => {
        impl WireField for $ty {
            const WIDTH: usize = $width;

            #[inline]
            fn put(&self, writer: &mut WireWriter) {
                writer.$write(*self);
            }

            #[inline]
            fn get(reader: &mut WireReader<'_>, _name: &'static str) -> ProtocolResult<Self> {
                reader.$read()
            }
        }
    };
}

scalar_field!(u8, 1, write_u8, read_u8);
scalar_field!(u16, 2, write_u16, read_u16);
scalar_field!(u32, 4, write_u32, read_u32);
scalar_field!(i16, 2, write_i16, read_i16);
scalar_field!(i32, 4, write_i32, read_i32);
scalar_field!(f32, 4, write_f32, read_f32);

impl<const N: usize> WireField for FixedString<N> {
    const WIDTH: usize = N;

    #[inline]
    fn put(&self, writer: &mut WireWriter) {
        writer.write_fixed(self);
    }

    #[inline]
    fn get(reader: &mut WireReader<'_>, _name: &'static str) -> ProtocolResult<Self> {
        reader.read_fixed()
    }
}

/// A fixed-size record: a whole payload or one entry of a counted payload.
pub trait WireRecord: Sized {
    /// Exact encoded size.
    const SIZE: usize;

    /// Appends every field in declaration order.
    fn write(&self, writer: &mut WireWriter);

    /// Reads every field in declaration order.
    fn read(reader: &mut WireReader<'_>) -> ProtocolResult<Self>;
}

/// The body of one packet type.
pub trait Payload: Sized {
    /// Packet type this payload travels under.
    const PACKET_TYPE: PacketType;

    /// Encoded length of this value.
    fn encoded_len(&self) -> usize;

    /// Appends the encoded payload.
    fn write_payload(&self, writer: &mut WireWriter);

    /// Reads a payload whose size has already been validated.
    fn read_payload(reader: &mut WireReader<'_>) -> ProtocolResult<Self>;

    /// Encodes into a fresh buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = WireWriter::with_capacity(self.encoded_len());
        self.write_payload(&mut writer);
        writer.into_bytes()
    }

    /// Validates the size against the registry, then decodes.
    fn from_bytes(bytes: &[u8]) -> ProtocolResult<Self> {
        check_payload_size(Self::PACKET_TYPE, bytes)?;
        Self::read_payload(&mut WireReader::new(bytes))
    }
}

/// Declares a record struct and its explicit field-by-field codec.
macro_rules! wire_record {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $(#[$fdoc:meta])* pub $field:ident : $fty:ty ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq)]
        pub struct $name {
            $( $(#[$fdoc])* pub $field: $fty, )+
        }

        impl $crate::payload::WireRecord for $name {
            const SIZE: usize = 0 $( + <$fty as $crate::payload::WireField>::WIDTH )+;

            fn write(&self, writer: &mut $crate::codec::WireWriter) {
                $( $crate::payload::WireField::put(&self.$field, writer); )+
            }

            fn read(reader: &mut $crate::codec::WireReader<'_>) -> $crate::error::ProtocolResult<Self> {
                Ok(Self {
                    $( $field: <$fty as $crate::payload::WireField>::get(reader, stringify!($field))?, )+
                })
            }
        }
    };
}

/// Marks a record as the complete payload of a packet type.
macro_rules! fixed_payload {
    ($($name:ident => $packet:ident),+ $(,)?) => {
        $(
            impl $crate::payload::Payload for $name {
                const PACKET_TYPE: $crate::packet_type::PacketType =
                    $crate::packet_type::PacketType::$packet;

                #[inline]
                fn encoded_len(&self) -> usize {
                    <Self as $crate::payload::WireRecord>::SIZE
                }

                fn write_payload(&self, writer: &mut $crate::codec::WireWriter) {
                    $crate::payload::WireRecord::write(self, writer);
                }

                fn read_payload(
                    reader: &mut $crate::codec::WireReader<'_>,
                ) -> $crate::error::ProtocolResult<Self> {
                    <Self as $crate::payload::WireRecord>::read(reader)
                }
            }
        )+
    };
}

/// Declares a header-plus-entries payload. The header's count field is
/// rewritten from the entry list on encode.
macro_rules! counted_payload {
    (
        $(#[$meta:meta])*
        pub struct $name:ident => $packet:ident {
            header: $header:ty,
            count: $count:ident as $cty:ty,
            $(#[$edoc:meta])*
            pub $entries:ident : Vec<$entry:ty> $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name {
            /// Fixed header record.
            pub header: $header,
            $(#[$edoc])*
            pub $entries: Vec<$entry>,
        }

        impl $name {
            /// Most entries the count field can express.
            pub const MAX_ENTRIES: usize = <$cty>::MAX as usize;

            /// Builds the payload, setting the header count from `entries`.
            #[must_use]
            pub fn new(mut header: $header, $entries: Vec<$entry>) -> Self {
                header.$count = <$cty>::try_from($entries.len()).unwrap_or(<$cty>::MAX);
                Self { header, $entries }
            }

            fn written_entries(&self) -> usize {
                self.$entries.len().min(Self::MAX_ENTRIES)
            }
        }

        impl $crate::payload::Payload for $name {
            const PACKET_TYPE: $crate::packet_type::PacketType =
                $crate::packet_type::PacketType::$packet;

            fn encoded_len(&self) -> usize {
                <$header as $crate::payload::WireRecord>::SIZE
                    + self.written_entries() * <$entry as $crate::payload::WireRecord>::SIZE
            }

            fn write_payload(&self, writer: &mut $crate::codec::WireWriter) {
                let count = self.written_entries();
                let mut header = self.header;
                header.$count = <$cty>::try_from(count).unwrap_or(<$cty>::MAX);
                $crate::payload::WireRecord::write(&header, writer);
                for entry in &self.$entries[..count] {
                    $crate::payload::WireRecord::write(entry, writer);
                }
            }

            fn read_payload(
                reader: &mut $crate::codec::WireReader<'_>,
            ) -> $crate::error::ProtocolResult<Self> {
                let header = <$header as $crate::payload::WireRecord>::read(reader)?;
                let count = usize::from(header.$count);
                let mut $entries = Vec::with_capacity(count);
                for _ in 0..count {
                    $entries.push(<$entry as $crate::payload::WireRecord>::read(reader)?);
                }
                Ok(Self { header, $entries })
            }
        }
    };
}

// Record modules come after the macros so textual macro scope reaches them.
mod admin;
mod connection;
mod enums;
mod events;
mod lobby;
mod room;
mod world;

pub use admin::*;
pub use connection::*;
pub use enums::*;
pub use events::*;
pub use lobby::*;
pub use room::*;
pub use world::*;

/// Payload of a packet type that carries no body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmptyPayload;

impl EmptyPayload {
    /// Decodes an empty body, rejecting any trailing bytes for `packet_type`.
    pub fn check(packet_type: PacketType, bytes: &[u8]) -> ProtocolResult<Self> {
        check_payload_size(packet_type, bytes)?;
        Ok(Self)
    }
}
