//! Declarative helpers for the message catalogs

/// Declares payload structs whose wire shape is their fields in order.
macro_rules! wire_struct {
    ($(
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $(#[$fmeta:meta])* pub $field:ident : $ty:ty, )*
        }
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Debug, PartialEq)]
            pub struct $name {
                $( $(#[$fmeta])* pub $field: $ty, )*
            }

            impl $crate::codec::WireField for $name {
                #[allow(unused_variables)]
                fn encode(
                    &self,
                    w: &mut $crate::codec::WireWriter,
                ) -> animproc_core::AnimResult<()> {
                    $( $crate::codec::WireField::encode(&self.$field, w)?; )*
                    Ok(())
                }

                #[allow(unused_variables)]
                fn decode(
                    r: &mut $crate::codec::WireReader<'_>,
                ) -> animproc_core::AnimResult<Self> {
                    Ok($name {
                        $( $field: <$ty as $crate::codec::WireField>::decode(r)?, )*
                    })
                }
            }
        )*
    };
}

/// Declares a tagged union over payload structs plus its envelope codec.
macro_rules! message_catalog {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $variant:ident = $tag:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub enum $name {
            $( $variant($variant), )*
        }

        impl $name {
            /// Envelope tag of this message
            pub fn tag(&self) -> u8 {
                match self {
                    $( $name::$variant(_) => $tag, )*
                }
            }

            /// Whether `tag` names a message of this catalog
            pub fn is_known_tag(tag: u8) -> bool {
                matches!(tag, $( $tag )|*)
            }

            /// Variant name, for logs
            pub fn name(&self) -> &'static str {
                match self {
                    $( $name::$variant(_) => stringify!($variant), )*
                }
            }

            fn encode_payload(
                &self,
                w: &mut $crate::codec::WireWriter,
            ) -> animproc_core::AnimResult<()> {
                match self {
                    $( $name::$variant(m) => $crate::codec::WireField::encode(m, w), )*
                }
            }

            fn decode_payload(
                tag: u8,
                r: &mut $crate::codec::WireReader<'_>,
            ) -> animproc_core::AnimResult<Self> {
                match tag {
                    $( $tag => Ok($name::$variant(
                        <$variant as $crate::codec::WireField>::decode(r)?,
                    )), )*
                    other => Err(animproc_core::AnimError::UnknownTag(other)),
                }
            }

            /// Serialize as `[tag][payload]`
            pub fn encode(&self) -> animproc_core::AnimResult<Vec<u8>> {
                let mut w = $crate::codec::WireWriter::new();
                w.put_u8(self.tag());
                self.encode_payload(&mut w)?;
                if w.len() > $crate::MAX_PACKET_BUFFER_SIZE {
                    return Err(animproc_core::AnimError::MessageTooLarge(w.len()));
                }
                Ok(w.into_vec())
            }

            /// Parse one datagram.
            ///
            /// The decoded size must equal `buf.len()` exactly.
            pub fn decode(buf: &[u8]) -> animproc_core::AnimResult<Self> {
                let Some((&tag, payload)) = buf.split_first() else {
                    return Err(animproc_core::AnimError::BufferTooShort {
                        expected: 1,
                        actual: 0,
                    });
                };
                let mut r = $crate::codec::WireReader::new(payload);
                let msg = Self::decode_payload(tag, &mut r)?;
                if r.remaining() != 0 {
                    return Err(animproc_core::AnimError::SizeMismatch {
                        decoded: 1 + r.consumed(),
                        received: buf.len(),
                    });
                }
                Ok(msg)
            }
        }

        impl $crate::codec::WireField for Box<$name> {
            fn encode(
                &self,
                w: &mut $crate::codec::WireWriter,
            ) -> animproc_core::AnimResult<()> {
                w.put_u8(self.tag());
                self.encode_payload(w)
            }

            fn decode(
                r: &mut $crate::codec::WireReader<'_>,
            ) -> animproc_core::AnimResult<Self> {
                let tag = r.get_u8()?;
                Ok(Box::new($name::decode_payload(tag, r)?))
            }
        }

        $(
            impl From<$variant> for $name {
                fn from(msg: $variant) -> Self {
                    $name::$variant(msg)
                }
            }
        )*
    };
}
