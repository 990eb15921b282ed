//! Newtype keys for type-safe cart references.
//!
//! Use the `define_key!` macro to create type-safe key wrappers that prevent
//! accidentally mixing product references with server-assigned line ids.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Macro to define a type-safe opaque key.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize` as a plain JSON string
/// - `Deserialize` from either a JSON string or a JSON integer, since the
///   backend is free to use numeric identifiers
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `From<i64>` implementations
///
/// # Example
///
/// ```rust
/// # use edustore_core::define_key;
/// define_key!(CourseKey);
/// define_key!(VideoKey);
///
/// let course = CourseKey::new("c-1");
/// let video = VideoKey::from(7);
///
/// // These are different types, so this won't compile:
/// // let _: CourseKey = video;
/// assert_eq!(video.as_str(), "7");
/// # let _ = course;
/// ```
#[macro_export]
macro_rules! define_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ::serde::Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new key from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the key as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Convert into the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::core::convert::AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id.to_string())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::core::result::Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                $crate::types::id::deserialize_key(deserializer).map(Self)
            }
        }
    };
}

/// Accepts a key encoded as a JSON string or integer.
#[doc(hidden)]
pub fn deserialize_key<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawKey {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(match RawKey::deserialize(deserializer)? {
        RawKey::Text(s) => s,
        RawKey::Signed(n) => n.to_string(),
        RawKey::Unsigned(n) => n.to_string(),
    })
}

define_key!(
    /// Opaque reference to a purchasable product (note, lab manual, video, course).
    ItemId
);
define_key!(
    /// Identifier the remote cart assigns to one of its lines.
    LineId
);

/// Key used to address a line in a remote delete.
///
/// The server-assigned line id wins when known; otherwise the item id is used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum LineKey {
    /// Server-assigned line identifier.
    Server(LineId),
    /// Product reference, used before the server has assigned a line id.
    Item(ItemId),
}

impl LineKey {
    /// Pick the delete key for a line.
    #[must_use]
    pub fn for_line(item_id: &ItemId, server_line_id: Option<&LineId>) -> Self {
        server_line_id.map_or_else(
            || Self::Item(item_id.clone()),
            |line_id| Self::Server(line_id.clone()),
        )
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Server(id) => id.as_str(),
            Self::Item(id) => id.as_str(),
        }
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
