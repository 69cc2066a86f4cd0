//! Macros for defining typed id types.

/// Macro to define a typed wrapper around an opaque, master-assigned id.
///
/// Offer, agent and framework ids are minted by the cluster master; the
/// scheduler only stores and echoes them. The wrapper rejects empty strings
/// and provides:
/// - `new()` from any string-like value
/// - `as_str()` access to the raw value
/// - `Display`, `FromStr`, `Serialize` and `Deserialize` implementations
///
/// # Example
///
/// ```ignore
/// define_opaque_id!(OfferId, "offer id");
///
/// let offer_id = OfferId::new("20240801-000317-12-O42");
/// assert_eq!(offer_id.as_str(), "20240801-000317-12-O42");
/// ```
#[macro_export]
macro_rules! define_opaque_id {
    ($name:ident, $label:literal) => {
        #[doc = concat!("An opaque ", $label, " assigned by the cluster master.")]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw id value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Parses an id, rejecting empty input.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }
                Ok(Self(s.to_string()))
            }

            /// Returns the raw id value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}
