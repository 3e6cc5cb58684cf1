//!
//! # Enum-String Mapping Module
//!
//! Primarily defines the [enumstr] macro and paired [EnumStr] trait,
//! for defining a mapping between an enum and a string.
//! Used for the enumerated, string-valued fields of circuit data:
//! port directions, primitive-device names, and the like.
//!
//! The [EnumStr] trait defines three central methods:
//! * `to_str(&self) -> &'static str` converts the enum to its String values.
//! * `from_str(&str) -> Option<Self>` does the opposite, returning an [Option] indicator of success or failure.
//! * `variants() -> &'static [Self]` lists every variant, in declaration order.
//!
//! Example:
//!
//! ```rust
//! use hdl21utils::{enumstr, EnumStr};
//!
//! enumstr!(
//! /// # Logic Levels
//! Level {
//!     High: "HIGH",
//!     Low: "LOW",
//!  }
//! );
//! assert_eq!(Level::from_str("LOW"), Some(Level::Low));
//! ```
//!

///
/// # String-Enumeration Trait
///
/// While [EnumStr] can be implemented by any type, its primary intent is
/// for implementation by the [enumstr] macro.
///
pub trait EnumStr: std::marker::Sized + 'static {
    fn to_str(&self) -> &'static str;
    fn from_str(txt: &str) -> Option<Self>;
    fn variants() -> &'static [Self];
}

///
/// # Enum-String Pairing Macro
///
/// For creating an `enum` which:
/// * (a) Has paired string-values
/// * (b) Automatically implements the [EnumStr] trait for conversions to and from these strings.
/// * (c) Automatically implements [std::fmt::Display] writing the string-values
///
/// All variants are fieldless, and include derived implementations of common traits,
/// notably including `Hash` and `serde::{Serialize,Deserialize}`.
/// Serialization uses the paired string-values.
/// Invoking crates must depend on `serde`.
///
#[macro_export]
macro_rules! enumstr {
    (   $(#[$meta: meta])*
        $enum_name: ident {
        $( $variant: ident : $strval: literal ),* $(,)?
    }) => {
        $(#[$meta])*
        #[allow(dead_code)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ::serde::Deserialize, ::serde::Serialize)]
        pub enum $enum_name {
            $( #[doc=$strval]
               #[serde(rename = $strval)]
                $variant ),*
        }
        impl $crate::enumstr::EnumStr for $enum_name {
            /// Convert a variant to its paired (static) string value.
            fn to_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $strval),*,
                }
            }
            /// Create from one of the string-values.
            /// Returns `None` if input `txt` does not match one of the variants.
            /// Note `from_str` is case *sensitive*.
            fn from_str(txt: &str) -> Option<Self> {
                match txt {
                    $( $strval => Some(Self::$variant)),*,
                    _ => None,
                }
            }
            /// All variants, in declaration order
            fn variants() -> &'static [Self] {
                &[ $( Self::$variant ),* ]
            }
        }
        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                let s = $crate::enumstr::EnumStr::to_str(self);
                write!(f, "{}", s)
            }
        }
    }
}
