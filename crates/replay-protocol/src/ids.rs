//! Trace context: StreamId/TraceId generation and bookkeeping.
//!
//! Both are 128-bit, lexically sortable ULIDs. Generation itself is an
//! external collaborator (the `ulid` crate); this module only wraps it in
//! newtypes so StreamId and TraceId aren't interchangeable at the type
//! level, and gives them the JSON-string wire shape the rest of the
//! protocol expects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use ulid::{Generator, Ulid};

/// `Ulid::new()` is plain-random and gives no ordering guarantee across
/// two calls in the same millisecond, so every newtype below shares one
/// process-wide monotonic `Generator` instead.
static GENERATOR: Mutex<Generator> = Mutex::new(Generator::new());

fn next_ulid() -> Ulid {
    GENERATOR
        .lock()
        .unwrap()
        .generate()
        .expect("ulid random bits exhausted within a single millisecond")
}

macro_rules! ulid_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Ulid);

        impl $name {
            /// Generates a fresh, monotonically-increasing id.
            pub fn new() -> Self {
                Self(next_ulid())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Ulid::from_str(s)?))
            }
        }

        impl From<Ulid> for $name {
            fn from(u: Ulid) -> Self {
                Self(u)
            }
        }
    };
}

ulid_newtype!(StreamId);
ulid_newtype!(TraceId);
ulid_newtype!(InterceptId);
