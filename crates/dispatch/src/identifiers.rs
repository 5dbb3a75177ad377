//! Newtype identifiers for webhook events.
//!
//! Every tag carried by a [`crate::WebhookEvent`] is a distinct newtype wrapping
//! a `String`. This prevents accidentally looking up a secret by an
//! [`EventType`] or deduplicating on an [`EventSource`] even though all three
//! are strings on the wire.
//!
//! Each identifier appears on the wire as a bare JSON string. Deserialisation
//! goes through the same non-empty check as [`EventId::new`], so an empty
//! string is a parse error rather than a valid identifier.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display, and the
// String conversions serde uses for the wire form.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
                    .ok_or_else(|| format!("{} must not be empty", stringify!($name)))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id! {
    /// Identifies one logical webhook event.
    ///
    /// Assigned by the sender (e.g. GitHub's `X-GitHub-Delivery`) and expected
    /// to be globally unique per logical event. Redeliveries of the same event
    /// reuse the identifier, which is what the deduplicator keys on.
    EventId
}

string_id! {
    /// Tags the origin system of an event (e.g. `"github"`, `"slack"`).
    ///
    /// Selects the shared secret used for signature verification and is
    /// available to handler predicates for routing.
    EventSource
}

string_id! {
    /// Tags the kind of event (e.g. `"push"`, `"pull_request"`).
    EventType
}
