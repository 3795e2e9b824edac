//! NewType wrappers for the identifiers that flow through the auth pipeline.
//!
//! Session ids, consumer ids and scopes are all strings on the wire; keeping
//! them apart in the type system stops a consumer id from being looked up as a
//! session (or the reverse).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Identifier of a server-tracked session.
    ///
    /// Carried as the `jti` claim of the signed session token and used as the
    /// key for both the session store and the anti-forgery cache.
    SessionId
);

newtype_string!(
    /// Identifier of a consumer (the identity a session belongs to).
    ConsumerId
);

newtype_string!(
    /// A named capability, e.g. `build:write`.
    Scope
);

newtype_string!(
    /// Resource key a route operates on (e.g. `project/ABC`).
    ///
    /// Set on the route definition and used by the permission checker to
    /// look up per-resource grants.
    ResourceKey
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_newtype_roundtrip() {
        let id = SessionId::new("abc");
        assert_eq!(id.as_str(), "abc");
        assert_eq!(id.to_string(), "abc");
        assert_eq!(id.clone().into_inner(), "abc".to_string());
        assert_eq!(SessionId::from("abc"), id);
    }

    #[test]
    fn test_scope_serializes_transparently() {
        let scope = Scope::new("build:write");
        let json = serde_json::to_string(&scope).unwrap();
        assert_eq!(json, "\"build:write\"");
    }

    #[test]
    fn test_scope_set_lookup_by_str() {
        let scopes: BTreeSet<Scope> = [Scope::new("a"), Scope::new("b")].into_iter().collect();
        assert!(scopes.contains("a"));
        assert!(!scopes.contains("c"));
    }
}
