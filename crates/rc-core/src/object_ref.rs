//! Weak references to live engine objects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RcError;

/// Prefix of the textual object-reference token (`@ref:<Type>:<id>`).
pub const TOKEN_PREFIX: &str = "@ref:";

/// Opaque identifier + type tag for a live engine object.
///
/// Carries no ownership. The object behind it can be destroyed at any time;
/// that is only detected when the reference is next used on the engine
/// thread, which reports [`RcError::StaleReference`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Engine class name (e.g. `PointLight`).
    pub class: String,
    /// Engine-assigned numeric identity, never reused within a process.
    pub id: u64,
}

impl ObjectRef {
    /// Create a reference.
    pub fn new(class: impl Into<String>, id: u64) -> Self {
        Self {
            class: class.into(),
            id,
        }
    }

    /// Stable string token used on the wire: `@ref:<class>:<id>`.
    pub fn token(&self) -> String {
        format!("{TOKEN_PREFIX}{}:{}", self.class, self.id)
    }

    /// Parse a wire token produced by [`ObjectRef::token`].
    pub fn parse_token(token: &str) -> Result<Self, RcError> {
        let body = token
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| RcError::malformed(format!("'{token}' is not an object reference")))?;
        let (class, id) = body
            .rsplit_once(':')
            .ok_or_else(|| RcError::malformed(format!("object reference '{token}' has no id")))?;
        if class.is_empty() {
            return Err(RcError::malformed(format!(
                "object reference '{token}' has an empty class"
            )));
        }
        let id = id
            .parse::<u64>()
            .map_err(|_| RcError::malformed(format!("object reference '{token}' has a bad id")))?;
        Ok(Self::new(class, id))
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class, self.id)
    }
}

impl FromStr for ObjectRef {
    type Err = RcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_token(s)
    }
}
