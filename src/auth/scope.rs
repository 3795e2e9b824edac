//! Scope matching between a consumer's grants and a route's requirements.

use std::collections::BTreeSet;

use crate::auth::error::ScopeDenial;
use crate::types::Scope;

/// Match granted scopes against required scopes.
///
/// An empty set on either side is unrestricted. Otherwise at least one
/// granted scope must appear in the required set.
pub fn match_scopes(
    granted: &BTreeSet<Scope>,
    required: &BTreeSet<Scope>,
) -> Result<(), ScopeDenial> {
    if granted.is_empty() || required.is_empty() {
        return Ok(());
    }
    if granted.intersection(required).next().is_some() {
        return Ok(());
    }
    Err(ScopeDenial {
        granted: granted.clone(),
        required: required.clone(),
    })
}
