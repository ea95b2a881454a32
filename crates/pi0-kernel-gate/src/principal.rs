//! The fixed universe of known principals.

use std::collections::BTreeSet;
use std::sync::Arc;

use pi0_kernel_core::Principal;

/// A finite, immutable set of principals. Cheap to clone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrincipalSet(Arc<BTreeSet<Principal>>);

impl PrincipalSet {
    pub fn new<I, P>(principals: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Principal>,
    {
        Self(Arc::new(principals.into_iter().map(Into::into).collect()))
    }

    pub fn contains(&self, principal: &Principal) -> bool {
        self.0.contains(principal)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Principal> {
        self.0.iter()
    }
}

impl<P: Into<Principal>> FromIterator<P> for PrincipalSet {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self::new(iter)
    }
}
