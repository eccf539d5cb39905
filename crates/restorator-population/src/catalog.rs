//! Social group catalog.
//!
//! The catalog is loaded once with the starting snapshot and copied into
//! every year that follows; balancing never changes it. Construction
//! validates that ids are unique, shares are non-negative, and parent
//! chains resolve without cycles. Whether the catalog defines any primary group is checked
//! separately through [`SocialGroupCatalog::ensure_primary`], because an
//! empty partition is only fatal once someone tries to balance with it.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use restorator_types::{SocialGroup, SocialGroupId};

use crate::error::PopulationError;

/// A validated set of social groups keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocialGroupCatalog {
    groups: BTreeMap<SocialGroupId, SocialGroup>,
}

impl SocialGroupCatalog {
    /// Build a catalog from group descriptors.
    ///
    /// # Errors
    ///
    /// - [`PopulationError::DuplicateSocialGroup`] if two groups share an id.
    /// - [`PopulationError::NegativeShare`] if a default share is below zero.
    /// - [`PopulationError::InvalidParent`] if a parent is unknown, the
    ///   group names itself, or a chain of parents loops back on itself.
    pub fn new(groups: impl IntoIterator<Item = SocialGroup>) -> Result<Self, PopulationError> {
        let mut map = BTreeMap::new();
        for group in groups {
            if group.default_share < Decimal::ZERO {
                return Err(PopulationError::NegativeShare(group.id));
            }
            let id = group.id;
            if map.insert(id, group).is_some() {
                return Err(PopulationError::DuplicateSocialGroup(id));
            }
        }

        for group in map.values() {
            if let Some(parent) = group.parent {
                if parent == group.id || !map.contains_key(&parent) {
                    return Err(PopulationError::InvalidParent {
                        group: group.id,
                        parent,
                    });
                }
            }
        }

        for group in map.values() {
            check_parent_chain(&map, group)?;
        }

        Ok(Self { groups: map })
    }

    /// Look up a group by id.
    pub fn get(&self, id: SocialGroupId) -> Option<&SocialGroup> {
        self.groups.get(&id)
    }

    /// Return whether the group is primary.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::UnknownSocialGroup`] if the id is not in
    /// the catalog.
    pub fn is_primary(&self, id: SocialGroupId) -> Result<bool, PopulationError> {
        self.groups
            .get(&id)
            .map(|group| group.is_primary)
            .ok_or(PopulationError::UnknownSocialGroup(id))
    }

    /// Iterate over all groups in id order.
    pub fn groups(&self) -> impl Iterator<Item = &SocialGroup> {
        self.groups.values()
    }

    /// Iterate over the primary groups in id order.
    pub fn primary(&self) -> impl Iterator<Item = &SocialGroup> {
        self.groups.values().filter(|group| group.is_primary)
    }

    /// Iterate over the additional groups in id order.
    pub fn additional(&self) -> impl Iterator<Item = &SocialGroup> {
        self.groups.values().filter(|group| !group.is_primary)
    }

    /// Default shares of the primary groups, used to split a cohort that
    /// has no existing breakdown.
    pub fn primary_profile(&self) -> Vec<(SocialGroupId, Decimal)> {
        self.primary()
            .map(|group| (group.id, group.default_share))
            .collect()
    }

    /// Fail unless at least one primary group exists.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::NoPrimaryGroups`] for a catalog with no
    /// primary group.
    pub fn ensure_primary(&self) -> Result<(), PopulationError> {
        if self.primary().next().is_some() {
            Ok(())
        } else {
            Err(PopulationError::NoPrimaryGroups)
        }
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns `true` if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Follow the parents of `group` and fail if a group is seen twice.
fn check_parent_chain(
    map: &BTreeMap<SocialGroupId, SocialGroup>,
    group: &SocialGroup,
) -> Result<(), PopulationError> {
    let mut seen = BTreeSet::from([group.id]);
    let mut current = group;
    while let Some(parent) = current.parent {
        if !seen.insert(parent) {
            return Err(PopulationError::InvalidParent {
                group: current.id,
                parent,
            });
        }
        match map.get(&parent) {
            Some(next) => current = next,
            None => break,
        }
    }
    Ok(())
}
