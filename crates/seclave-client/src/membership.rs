//! Versioned room membership.
//!
//! The membership set is the single input (besides the room code) to
//! room key derivation, so it is an explicit, versioned collection: every
//! mutation bumps the version, and the derived key records which version
//! it reflects. Updates arriving out of order are detected by version,
//! never silently applied.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use seclave_crypto::PublicKeyRecord;

/// One room member: a username bound to exactly one public key record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Display name, unique within the room.
    pub username: String,
    /// The member's exported public key.
    pub public_key: PublicKeyRecord,
}

/// Sorted, versioned set of the public keys currently in the room.
///
/// Keys are ordered by their text encoding (the derivation sort order).
/// Mutated only by the session on approve/leave/update events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipSet {
    members: BTreeMap<PublicKeyRecord, String>,
    version: u64,
}

impl MembershipSet {
    /// A set containing only the founding member, at version 1.
    pub fn founding(member: Member) -> Self {
        let mut members = BTreeMap::new();
        members.insert(member.public_key, member.username);
        Self { members, version: 1 }
    }

    /// Rebuild from a published membership list at an authoritative
    /// version (joiner applying the owner's announcement).
    ///
    /// Duplicate keys collapse; the last username wins, matching how the
    /// relay republishes full snapshots.
    pub fn from_update(members: Vec<Member>, version: u64) -> Self {
        let members = members.into_iter().map(|m| (m.public_key, m.username)).collect();
        Self { members, version }
    }

    /// Version of this set. Bumped on every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if no members remain.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check whether a public key belongs to the room.
    pub fn contains(&self, key: &PublicKeyRecord) -> bool {
        self.members.contains_key(key)
    }

    /// Add a member, bumping the version.
    ///
    /// Returns `false` (and leaves the set untouched) if the key is
    /// already present - membership never double-adds.
    pub fn insert(&mut self, member: Member) -> bool {
        if self.members.contains_key(&member.public_key) {
            return false;
        }
        self.members.insert(member.public_key, member.username);
        self.version += 1;
        true
    }

    /// Remove a member by public key, bumping the version.
    ///
    /// Returns `false` if the key was not present.
    pub fn remove(&mut self, key: &PublicKeyRecord) -> bool {
        if self.members.remove(key).is_none() {
            return false;
        }
        self.version += 1;
        true
    }

    /// Sorted public keys, the exact derivation input.
    pub fn keys(&self) -> Vec<PublicKeyRecord> {
        self.members.keys().cloned().collect()
    }

    /// Full membership in sorted-key order, for publication.
    pub fn to_members(&self) -> Vec<Member> {
        self.members
            .iter()
            .map(|(key, name)| Member { username: name.clone(), public_key: key.clone() })
            .collect()
    }

    /// Username bound to a key, if the key is a member.
    pub fn username_for(&self, key: &PublicKeyRecord) -> Option<&str> {
        self.members.get(key).map(String::as_str)
    }
}
