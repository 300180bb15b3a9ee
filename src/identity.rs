//! Stable 64-bit identity hashing for call-tree nodes.
//!
//! `identity = parent_hash + local_hash`, `local_hash = line*10 + hash(key)`
//! (`spec.md` §4.4). The multiplication by 10 spaces line numbers so two
//! adjacent source lines sharing a key still land on distinct identities.
//! Collisions are tolerated: they only merge two distinct call sites into
//! one node, they never corrupt the tree.

/// Opaque 64-bit identity for a call-tree node.
///
/// Identity is a pure function of `(parent_hash, key, line)` — it never
/// depends on measured values, so two scopes with the same triple under the
/// same parent always map to the same node (`spec.md` §8).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(pub u64);

impl Identity {
    pub const ROOT: Identity = Identity(0);

    /// Compute the identity of a scope given its parent's identity.
    pub fn derive(parent: Identity, key: &str, line: u32) -> Identity {
        Identity(parent.0.wrapping_add(local_hash(key, line)))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Inverse of [`Identity`]'s `Display` impl. Used to restore an
    /// archive's `"identifier"` field back into an `Identity` when
    /// deserializing a [`crate::bundle::Bundle`].
    pub fn parse(s: &str) -> Option<Identity> {
        u64::from_str_radix(s, 16).ok().map(Identity)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// `line*10 + hash(key)`, per `spec.md` §4.4.
pub fn local_hash(key: &str, line: u32) -> u64 {
    (line as u64).wrapping_mul(10).wrapping_add(fnv1a(key))
}

/// FNV-1a 64-bit string hash. Stable across runs and platforms, which the
/// contract in §4.4 requires ("any stable 64-bit string hash") — hand
/// rolled rather than pulling a hashing crate, the same posture the teacher
/// takes with its own small ioctl/bit-twiddling helpers rather than reaching
/// for a crate to do a few lines of arithmetic.
pub fn fnv1a(s: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET_BASIS;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_pure_function_of_triple() {
        let parent = Identity(42);
        let a = Identity::derive(parent, "foo", 10);
        let b = Identity::derive(parent, "foo", 10);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_parents_give_distinct_identity() {
        let a = Identity::derive(Identity(1), "foo", 10);
        let b = Identity::derive(Identity(2), "foo", 10);
        assert_ne!(a, b);
    }

    #[test]
    fn adjacent_lines_same_key_differ() {
        let parent = Identity::ROOT;
        let a = Identity::derive(parent, "foo", 10);
        let b = Identity::derive(parent, "foo", 11);
        assert_ne!(a, b);
    }

    #[test]
    fn fnv1a_is_deterministic() {
        assert_eq!(fnv1a("foo"), fnv1a("foo"));
        assert_ne!(fnv1a("foo"), fnv1a("bar"));
    }

    #[test]
    fn parse_is_inverse_of_display() {
        let id = Identity::derive(Identity::ROOT, "foo", 10);
        assert_eq!(Identity::parse(&id.to_string()), Some(id));
    }
}
