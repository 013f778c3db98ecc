//! Per-object version chains

use offchain_core::{ObjectId, OffChainObject, Party};

/// One version of an object and the sequence position that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub object: OffChainObject,
    pub author: Party,
    pub offset: u64,
}

/// Versions `1..=head` of one object.
///
/// `links[i]` holds version `i + 1`. Local pending links may sit on top of
/// confirmed ones; they are the only links that can be rolled back.
#[derive(Debug, Clone)]
pub struct ObjectChain {
    object_id: ObjectId,
    links: Vec<Link>,
}

impl ObjectChain {
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            links: Vec::new(),
        }
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    pub fn head(&self) -> Option<&Link> {
        self.links.last()
    }

    /// Head version, 0 when the object does not exist
    pub fn version(&self) -> u64 {
        self.links.len() as u64
    }

    /// Link holding `version` (1-based)
    pub fn at_version(&self, version: u64) -> Option<&Link> {
        let index = usize::try_from(version.checked_sub(1)?).ok()?;
        self.links.get(index)
    }

    /// Links holding versions greater than `version`
    pub fn after(&self, version: u64) -> &[Link] {
        let start = usize::try_from(version)
            .unwrap_or(usize::MAX)
            .min(self.links.len());
        &self.links[start..]
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub(crate) fn push(&mut self, link: Link) {
        debug_assert_eq!(link.object.version, self.version() + 1);
        self.links.push(link);
    }

    /// Drop every link above `version`, returning them oldest first
    pub(crate) fn truncate_to(&mut self, version: u64) -> Vec<Link> {
        let keep = usize::try_from(version)
            .unwrap_or(usize::MAX)
            .min(self.links.len());
        self.links.split_off(keep)
    }
}
