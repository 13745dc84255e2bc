//! # Object Graph
//!
//! The in-memory form of a serialized font table: opaque byte payloads
//! connected by typed offset links. The upstream serializer hands us its
//! packed object stack in reverse serialization order — the root table sits
//! at the *end* of the list, leaves at the start — and every link records
//! where inside its parent's payload the encoded offset must eventually be
//! written.
//!
//! The graph owns the link metadata but borrows the payload bytes: each
//! object holds a slice into the serializer's buffer, so the buffer must
//! outlive the graph. Payloads are never copied until re-emission.
//!
//! ## Invariants
//! - The object sequence is a valid reverse topological order (every parent
//!   has a higher index than all of its children; the root is last).
//! - Every link's `child` names a valid object, and its offset field lies
//!   entirely inside the parent's payload.
//! - The graph is acyclic and fully connected from the root. Violations are
//!   not checked at construction; the sorts surface them as
//!   [`RepackError::GraphStructure`](crate::error::RepackError).

use serde::{Deserialize, Serialize};

use crate::error::RepackError;

// ─── Link Model ─────────────────────────────────────────────────

/// Byte width of an encoded offset field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetWidth {
    /// 16-bit field (2 bytes). The common case in font tables, and the one
    /// that overflows.
    Narrow,
    /// 32-bit field (4 bytes).
    Wide,
}

impl OffsetWidth {
    /// Size of the encoded field in bytes.
    pub fn bytes(self) -> usize {
        match self {
            OffsetWidth::Narrow => 2,
            OffsetWidth::Wide => 4,
        }
    }
}

impl Default for OffsetWidth {
    fn default() -> Self {
        OffsetWidth::Narrow
    }
}

/// Whether an encoded offset is interpreted as signed or unsigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signedness {
    Signed,
    Unsigned,
}

impl Default for Signedness {
    fn default() -> Self {
        Signedness::Unsigned
    }
}

/// The base point an offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    /// The parent object's first byte.
    Head,
    /// The parent object's one-past-last byte.
    Tail,
    /// Byte zero of the output stream.
    Absolute,
}

impl Default for Anchor {
    fn default() -> Self {
        Anchor::Head
    }
}

/// A directed, typed reference from a parent object to a child object.
///
/// The offset itself is not stored — it is a function of the final byte
/// layout and gets computed (and written) only at emission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Index of the child object within the graph.
    pub child: usize,
    /// Byte position of the offset field inside the parent's payload.
    pub position: usize,
    pub width: OffsetWidth,
    pub signedness: Signedness,
    pub anchor: Anchor,
    /// Constant subtracted from the raw offset before encoding. Used by
    /// formats that measure offsets past a fixed header. Guaranteed by the
    /// producer never to exceed the raw offset.
    pub bias: u32,
}

// ─── Objects ────────────────────────────────────────────────────

/// An object as handed over by the upstream serializer: a payload addressed
/// by `[head, tail)` byte anchors into the serializer's buffer, plus
/// outbound links.
#[derive(Debug, Clone)]
pub struct PackedObject {
    pub head: usize,
    pub tail: usize,
    pub links: Vec<Link>,
}

/// An object owned by the graph: the resolved payload slice and its links.
#[derive(Debug, Clone)]
pub struct Object<'a> {
    /// Payload bytes, borrowed from the serializer's buffer.
    pub data: &'a [u8],
    pub links: Vec<Link>,
}

// ─── Graph ──────────────────────────────────────────────────────

/// An ordered sequence of objects in reverse topological order.
///
/// Index `len() - 1` is the root (the first object in the final byte
/// stream); index 0 is emitted last.
#[derive(Debug, Clone)]
pub struct Graph<'a> {
    objects: Vec<Object<'a>>,
}

impl<'a> Graph<'a> {
    /// Build a graph from the serializer's packed object stack.
    ///
    /// `packed` is in reverse serialization order. When the stack came out
    /// of a serialization buffer its first slot is the nil object (`None`);
    /// it is dropped here and every link's child index is shifted down by
    /// one to compensate.
    ///
    /// Validates payload anchors against `buffer`, offset field positions
    /// against their parent payloads, and child indices against the final
    /// object count.
    pub fn from_packed(
        buffer: &'a [u8],
        packed: &[Option<PackedObject>],
    ) -> Result<Graph<'a>, RepackError> {
        let removed_nil = matches!(packed.first(), Some(None));
        let skip = if removed_nil { 1 } else { 0 };
        let count = packed.len() - skip;

        let mut objects = Vec::with_capacity(count);
        for (i, slot) in packed.iter().enumerate().skip(skip) {
            let obj = slot.as_ref().ok_or_else(|| {
                RepackError::InvalidInput(format!("object {} is nil (only slot 0 may be)", i))
            })?;

            if obj.head > obj.tail || obj.tail > buffer.len() {
                return Err(RepackError::InvalidInput(format!(
                    "object {} has inconsistent payload anchors [{}, {}) in a {}-byte buffer",
                    i,
                    obj.head,
                    obj.tail,
                    buffer.len()
                )));
            }
            let data = &buffer[obj.head..obj.tail];

            let mut links = Vec::with_capacity(obj.links.len());
            for link in &obj.links {
                if link.position + link.width.bytes() > data.len() {
                    return Err(RepackError::InvalidInput(format!(
                        "link field at byte {} overruns object {} ({} bytes)",
                        link.position,
                        i,
                        data.len()
                    )));
                }
                if removed_nil && link.child == 0 {
                    return Err(RepackError::InvalidInput(format!(
                        "link on object {} targets the nil sentinel",
                        i
                    )));
                }
                let child = link.child - skip;
                if child >= count {
                    return Err(RepackError::InvalidInput(format!(
                        "link on object {} targets out-of-range child {}",
                        i, link.child
                    )));
                }
                links.push(Link { child, ..*link });
            }

            objects.push(Object { data, links });
        }

        Ok(Graph { objects })
    }

    /// Number of objects in the graph.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Index of the root object (highest index, first in the byte stream).
    pub fn root(&self) -> usize {
        self.objects.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Object<'a>> {
        self.objects.get(index)
    }

    /// All objects in current (reverse topological) index order.
    pub fn objects(&self) -> &[Object<'a>] {
        &self.objects
    }

    /// Count of incoming links per object, indexed by object.
    ///
    /// Objects with no referrers get an explicit zero entry. Parallel links
    /// between the same pair contribute one count each, which is what the
    /// sorts' decrement bookkeeping needs.
    pub fn incoming_edge_count(&self) -> Vec<u32> {
        let mut counts = vec![0u32; self.objects.len()];
        for obj in &self.objects {
            for link in &obj.links {
                counts[link.child] += 1;
            }
        }
        counts
    }

    /// Which objects can be reached by following links from the root.
    ///
    /// Anything unreachable is an orphan; both sorts reject such graphs.
    pub fn reachable_from_root(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.objects.len()];
        if self.objects.is_empty() {
            return reachable;
        }
        let mut stack = vec![self.root()];
        reachable[self.root()] = true;
        while let Some(index) = stack.pop() {
            for link in &self.objects[index].links {
                if !reachable[link.child] {
                    reachable[link.child] = true;
                    stack.push(link.child);
                }
            }
        }
        reachable
    }

    /// Reorder the graph so that `new_order[k]` becomes the object at index
    /// `k`, rewriting every link's child index to match.
    ///
    /// `new_order` must be a permutation of `0..len()`; anything else means
    /// a sort produced a broken ordering and is reported as a structure
    /// error.
    pub fn apply_permutation(&mut self, new_order: &[usize]) -> Result<(), RepackError> {
        if new_order.len() != self.objects.len() {
            return Err(RepackError::GraphStructure(format!(
                "permutation covers {} of {} objects",
                new_order.len(),
                self.objects.len()
            )));
        }

        let mut remap = vec![usize::MAX; self.objects.len()];
        for (new_index, &old_index) in new_order.iter().enumerate() {
            if old_index >= remap.len() || remap[old_index] != usize::MAX {
                return Err(RepackError::GraphStructure(format!(
                    "permutation entry {} is out of range or repeated",
                    old_index
                )));
            }
            remap[old_index] = new_index;
        }

        let mut slots: Vec<Option<Object<'a>>> =
            std::mem::take(&mut self.objects).into_iter().map(Some).collect();
        let mut reordered = Vec::with_capacity(slots.len());
        for &old_index in new_order {
            let mut obj = slots[old_index].take().expect("checked permutation");
            for link in &mut obj.links {
                link.child = remap[link.child];
            }
            reordered.push(obj);
        }
        self.objects = reordered;
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────
