//! # Overflow Oracle
//!
//! Pure offset arithmetic over a candidate layout: given the graph's
//! current order, where does every object land in the byte stream, what
//! signed distance would each link encode, and does that distance fit the
//! link's declared width and signedness?
//!
//! All intermediate arithmetic is 64-bit signed. Encoded offsets are only
//! narrowed to their field width at emission time, after these checks.

use crate::error::RepackError;
use crate::graph::{Anchor, Graph, Link, OffsetWidth, Signedness};

/// One link whose encoded offset does not fit its field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overflow {
    /// Graph index of the parent object carrying the link.
    pub parent: usize,
    /// Graph index of the link's child.
    pub child: usize,
    /// The offset that would have been encoded (bias already subtracted).
    pub offset: i64,
}

/// Start and end byte positions of every object under the current order.
///
/// Emission walks the graph from the highest index down, so the root is at
/// byte zero and index 0 lands last.
pub fn object_positions(graph: &Graph) -> (Vec<i64>, Vec<i64>) {
    let mut start = vec![0i64; graph.len()];
    let mut end = vec![0i64; graph.len()];
    let mut current = 0i64;
    for index in (0..graph.len()).rev() {
        start[index] = current;
        current += graph.objects()[index].data.len() as i64;
        end[index] = current;
    }
    (start, end)
}

/// The offset a link would encode: child start measured from the link's
/// anchor, minus the link's bias.
///
/// Errors with [`RepackError::OffsetUnderflow`] if the bias exceeds the
/// raw offset — the producer guarantees that never happens for layouts it
/// generated, so it means the input graph is broken.
pub fn compute_offset(
    parent: usize,
    link: &Link,
    start: &[i64],
    end: &[i64],
) -> Result<i64, RepackError> {
    let offset = match link.anchor {
        Anchor::Head => start[link.child] - start[parent],
        Anchor::Tail => start[link.child] - end[parent],
        Anchor::Absolute => start[link.child],
    };
    if offset < link.bias as i64 {
        return Err(RepackError::OffsetUnderflow {
            parent,
            child: link.child,
        });
    }
    Ok(offset - link.bias as i64)
}

/// Whether an encoded offset is representable in the given field.
pub fn offset_fits(offset: i64, width: OffsetWidth, signedness: Signedness) -> bool {
    match (signedness, width) {
        (Signedness::Signed, OffsetWidth::Wide) => {
            offset >= -(1i64 << 31) && offset < (1i64 << 31)
        }
        (Signedness::Signed, OffsetWidth::Narrow) => {
            offset >= -(1i64 << 15) && offset < (1i64 << 15)
        }
        (Signedness::Unsigned, OffsetWidth::Wide) => offset >= 0 && offset < (1i64 << 32),
        (Signedness::Unsigned, OffsetWidth::Narrow) => offset >= 0 && offset < (1i64 << 16),
    }
}

/// Would any link overflow its field if the graph were emitted as-is?
///
/// Stops at the first failing link.
pub fn will_overflow(graph: &Graph) -> Result<bool, RepackError> {
    let (start, end) = object_positions(graph);
    for (parent, object) in graph.objects().iter().enumerate() {
        for link in &object.links {
            let offset = compute_offset(parent, link, &start, &end)?;
            if !offset_fits(offset, link.width, link.signedness) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Every link that would overflow under the current order.
///
/// [`will_overflow`] answers yes/no for the driver; callers layering
/// further strategies (duplication, splitting, extension promotion) need
/// the full list to decide what to attack next.
pub fn overflows(graph: &Graph) -> Result<Vec<Overflow>, RepackError> {
    let (start, end) = object_positions(graph);
    let mut found = Vec::new();
    for (parent, object) in graph.objects().iter().enumerate() {
        for link in &object.links {
            let offset = compute_offset(parent, link, &start, &end)?;
            if !offset_fits(offset, link.width, link.signedness) {
                found.push(Overflow {
                    parent,
                    child: link.child,
                    offset,
                });
            }
        }
    }
    Ok(found)
}

// ─── Tests ──────────────────────────────────────────────────────
