//! # Quoin
//!
//! A font-table offset repacker.
//!
//! Font container formats encode cross-table references as byte offsets
//! from an anchor point, often only 16 bits wide. A subsetter can produce a
//! perfectly valid object graph whose *serialization order* is still
//! wrong: place a child table too far from its parent and the offset no
//! longer fits its field. Recomputing the tables is expensive and
//! unnecessary — the bytes are fine, only the layout is not.
//!
//! Quoin is the wedge that locks the forme: it treats each table as an
//! opaque blob connected by typed offset links and searches for an
//! ordering of the blobs in which every offset is representable, then
//! re-emits the byte stream with the offsets patched.
//!
//! ## Architecture
//!
//! ```text
//! Packed object list (root last)
//!       ↓
//!   [graph]   — object graph: borrowed payload spans + typed links
//!       ↓
//!   [sort]    — Kahn first; shortest-distance fallback on overflow
//!       ↓
//!   [offset]  — oracle: would any offset exceed its field?
//!       ↓
//!   [emit]    — byte stream + deferred offset patches into a sink
//! ```
//!
//! Everything is single-threaded and allocation-light; payload bytes are
//! borrowed from the caller's buffer and copied exactly once, into the
//! output stream.

pub mod emit;
pub mod error;
pub mod graph;
pub mod model;
pub mod offset;
pub mod sort;

#[cfg(feature = "wasm")]
pub mod wasm;

use emit::{Sink, StreamSink};
use error::RepackError;
use graph::{Graph, PackedObject};

/// Repack a serialized object graph into the sink.
///
/// This is the primary entry point. `packed` is the serializer's object
/// stack in reverse serialization order (slot 0 may be the nil sentinel);
/// `buffer` is the byte buffer its payload anchors refer to.
///
/// The graph is Kahn-sorted first. If that layout would overflow any
/// offset field, a shortest-distance sort biased against narrow links is
/// tried instead, and the result is emitted unconditionally — the fallback
/// order may still leave some offsets unrepresentable, which the sink
/// records in its own error state for the caller to inspect.
pub fn resolve_overflows<S: Sink>(
    buffer: &[u8],
    packed: &[Option<PackedObject>],
    sink: &mut S,
) -> Result<(), RepackError> {
    let mut graph = Graph::from_packed(buffer, packed)?;
    sort::sort_kahn(&mut graph)?;
    if offset::will_overflow(&graph)? {
        sort::sort_shortest_distance(&mut graph)?;
    }
    emit::serialize(&graph, sink);
    Ok(())
}

/// Repack a graph described as JSON, returning the output byte stream.
///
/// Convenience wrapper over [`resolve_overflows`] with the built-in
/// [`StreamSink`]; fails if any offset remains unrepresentable after the
/// fallback sort.
pub fn repack_json(json: &str) -> Result<Vec<u8>, RepackError> {
    let input = model::GraphInput::from_json(json)?;
    let (buffer, packed) = input.to_buffer_and_packed()?;
    let mut sink = StreamSink::new();
    resolve_overflows(&buffer, &packed, &mut sink)?;
    sink.finish()
}
