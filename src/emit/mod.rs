//! # Re-emission
//!
//! Walks a sorted graph root-first and replays it into a serialization
//! sink: payload bytes are copied verbatim, every offset field is zeroed,
//! and each link is registered as a deferred patch. The sink writes the
//! actual offset values once every object's final position is known — the
//! repacker core never encodes an offset byte itself.
//!
//! The sink numbers objects the way the serializer's pack stack does:
//! index 0 is a reserved nil object, and real indices count from the tail
//! of the stream — the last object pushed is index 1. The graph's child
//! indices line up with that numbering after adding one, which is why
//! [`serialize`] registers every link against `child + 1`. Forgetting that
//! adjustment would corrupt every link in the output, so it lives in
//! exactly one place.
//!
//! [`StreamSink`] is the built-in in-memory sink: it collects object
//! frames into a byte vector and patches the offset fields in place at
//! [`end`](Sink::end), the same collect-then-patch shape as a PDF writer
//! fixing up its xref table.

use crate::error::RepackError;
use crate::graph::{Anchor, Graph, OffsetWidth, Signedness};
use crate::offset::offset_fits;

// ─── Sink Contract ──────────────────────────────────────────────

/// Reference to an offset field inside the object frame currently open on
/// the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef {
    /// Byte position of the field within the frame.
    pub position: usize,
    pub width: OffsetWidth,
    pub signedness: Signedness,
}

/// A serialization sink that accepts raw bytes now and offset patches
/// later.
pub trait Sink {
    /// Start a new top-level emission.
    fn begin(&mut self);
    /// Open a new object frame.
    fn push_object(&mut self);
    /// Reserve `n` zeroed bytes in the current frame and hand them back
    /// for the payload copy.
    fn allocate_bytes(&mut self, n: usize) -> &mut [u8];
    /// Declare a deferred offset patch from a field in the current frame
    /// to the object numbered `target` (sink numbering, nil = 0).
    fn register_link(&mut self, field: FieldRef, target: usize, anchor: Anchor, bias: u32);
    /// Close the current object frame. `no_dedup` asks the sink not to
    /// merge this object with an identical one it may already hold.
    fn pop_object(&mut self, no_dedup: bool);
    /// Finalize the emission and resolve every registered patch.
    fn end(&mut self);
}

/// Replay the graph into a sink, root first.
pub fn serialize<S: Sink>(graph: &Graph, sink: &mut S) {
    sink.begin();
    for index in (0..graph.len()).rev() {
        let object = &graph.objects()[index];
        sink.push_object();

        let dst = sink.allocate_bytes(object.data.len());
        dst.copy_from_slice(object.data);
        // Zero every offset field so stale payload bytes can't leak into
        // the output if a patch is never resolved.
        for link in &object.links {
            let field = &mut dst[link.position..link.position + link.width.bytes()];
            field.fill(0);
        }

        for link in &object.links {
            sink.register_link(
                FieldRef {
                    position: link.position,
                    width: link.width,
                    signedness: link.signedness,
                },
                link.child + 1,
                link.anchor,
                link.bias,
            );
        }
        sink.pop_object(true);
    }
    sink.end();
}

// ─── In-memory Sink ─────────────────────────────────────────────

/// A link whose final offset did not fit its field.
///
/// Indices are reported in the graph's convention (sink index minus one,
/// root highest) so they line up with what the overflow oracle reports for
/// the same objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedLink {
    /// Graph index of the object carrying the field.
    pub parent: usize,
    /// Graph index of the link's target.
    pub target: usize,
    /// The offset that was required (bias already subtracted).
    pub offset: i64,
}

#[derive(Debug, Clone)]
struct RegisteredLink {
    field: FieldRef,
    target: usize,
    anchor: Anchor,
    bias: u32,
}

#[derive(Debug, Clone)]
struct ObjectFrame {
    head: usize,
    tail: usize,
    links: Vec<RegisteredLink>,
}

/// In-memory [`Sink`]: a growing byte vector plus a patch list resolved at
/// [`end`](Sink::end).
///
/// Errors don't abort emission; they accumulate in the sink's own state.
/// [`finish`](StreamSink::finish) turns that state into a `Result`, so no
/// caller can mistake a stream with broken offsets for valid output.
#[derive(Debug, Default)]
pub struct StreamSink {
    out: Vec<u8>,
    /// Stack of open frames (start offset + links registered so far).
    open: Vec<ObjectFrame>,
    /// Closed frames in push order. Sink indices count from the tail:
    /// the frame at push position `j` has index `closed.len() - j`.
    closed: Vec<ObjectFrame>,
    unresolved: Vec<UnresolvedLink>,
    underflow: Option<(usize, usize)>,
    bad_target: Option<usize>,
}

impl StreamSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any patch failed to resolve cleanly.
    pub fn in_error(&self) -> bool {
        !self.unresolved.is_empty() || self.underflow.is_some() || self.bad_target.is_some()
    }

    /// Links whose offsets still don't fit their fields.
    pub fn unresolved(&self) -> &[UnresolvedLink] {
        &self.unresolved
    }

    /// The emitted bytes, regardless of error state. Offset fields of
    /// unresolved links hold truncated values; check
    /// [`in_error`](StreamSink::in_error) or use [`finish`](StreamSink::finish).
    pub fn bytes(&self) -> &[u8] {
        &self.out
    }

    /// Consume the sink, returning the byte stream only if every offset
    /// was representable.
    pub fn finish(self) -> Result<Vec<u8>, RepackError> {
        if let Some(target) = self.bad_target {
            return Err(RepackError::InvalidInput(format!(
                "patch targets unknown object {}",
                target
            )));
        }
        if let Some((parent, child)) = self.underflow {
            return Err(RepackError::OffsetUnderflow { parent, child });
        }
        if !self.unresolved.is_empty() {
            return Err(RepackError::OverflowUnresolved {
                count: self.unresolved.len(),
            });
        }
        Ok(self.out)
    }

    /// Sink index of the frame at `push_position`, counting from the tail
    /// of the stream.
    fn index_of_position(&self, push_position: usize) -> usize {
        self.closed.len() - push_position
    }

    fn resolve_patches(&mut self) {
        let total = self.closed.len();
        for position in 0..total {
            // Error records subtract the sentinel back out so they name the
            // same graph indices the overflow oracle would.
            let parent_index = self.index_of_position(position) - 1;
            let (head, tail) = (self.closed[position].head, self.closed[position].tail);
            let links = std::mem::take(&mut self.closed[position].links);
            for link in &links {
                if link.target == 0 || link.target > total {
                    self.bad_target = Some(link.target);
                    continue;
                }
                let target_head = self.closed[total - link.target].head as i64;
                let base = match link.anchor {
                    Anchor::Head => head as i64,
                    Anchor::Tail => tail as i64,
                    Anchor::Absolute => 0,
                };
                let raw = target_head - base;
                if raw < link.bias as i64 {
                    self.underflow.get_or_insert((parent_index, link.target - 1));
                    continue;
                }
                let encoded = raw - link.bias as i64;

                let at = head + link.field.position;
                match link.field.width {
                    OffsetWidth::Narrow => {
                        self.out[at..at + 2].copy_from_slice(&(encoded as u16).to_be_bytes())
                    }
                    OffsetWidth::Wide => {
                        self.out[at..at + 4].copy_from_slice(&(encoded as u32).to_be_bytes())
                    }
                }
                if !offset_fits(encoded, link.field.width, link.field.signedness) {
                    self.unresolved.push(UnresolvedLink {
                        parent: parent_index,
                        target: link.target - 1,
                        offset: encoded,
                    });
                }
            }
            self.closed[position].links = links;
        }
    }
}

impl Sink for StreamSink {
    fn begin(&mut self) {
        self.out.clear();
        self.open.clear();
        self.closed.clear();
        self.unresolved.clear();
        self.underflow = None;
        self.bad_target = None;
    }

    fn push_object(&mut self) {
        self.open.push(ObjectFrame {
            head: self.out.len(),
            tail: self.out.len(),
            links: Vec::new(),
        });
    }

    fn allocate_bytes(&mut self, n: usize) -> &mut [u8] {
        let start = self.out.len();
        self.out.resize(start + n, 0);
        if let Some(frame) = self.open.last_mut() {
            frame.tail = start + n;
        }
        &mut self.out[start..]
    }

    fn register_link(&mut self, field: FieldRef, target: usize, anchor: Anchor, bias: u32) {
        if let Some(frame) = self.open.last_mut() {
            frame.links.push(RegisteredLink {
                field,
                target,
                anchor,
                bias,
            });
        }
    }

    fn pop_object(&mut self, _no_dedup: bool) {
        if let Some(mut frame) = self.open.pop() {
            frame.tail = self.out.len();
            self.closed.push(frame);
        }
    }

    fn end(&mut self) {
        debug_assert!(self.open.is_empty(), "unbalanced push_object/pop_object");
        self.resolve_patches();
    }
}

// ─── Tests ──────────────────────────────────────────────────────
