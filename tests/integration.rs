//! Integration tests for the repacking pipeline.
//!
//! These tests exercise the full path from a packed object list to the
//! patched output byte stream. They verify:
//! - Graph import drops the nil sentinel and keeps indices straight
//! - The Kahn order is kept when nothing overflows
//! - The shortest-distance fallback rescues narrow links
//! - Anchors and biases produce the right encoded values
//! - Unresolvable overflows surface through the sink's error channel

use base64::Engine;

use quoin::emit::StreamSink;
use quoin::error::RepackError;
use quoin::graph::{Anchor, Graph, Link, OffsetWidth, PackedObject, Signedness};
use quoin::{repack_json, resolve_overflows};

// ─── Helpers ────────────────────────────────────────────────────

fn narrow_link(child: usize, position: usize) -> Link {
    Link {
        child,
        position,
        width: OffsetWidth::Narrow,
        signedness: Signedness::Unsigned,
        anchor: Anchor::Head,
        bias: 0,
    }
}

fn obj(head: usize, tail: usize, links: Vec<Link>) -> Option<PackedObject> {
    Some(PackedObject { head, tail, links })
}

fn repack(buffer: &[u8], packed: &[Option<PackedObject>]) -> StreamSink {
    let mut sink = StreamSink::new();
    resolve_overflows(buffer, packed, &mut sink).unwrap();
    sink
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

// ─── Scenarios ──────────────────────────────────────────────────

#[test]
fn test_single_object_passes_through() {
    let buffer = *b"glyfdata";
    let packed = vec![obj(0, 8, vec![])];
    let sink = repack(&buffer, &packed);
    assert!(!sink.in_error());
    assert_eq!(sink.finish().unwrap(), b"glyfdata");
}

#[test]
fn test_three_object_chain_keeps_kahn_order() {
    // root -> a -> b, 10 bytes each, all narrow unsigned head offsets.
    // Nothing overflows, so the fallback sort must not disturb the layout.
    let buffer = [0x55u8; 30];
    let packed = vec![
        obj(0, 10, vec![]),
        obj(10, 20, vec![narrow_link(0, 0)]),
        obj(20, 30, vec![narrow_link(1, 0)]),
    ];
    let bytes = repack(&buffer, &packed).finish().unwrap();
    assert_eq!(bytes.len(), 30);
    assert_eq!(read_u16(&bytes, 0), 10); // root -> a
    assert_eq!(read_u16(&bytes, 10), 10); // a -> b
}

#[test]
fn test_nil_sentinel_is_dropped_and_compensated() {
    // The same chain, once with the serializer's nil sentinel in slot 0
    // (child indices shifted by one) and once without. The output must be
    // byte-identical; a missed adjustment would corrupt every offset.
    let buffer = [0x55u8; 30];
    let without = vec![
        obj(0, 10, vec![]),
        obj(10, 20, vec![narrow_link(0, 0)]),
        obj(20, 30, vec![narrow_link(1, 0)]),
    ];
    let with = vec![
        None,
        obj(0, 10, vec![]),
        obj(10, 20, vec![narrow_link(1, 0)]),
        obj(20, 30, vec![narrow_link(2, 0)]),
    ];
    let a = repack(&buffer, &without).finish().unwrap();
    let b = repack(&buffer, &with).finish().unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_narrow_overflow_is_rescued_by_distance_sort() {
    // Root points at a huge child X and a tiny child Y, both through
    // narrow unsigned links. The producer's order emits X first, pushing Y
    // past 2^16; the distance sort must pull Y in front of X.
    let x_len = 80_000;
    let buffer = vec![0u8; x_len + 10];
    let packed = vec![
        obj(0, x_len, vec![]),         // X
        obj(x_len, x_len + 4, vec![]), // Y
        obj(
            x_len + 4,
            x_len + 10,
            vec![narrow_link(0, 0), narrow_link(1, 2)],
        ),
    ];
    let sink = repack(&buffer, &packed);
    assert!(!sink.in_error());
    let bytes = sink.finish().unwrap();
    assert_eq!(bytes.len(), x_len + 10);
    // Stream: root(6), Y(4), X(80000).
    assert_eq!(read_u16(&bytes, 2), 6); // root -> Y, right behind the root
    assert_eq!(read_u16(&bytes, 0), 10); // root -> X, past Y
}

#[test]
fn test_unresolvable_overflow_reaches_the_sink() {
    // Two 70,000-byte children behind narrow links. Whatever the order,
    // the second child starts past 2^16; emission still completes and the
    // sink reports exactly one broken link.
    let buffer = vec![0u8; 140_008];
    let packed = vec![
        obj(0, 70_000, vec![]),
        obj(70_000, 140_000, vec![]),
        obj(
            140_000,
            140_008,
            vec![narrow_link(0, 0), narrow_link(1, 2)],
        ),
    ];
    let sink = repack(&buffer, &packed);
    assert!(sink.in_error());
    assert_eq!(sink.unresolved().len(), 1);
    assert!(matches!(
        sink.finish(),
        Err(RepackError::OverflowUnresolved { count: 1 })
    ));
}

#[test]
fn test_absolute_anchor_with_bias_writes_zero() {
    // Child placed at byte 100 of the stream, absolute anchor, bias 100:
    // the encoded field must be zero, not the raw position.
    let buffer = vec![0xFFu8; 104];
    let packed = vec![
        obj(100, 104, vec![]),
        obj(
            0,
            100,
            vec![Link {
                child: 0,
                position: 10,
                width: OffsetWidth::Narrow,
                signedness: Signedness::Signed,
                anchor: Anchor::Absolute,
                bias: 100,
            }],
        ),
    ];
    let bytes = repack(&buffer, &packed).finish().unwrap();
    assert_eq!(read_u16(&bytes, 10), 0);
}

#[test]
fn test_tail_anchor_measures_from_parent_end() {
    // Parent payload is 20 bytes; the child starts right where the parent
    // ends, so a tail-anchored offset encodes zero.
    let buffer = [0u8; 26];
    let packed = vec![
        obj(20, 26, vec![]),
        obj(
            0,
            20,
            vec![Link {
                child: 0,
                position: 4,
                width: OffsetWidth::Narrow,
                signedness: Signedness::Unsigned,
                anchor: Anchor::Tail,
                bias: 0,
            }],
        ),
    ];
    let bytes = repack(&buffer, &packed).finish().unwrap();
    assert_eq!(read_u16(&bytes, 4), 0);
}

#[test]
fn test_no_overflow_round_trip_preserves_encoded_offsets() {
    // The input payloads already carry the offsets the layout implies.
    // When nothing overflows, the output must decode to the same values —
    // and since the Kahn order of a chain is the producer's order, the
    // whole stream is byte-identical modulo object placement.
    let mut buffer = vec![0xABu8; 30];
    buffer[20..22].copy_from_slice(&10u16.to_be_bytes()); // root -> a
    buffer[10..12].copy_from_slice(&10u16.to_be_bytes()); // a -> b
    let packed = vec![
        obj(0, 10, vec![]),
        obj(10, 20, vec![narrow_link(0, 0)]),
        obj(20, 30, vec![narrow_link(1, 0)]),
    ];
    let bytes = repack(&buffer, &packed).finish().unwrap();
    let mut expected = Vec::new();
    expected.extend_from_slice(&buffer[20..30]); // root
    expected.extend_from_slice(&buffer[10..20]); // a
    expected.extend_from_slice(&buffer[0..10]); // b
    assert_eq!(bytes, expected);
}

#[test]
fn test_repack_is_deterministic() {
    let x_len = 80_000;
    let buffer = vec![0u8; x_len + 10];
    let packed = vec![
        obj(0, x_len, vec![]),
        obj(x_len, x_len + 4, vec![]),
        obj(
            x_len + 4,
            x_len + 10,
            vec![narrow_link(0, 0), narrow_link(1, 2)],
        ),
    ];
    let first = repack(&buffer, &packed).finish().unwrap();
    let second = repack(&buffer, &packed).finish().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_bias_underflow_reports_graph_indices_on_both_paths() {
    // Oracle path: the Kahn layout itself violates a bias, so the driver
    // fails before emission. The error names graph indices: root 1,
    // child 0.
    let buffer = [0u8; 14];
    let packed = vec![
        obj(0, 4, vec![]),
        obj(
            4,
            14,
            vec![Link {
                bias: 500,
                ..narrow_link(0, 0)
            }],
        ),
    ];
    let mut sink = StreamSink::new();
    let err = resolve_overflows(&buffer, &packed, &mut sink).unwrap_err();
    assert!(matches!(
        err,
        RepackError::OffsetUnderflow { parent: 1, child: 0 }
    ));

    // Sink path: under the producer's order Y sits 80,010 bytes out, well
    // past its 1000-byte bias, but the narrow link to it overflows and
    // forces the fallback sort. The distance sort pulls Y to byte 10,
    // under the bias, so the violation first exists during patch
    // resolution — and must name the same index space: root 2, Y 1.
    let x_len = 80_000;
    let buffer = vec![0u8; x_len + 14];
    let packed = vec![
        obj(0, x_len, vec![]),             // X
        obj(x_len, x_len + 4, vec![]),     // Y
        obj(
            x_len + 4,
            x_len + 14,
            vec![
                narrow_link(0, 0),
                narrow_link(1, 2),
                Link {
                    bias: 1000,
                    ..narrow_link(1, 4)
                },
            ],
        ),
    ];
    let sink = repack(&buffer, &packed);
    assert!(sink.in_error());
    assert!(matches!(
        sink.finish(),
        Err(RepackError::OffsetUnderflow { parent: 2, child: 1 })
    ));
}

#[test]
fn test_disconnected_graph_is_fatal() {
    let buffer = [0u8; 30];
    let packed = vec![
        obj(0, 10, vec![]),
        obj(10, 20, vec![]), // orphan: nothing links to it
        obj(20, 30, vec![narrow_link(0, 0)]),
    ];
    let mut sink = StreamSink::new();
    let err = resolve_overflows(&buffer, &packed, &mut sink).unwrap_err();
    assert!(matches!(err, RepackError::GraphStructure(_)));
}

#[test]
fn test_diamond_shares_a_single_child() {
    // root -> a, root -> b, a -> c, b -> c. The shared child c must be
    // emitted once and both offsets must land on it.
    let buffer = [0u8; 16];
    let packed = vec![
        obj(0, 2, vec![]),                   // c
        obj(2, 6, vec![narrow_link(0, 0)]),  // b
        obj(6, 10, vec![narrow_link(0, 0)]), // a
        obj(10, 16, vec![narrow_link(2, 0), narrow_link(1, 2)]),
    ];
    let bytes = repack(&buffer, &packed).finish().unwrap();
    assert_eq!(bytes.len(), 16);
    let a_at = read_u16(&bytes, 0) as usize;
    let b_at = read_u16(&bytes, 2) as usize;
    // Both parents sit somewhere in the stream, and both point at the
    // same single copy of c.
    let c_from_a = a_at + read_u16(&bytes, a_at) as usize;
    let c_from_b = b_at + read_u16(&bytes, b_at) as usize;
    assert_eq!(c_from_a, c_from_b);
    assert_eq!(c_from_a, 14); // the 2-byte c is the last object
}

#[test]
fn test_repack_json_end_to_end() {
    let json = format!(
        r#"{{
            "objects": [
                {{ "data": "{}" }},
                {{ "data": "{}", "links": [{{ "child": 0, "position": 0 }}] }}
            ]
        }}"#,
        b64(&[9, 9, 9, 9]),
        b64(&[0, 0, 1, 1])
    );
    let bytes = repack_json(&json).unwrap();
    // Root first: its 4 bytes, then the child's.
    assert_eq!(read_u16(&bytes, 0), 4);
    assert_eq!(&bytes[4..], &[9, 9, 9, 9]);
}

#[test]
fn test_repack_json_reports_parse_errors() {
    let err = repack_json("{ definitely not json").unwrap_err();
    assert!(matches!(err, RepackError::ParseError { .. }));
}

#[test]
fn test_invalid_child_index_is_rejected() {
    let buffer = [0u8; 10];
    let packed = vec![obj(0, 4, vec![]), obj(4, 10, vec![narrow_link(7, 0)])];
    let mut sink = StreamSink::new();
    let err = resolve_overflows(&buffer, &packed, &mut sink).unwrap_err();
    assert!(matches!(err, RepackError::InvalidInput(_)));
}

#[test]
fn test_graph_queries_survive_repacking() {
    // Structural queries agree before and after a sort reorders things.
    let buffer = [0u8; 16];
    let packed = vec![
        obj(0, 2, vec![]),
        obj(2, 6, vec![narrow_link(0, 0)]),
        obj(6, 10, vec![narrow_link(0, 0)]),
        obj(10, 16, vec![narrow_link(2, 0), narrow_link(1, 2)]),
    ];
    let mut graph = Graph::from_packed(&buffer, &packed).unwrap();
    let before: u32 = graph.incoming_edge_count().iter().sum();
    quoin::sort::sort_kahn(&mut graph).unwrap();
    let after: u32 = graph.incoming_edge_count().iter().sum();
    assert_eq!(before, after);
    assert!(graph.reachable_from_root().iter().all(|&r| r));
}
