//! # Graph Description
//!
//! A JSON-friendly description of a packed object list, for callers that
//! don't hold a live serializer: payloads travel base64-encoded, links as
//! plain records with defaulted attributes. This is designed to be easily
//! produced by a test harness, a fuzzer corpus, or a subsetter dumping its
//! pack stack for offline repacking.
//!
//! Objects are listed in reverse serialization order — the root table is
//! the *last* entry — and child indices refer to this list directly; the
//! nil sentinel the serializer contract expects is added back internally.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::RepackError;
use crate::graph::{Anchor, Link, OffsetWidth, PackedObject, Signedness};

/// A complete packed object list ready for repacking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphInput {
    /// Objects in reverse serialization order; the root comes last.
    pub objects: Vec<ObjectInput>,
}

/// One object: its payload bytes and outbound links.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInput {
    /// Base64-encoded payload bytes (standard alphabet, padded).
    pub data: String,
    #[serde(default)]
    pub links: Vec<LinkInput>,
}

/// One link record. Width, signedness, anchor, and bias all default to the
/// most common case in font tables: a narrow unsigned offset from the
/// parent's first byte, no bias.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInput {
    /// Index of the child within [`GraphInput::objects`].
    pub child: usize,
    /// Byte position of the offset field inside the parent's payload.
    pub position: usize,
    #[serde(default)]
    pub width: OffsetWidth,
    #[serde(default)]
    pub signedness: Signedness,
    #[serde(default)]
    pub anchor: Anchor,
    #[serde(default)]
    pub bias: u32,
}

impl GraphInput {
    /// Parse a description from JSON.
    pub fn from_json(json: &str) -> Result<GraphInput, RepackError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decode every payload into one contiguous backing buffer and rebuild
    /// the sentinel-prefixed packed list the repacker core consumes.
    ///
    /// Child indices are shifted up by one to account for the sentinel,
    /// undoing the adjustment the core applies on import.
    pub fn to_buffer_and_packed(&self) -> Result<(Vec<u8>, Vec<Option<PackedObject>>), RepackError> {
        let mut buffer = Vec::new();
        let mut packed: Vec<Option<PackedObject>> = Vec::with_capacity(self.objects.len() + 1);
        packed.push(None);

        for (i, object) in self.objects.iter().enumerate() {
            let head = buffer.len();
            let payload = base64::engine::general_purpose::STANDARD
                .decode(&object.data)
                .map_err(|e| {
                    RepackError::InvalidInput(format!("object {} payload is not valid base64: {}", i, e))
                })?;
            buffer.extend_from_slice(&payload);
            let tail = buffer.len();

            let links = object
                .links
                .iter()
                .map(|l| Link {
                    child: l.child + 1,
                    position: l.position,
                    width: l.width,
                    signedness: l.signedness,
                    anchor: l.anchor,
                    bias: l.bias,
                })
                .collect();

            packed.push(Some(PackedObject { head, tail, links }));
        }

        Ok((buffer, packed))
    }
}

// ─── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    fn b64(data: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(data)
    }

    #[test]
    fn test_description_round_trips_through_graph() {
        let input = GraphInput {
            objects: vec![
                ObjectInput {
                    data: b64(&[1, 2, 3, 4]),
                    links: vec![],
                },
                ObjectInput {
                    data: b64(&[0, 0, 9, 9]),
                    links: vec![LinkInput {
                        child: 0,
                        position: 0,
                        width: OffsetWidth::Narrow,
                        signedness: Signedness::Unsigned,
                        anchor: Anchor::Head,
                        bias: 0,
                    }],
                },
            ],
        };

        let (buffer, packed) = input.to_buffer_and_packed().unwrap();
        assert_eq!(buffer.len(), 8);
        assert!(packed[0].is_none());
        // The sentinel shift round-trips: JSON child 0 -> packed child 1 ->
        // graph child 0.
        let graph = Graph::from_packed(&buffer, &packed).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get(1).unwrap().links[0].child, 0);
        assert_eq!(graph.get(0).unwrap().data, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{
            "objects": [
                { "data": "AAAA" },
                { "data": "AAAAAA==", "links": [{ "child": 0, "position": 0 }] }
            ]
        }"#;
        let input = GraphInput::from_json(json).unwrap();
        let link = &input.objects[1].links[0];
        assert_eq!(link.width, OffsetWidth::Narrow);
        assert_eq!(link.signedness, Signedness::Unsigned);
        assert_eq!(link.anchor, Anchor::Head);
        assert_eq!(link.bias, 0);
    }

    #[test]
    fn test_json_explicit_attributes() {
        let json = r#"{
            "objects": [
                { "data": "AAAA" },
                { "data": "AAAAAAAA", "links": [{
                    "child": 0, "position": 2,
                    "width": "wide", "signedness": "signed",
                    "anchor": "tail", "bias": 4
                }] }
            ]
        }"#;
        let input = GraphInput::from_json(json).unwrap();
        let link = &input.objects[1].links[0];
        assert_eq!(link.width, OffsetWidth::Wide);
        assert_eq!(link.signedness, Signedness::Signed);
        assert_eq!(link.anchor, Anchor::Tail);
        assert_eq!(link.bias, 4);
    }

    #[test]
    fn test_bad_base64_is_invalid_input() {
        let json = r#"{ "objects": [{ "data": "not base64!!!" }] }"#;
        let input = GraphInput::from_json(json).unwrap();
        assert!(matches!(
            input.to_buffer_and_packed(),
            Err(RepackError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_malformed_json_gets_a_hint() {
        let err = GraphInput::from_json("{ not json").unwrap_err();
        match err {
            RepackError::ParseError { hint, .. } => assert!(!hint.is_empty()),
            other => panic!("expected ParseError, got {:?}", other),
        }
    }
}
