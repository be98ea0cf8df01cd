//! Forward pass against a store-backed reference cycle.
//!
//! A -> B -> C -> A, stored by identifier. A TestDocument lists [A, B, C].
//! Following is bounded by depth only: every branch walks the cycle on its own
//! counter, so each record is rendered once per depth level per branch.

mod common;

use common::{codec_with, init_tracing, rendered_depths, RecordingStore};
use pretty_assertions::assert_eq;
use refjson::{
    CodecError, EncodeOptions, FieldKind, MemoryDocumentStore, ObjectId, Record, Reference,
    ReferenceSpec, Value,
};
use serde_json::json;
use std::sync::Arc;

struct Cycle {
    store: Arc<RecordingStore>,
    ids: [ObjectId; 3],
    document: Record,
}

fn cycle() -> Cycle {
    let ids = [ObjectId::new(), ObjectId::new(), ObjectId::new()];
    let names = ["A", "B", "C"];
    let records = (0..3).map(|i| {
        Record::new("SelfReference")
            .with_id(ids[i])
            .with("name", names[i])
            .with("reference", Reference::Id(ids[(i + 1) % 3]))
    });
    let store = Arc::new(RecordingStore::with_records(records));
    let document = Record::new("TestDocument")
        .with("title", "cycle")
        .with(
            "references",
            ids.iter().map(|id| Value::reference_to(*id)).collect::<Vec<_>>(),
        );
    Cycle {
        store,
        ids,
        document,
    }
}

/// max_depth = 3 renders each cycle member exactly 3 times.
#[test]
fn cycle_followed_three_deep() {
    init_tracing();
    let Cycle {
        store,
        ids,
        document,
    } = cycle();
    let codec = codec_with(store.clone());

    let json = codec
        .to_json(&document, &EncodeOptions::following(3))
        .unwrap();

    for name in ["A", "B", "C"] {
        assert_eq!(rendered_depths(&json, name), vec![1, 2, 3], "record {name}");
    }
    for id in &ids {
        assert_eq!(store.lookups_of(id), 3);
    }
}

/// max_depth = 15 renders each cycle member exactly 15 times.
#[test]
fn cycle_followed_fifteen_deep() {
    let Cycle {
        store,
        ids,
        document,
    } = cycle();
    let codec = codec_with(store.clone());

    let json = codec
        .to_json(&document, &EncodeOptions::following(15))
        .unwrap();

    for name in ["A", "B", "C"] {
        assert_eq!(rendered_depths(&json, name), (1..=15).collect::<Vec<_>>());
    }
    for id in &ids {
        assert_eq!(store.lookups_of(id), 15);
    }
    assert_eq!(store.total_lookups(), 45);
}

#[test]
fn hop_past_budget_is_bare_id() {
    let Cycle {
        store,
        ids,
        document,
    } = cycle();
    let codec = codec_with(store);

    let json = codec
        .to_json(&document, &EncodeOptions::following(1))
        .unwrap();
    let tagged = |id: ObjectId| json!({"$type": "objectId", "value": id.to_hex()});

    assert_eq!(
        json,
        json!({
            "title": "cycle",
            "references": [
                {"_id": tagged(ids[0]), "name": "A", "reference": tagged(ids[1])},
                {"_id": tagged(ids[1]), "name": "B", "reference": tagged(ids[2])},
                {"_id": tagged(ids[2]), "name": "C", "reference": tagged(ids[0])},
            ]
        })
    );
}

#[test]
fn no_follow_by_default() {
    let Cycle {
        store,
        ids,
        document,
    } = cycle();
    let codec = codec_with(store.clone());

    for max_depth in [1, 3, 15] {
        let options = EncodeOptions {
            max_depth,
            ..EncodeOptions::default()
        };
        let json = codec.to_json(&document, &options).unwrap();
        let refs: Vec<_> = ids
            .iter()
            .map(|id| json!({"$type": "objectId", "value": id.to_hex()}))
            .collect();
        assert_eq!(json["references"], json!(refs));
    }
    assert_eq!(store.total_lookups(), 0);
}

#[test]
fn unsaved_reference_requires_id() {
    let codec = codec_with(Arc::new(MemoryDocumentStore::new()));
    let document = Record::new("TestDocument").with(
        "references",
        vec![Value::from(Reference::from(
            Record::new("SelfReference").with("name", "draft"),
        ))],
    );

    let err = codec
        .to_json(&document, &EncodeOptions::default())
        .unwrap_err();
    match err {
        CodecError::MissingIdentifier { path, doc_type } => {
            assert_eq!(path.to_string(), "references[0]");
            assert_eq!(doc_type, "SelfReference");
        }
        other => panic!("expected MissingIdentifier, got {other:?}"),
    }
}

#[test]
fn unsaved_reference_without_id_check_renders_inline() {
    let registry = refjson::MemorySchemaRegistry::new()
        .with(refjson::DocumentSchema::new("Draft").field(
            "parent",
            FieldKind::Reference(ReferenceSpec::new("Draft").with_id_check(false)),
        ))
        .unwrap();
    let codec = refjson::DocumentCodec::new(
        Arc::new(registry),
        Arc::new(MemoryDocumentStore::new()),
    );
    let draft = Record::new("Draft").with("parent", Reference::from(Record::new("Draft")));

    let json = codec.to_json(&draft, &EncodeOptions::default()).unwrap();
    assert_eq!(json, json!({"parent": {}}));
}

#[test]
fn dangling_id_is_unresolved_under_follow() {
    let codec = codec_with(Arc::new(MemoryDocumentStore::new()));
    let missing = ObjectId::new();
    let document = Record::new("TestDocument")
        .with("references", vec![Value::reference_to(missing)]);

    let err = codec
        .to_json(&document, &EncodeOptions::following(3))
        .unwrap_err();
    assert!(matches!(err, CodecError::UnresolvedReference { id, .. } if id == missing));

    // Without following, the id is written as-is.
    assert!(codec.to_json(&document, &EncodeOptions::default()).is_ok());
}

#[test]
fn dangling_id_degrades_without_id_check() {
    init_tracing();
    let registry = refjson::MemorySchemaRegistry::new()
        .with(refjson::DocumentSchema::new("Link").field(
            "target",
            FieldKind::Reference(ReferenceSpec::new("Link").with_id_check(false)),
        ))
        .unwrap();
    let codec = refjson::DocumentCodec::new(
        Arc::new(registry),
        Arc::new(MemoryDocumentStore::new()),
    );
    let missing = ObjectId::new();
    let link = Record::new("Link").with("target", Reference::Id(missing));

    let json = codec.to_json(&link, &EncodeOptions::following(3)).unwrap();
    assert_eq!(
        json,
        json!({"target": {"$type": "objectId", "value": missing.to_hex()}})
    );
}

#[test]
fn always_follow_is_still_depth_bounded() {
    let registry = refjson::MemorySchemaRegistry::new()
        .with(
            refjson::DocumentSchema::new("Node")
                .field("name", FieldKind::Scalar(refjson::ScalarKind::String))
                .field(
                    "next",
                    FieldKind::Reference(ReferenceSpec::new("Node").with_always_follow(true)),
                ),
        )
        .unwrap();
    let (a, b) = (ObjectId::new(), ObjectId::new());
    let store = Arc::new(RecordingStore::with_records([
        Record::new("Node").with_id(a).with("name", "a").with("next", Reference::Id(b)),
        Record::new("Node").with_id(b).with("name", "b").with("next", Reference::Id(a)),
    ]));
    let codec = refjson::DocumentCodec::new(Arc::new(registry), store.clone());
    let root = Record::new("Node").with("name", "root").with("next", Reference::Id(a));

    let options = EncodeOptions {
        max_depth: 2,
        ..EncodeOptions::default()
    };
    let json = codec.to_json(&root, &options).unwrap();

    assert_eq!(json["next"]["name"], "a");
    assert_eq!(json["next"]["next"]["name"], "b");
    assert_eq!(
        json["next"]["next"]["next"],
        json!({"$type": "objectId", "value": a.to_hex()})
    );
    assert_eq!(store.total_lookups(), 2);
}

#[test]
fn invalid_depth_is_configuration_error() {
    let Cycle { store, document, .. } = cycle();
    let codec = codec_with(store.clone());

    for max_depth in [0, refjson::MAX_DEPTH_CEILING + 1] {
        let options = EncodeOptions {
            max_depth,
            ..EncodeOptions::following(1)
        };
        let err = codec.to_json(&document, &options).unwrap_err();
        assert!(matches!(err, CodecError::InvalidConfiguration(_)));
    }
    assert_eq!(store.total_lookups(), 0);
}
