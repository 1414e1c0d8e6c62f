mod common;

use common::{assert_consistent, document_with_sentences, init_logging};
use deptree_core::{
    diagnostic::ConsistencyWarning, ChildPolicy, CorefConfig, Document, InsertPosition,
    TreebankError,
};

#[test]
fn test_merge_orders_nested_mentions() {
    init_logging();
    let (mut doc, sentences) = document_with_sentences(&[6]);
    let n = &sentences[0].1;
    let e1 = doc.create_entity(Some("e1")).unwrap();
    let e2 = doc.create_entity(Some("e2")).unwrap();
    let m1 = doc.create_mention(e1, n[1], None).unwrap();
    let m2 = doc
        .create_mention(e2, n[4], Some(&[n[1], n[2], n[3], n[4]]))
        .unwrap();

    doc.merge_entities(e1, e2).unwrap();
    assert_eq!(doc.entity(e2).unwrap().mentions(), &[m1, m2]);
    assert_eq!(doc.coref_mentions(n[1]).unwrap(), vec![m1, m2]);

    // Every mention that was in e1 is already in e2.
    doc.move_mention(m1, e2).unwrap();
    doc.merge_entities(e2, e2).unwrap();
    assert_eq!(doc.entity(e2).unwrap().mentions(), &[m1, m2]);
    assert!(doc.entity_by_eid("e1").is_none());
    assert_consistent(&doc);
}

#[test]
fn test_bridging_to_own_entity_is_rejected() {
    init_logging();
    let (mut doc, sentences) = document_with_sentences(&[2]);
    let n = &sentences[0].1;
    let e = doc.create_entity(None).unwrap();
    let m = doc.create_mention(e, n[0], None).unwrap();
    let err = doc.add_bridging(m, e, "Part").unwrap_err();
    assert!(matches!(err, TreebankError::SelfReference(_)));
    assert!(doc.mention(m).unwrap().bridging().is_empty());
}

#[test]
fn test_store_load_across_sentences() {
    init_logging();
    let (mut doc, sentences) = document_with_sentences(&[4, 3]);
    let (first_tree, a) = sentences[0].clone();
    let (_second_tree, b) = sentences[1].clone();
    let empty = doc
        .create_empty_child(a[1], "nsubj", InsertPosition::After)
        .unwrap();

    let person = doc.create_entity(None).unwrap();
    let place = doc.create_entity(None).unwrap();
    doc.set_etype(person, Some("person".to_string())).unwrap();
    doc.create_mention(person, a[0], Some(&[a[0], a[1]])).unwrap();
    let pronoun = doc.create_mention(person, empty, None).unwrap();
    let there = doc.create_mention(place, b[2], None).unwrap();
    doc.create_mention(place, a[3], None).unwrap();
    doc.add_bridging(there, person, "owner").unwrap();
    doc.set_mention_misc(pronoun, Some("Implicit:yes".to_string()))
        .unwrap();

    let before = doc.coref_snapshot().unwrap();
    doc.store().unwrap();
    assert_eq!(
        doc.node(empty).unwrap().misc.to_string(),
        "ClusterId=e1|MentionSpan=2.1|ClusterType=person|MentionMisc=Implicit:yes"
    );
    assert_eq!(
        doc.node(b[2]).unwrap().misc.to_string(),
        "ClusterId=e2|MentionSpan=3|Bridging=e1:owner"
    );

    doc.load().unwrap();
    assert_eq!(doc.coref_snapshot().unwrap(), before);
    assert_eq!(doc.mentions().len(), 4);
    assert!(doc.warnings().is_empty());
    assert_eq!(doc.span_decode(first_tree, "2-2.1").unwrap(), vec![a[1], empty]);
    assert_consistent(&doc);
}

#[test]
fn test_type_only_on_first_mention() {
    init_logging();
    let config = CorefConfig::from_toml_str("eid_prefix = \"c\"\ntype_on_every_mention = false")
        .unwrap();
    let mut doc = Document::with_config("doc", config);
    let (_tree, n) = common::add_sentence(&mut doc, "s1", 3);
    let e = doc.create_entity(None).unwrap();
    doc.set_etype(e, Some("event".to_string())).unwrap();
    doc.create_mention(e, n[0], None).unwrap();
    doc.create_mention(e, n[2], None).unwrap();
    doc.store().unwrap();
    assert_eq!(doc.node(n[0]).unwrap().misc.get("ClusterType"), Some("event"));
    assert_eq!(doc.node(n[2]).unwrap().misc.get("ClusterType"), None);
    assert_eq!(doc.node(n[2]).unwrap().misc.get("ClusterId"), Some("c1"));
    doc.load().unwrap();
    assert_eq!(doc.entity(doc.entity_by_eid("c1").unwrap()).unwrap().etype(), Some("event"));
    assert!(doc.warnings().is_empty());
}

#[test]
fn test_id_generator_continues_across_documents() {
    init_logging();
    let mut first = Document::new("a");
    first.create_entity(None).unwrap();
    first.create_entity(None).unwrap();
    let mut second = Document::new("b").with_id_generator(first.take_id_generator());
    let id = second.create_entity(None).unwrap();
    assert_eq!(second.entity(id).unwrap().eid(), "e3");

    // Independent documents do not share numbering.
    let mut third = Document::new("c");
    let id = third.create_entity(None).unwrap();
    assert_eq!(third.entity(id).unwrap().eid(), "e1");
}

#[test]
fn test_same_span_across_entities_is_reported() {
    init_logging();
    let (mut doc, sentences) = document_with_sentences(&[3]);
    let n = &sentences[0].1;
    let a = doc.create_entity(Some("b7")).unwrap();
    let b = doc.create_entity(Some("a3")).unwrap();
    let ma = doc.create_mention(a, n[1], Some(&[n[0], n[1]])).unwrap();
    let mb = doc.create_mention(b, n[0], Some(&[n[0], n[1]])).unwrap();

    assert_eq!(doc.remove_duplicate_same_span_mentions(false).unwrap(), 1);
    assert!(doc.mention(mb).is_some());
    assert!(doc.mention(ma).is_none());
    assert!(doc.entity(a).is_none());
    match doc.take_warnings().as_slice() {
        [ConsistencyWarning::SameSpanAcrossEntities {
            span,
            kept,
            other,
            removed: true,
        }] => {
            assert_eq!(span, "1-2");
            assert_eq!(kept, "a3");
            assert_eq!(other, "b7");
        }
        other => panic!("unexpected warnings {other:?}"),
    }
    assert_consistent(&doc);
}

#[test]
fn test_cascade_removal_destroys_entity() {
    init_logging();
    let (mut doc, sentences) = document_with_sentences(&[4]);
    let n = &sentences[0].1;
    doc.set_parent(n[2], n[1]).unwrap();
    let lost = doc.create_entity(None).unwrap();
    let kept = doc.create_entity(None).unwrap();
    doc.create_mention(lost, n[2], None).unwrap();
    doc.create_mention(kept, n[3], None).unwrap();
    doc.set_split_ante(kept, &[lost]).unwrap();

    doc.remove(n[1], ChildPolicy::Cascade).unwrap();
    assert!(doc.entity(lost).is_none());
    assert!(doc.entity(kept).unwrap().split_ante().is_empty());
    assert_eq!(doc.span(doc.entity(kept).unwrap().mentions()[0]).unwrap(), "2");
    let warnings = doc.take_warnings();
    assert_eq!(warnings.len(), 2, "{warnings:?}");
    assert_consistent(&doc);
}
