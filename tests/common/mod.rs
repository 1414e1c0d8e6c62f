//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use deptree_core::{Document, NodeId, TreeId};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Append a bundle with a single flat tree of `words` nodes, all attached to the root.
#[allow(dead_code)]
pub fn add_sentence(doc: &mut Document, bundle_id: &str, words: usize) -> (TreeId, Vec<NodeId>) {
    let bundle = doc.create_bundle(bundle_id);
    let tree = doc.create_tree(bundle, "").unwrap();
    let root = doc.root(tree).unwrap();
    let nodes = (0..words)
        .map(|idx| {
            let id = doc.create_child(root).unwrap();
            doc.node_mut(id).unwrap().form = format!("w{}", idx + 1);
            id
        })
        .collect();
    (tree, nodes)
}

/// A document with one flat sentence per entry of `sizes`.
#[allow(dead_code)]
pub fn document_with_sentences(sizes: &[usize]) -> (Document, Vec<(TreeId, Vec<NodeId>)>) {
    let mut doc = Document::new("test-doc");
    let sentences = sizes
        .iter()
        .enumerate()
        .map(|(idx, size)| add_sentence(&mut doc, &format!("s{}", idx + 1), *size))
        .collect();
    (doc, sentences)
}

/// Fail with the full violation list when the document is inconsistent.
#[allow(dead_code)]
pub fn assert_consistent(doc: &Document) {
    let errors = doc.built_in_test(true);
    assert!(errors.is_empty(), "built_in_test failed:\n{}", errors.join("\n"));
}
