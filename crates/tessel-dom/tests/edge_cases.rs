//! Edge case tests for tessel-dom
//!
//! Invariants under long operation sequences and misuse.

use std::cell::Cell;
use std::rc::Rc;

use tessel_dom::{DomAction, DomError, Document, Listener, NodeId, RecordingHost};

fn new_doc() -> (Document, RecordingHost) {
    let host = RecordingHost::new();
    (Document::new(Listener::new("edge", Rc::new(host.clone()))), host)
}

/// Tiny deterministic generator so the sequence is reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as usize) % bound.max(1)
    }
}

fn assert_pure_is_subsequence(doc: &Document, parent: NodeId) {
    let children = doc.children(parent);
    let pure = doc.pure_children(parent);
    let elements: Vec<_> = children.iter().copied().filter(|c| doc.is_element(*c)).collect();
    assert_eq!(elements, pure, "pure children must be the element subsequence");
    for (i, child) in children.iter().enumerate() {
        assert_eq!(doc.parent(*child), Some(parent));
        let prev = i.checked_sub(1).map(|j| children[j]);
        assert_eq!(doc.prev_sibling(*child), prev);
        assert_eq!(doc.next_sibling(*child), children.get(i + 1).copied());
    }
}

// ============================================================================
// Invariants
// ============================================================================

#[test]
fn test_pure_children_invariant_under_random_operations() {
    let (mut doc, _host) = new_doc();
    let parent = doc.create_body("div");
    doc.append_child(doc.document_element(), parent).unwrap();
    let mut rng = Lcg(7);

    for _ in 0..500 {
        let children = doc.children(parent).to_vec();
        let op = rng.next(5);
        let fresh = if rng.next(3) == 0 {
            doc.create_comment("m")
        } else {
            doc.create_element("cell")
        };
        let node = if children.is_empty() || rng.next(2) == 0 {
            fresh
        } else {
            children[rng.next(children.len())]
        };
        let anchor = (!children.is_empty()).then(|| children[rng.next(children.len())]);
        match (op, anchor) {
            (0, _) | (_, None) => doc.append_child(parent, node).unwrap(),
            (1, Some(anchor)) => doc.insert_before(parent, node, anchor).unwrap(),
            (2, Some(anchor)) => doc.insert_after(parent, node, anchor).unwrap(),
            (_, Some(anchor)) => doc.remove_child(parent, anchor, rng.next(2) == 0).unwrap(),
        }
        assert_pure_is_subsequence(&doc, parent);
    }
}

#[test]
fn test_moves_and_adds_mirror_host_view() {
    let (mut doc, host) = new_doc();
    let parent = doc.create_body("div");
    doc.append_child(doc.document_element(), parent).unwrap();
    let mut rng = Lcg(42);
    let mut mirror: Vec<String> = Vec::new();

    for _ in 0..200 {
        host.clear();
        let children = doc.children(parent).to_vec();
        if children.is_empty() || rng.next(3) == 0 {
            let node = doc.create_element("cell");
            doc.append_child(parent, node).unwrap();
        } else {
            let node = children[rng.next(children.len())];
            let anchor = children[rng.next(children.len())];
            doc.insert_before(parent, node, anchor).unwrap();
        }
        // replay host messages onto a flat mirror
        for call in host.calls() {
            if call.is(DomAction::AddElement) {
                let index = call.args[2].as_u64().unwrap() as usize;
                let node_ref = call.args[1]["ref"].as_str().unwrap().to_string();
                mirror.insert(index, node_ref);
            } else if call.is(DomAction::MoveElement) {
                let node_ref = call.args[0].as_str().unwrap();
                let index = call.args[2].as_u64().unwrap() as usize;
                let old = mirror.iter().position(|r| r == node_ref).unwrap();
                let moved = mirror.remove(old);
                mirror.insert(index, moved);
            }
        }
        let expected: Vec<String> = doc
            .pure_children(parent)
            .iter()
            .map(|c| doc.node_ref(*c).unwrap().to_string())
            .collect();
        assert_eq!(mirror, expected);
    }
}

// ============================================================================
// Destruction
// ============================================================================

#[test]
fn test_destroy_runs_each_cleanup_once() {
    let (mut doc, _host) = new_doc();
    let runs = Rc::new(Cell::new(0));
    let root = doc.create_element("div");
    let mut frontier = vec![root];
    for _ in 0..3 {
        let mut next = Vec::new();
        for parent in frontier {
            for _ in 0..2 {
                let child = doc.create_element("div");
                doc.append_child(parent, child).unwrap();
                let counter = runs.clone();
                doc.add_cleanup(child, Box::new(move || counter.set(counter.get() + 1)));
                next.push(child);
            }
        }
        frontier = next;
    }
    doc.destroy(root);
    doc.destroy(root);
    for cleanup in doc.take_cleanups() {
        cleanup();
    }
    assert_eq!(runs.get(), 2 + 4 + 8);
    assert_eq!(doc.len(), 1);
}

#[test]
fn test_cleanup_on_destroyed_node_is_queued() {
    let (mut doc, _host) = new_doc();
    let node = doc.create_element("div");
    doc.destroy(node);
    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    doc.add_cleanup(node, Box::new(move || flag.set(true)));
    for cleanup in doc.take_cleanups() {
        cleanup();
    }
    assert!(ran.get());
}

#[test]
fn test_destroy_all_clears_body() {
    let (mut doc, _host) = new_doc();
    let body = doc.create_body("div");
    doc.append_child(doc.document_element(), body).unwrap();
    let _detached = doc.create_element("div");
    doc.destroy_all();
    assert!(doc.is_empty());
    assert!(doc.body().is_none());
    assert!(doc.get_ref("_root").is_none());
}

#[test]
fn test_destroyed_slots_are_reused() {
    let (mut doc, _host) = new_doc();
    let body = doc.create_body("div");
    doc.append_child(doc.document_element(), body).unwrap();
    for _ in 0..500 {
        let row = doc.create_element("row");
        let marker = doc.create_comment("m");
        doc.append_child(body, row).unwrap();
        doc.append_child(row, marker).unwrap();
        doc.remove_child(body, row, false).unwrap();
    }
    assert_eq!(doc.len(), 2);
    assert!(doc.arena_size() <= 4, "arena grew to {}", doc.arena_size());
}

#[test]
fn test_stale_id_does_not_alias_reused_slot() {
    let (mut doc, _host) = new_doc();
    let old = doc.create_element("old");
    doc.set_attr(old, "value", serde_json::json!("x"), Default::default()).unwrap();
    doc.destroy(old);
    let new = doc.create_element("new");

    assert_ne!(old, new);
    assert!(!doc.contains(old));
    assert!(doc.contains(new));
    assert!(doc.element(old).is_none());
    assert_eq!(doc.element(new).map(|e| e.tag()), Some("new"));
    assert!(doc.attr(new, "value").is_none());
    assert_eq!(
        doc.set_attr(old, "value", serde_json::json!("y"), Default::default()),
        Err(DomError::UnknownNode(old))
    );
    // destroying through the stale id leaves the new occupant alone
    doc.destroy(old);
    assert!(doc.contains(new));
    assert_eq!(doc.len(), 2);
}

#[test]
fn test_document_root_slot_is_never_reused() {
    let (mut doc, _host) = new_doc();
    doc.create_element("div");
    doc.destroy_all();
    assert!(doc.is_empty());
    let fresh = doc.create_element("div");
    assert_ne!(fresh, doc.document_element());
    assert!(!doc.contains(doc.document_element()));
}

// ============================================================================
// Misuse
// ============================================================================

#[test]
fn test_operations_on_unknown_nodes() {
    let (mut doc, _host) = new_doc();
    let div = doc.create_element("div");
    let comment = doc.create_comment("c");
    doc.destroy(div);
    assert_eq!(
        doc.set_attr(div, "a", serde_json::json!(1), Default::default()),
        Err(DomError::UnknownNode(div))
    );
    assert_eq!(doc.append_child(comment, div), Err(DomError::NotAnElement(comment)));
}

#[test]
fn test_anchor_must_be_child() {
    let (mut doc, _host) = new_doc();
    let parent = doc.create_element("div");
    let stranger = doc.create_element("div");
    let node = doc.create_element("div");
    assert_eq!(
        doc.insert_before(parent, node, stranger),
        Err(DomError::NotAChild { node: stranger, parent })
    );
    assert!(doc.parent(node).is_none());
}

#[test]
fn test_second_body_is_plain_element() {
    let (mut doc, _host) = new_doc();
    let first = doc.create_body("div");
    let second = doc.create_body("div");
    assert_ne!(first, second);
    assert_eq!(doc.body(), Some(first));
    assert_ne!(doc.node_ref(second), Some("_root"));
}
