//! Integration tests - shadow tree, composed projection and lifecycle
//!
//! Builds component trees without a backend and checks the composed view,
//! structural operations, attachment and mutation observers.

use std::cell::RefCell;
use std::rc::Rc;

use shade_dom::{
    AttachStatus, ComponentDefinition, ComponentOptions, GlobalContext, GlobalOptions, Lifetime,
    MutationKind, MutationObserverOptions, MutationRecord, NodeId, SlotMode, Tree, TreeError,
};

type Log = Rc<RefCell<Vec<String>>>;

fn logging_definition(tag: &str, log: &Log) -> Rc<ComponentDefinition> {
    let mut def = ComponentDefinition::new(tag);
    for lifetime in [Lifetime::Created, Lifetime::Attached, Lifetime::Moved, Lifetime::Detached] {
        let log = log.clone();
        let label = format!("{tag}.{}", lifetime.name());
        def = def.lifetime(lifetime, move |_, _| {
            log.borrow_mut().push(label.clone());
            Ok(())
        });
    }
    def.build()
}

fn failing_attach(tag: &str) -> Rc<ComponentDefinition> {
    ComponentDefinition::new(tag)
        .lifetime(Lifetime::Attached, |_, _| Err(anyhow::anyhow!("attach failed")))
        .build()
}

fn rethrowing_tree() -> Tree {
    Tree::with_context(Rc::new(GlobalContext::with_options(GlobalOptions {
        throw_global_error: true,
        ..Default::default()
    })))
}

/// `<multi>` with shadow `<header/> <slot name="a"/> <footer/> <slot/>`
fn multi_slot_component(tree: &mut Tree, owner: NodeId) -> (NodeId, [NodeId; 4]) {
    let def = ComponentDefinition::new("multi")
        .options(ComponentOptions {
            slot_mode: SlotMode::Multiple,
            ..Default::default()
        })
        .build();
    let comp = tree.create_component(owner, "multi", def).unwrap();
    let sr = tree.shadow_root(comp).unwrap();
    let header = tree.create_native_node(sr, "header").unwrap();
    let slot_a = tree.create_slot(sr, "a").unwrap();
    let footer = tree.create_native_node(sr, "footer").unwrap();
    let slot_default = tree.create_slot(sr, "").unwrap();
    for n in [header, slot_a, footer, slot_default] {
        tree.append_child(sr, n).unwrap();
    }
    (comp, [header, slot_a, footer, slot_default])
}

// ============================================================================
// COMPOSED PROJECTION
// ============================================================================

#[test]
fn test_composed_order_substitutes_slots() {
    let mut tree = Tree::new();
    let root = tree.create_root().unwrap();
    let (comp, [header, slot_a, footer, slot_default]) = multi_slot_component(&mut tree, root);
    tree.append_child(root, comp).unwrap();

    let x = tree.create_native_node(root, "x").unwrap();
    let y = tree.create_native_node(root, "y").unwrap();
    let z = tree.create_native_node(root, "z").unwrap();
    tree.set_slot(y, "a").unwrap();
    tree.set_slot(z, "a").unwrap();
    let block = tree.create_virtual_node(root, "block").unwrap();
    let w = tree.create_native_node(root, "w").unwrap();
    tree.append_child(block, w).unwrap();
    for n in [x, y, z, block] {
        tree.append_child(comp, n).unwrap();
    }

    assert_eq!(tree.child_nodes(comp).unwrap(), vec![header, y, z, footer, x, w]);
    assert_eq!(tree.assigned_nodes(slot_a).unwrap(), vec![y, z]);
    assert_eq!(tree.assigned_nodes(slot_default).unwrap(), vec![x, block]);
    assert_eq!(tree.composed_parent(w).unwrap(), Some(comp));
    assert_eq!(tree.child_nodes(root).unwrap(), vec![comp]);

    let mut seen = Vec::new();
    let completed = tree
        .for_each_non_virtual_composed_child(comp, |c| {
            seen.push(c);
            seen.len() < 2
        })
        .unwrap();
    assert!(!completed);
    assert_eq!(seen, vec![header, y]);

    let mut with_virtual = Vec::new();
    tree.for_each_composed_child(comp, |c| {
        with_virtual.push(c);
        true
    })
    .unwrap();
    assert_eq!(with_virtual, vec![header, slot_a, footer, slot_default]);
}

#[test]
fn test_unmatched_content_is_not_composed() {
    let mut tree = Tree::new();
    let root = tree.create_root().unwrap();
    let (comp, [header, _, footer, _]) = multi_slot_component(&mut tree, root);
    let lost = tree.create_native_node(root, "lost").unwrap();
    tree.set_slot(lost, "missing").unwrap();
    tree.append_child(comp, lost).unwrap();

    assert_eq!(tree.child_nodes(comp).unwrap(), vec![header, footer]);
    assert_eq!(tree.composed_parent(lost).unwrap(), None);
    assert_eq!(tree.containing_slot(lost).unwrap(), None);
}

// ============================================================================
// STRUCTURAL OPERATIONS
// ============================================================================

#[test]
fn test_fragment_splices() {
    let mut tree = Tree::new();
    let root = tree.create_root().unwrap();
    let [a, b, c, d] = ["a", "b", "c", "d"].map(|tag| tree.create_native_node(root, tag).unwrap());
    tree.append_child(root, a).unwrap();
    tree.append_child(root, d).unwrap();

    let fragment = tree.create_fragment().unwrap();
    tree.append_child(fragment, b).unwrap();
    tree.append_child(fragment, c).unwrap();
    let removed = tree.splice_before(root, d, 0, fragment).unwrap();
    assert!(removed.is_empty());
    assert_eq!(tree.children(root).unwrap(), [a, b, c, d]);
    assert!(tree.children(fragment).unwrap().is_empty());
    assert_eq!(tree.parent(b).unwrap(), Some(root));

    let removed = tree.splice_remove(root, b, 2).unwrap();
    assert_eq!(removed, vec![b, c]);
    assert_eq!(tree.children(root).unwrap(), [a, d]);
    assert_eq!(tree.parent(c).unwrap(), None);

    // a non-fragment cannot be spliced in
    assert!(matches!(
        tree.splice_append(root, b),
        Err(TreeError::WrongNodeKind { .. })
    ));
    assert!(matches!(
        tree.splice_remove(root, a, 5),
        Err(TreeError::IndexOutOfRange { .. })
    ));
}

#[test]
fn test_index_hints_and_errors() {
    let mut tree = Tree::new();
    let root = tree.create_root().unwrap();
    let a = tree.create_native_node(root, "a").unwrap();
    let b = tree.create_native_node(root, "b").unwrap();
    let c = tree.create_native_node(root, "c").unwrap();
    tree.append_child(root, a).unwrap();
    tree.append_child(root, b).unwrap();

    assert!(matches!(
        tree.remove_child_at(root, b, 0),
        Err(TreeError::IndexMismatch { hint: 0, actual: 1 })
    ));
    tree.replace_child_at(root, c, b, 1).unwrap();
    assert_eq!(tree.children(root).unwrap(), [a, c]);
    assert!(matches!(
        tree.remove_child(root, b),
        Err(TreeError::NotAChild { .. })
    ));
    assert!(matches!(
        tree.append_child(a, root),
        Err(TreeError::HierarchyRequest { .. })
    ));
}

#[test]
fn test_release_frees_whole_subtree() {
    let log: Log = Default::default();
    let mut tree = Tree::new();
    let root = tree.create_root().unwrap();
    let comp = tree.create_component(root, "comp", logging_definition("comp", &log)).unwrap();
    let sr = tree.shadow_root(comp).unwrap();
    let inner = tree.create_native_node(sr, "inner").unwrap();
    tree.append_child(sr, inner).unwrap();
    let before = tree.len();

    tree.release(comp).unwrap();
    assert_eq!(tree.len(), before - 3);
    assert!(!tree.contains(inner));
    assert!(matches!(tree.release(comp), Err(TreeError::DoubleRelease(_))));
    assert!(matches!(tree.append_child(root, inner), Err(TreeError::DoubleRelease(_))));
}

// ============================================================================
// ATTACHMENT LIFECYCLE
// ============================================================================

#[test]
fn test_nested_component_lifetimes() {
    let log: Log = Default::default();
    let mut tree = Tree::new();
    let root = tree.create_root().unwrap();
    tree.pretend_attached(root).unwrap();

    let outer = tree.create_component(root, "outer", logging_definition("outer", &log)).unwrap();
    let outer_sr = tree.shadow_root(outer).unwrap();
    let inner = tree
        .create_component(outer_sr, "inner", logging_definition("inner", &log))
        .unwrap();
    tree.append_child(outer_sr, inner).unwrap();
    assert_eq!(*log.borrow(), ["outer.created", "inner.created"]);
    assert!(!tree.is_attached(inner).unwrap());

    log.borrow_mut().clear();
    tree.append_child(root, outer).unwrap();
    assert_eq!(*log.borrow(), ["outer.attached", "inner.attached"]);
    assert!(tree.is_attached(inner).unwrap());

    log.borrow_mut().clear();
    let div = tree.create_native_node(root, "div").unwrap();
    tree.append_child(root, div).unwrap();
    tree.append_child(div, outer).unwrap();
    assert_eq!(*log.borrow(), ["outer.moved", "inner.moved"]);

    log.borrow_mut().clear();
    tree.remove_child(root, div).unwrap();
    assert_eq!(*log.borrow(), ["outer.detached", "inner.detached"]);
    assert!(!tree.is_attached(outer_sr).unwrap());
}

#[test]
fn test_attach_detach_symmetry() {
    let log: Log = Default::default();
    let mut tree = Tree::new();
    let root = tree.create_root().unwrap();
    let a = tree.create_component(root, "a", logging_definition("a", &log)).unwrap();
    let b = tree.create_component(root, "b", logging_definition("b", &log)).unwrap();
    tree.append_child(root, a).unwrap();
    tree.append_child(a, b).unwrap();
    log.borrow_mut().clear();

    for _ in 0..3 {
        tree.pretend_attached(root).unwrap();
        tree.pretend_detached(root).unwrap();
    }
    let attached = log.borrow().iter().filter(|l| l.ends_with(".attached")).count();
    let detached = log.borrow().iter().filter(|l| l.ends_with(".detached")).count();
    assert_eq!(attached, 6);
    assert_eq!(attached, detached);

    // already detached: nothing fires
    log.borrow_mut().clear();
    tree.pretend_detached(root).unwrap();
    assert!(log.borrow().is_empty());
}

#[test]
fn test_failing_attached_callback_finishes_traversal() {
    let log: Log = Default::default();
    let mut tree = rethrowing_tree();
    let root = tree.create_root().unwrap();
    let a = tree.create_component(root, "a", failing_attach("a")).unwrap();
    let b = tree.create_component(root, "b", logging_definition("b", &log)).unwrap();
    tree.append_child(root, a).unwrap();
    tree.append_child(root, b).unwrap();
    log.borrow_mut().clear();

    let err = tree.pretend_attached(root).unwrap_err();
    assert!(matches!(&err, TreeError::UserCode { origin, .. } if origin.node == Some(a)));
    assert_eq!(*log.borrow(), ["b.attached"]);
    assert!(tree.is_attached(a).unwrap());
    assert!(tree.is_attached(b).unwrap());

    // both siblings detach exactly once
    log.borrow_mut().clear();
    tree.pretend_detached(root).unwrap();
    assert_eq!(*log.borrow(), ["b.detached"]);
    assert!(!tree.is_attached(a).unwrap());
}

#[test]
fn test_failing_insert_does_not_block_siblings() {
    let log: Log = Default::default();
    let mut tree = rethrowing_tree();
    let root = tree.create_root().unwrap();
    tree.pretend_attached(root).unwrap();
    let a = tree.create_component(root, "a", failing_attach("a")).unwrap();
    let b = tree.create_component(root, "b", logging_definition("b", &log)).unwrap();
    let fragment = tree.create_fragment().unwrap();
    tree.append_child(fragment, a).unwrap();
    tree.append_child(fragment, b).unwrap();
    log.borrow_mut().clear();

    assert!(tree.splice_append(root, fragment).unwrap_err().is_user_code());
    assert_eq!(tree.children(root).unwrap(), [a, b]);
    assert!(tree.is_attached(b).unwrap());
    assert_eq!(*log.borrow(), ["b.attached"]);
}

#[test]
fn test_dynamic_lifetime_listener() {
    let log: Log = Default::default();
    let mut tree = Tree::new();
    let root = tree.create_root().unwrap();
    let div = tree.create_native_node(root, "div").unwrap();
    tree.append_child(root, div).unwrap();

    let l = log.clone();
    let listener = tree
        .add_lifetime_listener(div, Lifetime::Attached, move |_, _| {
            l.borrow_mut().push("div.attached".to_string());
            Ok(())
        })
        .unwrap();
    tree.pretend_attached(root).unwrap();
    tree.pretend_detached(root).unwrap();
    assert!(tree.remove_lifetime_listener(div, listener).unwrap());
    tree.pretend_attached(root).unwrap();
    assert_eq!(*log.borrow(), ["div.attached"]);
}

// ============================================================================
// MUTATION OBSERVERS
// ============================================================================

#[test]
fn test_observer_sees_projected_content() {
    let mut tree = Tree::new();
    let root = tree.create_root().unwrap();
    let (comp, [_, slot_a, ..]) = multi_slot_component(&mut tree, root);
    tree.append_child(root, comp).unwrap();
    let y = tree.create_native_node(root, "y").unwrap();
    tree.set_slot(y, "a").unwrap();
    tree.append_child(comp, y).unwrap();

    let records: Rc<RefCell<Vec<MutationRecord>>> = Default::default();
    let r = records.clone();
    tree.observe(
        slot_a,
        MutationObserverOptions {
            properties: true,
            attach_status: true,
            subtree: true,
            ..Default::default()
        },
        move |_, record| {
            r.borrow_mut().push(record.clone());
            Ok(())
        },
    )
    .unwrap();

    tree.set_attribute(y, "title", "hello").unwrap();
    tree.pretend_attached(root).unwrap();

    let records = records.borrow();
    assert_eq!(records[0].kind, MutationKind::Properties);
    assert_eq!(records[0].target, y);
    let statuses: Vec<_> = records.iter().filter_map(|r| r.status.map(|s| (r.target, s))).collect();
    assert_eq!(statuses, vec![(slot_a, AttachStatus::Attached), (y, AttachStatus::Attached)]);
}
