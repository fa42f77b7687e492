//! Integration tests - backend contract against the in-memory backend
//!
//! Exercises the public surface the tree core relies on: factories, child
//! list mutation, asynchronous queries, the event sink and render passes.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use shade_backend::{
    BackendContext, BackendError, BackendMode, BoundingClientRect, ComponentInit, MemoryBackend,
    MediaQueryStatus, RawEvent,
};

// ============================================================================
// TREE MUTATION
// ============================================================================

#[test]
fn test_fragment_splices() {
    let mut backend = MemoryBackend::new(BackendMode::Domlike);
    let root = backend.create_element("root", "root").unwrap();
    let a = backend.create_element("a", "a").unwrap();
    let d = backend.create_element("d", "d").unwrap();
    backend.append_child(root, a).unwrap();
    backend.append_child(root, d).unwrap();

    let fragment = backend.create_fragment().unwrap();
    let b = backend.create_element("b", "b").unwrap();
    let c = backend.create_text_node("c").unwrap();
    backend.append_child(fragment, b).unwrap();
    backend.append_child(fragment, c).unwrap();
    backend.splice_before(root, d, 0, fragment).unwrap();
    assert_eq!(backend.serialize_children(root), "<a></a><b></b>c<d></d>");
    assert!(backend.children(fragment).is_empty());

    backend.splice_remove(root, b, 2).unwrap();
    assert_eq!(backend.serialize_children(root), "<a></a><d></d>");
    assert_eq!(backend.parent(b), None);

    // Consumed fragment can be reused
    backend.append_child(fragment, b).unwrap();
    backend.splice_append(root, fragment).unwrap();
    assert_eq!(backend.serialize_children(root), "<a></a><d></d><b></b>");
}

#[test]
fn test_assertion_errors() {
    let mut backend = MemoryBackend::new(BackendMode::Domlike);
    let root = backend.create_element("root", "root").unwrap();
    let a = backend.create_element("a", "a").unwrap();
    let text = backend.create_text_node("t").unwrap();
    backend.append_child(root, a).unwrap();

    assert_eq!(
        backend.append_child(root, a),
        Err(BackendError::AlreadyHasParent(a))
    );
    assert_eq!(
        backend.append_child(text, a),
        Err(BackendError::NotAContainer(text))
    );
    assert_eq!(
        backend.remove_child(text, a),
        Err(BackendError::NotAContainer(text))
    );
    assert!(matches!(
        backend.create_virtual_node("block"),
        Err(BackendError::Unsupported(BackendMode::Domlike))
    ));

    backend.release(a).unwrap();
    assert_eq!(backend.set_id(a, "x"), Err(BackendError::ElementReleased(a)));
    assert!(backend.children(root).is_empty());
}

#[test]
fn test_shadow_mode_component() {
    let mut backend = MemoryBackend::new(BackendMode::Shadow);
    let comp = backend
        .create_component(&ComponentInit {
            tag_name: "my-comp".to_string(),
            ..Default::default()
        })
        .unwrap();
    let shadow = backend.create_shadow_root(comp).unwrap();
    let slot = backend.create_virtual_node("slot").unwrap();
    backend.set_slot_name(slot, "").unwrap();
    backend.append_child(shadow, slot).unwrap();

    let content = backend.create_element("span", "span").unwrap();
    backend.append_child(comp, content).unwrap();
    backend.set_containing_slot(content, Some(slot)).unwrap();

    assert_eq!(
        backend.serialize(comp),
        "<my-comp><#shadow><virtual:slot></virtual:slot></#shadow><span></span></my-comp>"
    );
    assert_eq!(backend.element(content).unwrap().containing_slot, Some(slot));

    // Only one shadow root per host
    assert!(backend.create_shadow_root(comp).is_err());

    backend.release(slot).unwrap();
    assert_eq!(backend.element(content).unwrap().containing_slot, None);
}

// ============================================================================
// QUERIES, EVENTS AND RENDERING
// ============================================================================

#[test]
fn test_async_queries_run_on_flush() {
    let mut backend = MemoryBackend::new(BackendMode::Composed);
    let el = backend.create_element("view", "view").unwrap();
    backend.set_rect(el, BoundingClientRect::new(0.0, 10.0, 20.0, 30.0));

    let seen = Rc::new(RefCell::new(None));
    let s = seen.clone();
    backend
        .get_bounding_client_rect(el, Box::new(move |rect| *s.borrow_mut() = Some(rect)))
        .unwrap();
    assert!(seen.borrow().is_none());
    assert_eq!(backend.flush_tasks(), 1);
    assert_eq!(seen.borrow().as_ref().map(|r| r.bottom()), Some(40.0));
}

#[test]
fn test_media_query_fires_on_change() {
    let mut backend = MemoryBackend::new(BackendMode::Domlike);
    let states = Rc::new(RefCell::new(Vec::new()));
    let s = states.clone();
    backend
        .create_media_query_observer(
            MediaQueryStatus {
                min_width: Some(500.0),
                ..Default::default()
            },
            Box::new(move |matches| s.borrow_mut().push(matches)),
        )
        .unwrap();
    backend.flush_tasks();
    backend.flush_tasks();
    backend.set_window_size(800.0, 600.0);
    backend.flush_tasks();
    assert_eq!(*states.borrow(), vec![false, true]);
}

#[test]
fn test_event_sink() {
    let mut backend = MemoryBackend::new(BackendMode::Domlike);
    let el = backend.create_element("button", "button").unwrap();
    assert!(!backend.trigger_event(el, "tap", json!(null), true, false, false));

    let received: Rc<RefCell<Vec<RawEvent>>> = Default::default();
    let r = received.clone();
    backend.on_event(Box::new(move |event| r.borrow_mut().push(event)));
    assert!(backend.trigger_event(el, "tap", json!({"x": 1}), true, true, false));

    let received = received.borrow();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].target, el);
    assert_eq!(received[0].detail["x"], 1);
    assert!(received[0].composed);
}

#[test]
fn test_render_requests_share_a_pass() {
    let mut backend = MemoryBackend::new(BackendMode::Domlike);
    let count = Rc::new(RefCell::new(0));
    for _ in 0..3 {
        let c = count.clone();
        backend.render(Box::new(move || *c.borrow_mut() += 1));
    }
    assert!(backend.render_pending());
    assert_eq!(backend.complete_render(), 3);
    assert_eq!(*count.borrow(), 3);
    assert_eq!(backend.render_passes(), 1);
    assert_eq!(backend.complete_render(), 0);
}

#[test]
fn test_destroy_requires_released_elements() {
    let mut backend = MemoryBackend::new(BackendMode::Domlike);
    let el = backend.create_element("div", "div").unwrap();
    assert_eq!(backend.destroy(), Err(BackendError::LiveElements(1)));
    backend.release(el).unwrap();
    backend.destroy().unwrap();
    assert_eq!(backend.destroy(), Err(BackendError::Destroyed));
    assert!(backend.create_element("div", "div").is_err());
}
