//! Example: a component tree mirrored into the in-memory backend
//!
//! Run with `RUST_LOG=shade_dom=trace` to see tree operations.

use serde_json::json;
use shade_dom::{
    BackendMode, ComponentDefinition, EventOptions, Lifetime, ListenerOptions, Propagation, Tree,
};
use shade_backend::MemoryBackend;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let backend = MemoryBackend::new(BackendMode::Domlike);
    let mut tree = Tree::with_backend(Box::new(backend.clone()));
    let root = tree.create_root()?;
    tree.pretend_attached(root)?;

    let card = ComponentDefinition::new("card")
        .lifetime(Lifetime::Attached, |tree, id| {
            println!("<{}> attached", tree.tag_name(id)?);
            Ok(())
        })
        .build();

    // <card> shadow: <header/> <slot/>
    let comp = tree.create_component(root, "card", card)?;
    let sr = tree.shadow_root(comp)?;
    let header = tree.create_native_node(sr, "header")?;
    let slot = tree.create_slot(sr, "")?;
    tree.append_child(sr, header)?;
    tree.append_child(sr, slot)?;

    let text = tree.create_text_node(root, "hello")?;
    tree.append_child(comp, text)?;
    tree.append_child(root, comp)?;

    let root_element = tree.backend_element(root)?.ok_or_else(|| anyhow::anyhow!("no root element"))?;
    println!("backend tree: {}", backend.serialize_children(root_element));

    tree.add_listener(root, "tap", ListenerOptions::default(), |_, event| {
        println!("tap reached the page, target {:?}", event.target());
        Ok(Propagation::Continue)
    })?;
    let options = EventOptions {
        bubbles: true,
        composed: true,
        ..Default::default()
    };
    tree.trigger_event(header, "tap", json!({ "x": 10 }), options)?;

    tree.pretend_detached(root)?;
    tree.release(root)?;
    tree.destroy_backend()?;
    Ok(())
}
