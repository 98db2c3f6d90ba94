//! Shared test utilities.

#![allow(dead_code, unused_imports)]

use parking_lot::Mutex;
use serde_json::Value;
use socketry::context::{Effect, Provenance};
use socketry::paths::{path_map, LocalModel};
use socketry::{path, Component, Context, Template};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Provenance and state snapshot of every sink call.
pub type Notifications = Arc<Mutex<Vec<(Provenance, Value)>>>;

/// Context whose update sink records every notification.
pub fn recording_context(initial: Value) -> (Context<String>, Notifications) {
    let notifications: Notifications = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&notifications);
    let context = Context::builder(initial)
        .on_update(move |context: &Context<String>, provenance: &Provenance| {
            sink.lock().push((provenance.clone(), context.state()));
        })
        .build();
    (context, notifications)
}

/// Transform that sets `socket` to `value`.
pub fn set(socket: &str, value: Value) -> Effect {
    let socket = socket.to_string();
    Effect::now(move |mut model: LocalModel| {
        model.insert(socket, value);
        model
    })
}

/// `name` socket bound to `["name"]` with a `setName(x)` action.
pub fn name_component() -> Component<String> {
    let template = Template::builder()
        .name("Name")
        .socket("name")
        .action("setName", |args: &[Value]| {
            set("name", args.first().cloned().unwrap_or(Value::Null))
        })
        .render(|tools| format!("name={}", tools.model["name"]))
        .build();
    Component::new(&template, path_map([("name", path!["name"])]))
        .unwrap()
        .named("Name")
}

/// Component with one `value` socket at `path` that counts its renders.
pub fn counting_component(
    name: &str,
    path: socketry::Path,
) -> (Component<String>, Arc<AtomicUsize>) {
    let renders = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&renders);
    let label = name.to_string();
    let template = Template::builder()
        .name(name)
        .socket("value")
        .action("set", |args: &[Value]| {
            set("value", args.first().cloned().unwrap_or(Value::Null))
        })
        .render(move |tools| {
            counter.fetch_add(1, Ordering::SeqCst);
            format!("{}={}", label, tools.model["value"])
        })
        .build();
    let component = Component::new(&template, path_map([("value", path)]))
        .unwrap()
        .named(name);
    (component, renders)
}

/// Stateless page rendering `Name[outlet]`.
pub fn page(name: &'static str) -> Component<String> {
    let template = Template::builder()
        .name(name)
        .render(move |tools| format!("{}[{}]", name, tools.outlet.render(&Value::Null)))
        .build();
    Component::new(&template, socketry::PathMap::new())
        .unwrap()
        .named(name)
}

pub fn renders(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
