use std::cell::RefCell;
use std::rc::Rc;

use super::Harness;
use crate::components::FuncComponent;
use crate::core::config::{ChangeNotifications, SceneConfig};
use crate::events::{actions, AttributeChange, Reply, TagChange};

type Trace = Rc<RefCell<Vec<String>>>;

#[test]
fn test_change_notifications_for_live_nodes() {
    let config = SceneConfig::default().with_notifications(ChangeNotifications::ATTRIBUTES | ChangeNotifications::TAGS);
    let mut harness = Harness::with_config(config);
    let trace = Trace::default();
    let root = harness.root();

    let (attributes, tags) = (Rc::clone(&trace), Rc::clone(&trace));
    let observer = FuncComponent::new("observer")
        .do_on_message(actions::ATTRIBUTE_ADDED, move |_, msg| {
            if let Some(change) = msg.data::<AttributeChange>() {
                attributes.borrow_mut().push(format!("attribute:{}", change.key));
            }
            Ok(())
        })
        .do_on_message(actions::TAG_ADDED, move |_, msg| {
            if let Some(change) = msg.data::<TagChange>() {
                tags.borrow_mut().push(format!("tag:{}", change.tag));
            }
            Ok(())
        });
    harness.scene.spawn_component_and_run(root, observer).unwrap();

    let offstage = harness.scene.create_node("offstage");
    harness.scene.assign_attribute(offstage, "hp", 3_u32).unwrap();
    harness.scene.add_tag(offstage, "enemy").unwrap();
    assert!(trace.borrow().is_empty());

    harness.scene.add_child(root, offstage).unwrap();
    harness.scene.assign_attribute(offstage, "speed", 1.5_f64).unwrap();
    harness.scene.add_tag(offstage, "boss").unwrap();
    // state changes aren't enabled
    harness.scene.set_state_id(offstage, 4).unwrap();

    assert_eq!(*trace.borrow(), ["attribute:speed", "tag:boss"]);
}

#[test]
fn test_replies_are_aggregated() {
    let mut harness = Harness::new();
    let root = harness.root();

    let oracle = FuncComponent::new("oracle").do_on_message_reply("ASK", |_, _| Ok(Some(Reply::data(42_u32))));
    let skeptic = FuncComponent::new("skeptic").do_on_message_reply("ASK", |_, _| Ok(Some(Reply::error("no idea"))));
    let silent = FuncComponent::new("silent").do_on_message("ASK", |_, _| Ok(()));
    for component in [oracle, skeptic, silent] {
        harness.scene.spawn_component_and_run(root, component).unwrap();
    }

    let msg = harness.scene.emit("ASK", None).unwrap();
    assert_eq!(msg.responses.len(), 2);
    assert_eq!(msg.responses.data::<u32>(), Some(&42));
    assert!(msg.responses.is_processed());
    assert!(msg.responses.is_error());
    assert!(!msg.responses.is_success());

    let msg = harness.scene.emit("UNHEARD", None).unwrap();
    assert!(!msg.responses.is_processed());
}

#[test]
fn test_message_to_busy_component_is_deferred() {
    let mut harness = Harness::new();
    let trace = Trace::default();
    let root = harness.root();

    // pinger sends during its own update; the pong comes back while it is busy
    let (pings, pongs) = (Rc::clone(&trace), Rc::clone(&trace));
    let mut sent = false;
    let pinger = FuncComponent::new("pinger")
        .do_on_update(move |ctx, _, _| {
            if !sent {
                sent = true;
                let msg = ctx.send_message("PING", None)?;
                pings.borrow_mut().push(format!("ping replies:{}", msg.responses.len()));
            }
            Ok(())
        })
        .do_on_message("PONG", move |_, _| {
            pongs.borrow_mut().push("pong".to_string());
            Ok(())
        });
    let ponger = FuncComponent::new("ponger").do_on_message_reply("PING", |ctx, _| {
        let msg = ctx.send_message("PONG", None)?;
        Ok(Some(Reply::data(msg.responses.len())))
    });
    // buffered, so both are subscribed before the pinger's first update
    harness.scene.spawn_component(root, pinger).unwrap();
    harness.scene.spawn_component(root, ponger).unwrap();

    harness.tick();
    assert_eq!(*trace.borrow(), ["ping replies:1", "pong"]);
}

#[test]
fn test_wildcard_observer_sees_everything() {
    let mut harness = Harness::new();
    let trace = Trace::default();
    let root = harness.root();

    let sink = Rc::clone(&trace);
    let observer = FuncComponent::new("observer").do_on_message_reply(actions::ANY, move |_, msg| {
        sink.borrow_mut().push(msg.action().to_string());
        Ok(Some(Reply::data(())))
    });
    harness.scene.spawn_component_and_run(root, observer).unwrap();

    let node = harness.scene.create_node("ship");
    harness.scene.add_child(root, node).unwrap();
    let msg = harness.scene.emit("FIRE", None).unwrap();

    assert!(!msg.responses.is_processed());
    assert_eq!(*trace.borrow(), [actions::OBJECT_ADDED, "FIRE"]);
}

#[test]
fn test_clear_scene_notifies_and_removes_everything() {
    let mut harness = Harness::new();
    let trace = Trace::default();
    let root = harness.root();
    let node = harness.scene.create_node("ship");
    harness.scene.add_child(root, node).unwrap();

    let (cleared, removed) = (Rc::clone(&trace), Rc::clone(&trace));
    let listener = FuncComponent::new("listener")
        .do_on_message(actions::SCENE_CLEAR, move |_, msg| {
            let name = msg.data::<String>().cloned().unwrap_or_default();
            cleared.borrow_mut().push(format!("clear:{name}"));
            Ok(())
        })
        .do_on_remove(move |_| {
            removed.borrow_mut().push("removed".to_string());
            Ok(())
        });
    let listener = harness.scene.spawn_component(node, listener).unwrap();
    harness.scene.call_with_delay(5000.0, |_| panic!("dropped by the clear"));
    harness.tick();

    harness.scene.clear_scene(None).unwrap();
    assert_eq!(*trace.borrow(), ["clear:test", "removed"]);
    assert!(harness.scene.is_completed(listener));
    assert!(harness.scene.subscribers_of(actions::SCENE_CLEAR).is_empty());
    assert_eq!(harness.scene.pending_invocations(), 0);
    assert_eq!(harness.scene.node_count(), 1);

    harness.advance(6000.0);
}
