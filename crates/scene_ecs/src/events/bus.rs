//! Subscriptions and synchronous delivery

use crate::ecs::component::Hook;
use crate::ecs::{ComponentId, NodeId, Scene};
use crate::error::Result;
use crate::events::{actions, Message, Payload, Reply};

impl Scene {
    /// Subscribe a component to an action
    pub fn subscribe(&mut self, component: ComponentId, action: &str) {
        if !self.components.contains_key(component) {
            return;
        }
        if self.subscribers.insert(action.to_string(), component) {
            log::trace!("{:?} subscribed to {}", component, action);
        }
    }

    /// Unsubscribe a component from an action; repeated calls are harmless
    pub fn unsubscribe(&mut self, component: ComponentId, action: &str) {
        self.subscribers.remove(action, component);
    }

    /// Drop every subscription of a component
    pub fn unsubscribe_all(&mut self, component: ComponentId) {
        self.subscribers.remove_value(component);
    }

    /// Whether a component listens to an action
    pub fn is_subscribed(&self, component: ComponentId, action: &str) -> bool {
        self.subscribers.contains(action, component)
    }

    /// Subscribers of an action in subscription order
    pub fn subscribers_of(&self, action: &str) -> &[ComponentId] {
        self.subscribers.find_all(action)
    }

    /// Deliver a message to every subscriber of its action
    ///
    /// Delivery follows subscription order, skips the sender and stops once a
    /// handler expires the message. Components unsubscribed or removed by an
    /// earlier handler are not reached. With `tags`, only components whose owner
    /// carries at least one of them are reached. Wildcard observers see the
    /// message afterwards; their replies are not collected.
    pub fn send_message(&mut self, msg: &mut Message, tags: Option<&[&str]>) -> Result<()> {
        let targets = self.subscribers.find_all(msg.action()).to_vec();
        for target in targets {
            if msg.expired {
                break;
            }
            if msg.source() == Some(target) || !self.is_subscribed(target, msg.action()) {
                continue;
            }
            if let Some(tags) = tags {
                if !self.owner_has_any_tag(target, tags) {
                    continue;
                }
            }
            if let Some(reply) = self.deliver(target, msg)? {
                msg.responses.push(target, reply);
            }
        }

        if msg.action() != actions::ANY {
            let observers = self.subscribers.find_all(actions::ANY).to_vec();
            for observer in observers {
                if self.is_subscribed(observer, actions::ANY) {
                    self.deliver(observer, msg)?;
                }
            }
        }

        if self.config.debug_enabled {
            log::debug!(
                "MSG: {}; {} {}",
                msg.action(),
                if msg.responses.is_processed() { "PROCESSED" } else { "IGNORED" },
                if msg.responses.is_error() { "ERROR" } else { "SUCCESS" },
            );
        }
        Ok(())
    }

    /// Publish a message that has no source component
    pub fn emit(&mut self, action: &str, data: Option<Payload>) -> Result<Message> {
        let mut msg = Message::new(action);
        if let Some(data) = data {
            msg = msg.with_payload(data);
        }
        self.send_message(&mut msg, None)?;
        Ok(msg)
    }

    pub(crate) fn notify(
        &mut self,
        action: &str,
        node: NodeId,
        source: Option<ComponentId>,
        data: Option<Payload>,
    ) -> Result<()> {
        if self.subscribers.find_all(action).is_empty() && self.subscribers.find_all(actions::ANY).is_empty() {
            return Ok(());
        }
        let mut msg = Message::new(action).with_node(node);
        if let Some(source) = source {
            msg = msg.with_source(source);
        }
        if let Some(data) = data {
            msg = msg.with_payload(data);
        }
        self.send_message(&mut msg, None)
    }

    fn owner_has_any_tag(&self, component: ComponentId, tags: &[&str]) -> bool {
        self.component_owner(component)
            .and_then(|owner| self.nodes.get(owner))
            .is_some_and(|node| tags.iter().any(|tag| node.has_tag(tag)))
    }

    fn deliver(&mut self, target: ComponentId, msg: &mut Message) -> Result<Option<Reply>> {
        let Some(slot) = self.components.get_mut(target) else {
            return Ok(None);
        };
        if slot.behavior.is_none() {
            slot.deferred.push(Hook::Message(msg.redelivery()));
            return Ok(None);
        }
        Ok(self.invoke(target, |behavior, ctx| behavior.on_message(ctx, msg))?.flatten())
    }
}
