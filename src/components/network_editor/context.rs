//! Typed publish/subscribe between the editor and the surrounding UI.

use super::interaction::Selection;
use super::spatial::DatasetKind;
use super::transform::ZoomTransform;

#[derive(Clone, Debug, PartialEq)]
pub enum EditorEvent {
	SelectionChanged(Selection),
	/// The whole graph was rebuilt from raw data.
	GraphReplaced,
	/// Nodes or edges were mutated in place.
	GraphChanged,
	NodeHovered(Option<String>),
	TransformChanged(ZoomTransform),
	ModeToggled(bool),
	DatasetUpdated(DatasetKind),
	/// Full state republished, used by persistence hooks.
	StateChange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
	SelectionChanged,
	GraphReplaced,
	GraphChanged,
	NodeHovered,
	TransformChanged,
	ModeToggled,
	DatasetUpdated,
	StateChange,
}

impl EditorEvent {
	pub fn kind(&self) -> EventKind {
		match self {
			EditorEvent::SelectionChanged(_) => EventKind::SelectionChanged,
			EditorEvent::GraphReplaced => EventKind::GraphReplaced,
			EditorEvent::GraphChanged => EventKind::GraphChanged,
			EditorEvent::NodeHovered(_) => EventKind::NodeHovered,
			EditorEvent::TransformChanged(_) => EventKind::TransformChanged,
			EditorEvent::ModeToggled(_) => EventKind::ModeToggled,
			EditorEvent::DatasetUpdated(_) => EventKind::DatasetUpdated,
			EditorEvent::StateChange => EventKind::StateChange,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&EditorEvent)>;

/// Delivers every event to its subscribers synchronously, in subscription
/// order.
#[derive(Default)]
pub struct EventBus {
	listeners: Vec<(SubscriptionId, Option<EventKind>, Listener)>,
	next_id: u64,
}

impl std::fmt::Debug for EventBus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventBus")
			.field("listeners", &self.listeners.len())
			.finish()
	}
}

impl EventBus {
	pub fn subscribe(&mut self, kind: EventKind, listener: impl FnMut(&EditorEvent) + 'static) -> SubscriptionId {
		self.insert(Some(kind), Box::new(listener))
	}

	/// Receives every event.
	pub fn subscribe_all(&mut self, listener: impl FnMut(&EditorEvent) + 'static) -> SubscriptionId {
		self.insert(None, Box::new(listener))
	}

	pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
		let before = self.listeners.len();
		self.listeners.retain(|(sid, _, _)| *sid != id);
		self.listeners.len() != before
	}

	pub fn publish(&mut self, event: &EditorEvent) {
		let kind = event.kind();
		for (_, filter, listener) in &mut self.listeners {
			if filter.is_none_or(|k| k == kind) {
				listener(event);
			}
		}
	}

	fn insert(&mut self, kind: Option<EventKind>, listener: Listener) -> SubscriptionId {
		let id = SubscriptionId(self.next_id);
		self.next_id += 1;
		self.listeners.push((id, kind, listener));
		id
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn listeners_only_see_their_kind() {
		let mut bus = EventBus::default();
		let seen = Rc::new(RefCell::new(Vec::new()));
		let sink = seen.clone();
		bus.subscribe(EventKind::NodeHovered, move |e| sink.borrow_mut().push(e.clone()));

		bus.publish(&EditorEvent::GraphChanged);
		bus.publish(&EditorEvent::NodeHovered(Some("a".into())));
		assert_eq!(*seen.borrow(), vec![EditorEvent::NodeHovered(Some("a".into()))]);
	}

	#[test]
	fn unsubscribed_listener_is_silent() {
		let mut bus = EventBus::default();
		let count = Rc::new(RefCell::new(0));
		let c = count.clone();
		let id = bus.subscribe_all(move |_| *c.borrow_mut() += 1);
		bus.publish(&EditorEvent::StateChange);
		assert!(bus.unsubscribe(id));
		assert!(!bus.unsubscribe(id));
		bus.publish(&EditorEvent::StateChange);
		assert_eq!(*count.borrow(), 1);
	}
}
