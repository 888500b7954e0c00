//! Pointer and keyboard gestures as a finite-state machine.
//!
//! [`Interaction::step`] is a pure function of the current state and one
//! input event. It never touches the graph; it returns [`Effect`]s that the
//! editor state applies.

use log::debug;

use super::types::{Edge, Point};

/// Gesture in progress.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Mode {
	#[default]
	Idle,
	/// Pointer went down on a node and has not been classified yet.
	NodeArmed { node: String },
	/// A drag line follows the pointer from `source`.
	EdgeDragging { source: String, pointer: Point },
	/// Ctrl is held: nodes can be dragged around.
	CtrlPanning { dragging: Option<String> },
	/// Background drag moving the map.
	Panning { last: Point, moved: bool },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Selection {
	#[default]
	None,
	Node(String),
	Edge(Edge),
}

impl Selection {
	pub fn node(&self) -> Option<&str> {
		match self {
			Selection::Node(id) => Some(id),
			_ => None,
		}
	}

	pub fn edge(&self) -> Option<&Edge> {
		match self {
			Selection::Edge(edge) => Some(edge),
			_ => None,
		}
	}

	pub fn is_none(&self) -> bool {
		matches!(self, Selection::None)
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
	pub shift: bool,
	pub ctrl: bool,
}

/// What lies under the pointer.
#[derive(Clone, Debug, PartialEq)]
pub enum HitTarget {
	Canvas,
	Node(String),
	Edge(Edge),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
	Delete,
	Backspace,
	Control,
	Char(char),
	Other,
}

impl Key {
	/// Maps a DOM `KeyboardEvent.key` value.
	pub fn from_dom(key: &str) -> Self {
		match key {
			"Delete" => Key::Delete,
			"Backspace" => Key::Backspace,
			"Control" => Key::Control,
			_ => {
				let mut chars = key.chars();
				match (chars.next(), chars.next()) {
					(Some(c), None) => Key::Char(c),
					_ => Key::Other,
				}
			}
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
	PointerDown {
		at: Point,
		target: HitTarget,
		modifiers: Modifiers,
	},
	PointerMove {
		at: Point,
	},
	PointerUp {
		at: Point,
		target: HitTarget,
	},
	Click {
		at: Point,
		target: HitTarget,
		modifiers: Modifiers,
	},
	Wheel {
		at: Point,
		delta_y: f64,
	},
	PointerEnter,
	PointerLeave,
	KeyDown(Key),
	KeyUp(Key),
	Hover(Option<String>),
	WindowPointerUp,
	WindowBlur,
}

/// Requests produced by a transition.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
	CreateNode { at: Point },
	CreateEdge { source: String, target: String },
	DeleteNode(String),
	DeleteEdge(Edge),
	MoveNode { id: String, to: Point },
	ZoomToExtent,
	ZoomAt { anchor: Point, zoom_in: bool },
	PanBy { dx: f64, dy: f64 },
	SelectionChanged,
	HoverChanged(Option<String>),
	/// Republish the whole editor state so persistence hooks run.
	PersistState,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Interaction {
	pub mode: Mode,
	pub selection: Selection,
	pub hovered: Option<String>,
	pub ctrl_held: bool,
	/// Keyboard handling is live only while the pointer is over the canvas.
	pub listening: bool,
	pub edit_mode: bool,
	/// Held while a node is pressed or dragged; disables pan and zoom.
	pub drag_lock: bool,
	press_consumed: bool,
	pressed_canvas: bool,
}

impl Default for Interaction {
	fn default() -> Self {
		Self::new(true)
	}
}

impl Interaction {
	pub fn new(edit_mode: bool) -> Self {
		Self {
			mode: Mode::Idle,
			selection: Selection::None,
			hovered: None,
			ctrl_held: false,
			listening: false,
			edit_mode,
			drag_lock: false,
			press_consumed: false,
			pressed_canvas: false,
		}
	}

	/// Pure transition: `(state, event) → (state, effects)`.
	pub fn step(mut self, event: InputEvent) -> (Self, Vec<Effect>) {
		let effects = self.apply(event);
		(self, effects)
	}

	/// In-place form of [`Interaction::step`].
	pub fn handle(&mut self, event: InputEvent) -> Vec<Effect> {
		let (next, effects) = self.clone().step(event);
		*self = next;
		effects
	}

	/// Source node and pointer of the drag line, if one is showing.
	pub fn drag_line(&self) -> Option<(&str, Point)> {
		match &self.mode {
			Mode::EdgeDragging { source, pointer } => Some((source, *pointer)),
			_ => None,
		}
	}

	/// Selects `id`, or clears the selection if `id` already is selected.
	pub fn toggle_node(&mut self, id: &str) {
		self.selection = match &self.selection {
			Selection::Node(current) if current == id => Selection::None,
			_ => Selection::Node(id.to_string()),
		};
	}

	pub fn toggle_edge(&mut self, edge: &Edge) {
		self.selection = match &self.selection {
			Selection::Edge(current) if current == edge => Selection::None,
			_ => Selection::Edge(edge.clone()),
		};
	}

	pub fn set_edit_mode(&mut self, on: bool) -> Vec<Effect> {
		if self.edit_mode == on {
			return Vec::new();
		}
		self.edit_mode = on;
		if on {
			return Vec::new();
		}
		let mut effects = self.abandon_gesture();
		self.ctrl_held = false;
		if matches!(self.mode, Mode::CtrlPanning { .. }) {
			self.mode = Mode::Idle;
		}
		effects.push(Effect::SelectionChanged);
		effects
	}

	/// Drops references to a node that no longer exists.
	pub fn forget_node(&mut self, id: &str) {
		let dangling = match &self.selection {
			Selection::Node(n) => n == id,
			Selection::Edge(e) => e.touches(id),
			Selection::None => false,
		};
		if dangling {
			self.selection = Selection::None;
		}
		if self.hovered.as_deref() == Some(id) {
			self.hovered = None;
		}
		let gesture_uses = match &self.mode {
			Mode::NodeArmed { node } => node == id,
			Mode::EdgeDragging { source, .. } => source == id,
			Mode::CtrlPanning { dragging } => dragging.as_deref() == Some(id),
			_ => false,
		};
		if gesture_uses {
			self.mode = self.resting_mode();
			self.drag_lock = false;
		}
	}

	/// Back to a resting state after the graph was replaced.
	pub fn reset(&mut self) {
		self.mode = self.resting_mode();
		self.selection = Selection::None;
		self.hovered = None;
		self.drag_lock = false;
		self.press_consumed = false;
		self.pressed_canvas = false;
	}

	fn resting_mode(&self) -> Mode {
		if self.ctrl_held && self.edit_mode {
			Mode::CtrlPanning { dragging: None }
		} else {
			Mode::Idle
		}
	}

	fn apply(&mut self, event: InputEvent) -> Vec<Effect> {
		match event {
			InputEvent::PointerDown {
				at,
				target,
				modifiers,
			} => self.pointer_down(at, target, modifiers),
			InputEvent::PointerMove { at } => self.pointer_move(at),
			InputEvent::PointerUp { target, .. } => self.pointer_up(target),
			InputEvent::Click {
				at,
				target,
				modifiers,
			} => self.click(at, target, modifiers),
			InputEvent::Wheel { at, delta_y } => {
				if self.drag_lock {
					return Vec::new();
				}
				vec![Effect::ZoomAt {
					anchor: at,
					zoom_in: delta_y < 0.0,
				}]
			}
			InputEvent::PointerEnter => {
				self.listening = true;
				Vec::new()
			}
			InputEvent::PointerLeave => {
				self.listening = false;
				let mut effects = self.abandon_gesture();
				if self.hovered.take().is_some() {
					effects.push(Effect::HoverChanged(None));
				}
				effects
			}
			InputEvent::KeyDown(key) => self.key_down(key),
			InputEvent::KeyUp(key) => self.key_up(key),
			InputEvent::Hover(id) => {
				if self.hovered == id {
					return Vec::new();
				}
				self.hovered = id.clone();
				vec![Effect::HoverChanged(id)]
			}
			InputEvent::WindowPointerUp => self.abandon_gesture(),
			InputEvent::WindowBlur => {
				let effects = self.abandon_gesture();
				self.ctrl_held = false;
				self.mode = Mode::Idle;
				effects
			}
		}
	}

	fn pointer_down(&mut self, at: Point, target: HitTarget, modifiers: Modifiers) -> Vec<Effect> {
		self.press_consumed = false;
		self.pressed_canvas = target == HitTarget::Canvas;

		if let Mode::CtrlPanning { .. } = self.mode {
			return match target {
				HitTarget::Node(id) => {
					debug!("dragging node '{}'", id);
					self.mode = Mode::CtrlPanning { dragging: Some(id) };
					self.drag_lock = true;
					self.press_consumed = true;
					Vec::new()
				}
				_ => Vec::new(),
			};
		}

		match target {
			HitTarget::Node(id) if !modifiers.shift && !modifiers.ctrl => {
				self.toggle_node(&id);
				self.mode = Mode::NodeArmed { node: id };
				self.drag_lock = true;
				self.press_consumed = true;
				vec![Effect::SelectionChanged]
			}
			HitTarget::Node(_) => {
				self.press_consumed = true;
				Vec::new()
			}
			HitTarget::Edge(edge) if !modifiers.ctrl => {
				self.toggle_edge(&edge);
				self.press_consumed = true;
				vec![Effect::SelectionChanged]
			}
			HitTarget::Edge(_) => {
				self.press_consumed = true;
				Vec::new()
			}
			HitTarget::Canvas => {
				if !self.drag_lock {
					self.mode = Mode::Panning {
						last: at,
						moved: false,
					};
				}
				Vec::new()
			}
		}
	}

	fn pointer_move(&mut self, at: Point) -> Vec<Effect> {
		match &mut self.mode {
			Mode::NodeArmed { node } if self.edit_mode => {
				let source = std::mem::take(node);
				self.mode = Mode::EdgeDragging { source, pointer: at };
				Vec::new()
			}
			Mode::EdgeDragging { pointer, .. } => {
				*pointer = at;
				Vec::new()
			}
			Mode::CtrlPanning {
				dragging: Some(id),
			} => vec![Effect::MoveNode {
				id: id.clone(),
				to: at,
			}],
			Mode::Panning { last, moved } => {
				if self.drag_lock {
					return Vec::new();
				}
				let (dx, dy) = (at.x - last.x, at.y - last.y);
				*last = at;
				if dx == 0.0 && dy == 0.0 {
					return Vec::new();
				}
				*moved = true;
				self.press_consumed = true;
				vec![Effect::PanBy { dx, dy }]
			}
			_ => Vec::new(),
		}
	}

	fn pointer_up(&mut self, target: HitTarget) -> Vec<Effect> {
		match std::mem::take(&mut self.mode) {
			Mode::NodeArmed { node: source } | Mode::EdgeDragging { source, .. } => {
				self.drag_lock = false;
				self.mode = self.resting_mode();
				match target {
					HitTarget::Node(target) if target != source && self.edit_mode => {
						debug!("connecting '{}' -> '{}'", source, target);
						self.selection = Selection::Edge(Edge::new(source.clone(), target.clone()));
						vec![
							Effect::CreateEdge { source, target },
							Effect::SelectionChanged,
						]
					}
					_ => Vec::new(),
				}
			}
			Mode::CtrlPanning { dragging } => {
				self.mode = self.resting_mode();
				if dragging.is_some() {
					self.drag_lock = false;
					vec![Effect::PersistState]
				} else {
					Vec::new()
				}
			}
			Mode::Panning { .. } | Mode::Idle => {
				self.mode = self.resting_mode();
				Vec::new()
			}
		}
	}

	fn click(&mut self, at: Point, target: HitTarget, modifiers: Modifiers) -> Vec<Effect> {
		let creates = target == HitTarget::Canvas
			&& self.pressed_canvas
			&& !self.press_consumed
			&& !modifiers.shift
			&& !modifiers.ctrl
			&& self.edit_mode
			&& self.mode == Mode::Idle
			&& self.hovered.is_none();
		self.pressed_canvas = false;
		self.press_consumed = false;
		if creates {
			vec![Effect::CreateNode { at }]
		} else {
			Vec::new()
		}
	}

	fn key_down(&mut self, key: Key) -> Vec<Effect> {
		if !self.listening {
			return Vec::new();
		}
		match key {
			Key::Control if self.edit_mode && !self.ctrl_held => {
				self.ctrl_held = true;
				if self.mode == Mode::Idle {
					self.mode = Mode::CtrlPanning { dragging: None };
				}
				Vec::new()
			}
			Key::Delete | Key::Backspace if self.edit_mode => {
				let effect = match std::mem::take(&mut self.selection) {
					Selection::Node(id) => Effect::DeleteNode(id),
					Selection::Edge(edge) => Effect::DeleteEdge(edge),
					Selection::None => return Vec::new(),
				};
				vec![effect, Effect::SelectionChanged]
			}
			Key::Char('g' | 'G') => vec![Effect::ZoomToExtent],
			_ => Vec::new(),
		}
	}

	fn key_up(&mut self, key: Key) -> Vec<Effect> {
		if key != Key::Control {
			return Vec::new();
		}
		self.ctrl_held = false;
		match std::mem::take(&mut self.mode) {
			Mode::CtrlPanning { dragging } => {
				if dragging.is_some() {
					self.drag_lock = false;
					return vec![Effect::PersistState];
				}
				Vec::new()
			}
			other => {
				self.mode = other;
				Vec::new()
			}
		}
	}

	/// Ends whatever gesture is running and releases the drag lock. A node
	/// drag is finished rather than discarded.
	fn abandon_gesture(&mut self) -> Vec<Effect> {
		let mut effects = Vec::new();
		if let Mode::CtrlPanning { dragging: Some(_) } = self.mode {
			effects.push(Effect::PersistState);
		}
		if self.mode != Mode::Idle || self.drag_lock {
			self.mode = self.resting_mode();
			self.drag_lock = false;
			self.pressed_canvas = false;
			self.press_consumed = false;
		}
		effects
	}
}
