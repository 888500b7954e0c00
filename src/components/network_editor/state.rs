use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::context::{EditorEvent, EventBus, EventKind, SubscriptionId};
use super::graph::{ConstructReport, Graph, GraphOptions};
use super::interaction::{Effect, HitTarget, InputEvent, Interaction, Selection};
use super::reconcile::{ReconcilePatch, Reconciler};
use super::spatial::{DatasetKind, PolygonDataset, SpatialResolver};
use super::transform::{Extent, FitOptions, TransformTransition, ViewPipeline, ZoomTransform, zoom_to_extent};
use super::types::{Edge, GraphData, Node, NodePayload, NodeType, Point};
use crate::config::EditorConfig;
use crate::error::EditorError;

/// Everything the editor knows. All mutation goes through the setter methods
/// here, which recompute derived data before publishing events.
pub struct EditorState {
	pub config: EditorConfig,
	graph: Graph,
	view: ViewPipeline,
	resolver: SpatialResolver,
	interaction: Interaction,
	reconciler: Reconciler,
	transition: Option<TransformTransition>,
	bus: EventBus,
	rng: StdRng,
	scenario_name: String,
	last_patch: ReconcilePatch,
}

impl EditorState {
	/// Editor with an empty graph, centred on the configured location.
	pub fn new(config: EditorConfig, width: f64, height: f64) -> Self {
		let view = ViewPipeline::centered(config.initial_center, config.initial_scale, width, height);
		Self::with_view(config, view, StdRng::from_entropy())
	}

	pub fn with_view(config: EditorConfig, view: ViewPipeline, rng: StdRng) -> Self {
		Self {
			scenario_name: config.scenario_name.clone(),
			config,
			graph: Graph::default(),
			view,
			resolver: SpatialResolver::default(),
			interaction: Interaction::new(true),
			reconciler: Reconciler::default(),
			transition: None,
			bus: EventBus::default(),
			rng,
			last_patch: ReconcilePatch::default(),
		}
	}

	pub fn graph(&self) -> &Graph {
		&self.graph
	}

	pub fn view(&self) -> &ViewPipeline {
		&self.view
	}

	pub fn resolver(&self) -> &SpatialResolver {
		&self.resolver
	}

	pub fn interaction(&self) -> &Interaction {
		&self.interaction
	}

	pub fn reconciler(&self) -> &Reconciler {
		&self.reconciler
	}

	pub fn selection(&self) -> &Selection {
		&self.interaction.selection
	}

	pub fn hovered(&self) -> Option<&str> {
		self.interaction.hovered.as_deref()
	}

	pub fn scenario_name(&self) -> &str {
		&self.scenario_name
	}

	/// Keys touched by the most recent reconciliation.
	pub fn last_patch(&self) -> &ReconcilePatch {
		&self.last_patch
	}

	pub fn is_transitioning(&self) -> bool {
		self.transition.is_some()
	}

	pub fn subscribe(&mut self, kind: EventKind, listener: impl FnMut(&EditorEvent) + 'static) -> SubscriptionId {
		self.bus.subscribe(kind, listener)
	}

	pub fn subscribe_all(&mut self, listener: impl FnMut(&EditorEvent) + 'static) -> SubscriptionId {
		self.bus.subscribe_all(listener)
	}

	pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
		self.bus.unsubscribe(id)
	}

	/// Rebuilds the graph from raw data. This is the only way a graph is
	/// replaced wholesale.
	pub fn replace_graph(&mut self, data: GraphData) -> ConstructReport {
		let options = GraphOptions {
			width: self.view.width,
			height: self.view.height,
			default_node_size: self.config.default_node_size,
		};
		if data.nodes.len() > self.config.max_graph_size {
			debug!(
				"graph has {} nodes, more than the suggested {}",
				data.nodes.len(),
				self.config.max_graph_size
			);
		}
		self.graph = Graph::construct(data, &options, &self.view, &mut self.rng);
		self.interaction.reset();
		self.reconciler = Reconciler::default();
		self.recompute();
		let report = self.graph.report();
		info!(
			"loaded graph: {} nodes, {} edges",
			self.graph.len(),
			self.graph.edges().len()
		);
		self.publish(EditorEvent::GraphReplaced);
		self.publish(EditorEvent::SelectionChanged(Selection::None));
		report
	}

	/// Layers staged data over the current graph (see [`Graph::merge`]) and
	/// rebuilds from the result.
	pub fn merge_graph(&mut self, data: GraphData) -> ConstructReport {
		let merged = self.graph.merge(data);
		self.replace_graph(merged)
	}

	pub fn set_scenario_name(&mut self, name: impl Into<String>) {
		self.scenario_name = name.into();
		self.publish(EditorEvent::StateChange);
	}

	/// Jumps to `transform`, cancelling any running transition.
	pub fn set_transform(&mut self, transform: ZoomTransform) {
		self.transition = None;
		self.apply_transform(transform);
	}

	fn apply_transform(&mut self, transform: ZoomTransform) {
		self.view.transform = transform;
		self.recompute_positions();
		self.publish(EditorEvent::TransformChanged(transform));
	}

	pub fn resize(&mut self, width: f64, height: f64) {
		let center = self.view.transform.invert(self.view.center());
		self.view.width = width;
		self.view.height = height;
		let transform = ZoomTransform::centered_on(center, self.view.transform.k, width, height);
		self.set_transform(transform);
	}

	pub fn set_edit_mode(&mut self, on: bool) {
		let effects = self.interaction.set_edit_mode(on);
		self.apply_effects(effects);
		self.publish(EditorEvent::ModeToggled(on));
	}

	pub fn edit_mode(&self) -> bool {
		self.interaction.edit_mode
	}

	/// Installs (or removes) a reference dataset and re-enriches every node.
	pub fn set_dataset(&mut self, kind: DatasetKind, dataset: Option<PolygonDataset>) {
		self.resolver.set(kind, dataset);
		self.recompute();
		self.publish(EditorEvent::DatasetUpdated(kind));
		self.publish(EditorEvent::GraphChanged);
	}

	/// Feeds one input event through the interaction state machine.
	pub fn handle(&mut self, event: InputEvent) {
		let effects = self.interaction.handle(event);
		self.apply_effects(effects);
	}

	/// What lies under a screen point: nodes first, topmost wins, then edges.
	pub fn hit_test(&self, p: Point) -> HitTarget {
		if let Some(id) = self.node_at(p) {
			return HitTarget::Node(id);
		}
		if let Some(edge) = self.edge_at(p) {
			return HitTarget::Edge(edge);
		}
		HitTarget::Canvas
	}

	pub fn node_at(&self, p: Point) -> Option<String> {
		self.reconciler
			.nodes()
			.iter()
			.rev()
			.find(|v| v.center.distance(p) <= v.radius)
			.map(|v| v.key.clone())
	}

	pub fn edge_at(&self, p: Point) -> Option<Edge> {
		let tolerance = self.config.edge_hit_tolerance;
		self.reconciler
			.edges()
			.iter()
			.rev()
			.find(|v| segment_distance(p, v.from, v.to) <= tolerance)
			.map(|v| v.key.edge())
	}

	/// Updates hover from a pointer position.
	pub fn hover_at(&mut self, p: Point) {
		let hovered = self.node_at(p);
		if hovered.as_deref() != self.hovered() {
			self.handle(InputEvent::Hover(hovered));
		}
	}

	/// Advances the zoom transition by `dt_ms` and emphasis animations.
	pub fn tick(&mut self, dt_ms: f64) {
		if let Some(transition) = &mut self.transition {
			let transform = transition.tick(dt_ms);
			if transition.is_finished() {
				self.transition = None;
			}
			self.apply_transform(transform);
		}
		self.reconciler.tick(dt_ms / 1000.0);
	}

	/// Animates the view to frame the whole graph.
	pub fn zoom_to_fit(&mut self) {
		let ids: Vec<String> = self.graph.nodes().iter().map(|n| n.id.clone()).collect();
		self.zoom_to_nodes(&ids);
	}

	/// Animates the view to frame the given nodes. Unknown ids are ignored,
	/// an empty set does nothing.
	pub fn zoom_to_nodes(&mut self, ids: &[String]) {
		let circles = ids
			.iter()
			.filter_map(|id| self.reconciler.node(id))
			.map(|v| (v.center, v.radius));
		let Some(extent) = Extent::of_circles(circles) else {
			return;
		};
		let opts = FitOptions {
			margin: self.config.fit_margin,
			iterations: self.config.fit_iterations,
			min_scale: self.config.min_scale,
			max_scale: self.config.fit_max_scale,
		};
		if let Some(target) = zoom_to_extent(&self.view, extent, opts) {
			debug!("zooming to extent, k {} -> {}", self.view.transform.k, target.k);
			self.transition = Some(TransformTransition::new(&self.view, target, self.config.transition_ms));
		}
	}

	pub fn rename_node(&mut self, old: &str, new: &str) -> Result<(), EditorError> {
		self.graph.rename_node(old, new)?;
		if self.interaction.selection.node() == Some(old) {
			self.interaction.selection = Selection::Node(new.to_string());
		}
		self.after_edit();
		Ok(())
	}

	pub fn set_node_type(&mut self, id: &str, node_type: NodeType) -> Result<(), EditorError> {
		self.graph.set_node_type(id, node_type)?;
		self.after_edit();
		Ok(())
	}

	pub fn set_node_payload(&mut self, id: &str, payload: Option<NodePayload>) -> Result<(), EditorError> {
		self.graph.set_payload(id, payload)?;
		self.after_edit();
		Ok(())
	}

	pub fn set_node_color(&mut self, id: &str, color: Option<String>) -> Result<(), EditorError> {
		let node = self
			.graph
			.node_mut(id)
			.ok_or_else(|| crate::error::GraphError::UnknownNode(id.to_string()))?;
		node.color = color;
		self.after_edit();
		Ok(())
	}

	fn after_edit(&mut self) {
		self.recompute();
		self.publish(EditorEvent::GraphChanged);
		self.publish(EditorEvent::SelectionChanged(self.interaction.selection.clone()));
	}

	fn apply_effects(&mut self, effects: Vec<Effect>) {
		let mut changed = false;
		let mut pending = Vec::new();
		for effect in effects {
			match effect {
				Effect::CreateNode { at } => {
					let id = self.graph.fresh_node_id(&mut self.rng);
					let node = Node::new(
						id.clone(),
						self.view.point_to_longlat(at),
						self.config.default_node_size,
					);
					if self.graph.add_node(node).is_ok() {
						debug!("created node '{}'", id);
						self.interaction.selection = Selection::Node(id);
						pending.push(EditorEvent::SelectionChanged(self.interaction.selection.clone()));
						changed = true;
					}
				}
				Effect::CreateEdge { source, target } => {
					changed |= self.graph.add_edge(&source, &target);
				}
				Effect::DeleteNode(id) => {
					if self.graph.delete_node(&id).is_some() {
						self.interaction.forget_node(&id);
						changed = true;
					}
				}
				Effect::DeleteEdge(edge) => {
					changed |= self.graph.delete_edge(&edge);
				}
				Effect::MoveNode { id, to } => {
					let longlat = self.view.point_to_longlat(to);
					if let Some(node) = self.graph.node_mut(&id) {
						node.longlat = longlat;
						changed = true;
					}
				}
				Effect::ZoomToExtent => self.zoom_to_fit(),
				Effect::ZoomAt { anchor, zoom_in } => {
					let factor = if zoom_in {
						self.config.wheel_zoom_in
					} else {
						self.config.wheel_zoom_out
					};
					let transform = self.view.transform.zoom_about(
						anchor,
						factor,
						self.config.min_scale,
						self.config.max_scale,
					);
					self.set_transform(transform);
				}
				Effect::PanBy { dx, dy } => {
					let transform = self.view.transform.panned(dx, dy);
					self.set_transform(transform);
				}
				Effect::SelectionChanged => {
					pending.push(EditorEvent::SelectionChanged(self.interaction.selection.clone()));
				}
				Effect::HoverChanged(id) => pending.push(EditorEvent::NodeHovered(id)),
				Effect::PersistState => pending.push(EditorEvent::StateChange),
			}
		}

		if changed {
			self.recompute();
			self.publish(EditorEvent::GraphChanged);
		} else if !pending.is_empty() {
			// selection and hover only restyle
			self.reconcile();
		}
		for event in pending {
			self.publish(event);
		}
	}

	/// Re-derives positions and enrichment, then reconciles the view.
	fn recompute(&mut self) {
		self.graph.reproject(&self.view);
		for node in self.graph.nodes_mut() {
			self.resolver.enrich(node);
		}
		self.reconcile();
	}

	fn recompute_positions(&mut self) {
		self.graph.reproject(&self.view);
		self.reconcile();
	}

	fn reconcile(&mut self) {
		self.last_patch = self.reconciler.update(
			&self.graph,
			&self.interaction.selection,
			self.interaction.hovered.as_deref(),
			&self.config,
		);
	}

	fn publish(&mut self, event: EditorEvent) {
		self.bus.publish(&event);
	}
}

impl std::fmt::Debug for EditorState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EditorState")
			.field("nodes", &self.graph.len())
			.field("edges", &self.graph.edges().len())
			.field("transform", &self.view.transform)
			.field("interaction", &self.interaction)
			.finish()
	}
}

fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
	let (dx, dy) = (b.x - a.x, b.y - a.y);
	let len2 = dx * dx + dy * dy;
	if len2 == 0.0 {
		return p.distance(a);
	}
	let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
	p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;
	use crate::components::network_editor::interaction::{Key, Modifiers};
	use crate::components::network_editor::transform::Projection;

	fn editor() -> EditorState {
		let view = ViewPipeline::new(Projection::default(), ZoomTransform::IDENTITY, 800.0, 600.0);
		let config = EditorConfig {
			min_scale: 0.01,
			..EditorConfig::default()
		};
		let mut state = EditorState::with_view(config, view, StdRng::seed_from_u64(3));
		state.handle(InputEvent::PointerEnter);
		state
	}

	fn data(value: serde_json::Value) -> GraphData {
		serde_json::from_value(value).unwrap()
	}

	fn press(state: &mut EditorState, at: Point) {
		let target = state.hit_test(at);
		state.handle(InputEvent::PointerDown {
			at,
			target: target.clone(),
			modifiers: Modifiers::default(),
		});
		state.handle(InputEvent::PointerUp { at, target: target.clone() });
		state.handle(InputEvent::Click {
			at,
			target,
			modifiers: Modifiers::default(),
		});
	}

	#[test]
	fn segment_distance_clamps_to_endpoints() {
		let (a, b) = (Point::new(0.0, 0.0), Point::new(10.0, 0.0));
		assert_eq!(segment_distance(Point::new(5.0, 3.0), a, b), 3.0);
		assert_eq!(segment_distance(Point::new(13.0, 4.0), a, b), 5.0);
	}

	#[test]
	fn click_creates_selected_node_at_pointer() {
		let mut state = editor();
		press(&mut state, Point::new(100.0, 100.0));
		assert_eq!(state.graph().len(), 1);
		let node = &state.graph().nodes()[0];
		assert_eq!(state.selection(), &Selection::Node(node.id.clone()));
		assert!((node.x - 100.0).abs() < 1e-6 && (node.y - 100.0).abs() < 1e-6);
	}

	#[test]
	fn events_arrive_after_model_is_updated() {
		let mut state = editor();
		let log = Rc::new(RefCell::new(Vec::new()));
		let sink = log.clone();
		state.subscribe_all(move |e| sink.borrow_mut().push(e.kind()));
		press(&mut state, Point::new(100.0, 100.0));
		assert_eq!(
			*log.borrow(),
			vec![EventKind::GraphChanged, EventKind::SelectionChanged]
		);
	}

	#[test]
	fn delete_key_removes_selected_node_and_its_edges() {
		let mut state = editor();
		state.replace_graph(data(json!({
			"nodes": [
				{"id": "0", "node_type": "treatment_facility", "x": 300.0, "y": 300.0},
				{"id": "1", "node_type": "land_surface", "x": 100.0, "y": 100.0}
			],
			"edges": [{"source": "1", "target": "0"}]
		})));
		press(&mut state, Point::new(300.0, 300.0));
		assert_eq!(state.selection(), &Selection::Node("0".into()));
		state.handle(InputEvent::KeyDown(Key::Delete));
		let ids: Vec<&str> = state.graph().nodes().iter().map(|n| n.id.as_str()).collect();
		assert_eq!(ids, vec!["1"]);
		assert!(state.graph().edges().is_empty());
		assert!(state.selection().is_none());
		assert!(state.reconciler().edges().is_empty());
	}

	#[test]
	fn wheel_zoom_keeps_pointer_anchored_and_reprojects() {
		let mut state = editor();
		state.replace_graph(data(json!({"nodes": [{"id": "a", "longlat": [0.0, 0.0]}]})));
		let anchor = Point::new(480.0, 250.0);
		state.handle(InputEvent::Wheel { at: anchor, delta_y: -1.0 });
		assert!((state.view().transform.k - 1.1).abs() < 1e-12);
		let node = state.graph().node("a").unwrap();
		assert!((node.x - 480.0).abs() < 1e-9 && (node.y - 250.0).abs() < 1e-9);
	}

	#[test]
	fn zoom_to_fit_animates_to_target() {
		let mut state = editor();
		state.replace_graph(data(json!({"nodes": [{"id": "a", "x": 100.0, "y": 80.0}]})));
		state.handle(InputEvent::KeyDown(Key::Char('g')));
		assert!(state.is_transitioning());
		state.tick(10_000.0);
		assert!(!state.is_transitioning());
		let node = state.graph().node("a").unwrap();
		assert!((node.x - 400.0).abs() < 1e-3 && (node.y - 300.0).abs() < 1e-3, "{node:?}");
	}

	#[test]
	fn resize_keeps_map_centre() {
		let mut state = editor();
		let before = state.view().point_to_longlat(state.view().center());
		state.resize(1000.0, 700.0);
		let after = state.view().point_to_longlat(state.view().center());
		assert!((before.lon() - after.lon()).abs() < 1e-9 && (before.lat() - after.lat()).abs() < 1e-9);
	}

	#[test]
	fn leaving_edit_mode_blocks_creation() {
		let mut state = editor();
		state.set_edit_mode(false);
		press(&mut state, Point::new(100.0, 100.0));
		assert!(state.graph().is_empty());
	}

	#[test]
	fn rename_follows_selection() {
		let mut state = editor();
		state.replace_graph(data(json!({"nodes": [{"id": "a", "x": 100.0, "y": 100.0}]})));
		press(&mut state, Point::new(100.0, 100.0));
		state.rename_node("a", "outfall").unwrap();
		assert_eq!(state.selection(), &Selection::Node("outfall".into()));
		assert!(state.rename_node("missing", "x").is_err());
	}
}
