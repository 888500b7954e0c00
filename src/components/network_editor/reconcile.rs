//! Keyed view elements derived from the graph.
//!
//! Each node and edge maps to a view element keyed by stable identity, so an
//! update restyles and repositions existing elements and keeps their
//! animation state instead of recreating them.

use std::collections::HashMap;

use super::graph::Graph;
use super::interaction::Selection;
use super::types::{Edge, Node, Point};
use crate::config::EditorConfig;

pub const MIN_NODE_RADIUS: f64 = 3.0;
pub const EMPHASIS_SCALE: f64 = 1.3;
pub const ARROW_LENGTH: f64 = 5.0;
const FALLBACK_COLOR: Rgb = Rgb::new(211, 211, 211);

/// sRGB colour with d3-style brighten/darken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
	pub r: u8,
	pub g: u8,
	pub b: u8,
}

impl Rgb {
	pub const fn new(r: u8, g: u8, b: u8) -> Self {
		Self { r, g, b }
	}

	/// Accepts `#rgb`, `#rrggbb` and a handful of CSS names.
	pub fn parse(s: &str) -> Option<Self> {
		let s = s.trim();
		if let Some(hex) = s.strip_prefix('#') {
			let digits: Vec<u8> = hex
				.chars()
				.map(|c| c.to_digit(16).map(|d| d as u8))
				.collect::<Option<_>>()?;
			return match digits.as_slice() {
				[r, g, b] => Some(Self::new(r * 17, g * 17, b * 17)),
				[r1, r2, g1, g2, b1, b2] => Some(Self::new(r1 * 16 + r2, g1 * 16 + g2, b1 * 16 + b2)),
				_ => None,
			};
		}
		let rgb = match s.to_ascii_lowercase().as_str() {
			"black" => (0, 0, 0),
			"white" => (255, 255, 255),
			"red" => (255, 0, 0),
			"green" => (0, 128, 0),
			"blue" => (0, 0, 255),
			"grey" | "gray" => (128, 128, 128),
			"dimgrey" | "dimgray" => (105, 105, 105),
			"lightgrey" | "lightgray" => (211, 211, 211),
			"limegreen" => (50, 205, 50),
			"steelblue" => (70, 130, 180),
			"orangered" => (255, 69, 0),
			"orange" => (255, 165, 0),
			"purple" => (128, 0, 128),
			"teal" => (0, 128, 128),
			"gold" => (255, 215, 0),
			_ => return None,
		};
		Some(Self::new(rgb.0, rgb.1, rgb.2))
	}

	fn scaled(&self, factor: f64) -> Self {
		let c = |v: u8| (v as f64 * factor).round().clamp(0.0, 255.0) as u8;
		Self::new(c(self.r), c(self.g), c(self.b))
	}

	pub fn brighter(&self, k: f64) -> Self {
		self.scaled((1.0 / 0.7f64).powf(k))
	}

	pub fn darker(&self, k: f64) -> Self {
		self.scaled(0.7f64.powf(k))
	}

	pub fn to_css(&self) -> String {
		format!("rgb({}, {}, {})", self.r, self.g, self.b)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeView {
	pub key: String,
	pub center: Point,
	pub radius: f64,
	pub fill: Rgb,
	pub stroke: Rgb,
	pub emphasized: bool,
	/// Eases toward 1 while emphasized and back to 0 after.
	pub emphasis_t: f64,
}

/// Edges are keyed by endpoints plus an ordinal among parallel duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
	pub source: String,
	pub target: String,
	pub ordinal: usize,
}

impl EdgeKey {
	pub fn edge(&self) -> Edge {
		Edge::new(self.source.clone(), self.target.clone())
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct EdgeView {
	pub key: EdgeKey,
	pub from: Point,
	pub to: Point,
	pub selected: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Patch<K> {
	pub entered: Vec<K>,
	pub updated: Vec<K>,
	pub exited: Vec<K>,
}

impl<K> Default for Patch<K> {
	fn default() -> Self {
		Self {
			entered: Vec::new(),
			updated: Vec::new(),
			exited: Vec::new(),
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcilePatch {
	pub nodes: Patch<String>,
	pub edges: Patch<EdgeKey>,
}

#[derive(Clone, Debug, Default)]
pub struct Reconciler {
	nodes: Vec<NodeView>,
	edges: Vec<EdgeView>,
}

impl Reconciler {
	pub fn nodes(&self) -> &[NodeView] {
		&self.nodes
	}

	pub fn edges(&self) -> &[EdgeView] {
		&self.edges
	}

	pub fn node(&self, key: &str) -> Option<&NodeView> {
		self.nodes.iter().find(|v| v.key == key)
	}

	/// Rebuilds the view list from the graph, which must already carry fresh
	/// screen positions.
	pub fn update(
		&mut self,
		graph: &Graph,
		selection: &Selection,
		hovered: Option<&str>,
		config: &EditorConfig,
	) -> ReconcilePatch {
		let mut patch = ReconcilePatch::default();

		let mut previous: HashMap<String, NodeView> =
			self.nodes.drain(..).map(|v| (v.key.clone(), v)).collect();
		for node in graph.nodes() {
			let emphasized = selection.node() == Some(node.id.as_str()) || hovered == Some(node.id.as_str());
			let mut view = node_view(node, emphasized, config);
			match previous.remove(&node.id) {
				Some(old) => {
					view.emphasis_t = old.emphasis_t;
					patch.nodes.updated.push(view.key.clone());
				}
				None => patch.nodes.entered.push(view.key.clone()),
			}
			self.nodes.push(view);
		}
		let mut exited: Vec<String> = previous.into_keys().collect();
		exited.sort();
		patch.nodes.exited = exited;

		let mut previous: HashMap<EdgeKey, EdgeView> =
			self.edges.drain(..).map(|v| (v.key.clone(), v)).collect();
		let mut ordinals: HashMap<(&str, &str), usize> = HashMap::new();
		for edge in graph.edges() {
			let ordinal = ordinals.entry((&edge.source, &edge.target)).or_default();
			let key = EdgeKey {
				source: edge.source.clone(),
				target: edge.target.clone(),
				ordinal: *ordinal,
			};
			*ordinal += 1;
			let (Some(s), Some(t)) = (self.node(&edge.source), self.node(&edge.target)) else {
				continue;
			};
			let (from, to) = edge_path(s, t);
			let view = EdgeView {
				selected: selection.edge() == Some(edge),
				key,
				from,
				to,
			};
			if previous.remove(&view.key).is_some() {
				patch.edges.updated.push(view.key.clone());
			} else {
				patch.edges.entered.push(view.key.clone());
			}
			self.edges.push(view);
		}
		let mut exited: Vec<EdgeKey> = previous.into_keys().collect();
		exited.sort();
		patch.edges.exited = exited;

		patch
	}

	/// Advance emphasis animations by `dt` seconds.
	pub fn tick(&mut self, dt: f64) {
		const SPEED: f64 = 8.0;
		for view in &mut self.nodes {
			let target = if view.emphasized { 1.0 } else { 0.0 };
			view.emphasis_t += (target - view.emphasis_t) * (SPEED * dt).min(1.0);
			if (target - view.emphasis_t).abs() < 0.01 {
				view.emphasis_t = target;
			}
		}
	}
}

fn node_view(node: &Node, emphasized: bool, config: &EditorConfig) -> NodeView {
	let base = node
		.color
		.as_deref()
		.or_else(|| config.node_color(node.node_type))
		.and_then(Rgb::parse)
		.unwrap_or(FALLBACK_COLOR);
	let fill = if emphasized { base.brighter(3.0) } else { base };
	let radius = node.size.max(MIN_NODE_RADIUS) * if emphasized { EMPHASIS_SCALE } else { 1.0 };
	NodeView {
		key: node.id.clone(),
		center: node.position(),
		radius,
		fill,
		stroke: base.darker(1.0),
		emphasized,
		emphasis_t: 0.0,
	}
}

/// Segment from the rim of the source to just short of the target's rim,
/// leaving room for the arrow head. Falls back to centre to centre when the
/// nodes overlap.
pub fn edge_path(source: &NodeView, target: &NodeView) -> (Point, Point) {
	let (s, t) = (source.center, target.center);
	let dist = s.distance(t);
	let trim = source.radius + target.radius + ARROW_LENGTH;
	if dist <= trim || dist == 0.0 {
		return (s, t);
	}
	let (ux, uy) = ((t.x - s.x) / dist, (t.y - s.y) / dist);
	let end = target.radius + ARROW_LENGTH;
	(
		Point::new(s.x + ux * source.radius, s.y + uy * source.radius),
		Point::new(t.x - ux * end, t.y - uy * end),
	)
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::components::network_editor::types::{LongLat, NodeType};

	fn graph_with(nodes: &[(&str, f64, f64)], edges: &[(&str, &str)]) -> Graph {
		let mut graph = Graph::default();
		for (id, x, y) in nodes {
			let mut node = Node::new(*id, LongLat(0.0, 0.0), 20.0).with_type(NodeType::TreatmentFacility);
			node.x = *x;
			node.y = *y;
			graph.add_node(node).unwrap();
		}
		for (s, t) in edges {
			assert!(graph.add_edge(s, t));
		}
		graph
	}

	#[test]
	fn colours_parse_and_shift() {
		assert_eq!(Rgb::parse("#0f0"), Some(Rgb::new(0, 255, 0)));
		assert_eq!(Rgb::parse("steelblue"), Rgb::parse("#4682b4"));
		assert_eq!(Rgb::parse("nope"), None);
		let c = Rgb::new(70, 130, 180);
		assert_eq!(c.darker(1.0), Rgb::new(49, 91, 126));
		assert_eq!(c.brighter(3.0), Rgb::new(204, 255, 255));
	}

	#[test]
	fn selected_node_is_enlarged_and_brightened() {
		let graph = graph_with(&[("a", 0.0, 0.0), ("b", 100.0, 0.0)], &[]);
		let mut rec = Reconciler::default();
		rec.update(&graph, &Selection::Node("a".into()), None, &EditorConfig::default());
		let (a, b) = (rec.node("a").unwrap(), rec.node("b").unwrap());
		assert!((a.radius - 26.0).abs() < 1e-9);
		assert_eq!(b.radius, 20.0);
		assert_eq!(b.fill, Rgb::parse("steelblue").unwrap());
		assert_eq!(a.fill, b.fill.brighter(3.0));
	}

	#[test]
	fn outline_stays_with_the_node_colour_when_selected() {
		let graph = graph_with(&[("a", 0.0, 0.0), ("b", 100.0, 0.0)], &[]);
		let mut rec = Reconciler::default();
		rec.update(&graph, &Selection::Node("a".into()), None, &EditorConfig::default());
		let (a, b) = (rec.node("a").unwrap(), rec.node("b").unwrap());
		let base = Rgb::parse("steelblue").unwrap();
		assert_eq!(a.stroke, base.darker(1.0));
		assert_eq!(a.stroke, b.stroke);
	}

	#[test]
	fn patch_reports_entered_updated_exited() {
		let cfg = EditorConfig::default();
		let mut graph = graph_with(&[("a", 0.0, 0.0), ("b", 100.0, 0.0)], &[("a", "b")]);
		let mut rec = Reconciler::default();
		let first = rec.update(&graph, &Selection::None, None, &cfg);
		assert_eq!(first.nodes.entered, vec!["a".to_string(), "b".to_string()]);
		assert_eq!(first.edges.entered.len(), 1);

		graph.delete_node("b");
		graph
			.add_node(Node::new("c", LongLat(0.0, 0.0), 20.0))
			.unwrap();
		let second = rec.update(&graph, &Selection::None, None, &cfg);
		assert_eq!(second.nodes.updated, vec!["a".to_string()]);
		assert_eq!(second.nodes.entered, vec!["c".to_string()]);
		assert_eq!(second.nodes.exited, vec!["b".to_string()]);
		assert_eq!(second.edges.exited.len(), 1);
		assert!(rec.edges().is_empty());
	}

	#[test]
	fn emphasis_survives_updates() {
		let cfg = EditorConfig::default();
		let graph = graph_with(&[("a", 0.0, 0.0)], &[]);
		let mut rec = Reconciler::default();
		rec.update(&graph, &Selection::None, Some("a"), &cfg);
		rec.tick(1.0);
		assert_eq!(rec.node("a").unwrap().emphasis_t, 1.0);
		rec.update(&graph, &Selection::None, Some("a"), &cfg);
		assert_eq!(rec.node("a").unwrap().emphasis_t, 1.0);
	}

	#[test]
	fn edge_path_is_trimmed_unless_nodes_overlap() {
		let graph = graph_with(&[("a", 0.0, 0.0), ("b", 100.0, 0.0), ("c", 30.0, 0.0)], &[("a", "b"), ("a", "c")]);
		let mut rec = Reconciler::default();
		rec.update(&graph, &Selection::None, None, &EditorConfig::default());
		let far = &rec.edges()[0];
		assert_eq!((far.from, far.to), (Point::new(20.0, 0.0), Point::new(75.0, 0.0)));
		let near = &rec.edges()[1];
		assert_eq!((near.from, near.to), (Point::new(0.0, 0.0), Point::new(30.0, 0.0)));
	}
}
