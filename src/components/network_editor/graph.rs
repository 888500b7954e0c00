use std::collections::HashSet;

use log::{debug, warn};
use rand::Rng;
use rand::distributions::Alphanumeric;

use super::transform::ViewPipeline;
use super::types::{Edge, GraphData, Node, NodePayload, NodeType, Point, RawNode};
use crate::error::{EditorError, GraphError, PayloadError};

const NODE_ID_LEN: usize = 5;

/// Viewport and sizing used when constructing a graph.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GraphOptions {
	pub width: f64,
	pub height: f64,
	pub default_node_size: f64,
}

impl Default for GraphOptions {
	fn default() -> Self {
		Self {
			width: 600.0,
			height: 400.0,
			default_node_size: 20.0,
		}
	}
}

/// What construction threw away.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConstructReport {
	pub dropped_nodes: usize,
	pub dropped_edges: usize,
	pub dropped_payloads: usize,
}

/// Node arena keyed by id, plus directed edges between those ids.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Graph {
	nodes: Vec<Node>,
	edges: Vec<Edge>,
	report: ConstructReport,
}

impl Graph {
	/// Builds a graph from raw lists. Nodes without an id, repeated ids and
	/// edges with an endpoint outside the node set are dropped. Nodes without
	/// a position are scattered around the viewport centre, and nodes without
	/// `longlat` take it from their screen position.
	pub fn construct<R: Rng>(
		data: GraphData,
		options: &GraphOptions,
		view: &ViewPipeline,
		rng: &mut R,
	) -> Self {
		let mut report = ConstructReport::default();
		let mut seen = HashSet::new();
		let mut nodes = Vec::with_capacity(data.nodes.len());

		for raw in data.nodes {
			let Some(id) = raw.id.clone().filter(|id| !id.is_empty()) else {
				debug!("dropping node without id");
				report.dropped_nodes += 1;
				continue;
			};
			if !seen.insert(id.clone()) {
				warn!("dropping repeated node id '{}'", id);
				report.dropped_nodes += 1;
				continue;
			}
			let (node, payload_ok) = node_from_raw(id, raw, options, view, rng);
			if !payload_ok {
				report.dropped_payloads += 1;
			}
			nodes.push(node);
		}

		let edges: Vec<Edge> = data
			.edges
			.into_iter()
			.filter(|e| {
				let resolved = seen.contains(&e.source) && seen.contains(&e.target);
				if !resolved {
					warn!("dropping edge {} -> {}: unknown endpoint", e.source, e.target);
					report.dropped_edges += 1;
				}
				resolved
			})
			.collect();

		debug!(
			"constructed graph with {} nodes and {} edges",
			nodes.len(),
			edges.len()
		);
		Self { nodes, edges, report }
	}

	pub fn report(&self) -> ConstructReport {
		self.report
	}

	pub fn nodes(&self) -> &[Node] {
		&self.nodes
	}

	pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
		self.nodes.iter_mut()
	}

	pub fn edges(&self) -> &[Edge] {
		&self.edges
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	pub fn contains(&self, id: &str) -> bool {
		self.nodes.iter().any(|n| n.id == id)
	}

	pub fn node(&self, id: &str) -> Option<&Node> {
		self.nodes.iter().find(|n| n.id == id)
	}

	pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
		self.nodes.iter_mut().find(|n| n.id == id)
	}

	pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &Node> {
		self.nodes.iter().filter(move |n| n.node_type == node_type)
	}

	pub fn has_edge(&self, source: &str, target: &str) -> bool {
		self.edges.iter().any(|e| e.source == source && e.target == target)
	}

	pub fn edges_touching<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
		self.edges.iter().filter(move |e| e.touches(id))
	}

	pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
		if node.id.is_empty() {
			return Err(GraphError::EmptyId);
		}
		if self.contains(&node.id) {
			return Err(GraphError::DuplicateId(node.id));
		}
		self.nodes.push(node);
		Ok(())
	}

	/// Removes the node and every edge that starts or ends at it.
	pub fn delete_node(&mut self, id: &str) -> Option<Node> {
		let idx = self.nodes.iter().position(|n| n.id == id)?;
		let node = self.nodes.remove(idx);
		let before = self.edges.len();
		self.edges.retain(|e| !e.touches(id));
		debug!(
			"deleted node '{}' and {} edges",
			id,
			before - self.edges.len()
		);
		Some(node)
	}

	/// Adds `source -> target`. Self loops, duplicates and unknown endpoints
	/// are refused.
	pub fn add_edge(&mut self, source: &str, target: &str) -> bool {
		if source == target
			|| self.has_edge(source, target)
			|| !self.contains(source)
			|| !self.contains(target)
		{
			return false;
		}
		self.edges.push(Edge::new(source, target));
		true
	}

	/// Removes one edge equal to `edge`.
	pub fn delete_edge(&mut self, edge: &Edge) -> bool {
		match self.edges.iter().position(|e| e == edge) {
			Some(idx) => {
				self.edges.remove(idx);
				true
			}
			None => false,
		}
	}

	pub fn rename_node(&mut self, old: &str, new: &str) -> Result<(), GraphError> {
		if new.is_empty() {
			return Err(GraphError::EmptyId);
		}
		if old == new {
			return Ok(());
		}
		if self.contains(new) {
			return Err(GraphError::DuplicateId(new.to_string()));
		}
		let node = self
			.node_mut(old)
			.ok_or_else(|| GraphError::UnknownNode(old.to_string()))?;
		node.id = new.to_string();
		for edge in &mut self.edges {
			if edge.source == old {
				edge.source = new.to_string();
			}
			if edge.target == old {
				edge.target = new.to_string();
			}
		}
		Ok(())
	}

	/// Changes a node's type, dropping a payload of the wrong shape and any
	/// zone attributes the new type must not carry.
	pub fn set_node_type(&mut self, id: &str, node_type: NodeType) -> Result<(), GraphError> {
		let node = self
			.node_mut(id)
			.ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;
		node.node_type = node_type;
		if node.payload.as_ref().is_some_and(|p| p.node_type() != node_type) {
			node.payload = None;
		}
		if !node_type.receives_zone_enrichment() {
			node.enrichment.design_storm_depth_inches = None;
			node.enrichment.ref_data_key = None;
		}
		Ok(())
	}

	pub fn set_payload(&mut self, id: &str, payload: Option<NodePayload>) -> Result<(), EditorError> {
		let node = self
			.node_mut(id)
			.ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;
		if let Some(p) = &payload {
			if p.node_type() != node.node_type {
				return Err(PayloadError::Unexpected(node.node_type.as_str()).into());
			}
			p.validate()?;
		}
		node.payload = payload;
		Ok(())
	}

	/// Random alphanumeric id not used by any node.
	pub fn fresh_node_id<R: Rng>(&self, rng: &mut R) -> String {
		loop {
			let id: String = (0..NODE_ID_LEN)
				.map(|_| char::from(rng.sample(Alphanumeric)))
				.collect();
			if !self.contains(&id) {
				return id;
			}
		}
	}

	/// Re-derive every cached screen position from `longlat`.
	pub fn reproject(&mut self, view: &ViewPipeline) {
		for node in &mut self.nodes {
			let p = view.longlat_to_point(node.longlat);
			node.x = p.x;
			node.y = p.y;
		}
	}

	/// Raw data for this graph with `incoming` layered on top. Incoming nodes
	/// come first and shadow existing nodes with the same id; edges from both
	/// sides are kept once per `(source, target)`.
	pub fn merge(&self, incoming: GraphData) -> GraphData {
		let staged: HashSet<&str> = incoming.nodes.iter().filter_map(|n| n.id.as_deref()).collect();
		let kept: Vec<RawNode> = self
			.nodes
			.iter()
			.filter(|n| !staged.contains(n.id.as_str()))
			.map(Node::to_raw)
			.collect();

		let mut seen = HashSet::new();
		let edges = self
			.edges
			.iter()
			.cloned()
			.chain(incoming.edges)
			.filter(|e| seen.insert(e.clone()))
			.collect();
		let mut nodes = incoming.nodes;
		nodes.extend(kept);
		GraphData { nodes, edges }
	}

	/// Id-preserving snapshot suitable for saving and reconstructing.
	pub fn to_data(&self) -> GraphData {
		GraphData {
			nodes: self.nodes.iter().map(Node::to_raw).collect(),
			edges: self.edges.clone(),
		}
	}
}

fn node_from_raw<R: Rng>(
	id: String,
	raw: RawNode,
	options: &GraphOptions,
	view: &ViewPipeline,
	rng: &mut R,
) -> (Node, bool) {
	let (w, h) = (options.width, options.height);
	let x = raw
		.x
		.unwrap_or_else(|| w / 2.0 + (w / 3.0) * (rng.gen_range(0.0..1.0) - 1.0));
	let y = raw
		.y
		.unwrap_or_else(|| h / 2.0 + (h / 3.0) * (rng.gen_range(0.0..1.0) - 1.0));
	let longlat = raw
		.longlat
		.unwrap_or_else(|| view.point_to_longlat(Point::new(x, y)));
	let node_type = raw.node_type.unwrap_or_default();

	let mut node = Node::new(id, longlat, raw.size.filter(|s| *s > 0.0).unwrap_or(options.default_node_size))
		.with_type(node_type);
	node.color = raw.color;
	node.enrichment.state = raw.state;
	node.enrichment.design_storm_depth_inches = raw.design_storm_depth_inches;
	node.enrichment.ref_data_key = raw.ref_data_key;

	let mut payload_ok = true;
	match raw.data {
		None | Some(serde_json::Value::Null) => {}
		Some(_) if node_type == NodeType::Untyped => {
			debug!("ignoring data on untyped node '{}'", node.id);
		}
		Some(value) => match NodePayload::parse(node_type, value) {
			Ok((payload, seeds)) => {
				node.payload = Some(payload);
				let e = &mut node.enrichment;
				e.design_storm_depth_inches = e.design_storm_depth_inches.or(seeds.design_storm_depth_inches);
				e.ref_data_key = e.ref_data_key.take().or(seeds.ref_data_key);
			}
			Err(err) => {
				warn!("dropping payload of node '{}': {}", node.id, err);
				payload_ok = false;
			}
		},
	}
	if !node_type.receives_zone_enrichment() {
		node.enrichment.design_storm_depth_inches = None;
		node.enrichment.ref_data_key = None;
	}

	let p = view.longlat_to_point(node.longlat);
	node.x = p.x;
	node.y = p.y;
	(node, payload_ok)
}
