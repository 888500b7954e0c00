//! Id-preserving projections of the graph: backend request bodies, scenario
//! JSON and a node table.

use serde::Serialize;
use serde_json::Value;

use crate::components::network_editor::graph::Graph;
use crate::components::network_editor::types::{Edge, NodeType};
use crate::error::EditorError;

/// Network as the backend reads it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NetworkExport {
	pub directed: bool,
	pub multigraph: bool,
	pub edges: Vec<Edge>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WatershedRequest {
	pub graph: NetworkExport,
	pub land_surfaces: Vec<Value>,
	pub treatment_facilities: Vec<Value>,
	pub treatment_sites: Vec<Value>,
}

pub fn network(graph: &Graph) -> NetworkExport {
	NetworkExport {
		directed: true,
		multigraph: true,
		edges: graph.edges().to_vec(),
	}
}

/// Payload records of every node of `node_type`, flattened.
pub fn records_of(graph: &Graph, node_type: NodeType) -> Vec<Value> {
	graph.nodes_of_type(node_type).flat_map(|n| n.records()).collect()
}

pub fn treatment_facilities(graph: &Graph) -> Vec<Value> {
	records_of(graph, NodeType::TreatmentFacility)
}

pub fn watershed_request(graph: &Graph) -> WatershedRequest {
	WatershedRequest {
		graph: network(graph),
		land_surfaces: records_of(graph, NodeType::LandSurface),
		treatment_facilities: treatment_facilities(graph),
		treatment_sites: records_of(graph, NodeType::TreatmentSite),
	}
}

pub fn graph_json(graph: &Graph) -> Result<String, EditorError> {
	serde_json::to_string_pretty(&graph.to_data()).map_err(|e| EditorError::Export(e.to_string()))
}

#[derive(Serialize)]
struct NodeRow<'a> {
	id: &'a str,
	node_type: &'static str,
	lon: f64,
	lat: f64,
	state: Option<&'a str>,
	design_storm_depth_inches: Option<f64>,
	ref_data_key: Option<&'a str>,
}

/// One row per node with position and enrichment.
pub fn nodes_csv(graph: &Graph) -> Result<String, EditorError> {
	let mut writer = csv::Writer::from_writer(Vec::new());
	let export_err = |e: csv::Error| EditorError::Export(e.to_string());
	if graph.is_empty() {
		writer
			.write_record([
				"id",
				"node_type",
				"lon",
				"lat",
				"state",
				"design_storm_depth_inches",
				"ref_data_key",
			])
			.map_err(export_err)?;
	}
	for node in graph.nodes() {
		writer
			.serialize(NodeRow {
				id: &node.id,
				node_type: node.node_type.as_str(),
				lon: node.longlat.lon(),
				lat: node.longlat.lat(),
				state: node.enrichment.state.as_deref(),
				design_storm_depth_inches: node.enrichment.design_storm_depth_inches,
				ref_data_key: node.enrichment.ref_data_key.as_deref(),
			})
			.map_err(export_err)?;
	}
	let bytes = writer
		.into_inner()
		.map_err(|e| EditorError::Export(e.to_string()))?;
	String::from_utf8(bytes).map_err(|e| EditorError::Export(e.to_string()))
}
