use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

use stormwater_network_editor::components::network_editor::interaction::{InputEvent, Key, Modifiers};
use stormwater_network_editor::components::network_editor::spatial::{Polygon, ZoneFeature};
use stormwater_network_editor::components::network_editor::transform::{Projection, ViewPipeline, ZoomTransform};
use stormwater_network_editor::components::network_editor::types::{NodePayload, Point};
use stormwater_network_editor::components::network_editor::{
	DatasetKind, EditorEvent, EditorState, GraphData, NodeType, PolygonDataset, Selection,
};
use stormwater_network_editor::config::EditorConfig;
use stormwater_network_editor::export;
use stormwater_network_editor::session::{self, MemoryStore, SessionSnapshot};

fn editor() -> EditorState {
	let view = ViewPipeline::new(Projection::default(), ZoomTransform::IDENTITY, 960.0, 500.0);
	let config = EditorConfig {
		min_scale: 0.01,
		..EditorConfig::default()
	};
	let mut state = EditorState::with_view(config, view, StdRng::seed_from_u64(11));
	state.handle(InputEvent::PointerEnter);
	state
}

fn graph(value: serde_json::Value) -> GraphData {
	serde_json::from_value(value).unwrap()
}

fn click(state: &mut EditorState, at: Point) {
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

fn drag(state: &mut EditorState, from: Point, to: Point) {
	let source = state.hit_test(from);
	state.handle(InputEvent::PointerDown {
		at: from,
		target: source,
		modifiers: Modifiers::default(),
	});
	state.handle(InputEvent::PointerMove { at: to });
	let target = state.hit_test(to);
	state.handle(InputEvent::PointerUp { at: to, target });
}

/// Two unit squares side by side, at lon -118..-117 and -117..-116.
fn zones(field: &str, west: serde_json::Value, east: serde_json::Value) -> PolygonDataset {
	let square = |x0: f64| Polygon {
		rings: vec![vec![
			Point::new(x0, 32.0),
			Point::new(x0 + 1.0, 32.0),
			Point::new(x0 + 1.0, 33.0),
			Point::new(x0, 33.0),
			Point::new(x0, 32.0),
		]],
	};
	let props = |v: serde_json::Value| {
		let mut m = serde_json::Map::new();
		m.insert(field.to_string(), v);
		m
	};
	PolygonDataset::new(
		Some(field.to_string()),
		vec![
			ZoneFeature::new(vec![square(-118.0)], props(west)),
			ZoneFeature::new(vec![square(-117.0)], props(east)),
		],
	)
}

#[test]
fn deleting_the_facility_of_the_default_graph() {
	let mut state = editor();
	let mut data = session::default_graph();
	for (node, x) in data.nodes.iter_mut().zip([300.0, 120.0]) {
		node.x = Some(x);
		node.y = Some(200.0);
	}
	state.replace_graph(data);
	click(&mut state, Point::new(300.0, 200.0));
	assert_eq!(state.selection(), &Selection::Node("0".into()));

	state.handle(InputEvent::KeyDown(Key::Delete));
	let exported = state.graph().to_data();
	let ids: Vec<&str> = exported.nodes.iter().filter_map(|n| n.id.as_deref()).collect();
	assert_eq!(ids, vec!["1"]);
	assert!(exported.edges.is_empty());
}

#[test]
fn click_on_empty_canvas_creates_node_under_pointer() {
	let mut state = editor();
	click(&mut state, Point::new(100.0, 100.0));
	assert_eq!(state.graph().len(), 1);
	let node = &state.graph().nodes()[0];
	assert!((node.x - 100.0).abs() < 1e-6, "{node:?}");
	assert!((node.y - 100.0).abs() < 1e-6, "{node:?}");
	assert_eq!(node.node_type, NodeType::Untyped);
}

#[test]
fn dangling_edges_never_survive_construction() {
	let mut state = editor();
	let report = state.replace_graph(graph(json!({
		"nodes": [{"id": "a"}, {"id": "b"}, {"id": "a"}, {}],
		"edges": [
			{"source": "a", "target": "b"},
			{"source": "a", "target": "ghost"},
			{"source": {"id": "b"}, "target": {"id": "a"}}
		]
	})));
	assert_eq!(report.dropped_edges, 1);
	assert_eq!(state.graph().len(), 2);
	for edge in state.graph().edges() {
		assert!(state.graph().contains(&edge.source) && state.graph().contains(&edge.target));
	}
}

#[test]
fn second_press_on_a_node_clears_selection() {
	let mut state = editor();
	state.replace_graph(graph(json!({"nodes": [{"id": "a", "x": 200.0, "y": 200.0}]})));
	let at = Point::new(200.0, 200.0);
	click(&mut state, at);
	assert_eq!(state.selection(), &Selection::Node("a".into()));
	click(&mut state, at);
	assert!(state.selection().is_none());
	assert_eq!(state.graph().len(), 1);
}

#[test]
fn dragging_between_nodes_twice_adds_one_edge() {
	let mut state = editor();
	state.replace_graph(graph(json!({
		"nodes": [{"id": "a", "x": 100.0, "y": 100.0}, {"id": "b", "x": 400.0, "y": 300.0}]
	})));
	let (a, b) = (Point::new(100.0, 100.0), Point::new(400.0, 300.0));
	drag(&mut state, a, b);
	drag(&mut state, a, b);
	let edges: Vec<(&str, &str)> = state
		.graph()
		.edges()
		.iter()
		.map(|e| (e.source.as_str(), e.target.as_str()))
		.collect();
	assert_eq!(edges, vec![("a", "b")]);
	assert_eq!(state.reconciler().edges().len(), 1);
}

#[test]
fn zoom_to_extent_centres_a_lone_node() {
	let mut state = editor();
	state.replace_graph(graph(json!({"nodes": [{"id": "a", "x": 50.0, "y": 420.0}]})));
	state.zoom_to_fit();
	state.tick(10_000.0);
	let node = state.graph().node("a").unwrap();
	let centre = state.view().center();
	assert!(node.position().distance(centre) < 1e-3, "{node:?} vs {centre:?}");
}

#[test]
fn land_surfaces_never_receive_zone_attributes() {
	let mut state = editor();
	state.set_dataset(DatasetKind::Boundary, Some(zones("name", json!("ca"), json!("ca"))));
	state.set_dataset(DatasetKind::DesignStorm, Some(zones("depth", json!(0.614), json!(0.9))));
	state.set_dataset(DatasetKind::RainZone, Some(zones("zone", json!("Zone 1"), json!("Zone 2"))));
	state.replace_graph(graph(json!({
		"nodes": [
			{"id": "ls", "node_type": "land_surface", "longlat": [-117.5, 32.5]},
			{"id": "tf", "node_type": "treatment_facility", "longlat": [-117.5, 32.5]}
		]
	})));

	let ls = state.graph().node("ls").unwrap();
	assert_eq!(ls.enrichment.state.as_deref(), Some("ca"));
	assert_eq!(ls.enrichment.design_storm_depth_inches, None);
	assert_eq!(ls.enrichment.ref_data_key, None);

	let tf = state.graph().node("tf").unwrap();
	assert_eq!(tf.enrichment.design_storm_depth_inches, Some(0.61));
	assert_eq!(tf.enrichment.ref_data_key.as_deref(), Some("Zone 1"));

	state.set_node_type("ls", NodeType::TreatmentFacility).unwrap();
	let moved = state.graph().node("ls").unwrap();
	assert_eq!(moved.enrichment.ref_data_key.as_deref(), Some("Zone 1"));
}

#[test]
fn session_snapshot_restores_the_edited_scenario() {
	let mut state = editor();
	state.replace_graph(session::default_graph());
	click(&mut state, Point::new(700.0, 50.0));
	state.set_scenario_name("Chollas Creek");

	let store = MemoryStore::default();
	session::save(&store, &SessionSnapshot::capture(&state)).unwrap();
	let restored = session::restore(&store);
	assert_eq!(restored.scenario_name.as_deref(), Some("Chollas Creek"));
	assert_eq!(restored.graph.nodes.len(), 3);

	let mut again = editor();
	again.replace_graph(restored.graph);
	assert_eq!(again.graph().to_data(), state.graph().to_data());
}

#[test]
fn listeners_see_consistent_state() {
	let mut state = editor();
	let seen = Rc::new(RefCell::new(Vec::new()));
	let sink = seen.clone();
	state.subscribe_all(move |e| sink.borrow_mut().push(e.clone()));
	state.replace_graph(session::default_graph());
	state.set_edit_mode(false);

	let seen = seen.borrow();
	assert!(seen.contains(&EditorEvent::GraphReplaced));
	assert_eq!(seen.last(), Some(&EditorEvent::ModeToggled(false)));
}

#[test]
fn exported_request_carries_only_facility_records() {
	let mut state = editor();
	state.replace_graph(graph(json!({
		"nodes": [
			{"id": "0", "node_type": "treatment_facility", "data": {"facility_type": "no_treatment"}},
			{"id": "1", "node_type": "land_surface"}
		],
		"edges": [{"source": "1", "target": "0"}]
	})));
	let facilities = export::treatment_facilities(state.graph());
	assert_eq!(facilities.len(), 1);
	assert_eq!(facilities[0]["node_id"], json!("0"));
	assert_eq!(facilities[0]["facility_type"], json!("no_treatment"));
}

#[test]
fn node_drawer_edits_flow_into_exports() {
	let mut state = editor();
	state.replace_graph(session::default_graph());
	let (payload, _) = NodePayload::parse(
		NodeType::TreatmentFacility,
		json!({"facility_type": "bioretention", "captured_pct": 80}),
	)
	.unwrap();
	state.set_node_payload("0", Some(payload)).unwrap();
	state.set_node_color("1", Some("orchid".into())).unwrap();
	assert!(state.set_node_color("ghost", None).is_err());

	let json: serde_json::Value = serde_json::from_str(&export::graph_json(state.graph()).unwrap()).unwrap();
	let nodes = json["nodes"].as_array().unwrap();
	let facility = nodes.iter().find(|n| n["id"] == json!("0")).unwrap();
	assert_eq!(facility["data"]["facility_type"], json!("bioretention"));
	let surface = nodes.iter().find(|n| n["id"] == json!("1")).unwrap();
	assert_eq!(surface["color"], json!("orchid"));
	assert_eq!(json["edges"], json!([{"source": "1", "target": "0"}]));
}

#[test]
fn merging_staged_nodes_keeps_the_drawn_network() {
	let mut state = editor();
	state.replace_graph(graph(json!({
		"nodes": [
			{"id": "0", "node_type": "treatment_facility", "x": 300.0, "y": 200.0},
			{"id": "1", "node_type": "land_surface", "x": 120.0, "y": 200.0}
		],
		"edges": [{"source": "1", "target": "0"}]
	})));
	let before = state.graph().node("1").unwrap().longlat;

	let report = state.merge_graph(graph(json!({
		"nodes": [{"id": "2", "node_type": "land_surface", "x": 500.0, "y": 100.0}],
		"edges": [{"source": "2", "target": "0"}, {"source": "2", "target": "ghost"}]
	})));
	assert_eq!(report.dropped_edges, 1);
	let ids: Vec<&str> = state.graph().nodes().iter().map(|n| n.id.as_str()).collect();
	assert_eq!(ids, vec!["2", "0", "1"]);
	assert_eq!(state.graph().node("1").unwrap().longlat, before);
	assert_eq!(state.graph().edges_touching("0").count(), 2);
}
