use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_router::hooks::use_query_map;
use log::{debug, error, info};

use crate::api::{AnalysisClient, FetchTransport, Notice, RequestGeneration, Ticket, browser_sleep};
use crate::components::network_editor::{
	DatasetKind, EditorEvent, Graph, GraphData, LoadedDatasets, NetworkEditorCanvas, Selection,
};
use crate::config::EditorConfig;
use crate::export;
use crate::session::{self, BrowserSession};

/// Backend location, from `?host=&state=&region=`.
#[derive(Clone, Debug)]
struct Jurisdiction {
	host: String,
	state: String,
	region: String,
}

impl Jurisdiction {
	fn client(&self) -> AnalysisClient<FetchTransport> {
		AnalysisClient::new(FetchTransport, self.host.clone(), self.state.clone(), self.region.clone())
	}
}

#[derive(Clone, Copy, Debug)]
enum Action {
	ValidateNetwork,
	ValidateFacilities,
	ValidateAll,
	Solve,
}

fn run_action(action: Action, graph: Graph, jurisdiction: Jurisdiction, ticket: Ticket, notice: RwSignal<Option<Notice>>) {
	spawn_local(async move {
		let client = jurisdiction.client();
		let result = match action {
			Action::ValidateNetwork => client.validate_network(&graph, browser_sleep).await,
			Action::ValidateFacilities => client.validate_facilities(&graph, browser_sleep).await,
			Action::ValidateAll => Notice::combine(&[
				client.validate_network(&graph, browser_sleep).await,
				client.validate_facilities(&graph, browser_sleep).await,
			]),
			Action::Solve => match client.solve_watershed(&graph, browser_sleep).await {
				Ok(_) => Notice::success("Watershed Solved", format!("{} nodes submitted", graph.len())),
				Err(err) => Notice::error("Solve Failed", err.to_string()),
			},
		};
		match ticket.accept(result) {
			Ok(result) => notice.set(Some(result)),
			Err(_) => debug!("dropping stale {:?} result", action),
		}
	});
}

fn load_datasets(jurisdiction: Jurisdiction, datasets: RwSignal<LoadedDatasets>) {
	spawn_local(async move {
		let client = jurisdiction.client();
		let config = match client.get_config().await {
			Ok(config) => config,
			Err(err) => {
				error!("could not load project config: {}", err);
				return;
			}
		};
		let spatial = &config.project_spatial_data;
		for (kind, descriptor) in [
			(DatasetKind::Boundary, &spatial.state_boundaries),
			(DatasetKind::DesignStorm, &spatial.design_storm),
			(DatasetKind::RainZone, &spatial.ref_data_key),
		] {
			let Some(descriptor) = descriptor else {
				continue;
			};
			match client.get_reference_data(descriptor).await {
				Ok(dataset) => {
					info!("loaded {:?} with {} features", kind, dataset.features.len());
					datasets.update(|d| d.push((kind, dataset)));
				}
				Err(err) => error!("skipping {:?} reference data: {}", kind, err),
			}
		}
	});
}

fn describe(selection: &Selection, graph: Option<&Graph>) -> String {
	match selection {
		Selection::None => "Nothing selected".into(),
		Selection::Node(id) => {
			let edges = graph.map_or(0, |g| g.edges_touching(id).count());
			format!("Node {} ({} edges)", id, edges)
		}
		Selection::Edge(edge) => format!("Edge {} → {}", edge.source, edge.target),
	}
}

/// Parses pasted scenario JSON for the replace/merge buttons.
fn parse_staged(text: &str) -> Result<GraphData, Notice> {
	serde_json::from_str(text).map_err(|err| Notice::error("Invalid Graph Data", err.to_string()))
}

/// Default Home Page
#[component]
pub fn Home() -> impl IntoView {
	let query = use_query_map().get_untracked();
	let jurisdiction = Jurisdiction {
		host: query.get("host").unwrap_or_default(),
		state: query.get("state").unwrap_or_else(|| "state".into()),
		region: query.get("region").unwrap_or_else(|| "region".into()),
	};

	let snapshot = session::restore(&BrowserSession);
	let mut config = EditorConfig::default();
	if let Some(name) = snapshot.scenario_name {
		config.scenario_name = name;
	}
	let scenario_name = config.scenario_name.clone();

	let data = RwSignal::new(snapshot.graph);
	let merge = RwSignal::new(None::<GraphData>);
	let staged_text = RwSignal::new(String::new());
	let edit_mode = RwSignal::new(true);
	let datasets = RwSignal::new(LoadedDatasets::new());
	let latest = RwSignal::new(None::<Graph>);
	let notice = RwSignal::new(None::<Notice>);
	let selection = RwSignal::new(Selection::None);
	let hovered = RwSignal::new(None::<String>);

	load_datasets(jurisdiction.clone(), datasets);

	let on_event = Callback::new(move |event: EditorEvent| match event {
		EditorEvent::SelectionChanged(s) => selection.set(s),
		EditorEvent::NodeHovered(h) => hovered.set(h),
		EditorEvent::ModeToggled(on) => edit_mode.set(on),
		_ => {}
	});
	let on_graph_change = Callback::new(move |graph: Graph| latest.set(Some(graph)));

	let generation = RequestGeneration::default();
	let action_button = move |label: &'static str, action: Action| {
		let (generation, jurisdiction) = (generation.clone(), jurisdiction.clone());
		view! {
			<button on:click=move |_| {
				let Some(graph) = latest.get_untracked() else {
					return;
				};
				run_action(action, graph, jurisdiction.clone(), generation.next(), notice);
			}>{label}</button>
		}
	};

	let stage = move |merging: bool| match parse_staged(&staged_text.get_untracked()) {
		Ok(staged) if merging => merge.set(Some(staged)),
		Ok(staged) => data.set(staged),
		Err(err) => notice.set(Some(err)),
	};

	let log_csv = move |_: leptos::ev::MouseEvent| {
		let Some(graph) = latest.get_untracked() else {
			return;
		};
		match export::nodes_csv(&graph) {
			Ok(csv) => info!("{}", csv),
			Err(err) => error!("{}", err),
		}
	};

	view! {
		<ErrorBoundary fallback=|errors| {
			view! {
				<h1>"Uh oh! Something went wrong!"</h1>

				<p>"Errors: "</p>
				<ul>
					{move || {
						errors
							.get()
							.into_iter()
							.map(|(_, e)| view! { <li>{e.to_string()}</li> })
							.collect_view()
					}}
				</ul>
			}
		}>

			<div class="fullscreen-graph">
				<NetworkEditorCanvas
					data=data
					merge=merge
					edit_mode=edit_mode
					datasets=datasets
					config=config
					on_event=on_event
					on_graph_change=on_graph_change
					fullscreen=true
					autosave=true
				/>
				<div class="graph-overlay">
					<h1>{scenario_name}</h1>
					<p class="subtitle">
						"Click to add a node. Drag between nodes to connect them. Hold Ctrl to move nodes or pan. Scroll to zoom."
					</p>
					<p>{move || latest.with(|g| selection.with(|s| describe(s, g.as_ref())))}</p>
					<p>{move || hovered.get().map(|id| format!("Hovering {}", id))}</p>
					<button on:click=move |_| edit_mode.update(|on| *on = !*on)>
						{move || if edit_mode.get() { "Edit mode: on" } else { "Edit mode: off" }}
					</button>
					<button on:click=move |_| data.set(session::default_graph())>"Reset"</button>
					{action_button("Validate network", Action::ValidateNetwork)}
					{action_button("Validate facilities", Action::ValidateFacilities)}
					{action_button("Validate all", Action::ValidateAll)}
					{action_button("Solve", Action::Solve)}
					<button on:click=log_csv>"Log node table"</button>
					<textarea
						placeholder="Staged graph JSON"
						prop:value=move || staged_text.get()
						on:input=move |ev| staged_text.set(event_target_value(&ev))
					/>
					<button on:click=move |_| stage(false)>"Replace"</button>
					<button on:click=move |_| stage(true)>"Merge"</button>
					{move || {
						notice
							.get()
							.map(|n| {
								let class = if n.is_error() { "notice error" } else { "notice" };
								view! {
									<div class=class>
										<strong>{n.title}</strong>
										<pre>{n.message}</pre>
									</div>
								}
							})
					}}
				</div>
			</div>
		</ErrorBoundary>
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	use super::*;
	use crate::components::network_editor::Edge;
	use crate::components::network_editor::graph::GraphOptions;
	use crate::components::network_editor::transform::{Projection, ViewPipeline, ZoomTransform};

	#[test]
	fn selected_node_reports_its_edges() {
		let data: GraphData = serde_json::from_str(
			r#"{"nodes": [{"id": "a"}, {"id": "b"}, {"id": "c"}],
			"edges": [{"source": "a", "target": "b"}, {"source": "c", "target": "a"}]}"#,
		)
		.unwrap();
		let view = ViewPipeline::new(Projection::default(), ZoomTransform::IDENTITY, 600.0, 400.0);
		let graph = Graph::construct(data, &GraphOptions::default(), &view, &mut StdRng::seed_from_u64(1));
		let node = Selection::Node("a".into());
		assert_eq!(describe(&node, Some(&graph)), "Node a (2 edges)");
		assert_eq!(describe(&node, None), "Node a (0 edges)");
		assert_eq!(describe(&Selection::Edge(Edge::new("c", "a")), None), "Edge c → a");
	}

	#[test]
	fn unparseable_staged_text_becomes_error_notice() {
		let err = parse_staged("{nodes").unwrap_err();
		assert!(err.is_error());
		assert_eq!(err.title, "Invalid Graph Data");
		assert_eq!(parse_staged(r#"{"nodes": [{"id": "x"}]}"#).unwrap().nodes.len(), 1);
	}
}
