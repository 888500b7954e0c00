mod component;
pub mod context;
pub mod graph;
pub mod interaction;
pub mod reconcile;
mod render;
pub mod spatial;
pub mod state;
pub mod transform;
pub mod types;

pub use component::{LoadedDatasets, NetworkEditorCanvas};
pub use context::{EditorEvent, EventKind};
pub use graph::Graph;
pub use interaction::Selection;
pub use spatial::{DatasetKind, PolygonDataset};
pub use state::EditorState;
pub use types::{Edge, GraphData, LongLat, NodeType, RawNode};
