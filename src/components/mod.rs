pub mod network_editor;
