use leptos::prelude::*;
use stormwater_network_editor::{App, init_logging};

fn main() {
	init_logging();
	mount_to_body(|| {
		view! { <App /> }
	})
}
