mod state_builder;

pub use state_builder::{ApiRuntime, build_app_state};
