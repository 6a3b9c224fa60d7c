pub mod auth_middleware;
pub mod emitter;
pub mod health_handler;
pub mod metrics_handler;
pub mod mock_handler;
pub mod mock_server;
pub mod pattern;
pub mod route_table;
pub mod schema_synth;
pub mod spec_registry;
pub mod trigger_index;

#[cfg(test)]
mod schema_synth_test;
