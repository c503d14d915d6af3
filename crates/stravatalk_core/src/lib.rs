pub mod agents;
pub mod chat;
pub mod controller;
pub mod llm;
pub mod orchestrator;
pub mod render;
pub mod session;
pub mod store;
pub mod strava;
pub mod surface;
pub mod tabular;
pub mod util;
pub mod visualization;
