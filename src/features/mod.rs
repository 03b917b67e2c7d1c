pub mod archive;
pub mod query_agent;
