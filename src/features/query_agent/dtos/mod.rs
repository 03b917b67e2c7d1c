mod query_dto;

pub use query_dto::*;
