// HTTP surface over the migration dispatcher

pub mod handlers;
pub mod routes;
pub mod state;
