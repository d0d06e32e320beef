pub mod api;
pub mod auth;
pub mod models;
pub mod platform;
pub mod routes;
pub mod schema;
pub mod services;
pub mod store;

#[cfg(test)]
mod testing;
