pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod remap;
pub mod scrapers;
pub mod store;

#[cfg(test)]
mod test_support;
