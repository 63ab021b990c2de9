//! Backend access: the request gateway and typed resource clients.

pub mod categories;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod items;
pub mod local;
pub mod params;
pub mod resource;
pub mod suppliers;
pub mod types;
