pub mod cleanup;
pub mod conversion;
pub mod converter;
pub mod temp_store;
