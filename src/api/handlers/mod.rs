pub mod cleanup;
pub mod convert;
pub mod health;
