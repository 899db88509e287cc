pub mod extract;
pub mod fetch;
pub mod services;
pub mod settings;
pub mod store;
pub mod tasks;
