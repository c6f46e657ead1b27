// Configuration loading

pub mod access;
pub mod settings;

pub use access::{AccessContext, AccessError, KeySource};
pub use settings::Settings;
