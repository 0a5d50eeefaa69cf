pub mod prelude;

pub mod method_mappings;
pub mod secret_methods;
pub mod secrets;
