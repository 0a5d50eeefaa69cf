pub mod authenticator;
pub mod checksum;
pub mod dispatcher;
pub mod pipeline;
pub mod schema;
pub mod secret_admin;
pub mod secret_store;
