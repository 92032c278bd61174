pub mod credentials;

pub use credentials::{endpoint_label, mask_connection_string, mask_secret, secret_connection_string};
