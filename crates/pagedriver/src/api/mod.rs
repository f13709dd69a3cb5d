//! Public option types for connecting and driving a browser.

mod connect_options;

pub use connect_options::ConnectOptions;
