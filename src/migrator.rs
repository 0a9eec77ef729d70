//! Schema migrations live in the `migrations` workspace crate so they can be
//! run by the server at startup and by standalone tooling.
pub use migrations::Migrator;
