// Catalogue source abstraction — the client trait and its HTTP backend.

pub mod http_source;
pub mod traits;
