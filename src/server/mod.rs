// HTTP surface — routes, handlers and request validation.

pub mod handler;
pub mod validate;
