// Engine — credentials, catalogue session lifecycle and download coordination.

pub mod credentials;
pub mod downloader;
pub mod filename;
pub mod normalizer;
pub mod session;
pub mod upload;
