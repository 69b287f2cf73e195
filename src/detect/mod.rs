// Downloaded file inspection and EPUB metadata rewriting.

pub mod container;
pub mod epub;
