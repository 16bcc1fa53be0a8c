mod canonicalized_path_buf;
mod path_key;

pub use canonicalized_path_buf::CanonicalizedPathBuf;
pub use path_key::PathKey;
