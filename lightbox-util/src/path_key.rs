use std::path::Path;

use derive_more::{Display, Into};

/// Case-insensitive identity for a file path.
///
/// Delivery de-duplication treats `/a/x.jpg` and `/a/X.JPG` as the same item
/// even on case-sensitive filesystems, so the key folds to lowercase.
#[derive(Clone, Debug, Display, Into, PartialEq, Eq, Hash)]
pub struct PathKey(String);

impl From<&Path> for PathKey {
    fn from(value: &Path) -> Self {
        Self(value.to_string_lossy().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case() {
        let a = PathKey::from(Path::new("/photos/IMG_001.JPG"));
        let b = PathKey::from(Path::new("/photos/img_001.jpg"));
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_paths_stay_distinct() {
        let a = PathKey::from(Path::new("/photos/img_001.jpg"));
        let b = PathKey::from(Path::new("/photos/img_002.jpg"));
        assert_ne!(a, b);
    }
}
