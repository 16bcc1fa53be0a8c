use std::path::Path;
use std::str::FromStr;
use std::{io::Error, path::PathBuf};

use derive_more::Into;

/// A path that has been resolved against the filesystem, so relative CLI
/// arguments become absolute before they reach the store or scanner.
#[derive(Clone, Debug, Into)]
pub struct CanonicalizedPathBuf(PathBuf);

impl CanonicalizedPathBuf {
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }
}

impl FromStr for CanonicalizedPathBuf {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s).canonicalize()?))
    }
}

impl TryFrom<PathBuf> for CanonicalizedPathBuf {
    type Error = Error;

    fn try_from(value: PathBuf) -> Result<Self, Self::Error> {
        Ok(Self(value.canonicalize()?))
    }
}

impl AsRef<Path> for CanonicalizedPathBuf {
    fn as_ref(&self) -> &Path {
        self.0.as_ref()
    }
}
