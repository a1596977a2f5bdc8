// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A [`Loader`] that reads resources from the local filesystem.

use ferry_core::{Decoder, LoadError, Loader, Locator};
use std::marker::PhantomData;
use std::path::{Component, Path, PathBuf};

/// Resolves locators relative to a root directory, reads the file and hands
/// the bytes to a [`Decoder`].
pub struct FileLoader<P, D> {
    root: PathBuf,
    decoder: D,
    _payload: PhantomData<fn() -> P>,
}

impl<P, D: Decoder<P>> FileLoader<P, D> {
    /// Creates a loader rooted at `root`.
    pub fn new(root: impl AsRef<Path>, decoder: D) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            decoder,
            _payload: PhantomData,
        }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path a locator resolves to, or `None` if it would leave the root.
    ///
    /// Only plain relative paths resolve: absolute paths, drive prefixes and
    /// `..` components are refused.
    pub fn resolve(&self, locator: &Locator) -> Option<PathBuf> {
        let relative = locator.as_path();
        let contained = relative
            .components()
            .all(|part| matches!(part, Component::Normal(_) | Component::CurDir));
        contained.then(|| self.root.join(relative))
    }
}

impl<P: 'static, D: Decoder<P>> Loader<P> for FileLoader<P, D> {
    fn load(&self, locator: &Locator) -> Result<P, LoadError> {
        let Some(path) = self.resolve(locator) else {
            log::warn!("Refused '{}': outside of {:?}", locator, self.root);
            return Err(LoadError::not_found(locator));
        };
        let bytes = std::fs::read(&path).map_err(|e| LoadError::io(locator, &e))?;
        log::trace!("Read {} byte(s) from {:?}", bytes.len(), path);
        self.decoder
            .decode(&bytes)
            .map_err(|e| LoadError::decode(locator, e))
    }
}

impl<P, D> std::fmt::Debug for FileLoader<P, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLoader")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::ErrorKind;
    use std::error::Error;

    fn utf8(bytes: &[u8]) -> Result<String, Box<dyn Error + Send + Sync>> {
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }

    #[test]
    fn reads_and_decodes_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("shaders")).unwrap();
        std::fs::write(dir.path().join("shaders/basic.wgsl"), "fn main() {}").unwrap();

        let loader = FileLoader::new(dir.path(), utf8);
        let text = loader.load(&Locator::from("shaders/basic.wgsl")).unwrap();
        assert_eq!(text, "fn main() {}");
        assert_eq!(loader.root(), dir.path());
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FileLoader::new(dir.path(), utf8);
        let err = loader.load(&Locator::from("nope.txt")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn reading_a_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("folder")).unwrap();
        let loader = FileLoader::new(dir.path(), utf8);
        let err = loader.load(&Locator::from("folder")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn locators_cannot_leave_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("assets");
        std::fs::create_dir(&root).unwrap();
        let secret = dir.path().join("secret.txt");
        std::fs::write(&secret, "outside root").unwrap();

        let loader = FileLoader::new(&root, utf8);
        let absolute = Locator::from(secret.to_string_lossy().into_owned());
        let climbing = Locator::from("../secret.txt");
        let sneaky = Locator::from("sub/../../secret.txt");
        for locator in [&absolute, &climbing, &sneaky] {
            assert_eq!(loader.resolve(locator), None);
            let err = loader.load(locator).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }

        std::fs::write(root.join("inside.txt"), "fine").unwrap();
        assert_eq!(loader.load(&Locator::from("./inside.txt")).unwrap(), "fine");
    }

    #[test]
    fn decoder_failure_is_decode() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.txt"), [0xff, 0xfe, 0xfd]).unwrap();
        let loader = FileLoader::new(dir.path(), utf8);
        let err = loader.load(&Locator::from("bad.txt")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().starts_with("failed to decode 'bad.txt'"));
    }
}
