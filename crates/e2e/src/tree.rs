//! Fixed locations inside a browser source tree

use std::path::{Path, PathBuf};

const TRANSLATIONS_DIR: &str = "browser/extensions/translations";

/// Layout of a cloned Firefox checkout
#[derive(Debug, Clone)]
pub struct TreeLayout {
    root: PathBuf,
}

impl TreeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the packaged extension is unpacked
    pub fn extension_dir(&self) -> PathBuf {
        self.root.join(TRANSLATIONS_DIR).join("extension")
    }

    /// Browser-chrome test directory
    pub fn test_dir(&self) -> PathBuf {
        self.root.join(TRANSLATIONS_DIR).join("test/browser")
    }

    pub fn translations_moz_build(&self) -> PathBuf {
        self.root.join(TRANSLATIONS_DIR).join("moz.build")
    }

    pub fn extensions_moz_build(&self) -> PathBuf {
        self.root.join("browser/extensions/moz.build")
    }

    pub fn browser_glue(&self) -> PathBuf {
        self.root.join("browser/components/BrowserGlue.jsm")
    }

    pub fn mozconfig(&self) -> PathBuf {
        self.root.join("mozconfig")
    }
}
