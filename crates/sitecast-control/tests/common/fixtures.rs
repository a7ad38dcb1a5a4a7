//! Source trees for deployment tests.

use std::path::{Path, PathBuf};

/// Builder for an application source directory.
pub struct SourceTree {
    root: PathBuf,
    files: Vec<(PathBuf, String)>,
}

impl SourceTree {
    /// A source directory named `name` under `parent`.
    pub fn new(parent: &Path, name: &str) -> Self {
        Self {
            root: parent.join(name),
            files: vec![(PathBuf::from("index.html"), "<h1>hello</h1>".to_string())],
        }
    }

    /// Adds a file at a path relative to the root.
    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.files.push((PathBuf::from(path), contents.to_string()));
        self
    }

    /// A typical web application with build leftovers that must not ship.
    pub fn web_app(parent: &Path, name: &str) -> Self {
        Self::new(parent, name)
            .with_file(
                "web.config",
                r#"<configuration><connectionStrings><add name="Default" connectionString="Server=old" /></connectionStrings></configuration>"#,
            )
            .with_file("bin/app.dll", "binary")
            .with_file("bin/app.pdb", "symbols")
            .with_file(".git/HEAD", "ref: refs/heads/main")
            .with_file("obj/Debug/cache", "cache")
    }

    /// Writes the tree and returns its root.
    pub fn build(self) -> PathBuf {
        for (path, contents) in &self.files {
            let full = self.root.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(full, contents).unwrap();
        }
        self.root
    }
}
