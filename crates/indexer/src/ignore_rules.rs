//! Which files of a workspace take part in indexing.

use crate::error::Result;
use codeindex_chunker::is_supported_path;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use std::path::{Component, Path, PathBuf};

/// Workspace-level ignore file, gitignore syntax
pub const IGNORE_FILE_NAME: &str = ".codeindexignore";

/// Dependency, VCS and build-output directories, wherever they appear
const DENIED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    "vendor",
    "__pycache__",
    ".venv",
    "venv",
    ".next",
    ".nuxt",
    "coverage",
    ".cache",
    "Pods",
];

pub struct IgnoreRules {
    root: PathBuf,
    gitignore: Gitignore,
    extra: GlobSet,
}

impl IgnoreRules {
    /// Rules from the root `.gitignore`, `.codeindexignore` and `patterns`.
    pub fn load(root: &Path, patterns: &[String]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        for file in [root.join(".gitignore"), root.join(IGNORE_FILE_NAME)] {
            if file.is_file() {
                if let Some(err) = builder.add(&file) {
                    log::warn!("Failed to read {}: {err}", file.display());
                }
            }
        }
        let gitignore = builder.build().unwrap_or_else(|err| {
            log::warn!("Invalid ignore rules under {}: {err}", root.display());
            Gitignore::empty()
        });

        let mut globs = GlobSetBuilder::new();
        for pattern in patterns {
            globs.add(Glob::new(pattern)?);
        }

        Ok(Self {
            root: root.to_path_buf(),
            gitignore,
            extra: globs.build()?,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` (absolute or workspace-relative) is excluded from indexing.
    #[must_use]
    pub fn is_ignored(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        if relative.is_absolute() {
            // Outside the workspace
            return true;
        }
        if relative.components().any(|c| is_denied_component(&c)) {
            return true;
        }
        if self.extra.is_match(relative) {
            return true;
        }
        self.gitignore
            .matched_path_or_any_parents(relative, false)
            .is_ignore()
    }

    /// Whether `path` should be parsed: supported extension and not ignored.
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        is_supported_path(path) && !self.is_ignored(path)
    }

    /// Walk the workspace, honouring nested `.gitignore` and `.codeindexignore`
    /// files, and return at most `limit` candidate files.
    #[must_use]
    pub fn list_files(&self, limit: usize) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .git_global(false)
            .require_git(false)
            .add_custom_ignore_filename(IGNORE_FILE_NAME)
            .filter_entry(|entry| !is_denied_dir(&entry.file_name().to_string_lossy()))
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::debug!("Skipping unreadable entry: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            if files.len() >= limit {
                log::warn!(
                    "File listing stopped at {limit} files under {}",
                    self.root.display()
                );
                break;
            }
            files.push(entry.into_path());
        }
        files
    }
}

fn is_denied_component(component: &Component<'_>) -> bool {
    let Component::Normal(name) = component else {
        return false;
    };
    let name = name.to_string_lossy();
    (name.starts_with('.') && name.len() > 1) || is_denied_dir(&name)
}

fn is_denied_dir(name: &str) -> bool {
    DENIED_DIRS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join("generated")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(root.join("src/notes.bin"), "bytes").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(root.join("generated/api.ts"), "x").unwrap();
        fs::write(root.join("secret.py"), "x").unwrap();
        fs::write(root.join(".gitignore"), "generated/\n").unwrap();
        fs::write(root.join(IGNORE_FILE_NAME), "secret.py\n").unwrap();
        dir
    }

    #[test]
    fn listing_respects_ignore_files_and_deny_list() {
        let dir = workspace();
        let rules = IgnoreRules::load(dir.path(), &[]).unwrap();
        let mut files: Vec<String> = rules
            .list_files(100)
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        files.sort();
        assert_eq!(files, vec!["src/main.rs", "src/notes.bin"]);
    }

    #[test]
    fn single_path_queries_match_listing() {
        let dir = workspace();
        let rules = IgnoreRules::load(dir.path(), &["**/*.test.ts".to_string()]).unwrap();
        let root = dir.path();
        assert!(rules.accepts(&root.join("src/main.rs")));
        assert!(!rules.accepts(&root.join("src/notes.bin")));
        assert!(rules.is_ignored(&root.join("generated/api.ts")));
        assert!(rules.is_ignored(&root.join("secret.py")));
        assert!(rules.is_ignored(&root.join("node_modules/pkg/index.js")));
        assert!(rules.is_ignored(&root.join(".github/workflow.yml")));
        assert!(rules.is_ignored(&root.join("src/app.test.ts")));
        assert!(rules.is_ignored(Path::new("/elsewhere/file.rs")));
    }

    #[test]
    fn rust_binary_sources_are_indexed() {
        let dir = workspace();
        let root = dir.path();
        fs::create_dir_all(root.join("src/bin")).unwrap();
        fs::write(root.join("src/bin/tool.rs"), "fn main() {}").unwrap();
        let rules = IgnoreRules::load(root, &[]).unwrap();

        assert!(rules.accepts(&root.join("src/bin/tool.rs")));
        assert!(rules.list_files(100).contains(&root.join("src/bin/tool.rs")));
        assert!(rules.is_ignored(&root.join("target/debug/build.rs")));
    }

    #[test]
    fn listing_stops_at_limit() {
        let dir = workspace();
        let rules = IgnoreRules::load(dir.path(), &[]).unwrap();
        assert_eq!(rules.list_files(1).len(), 1);
    }
}
