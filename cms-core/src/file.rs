//! Per-asset file tree.

use serde::{Deserialize, Serialize};

/// Child representation of a [`File`].
///
/// `Nested` is a regular tree; `Flat` stores every descendant in one ordered
/// list, which is how archives with thousands of entries are indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "entries", rename_all = "lowercase")]
pub enum FileChildren {
    Nested(Vec<File>),
    Flat(Vec<File>),
}

impl Default for FileChildren {
    fn default() -> Self {
        FileChildren::Nested(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub name: String,
    /// Root-relative path, always starting with `/`.
    pub path: String,
    pub size: u64,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_encoding: String,
    #[serde(default)]
    pub children: FileChildren,
}

impl File {
    pub fn new(name: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            path: normalize_path(&path.into()),
            size,
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_content_encoding(mut self, content_encoding: impl Into<String>) -> Self {
        self.content_encoding = content_encoding.into();
        self
    }

    pub fn with_children(mut self, children: Vec<File>) -> Self {
        self.children = FileChildren::Nested(children);
        self
    }

    pub fn with_flat_files(mut self, files: Vec<File>) -> Self {
        self.children = FileChildren::Flat(files);
        self
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.children, FileChildren::Flat(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(&self.children, FileChildren::Nested(c) if !c.is_empty())
    }

    /// Direct nested children; empty for flat files.
    pub fn children(&self) -> &[File] {
        match &self.children {
            FileChildren::Nested(c) => c,
            FileChildren::Flat(_) => &[],
        }
    }

    /// Flat entries; empty for nested files.
    pub fn flat_files(&self) -> &[File] {
        match &self.children {
            FileChildren::Flat(f) => f,
            FileChildren::Nested(_) => &[],
        }
    }

    /// Every file below this one, depth first, excluding self.
    pub fn descendants(&self) -> Vec<&File> {
        let mut out = Vec::new();
        match &self.children {
            FileChildren::Flat(files) => out.extend(files.iter()),
            FileChildren::Nested(children) => {
                for child in children {
                    out.push(child);
                    out.extend(child.descendants());
                }
            }
        }
        out
    }

    /// Blob key prefix of this file for the asset identified by `uuid`.
    pub fn root_path(&self, uuid: &str) -> String {
        root_path(uuid, &self.path)
    }

    /// Fold a flat entry list into a nested tree keyed by path segments.
    pub fn fold_flat(&self) -> File {
        let entries = match &self.children {
            FileChildren::Flat(files) => files,
            FileChildren::Nested(_) => return self.clone(),
        };

        let mut root = File {
            children: FileChildren::Nested(Vec::new()),
            ..self.clone()
        };
        for entry in entries {
            let segments: Vec<&str> = entry.path.split('/').filter(|s| !s.is_empty()).collect();
            insert_at(&mut root, &segments, "", entry);
        }
        root
    }
}

fn insert_at(node: &mut File, segments: &[&str], prefix: &str, entry: &File) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let path = format!("{}/{}", prefix, head);
    let children = match &mut node.children {
        FileChildren::Nested(c) => c,
        FileChildren::Flat(_) => return,
    };

    if rest.is_empty() {
        if let Some(existing) = children.iter_mut().find(|c| c.path == path) {
            let kept = std::mem::take(&mut existing.children);
            *existing = File {
                children: kept,
                ..entry.clone()
            };
        } else {
            children.push(File {
                children: FileChildren::Nested(Vec::new()),
                ..entry.clone()
            });
        }
        return;
    }

    let idx = match children.iter().position(|c| c.path == path) {
        Some(idx) => idx,
        None => {
            children.push(File::new(*head, path.clone(), 0));
            children.len() - 1
        }
    };
    insert_at(&mut children[idx], rest, &path, entry);
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Canonical blob key: `uuid[0:2]/uuid[2:]/path`.
pub fn root_path(uuid: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    let split = uuid.char_indices().nth(2).map(|(i, _)| i).unwrap_or(uuid.len());
    format!("{}/{}/{}", &uuid[..split], &uuid[split..], path)
}
