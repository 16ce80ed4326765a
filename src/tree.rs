// src/tree.rs

use crate::model::*;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
struct DirBuilder {
    dirs: BTreeMap<String, DirBuilder>,
    files: BTreeSet<String>,
}

impl DirBuilder {
    fn insert(&mut self, path: &str) {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((file, parents)) = segments.split_last() else {
            return;
        };
        let mut dir = self;
        for segment in parents {
            dir = dir.dirs.entry(segment.to_string()).or_default();
        }
        dir.files.insert(file.to_string());
    }

    fn into_node(self, name: String, path: String) -> TreeNode {
        let child_path = |child: &str| {
            if path.is_empty() {
                child.to_string()
            } else {
                format!("{path}/{child}")
            }
        };

        let mut children: Vec<TreeNode> = self
            .files
            .into_iter()
            .map(|file| TreeNode {
                path: child_path(&file),
                name: file,
                kind: NodeKind::File,
                children: Vec::new(),
            })
            .collect();
        for (dir_name, dir) in self.dirs {
            let p = child_path(&dir_name);
            children.push(dir.into_node(dir_name, p));
        }
        // NodeKind orders File before Directory, which settles same-name ties.
        children.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.kind.cmp(&b.kind)));

        TreeNode {
            name,
            path,
            kind: NodeKind::Directory,
            children,
        }
    }
}

/// Build the directory hierarchy for `paths` under a root named `root_name` with path `""`.
pub fn build_tree(root_name: &str, paths: &[String]) -> TreeNode {
    let mut root = DirBuilder::default();
    for path in paths {
        root.insert(path);
    }
    root.into_node(root_name.to_string(), String::new())
}

pub fn count_files(node: &TreeNode) -> usize {
    match node.kind {
        NodeKind::File => 1,
        NodeKind::Directory => node.children.iter().map(count_files).sum(),
    }
}

/// Directories below `node`, not counting `node` itself
pub fn count_directories(node: &TreeNode) -> usize {
    node.children
        .iter()
        .filter(|c| c.kind == NodeKind::Directory)
        .map(|c| 1 + count_directories(c))
        .sum()
}

/// Paths of every file leaf, in tree order
pub fn file_paths(node: &TreeNode) -> Vec<&str> {
    let mut out = Vec::new();
    collect_files(node, &mut out);
    out
}

fn collect_files<'a>(node: &'a TreeNode, out: &mut Vec<&'a str>) {
    match node.kind {
        NodeKind::File => out.push(&node.path),
        NodeKind::Directory => node.children.iter().for_each(|c| collect_files(c, out)),
    }
}
