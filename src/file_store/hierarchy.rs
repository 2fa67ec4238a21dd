//! §4.3 `GetHierarchy` — derives a folder/file tree from a flat list of
//! file paths. Pure function: no I/O, easy to property-test.

use super::model::HierarchyNode;
use std::collections::BTreeMap;

enum Entry {
    File,
    Folder(BTreeMap<String, Entry>),
}

/// Build the hierarchy tree for a session's files. Output order: folders
/// first (lexicographic), then files (lexicographic), depth-first (§4.3).
pub fn build_hierarchy(file_paths: &[String]) -> Vec<HierarchyNode> {
    let mut root: BTreeMap<String, Entry> = BTreeMap::new();

    for path in file_paths {
        let mut cursor = &mut root;
        let segments: Vec<&str> = path.split('/').collect();
        for (i, segment) in segments.iter().enumerate() {
            let is_last = i == segments.len() - 1;
            if is_last {
                cursor.insert(segment.to_string(), Entry::File);
            } else {
                let entry = cursor
                    .entry(segment.to_string())
                    .or_insert_with(|| Entry::Folder(BTreeMap::new()));
                cursor = match entry {
                    Entry::Folder(map) => map,
                    Entry::File => {
                        // A file and a folder share a name; treat as a folder
                        // going forward rather than lose the deeper entries.
                        *entry = Entry::Folder(BTreeMap::new());
                        match entry {
                            Entry::Folder(map) => map,
                            Entry::File => unreachable!(),
                        }
                    }
                };
            }
        }
    }

    fn render(map: &BTreeMap<String, Entry>, prefix: &str) -> Vec<HierarchyNode> {
        let mut folders = Vec::new();
        let mut files = Vec::new();
        for (name, entry) in map {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            match entry {
                Entry::Folder(children) => folders.push(HierarchyNode {
                    name: name.clone(),
                    path: path.clone(),
                    is_folder: true,
                    children: render(children, &path),
                }),
                Entry::File => files.push(HierarchyNode {
                    name: name.clone(),
                    path,
                    is_folder: false,
                    children: Vec::new(),
                }),
            }
        }
        folders.into_iter().chain(files).collect()
    }

    render(&root, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folders_sort_before_files_at_each_level() {
        let paths = vec![
            "b.js".to_string(),
            "a/x.py".to_string(),
            "a.js".to_string(),
        ];
        let tree = build_hierarchy(&paths);
        assert!(tree[0].is_folder);
        assert_eq!(tree[0].name, "a");
        assert_eq!(tree[1].name, "a.js");
        assert_eq!(tree[2].name, "b.js");
    }

    #[test]
    fn nested_paths_build_depth_first() {
        let paths = vec!["src/util/io.js".to_string(), "src/main.py".to_string()];
        let tree = build_hierarchy(&paths);
        assert_eq!(tree.len(), 1);
        let src = &tree[0];
        assert_eq!(src.name, "src");
        assert_eq!(src.children[0].name, "util");
        assert_eq!(src.children[1].name, "main.py");
        assert_eq!(src.children[0].children[0].path, "src/util/io.js");
    }

    #[test]
    fn empty_input_yields_empty_tree() {
        assert!(build_hierarchy(&[]).is_empty());
    }
}
