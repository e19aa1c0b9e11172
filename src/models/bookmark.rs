// src/models/bookmark.rs

//! Bookmark tree built from hierarchy paths.

use serde::Serialize;

/// A node of the outline embedded in an assembled PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookmarkNode {
    pub label: String,
    /// Zero-based page index within the merged output
    pub target_page: usize,
    pub children: Vec<BookmarkNode>,
}

impl BookmarkNode {
    pub fn leaf(label: impl Into<String>, target_page: usize) -> Self {
        Self {
            label: label.into(),
            target_page,
            children: Vec::new(),
        }
    }

    /// Number of nodes below this one.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }
}

/// One document placed in the merged stream.
#[derive(Debug, Clone)]
pub struct PlacedDocument<'a> {
    pub hierarchy_path: &'a [String],
    pub label: &'a str,
    pub first_page: usize,
}

/// Build the bookmark forest for documents in merge order.
///
/// Each hierarchy level becomes a branch node targeting the first page of
/// its first document; each document becomes a leaf under its deepest
/// level. Consecutive documents sharing a path prefix share branch nodes.
pub fn build_tree<'a>(documents: impl IntoIterator<Item = PlacedDocument<'a>>) -> Vec<BookmarkNode> {
    let mut roots: Vec<BookmarkNode> = Vec::new();

    for doc in documents {
        let mut level = &mut roots;
        for label in doc.hierarchy_path {
            let reuse = level.last().is_some_and(|n| &n.label == label && !n.children.is_empty());
            if !reuse {
                level.push(BookmarkNode {
                    label: label.clone(),
                    target_page: doc.first_page,
                    children: Vec::new(),
                });
            }
            let last = level.len() - 1;
            level = &mut level[last].children;
        }
        level.push(BookmarkNode::leaf(doc.label, doc.first_page));
    }

    roots
}

/// A flattened outline line: depth, label and target page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineLine {
    pub depth: usize,
    pub label: String,
    pub target_page: usize,
}

/// Depth-first pre-order listing of a forest.
pub fn flatten(roots: &[BookmarkNode]) -> Vec<OutlineLine> {
    fn walk(nodes: &[BookmarkNode], depth: usize, out: &mut Vec<OutlineLine>) {
        for node in nodes {
            out.push(OutlineLine {
                depth,
                label: node.label.clone(),
                target_page: node.target_page,
            });
            walk(&node.children, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    walk(roots, 0, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn leaf_labels(nodes: &[BookmarkNode]) -> Vec<String> {
        nodes
            .iter()
            .flat_map(|node| {
                if node.children.is_empty() {
                    vec![node.label.clone()]
                } else {
                    leaf_labels(&node.children)
                }
            })
            .collect()
    }

    #[test]
    fn test_tree_mirrors_hierarchy_depth() {
        let gen1 = path(&["GEN", "GEN 1"]);
        let gen2 = path(&["GEN", "GEN 2"]);
        let docs = vec![
            PlacedDocument { hierarchy_path: &gen1, label: "GEN-1.1", first_page: 1 },
            PlacedDocument { hierarchy_path: &gen1, label: "GEN-1.2", first_page: 4 },
            PlacedDocument { hierarchy_path: &gen2, label: "GEN-2.1", first_page: 6 },
        ];
        let roots = build_tree(docs);

        assert_eq!(roots.len(), 1);
        let gen_node = &roots[0];
        assert_eq!(gen_node.label, "GEN");
        assert_eq!(gen_node.target_page, 1);
        assert_eq!(gen_node.children.len(), 2);
        assert_eq!(gen_node.children[0].children.len(), 2);
        assert_eq!(gen_node.children[1].target_page, 6);
        assert_eq!(gen_node.descendant_count(), 5);
    }

    #[test]
    fn test_leaves_follow_input_order() {
        let a = path(&["AD"]);
        let docs = ["AD-0.6", "SABE-AD-2.0", "AD-1.1"]
            .iter()
            .enumerate()
            .map(|(i, label)| PlacedDocument { hierarchy_path: &a, label: *label, first_page: i })
            .collect::<Vec<_>>();
        let roots = build_tree(docs);
        assert_eq!(leaf_labels(&roots), vec!["AD-0.6", "SABE-AD-2.0", "AD-1.1"]);
    }

    #[test]
    fn test_flatten_is_preorder_with_depth() {
        let p = path(&["ENR", "ENR 1"]);
        let roots = build_tree(vec![PlacedDocument { hierarchy_path: &p, label: "ENR-1.1", first_page: 2 }]);
        let lines = flatten(&roots);
        let depths: Vec<usize> = lines.iter().map(|l| l.depth).collect();
        assert_eq!(depths, vec![0, 1, 2]);
        assert!(lines.iter().all(|l| l.target_page == 2));
    }

    #[test]
    fn test_empty_path_yields_root_leaf() {
        let empty: Vec<String> = Vec::new();
        let roots = build_tree(vec![PlacedDocument { hierarchy_path: &empty, label: "Loose", first_page: 0 }]);
        assert_eq!(roots, vec![BookmarkNode::leaf("Loose", 0)]);
    }
}
