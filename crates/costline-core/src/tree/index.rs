use std::collections::HashMap;

use super::model::{Category, CostLine};

/// A line together with the ids of everything above it, outermost first
/// (the owning category id comes first).
#[derive(Debug, Clone)]
pub struct IndexedNode<'a> {
    pub line: &'a CostLine,
    pub ancestors: Vec<&'a str>,
}

/// What an identifier points at inside a snapshot.
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    Category(&'a Category),
    Node(&'a IndexedNode<'a>),
}

/// Lookup indices over a borrowed snapshot, rebuilt for every computation.
///
/// Identifiers are expected to be unique across the tree; on a collision the
/// first occurrence in document order wins.
#[derive(Debug, Default)]
pub struct TreeIndex<'a> {
    categories: HashMap<&'a str, &'a Category>,
    nodes: HashMap<&'a str, IndexedNode<'a>>,
}

impl<'a> TreeIndex<'a> {
    pub fn build(categories: &'a [Category]) -> Self {
        let mut index = TreeIndex::default();
        for category in categories {
            index.categories.entry(category.id.as_str()).or_insert(category);
            let mut chain = vec![category.id.as_str()];
            for line in &category.children {
                index.insert_line(line, &mut chain);
            }
        }
        index
    }

    fn insert_line(&mut self, line: &'a CostLine, chain: &mut Vec<&'a str>) {
        self.nodes.entry(line.id.as_str()).or_insert_with(|| IndexedNode {
            line,
            ancestors: chain.clone(),
        });
        chain.push(line.id.as_str());
        for child in &line.children {
            self.insert_line(child, chain);
        }
        chain.pop();
    }

    /// Categories shadow nodes when an id is used for both.
    pub fn resolve(&self, id: &str) -> Option<Resolved<'_>> {
        if let Some(category) = self.categories.get(id) {
            return Some(Resolved::Category(*category));
        }
        self.nodes.get(id).map(|node| Resolved::Node(node))
    }

    pub fn category(&self, id: &str) -> Option<&'a Category> {
        self.categories.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&IndexedNode<'a>> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.categories.len() + self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
