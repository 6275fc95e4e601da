//! Walks a compiled path tree against a scanner, producing one padded column block per
//! entity: each branch's matches become "instances", every instance's own value and its
//! children's values are padded together, then instances concatenate into the column.

use std::collections::HashMap;

use crate::error::Result;
use crate::pattern::ContentSpec;
use crate::scanner::Scanner;

use super::schema::PathNode;

/// One column's worth of values for an entity, alongside which slots are padding
/// duplicates rather than genuine matches (used by the emitter to suppress repeats).
#[derive(Default, Clone, Debug)]
pub struct ColumnData {
    pub values: Vec<String>,
    pub padded: Vec<bool>,
}

impl ColumnData {
    fn single(value: String) -> Self {
        Self { values: vec![value], padded: vec![false] }
    }

    fn append(&mut self, mut other: ColumnData) {
        self.values.append(&mut other.values);
        self.padded.append(&mut other.padded);
    }

    fn pad_to(&mut self, len: usize) {
        if self.values.len() >= len {
            return;
        }
        let last = self.values.last().cloned().unwrap_or_default();
        while self.values.len() < len {
            self.values.push(last.clone());
            self.padded.push(true);
        }
    }
}

pub type ColumnBlock = HashMap<usize, ColumnData>;

pub struct PathEngine;

impl PathEngine {
    /// Evaluate every top-level path against one entity's scanner, treating the named
    /// paths as siblings under a single implicit root instance.
    pub fn evaluate(root: &mut Scanner, tree: &[PathNode]) -> Result<ColumnBlock> {
        let (block, _) = evaluate_siblings(tree, Some(root), None)?;
        Ok(block)
    }
}

fn evaluate_siblings(
    nodes: &[PathNode],
    mut parent: Option<&mut Scanner>,
    props: Option<&HashMap<String, String>>,
) -> Result<(ColumnBlock, usize)> {
    let mut blocks = Vec::with_capacity(nodes.len());
    for node in nodes {
        let reborrowed = match &mut parent {
            Some(scanner) => Some(&mut **scanner),
            None => None,
        };
        blocks.push(evaluate_node(node, reborrowed, props)?);
    }
    Ok(combine_and_pad(blocks))
}

fn evaluate_node(
    node: &PathNode,
    parent: Option<&mut Scanner>,
    props: Option<&HashMap<String, String>>,
) -> Result<(ColumnBlock, usize)> {
    match node {
        PathNode::PropertyLeaf { property, columns } => {
            let value = props.map(|p| lookup_property(p, property)).unwrap_or_default();
            Ok(own_column_block(columns, value))
        }
        PathNode::Branch { pattern, from_star, children, columns } => {
            let instances = expand(parent, pattern, *from_star)?;
            let mut per_instance = Vec::with_capacity(instances.len());

            for instance in instances {
                match instance {
                    None => {
                        let own = own_column_block(columns, String::new());
                        let kids = evaluate_siblings(children, None, None)?;
                        per_instance.push(combine_and_pad(vec![own, kids]));
                    }
                    Some((tag_text, mut content)) => {
                        let collected = content.collect(None, false)?.join(",");
                        let inst_props = content.properties(Some(&tag_text));
                        content.reset();
                        let own = own_column_block(columns, collected);
                        let kids = evaluate_siblings(children, Some(&mut content), Some(&inst_props))?;
                        per_instance.push(combine_and_pad(vec![own, kids]));
                    }
                }
            }

            let mut combined = ColumnBlock::new();
            let mut total_len = 0usize;
            for (block, len) in per_instance {
                total_len += len;
                for (col, data) in block {
                    combined.entry(col).or_default().append(data);
                }
            }
            Ok((combined, total_len))
        }
    }
}

/// Walk `pattern` against the parent scanner, returning one `(tag_text, content)` entry
/// per match, or a single `None` placeholder if there were no matches (or no parent at
/// all, meaning this branch sits under a node that never matched).
///
/// Resets the scanner to its own start first: sibling branches (different tag patterns
/// under one parent) each scan independently from the same starting point rather than
/// picking up wherever a previous sibling's scan left off.
fn expand(
    parent: Option<&mut Scanner>,
    pattern: &str,
    use_find: bool,
) -> Result<Vec<Option<(String, Scanner)>>> {
    let Some(scanner) = parent else { return Ok(vec![None]) };

    scanner.reset();
    scanner.tags(pattern)?;
    let mut out = Vec::new();
    loop {
        let found = if use_find { scanner.find() } else { scanner.browse() }.map(str::to_string);
        let Some(tag_text) = found else { break };
        let content = scanner.extract(true);
        out.push(Some((tag_text, content)));
    }
    if out.is_empty() {
        out.push(None);
    }
    Ok(out)
}

fn own_column_block(columns: &[usize], value: String) -> (ColumnBlock, usize) {
    let mut block = ColumnBlock::new();
    for &col in columns {
        block.insert(col, ColumnData::single(value.clone()));
    }
    (block, 1)
}

/// Pad every block in `blocks` (siblings under one instance) to the longest among them,
/// then merge their columns together. Returns the shared instance length.
fn combine_and_pad(blocks: Vec<(ColumnBlock, usize)>) -> (ColumnBlock, usize) {
    let instance_len = blocks.iter().map(|(_, len)| *len).max().unwrap_or(1).max(1);
    let mut combined = ColumnBlock::new();
    for (block, _) in blocks {
        for (col, mut data) in block {
            data.pad_to(instance_len);
            combined.insert(col, data);
        }
    }
    (combined, instance_len)
}

/// Exact match first; otherwise, if the pattern carries any wildcard metacharacter,
/// compile it as a like-pattern and join every matching attribute's value with `|` in
/// alphabetical key order (deterministic, unlike Rust's randomized `HashMap` iteration).
fn lookup_property(props: &HashMap<String, String>, pattern: &str) -> String {
    if let Some(value) = props.get(pattern) {
        return value.clone();
    }
    if !pattern.contains(['*', '|', '?']) {
        return String::new();
    }
    let Ok(spec) = ContentSpec::compile(pattern) else { return String::new() };
    let mut matches: Vec<(&String, &String)> =
        props.iter().filter(|(key, _)| spec.is_match(key)).collect();
    matches.sort_by(|a, b| a.0.cmp(b.0));
    matches.into_iter().map(|(_, value)| value.clone()).collect::<Vec<_>>().join("|")
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::document::Document;

    fn scanner_for(xml: &str) -> Scanner {
        Scanner::new(Document::new(Rc::from(xml)))
    }

    #[test]
    fn single_match_yields_one_row() {
        let tree = vec![PathNode::Branch {
            pattern: "name".to_string(),
            from_star: false,
            children: Vec::new(),
            columns: vec![0],
        }];
        let mut scanner = scanner_for("<root><name>Alice</name></root>");
        scanner.tags("root").unwrap();
        scanner.find();
        let mut content = scanner.extract(true);
        let block = PathEngine::evaluate(&mut content, &tree).unwrap();
        assert_eq!(block[&0].values, vec!["Alice".to_string()]);
    }

    #[test]
    fn multiple_matches_pad_sibling_and_concatenate() {
        let tree = vec![
            PathNode::Branch {
                pattern: "name".to_string(),
                from_star: false,
                children: Vec::new(),
                columns: vec![0],
            },
            PathNode::Branch {
                pattern: "item".to_string(),
                from_star: false,
                children: Vec::new(),
                columns: vec![1],
            },
        ];
        let xml = "<root><name>Bob</name><item>a</item><item>b</item></root>";
        let mut scanner = scanner_for(xml);
        scanner.tags("root").unwrap();
        scanner.find();
        let mut content = scanner.extract(true);
        let block = PathEngine::evaluate(&mut content, &tree).unwrap();
        assert_eq!(block[&0].values, vec!["Bob".to_string(), "Bob".to_string()]);
        assert_eq!(block[&0].padded, vec![false, true]);
        assert_eq!(block[&1].values, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn sibling_branches_scan_independently_of_declaration_order() {
        // "age" is declared first but appears second in the document; each sibling
        // branch must search from the entity's own start, not from wherever its
        // preceding sibling's scan left off.
        let tree = vec![
            PathNode::Branch {
                pattern: "age".to_string(),
                from_star: true,
                children: Vec::new(),
                columns: vec![0],
            },
            PathNode::Branch {
                pattern: "name".to_string(),
                from_star: true,
                children: Vec::new(),
                columns: vec![1],
            },
        ];
        let xml = "<doc><name>Ada</name><age>30</age></doc>";
        let mut scanner = scanner_for(xml);
        scanner.tags("doc").unwrap();
        scanner.find();
        let mut content = scanner.extract(true);
        let block = PathEngine::evaluate(&mut content, &tree).unwrap();
        assert_eq!(block[&0].values, vec!["30".to_string()]);
        assert_eq!(block[&1].values, vec!["Ada".to_string()]);
    }

    #[test]
    fn no_match_still_produces_empty_placeholder_row() {
        let tree = vec![PathNode::Branch {
            pattern: "missing".to_string(),
            from_star: false,
            children: Vec::new(),
            columns: vec![0],
        }];
        let mut scanner = scanner_for("<root></root>");
        scanner.tags("root").unwrap();
        scanner.find();
        let mut content = scanner.extract(true);
        let block = PathEngine::evaluate(&mut content, &tree).unwrap();
        assert_eq!(block[&0].values, vec!["".to_string()]);
    }

    #[test]
    fn property_leaf_reads_matched_tag_attribute() {
        let tree = vec![PathNode::Branch {
            pattern: "item".to_string(),
            from_star: false,
            children: vec![PathNode::PropertyLeaf { property: "id".to_string(), columns: vec![1] }],
            columns: vec![0],
        }];
        let mut scanner = scanner_for(r#"<root><item id="7">x</item></root>"#);
        scanner.tags("root").unwrap();
        scanner.find();
        let mut content = scanner.extract(true);
        let block = PathEngine::evaluate(&mut content, &tree).unwrap();
        assert_eq!(block[&1].values, vec!["7".to_string()]);
    }

    #[test]
    fn wildcard_property_join_is_alphabetically_sorted() {
        let mut props = HashMap::new();
        props.insert("b_attr".to_string(), "2".to_string());
        props.insert("a_attr".to_string(), "1".to_string());
        assert_eq!(lookup_property(&props, "*_attr"), "1|2");
    }
}
