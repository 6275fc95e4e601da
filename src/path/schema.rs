//! Path definitions: `name = tag.tag:property` lines compiled into a tree of tag
//! branches and property leaves, sharing structure across paths that agree on a prefix.

use std::collections::HashMap;

use crate::error::{Error, Result};

use super::template::Template;

/// A node in the compiled path tree. `Branch` walks to a concrete tag (by `find` when
/// `from_star` is set, by `browse` otherwise); `PropertyLeaf` reads an attribute of the
/// tag that matched its parent branch, with no further navigation.
pub enum PathNode {
    Branch { pattern: String, from_star: bool, children: Vec<PathNode>, columns: Vec<usize> },
    PropertyLeaf { property: String, columns: Vec<usize> },
}

struct CompiledPath {
    segments: Vec<String>,
    property: Option<String>,
    column: usize,
}

struct TagStep {
    pattern: String,
    use_find: bool,
}

/// A fully compiled schema: the output template plus every named path, ready to build a
/// per-entity tree via [`tree`](Schema::tree).
pub struct Schema {
    root: Vec<String>,
    paths: Vec<CompiledPath>,
    name_index: HashMap<String, usize>,
    template: Template,
}

impl Schema {
    /// Start a schema from an initial output template (may be empty; path definitions
    /// append implicit columns as they're added).
    pub fn new(template: &str) -> Result<Self> {
        let mut tpl = Template::new();
        tpl.append(template)?;
        Ok(Self { root: Vec::new(), paths: Vec::new(), name_index: HashMap::new(), template: tpl })
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn template_mut(&mut self) -> &mut Template {
        &mut self.template
    }

    /// Path names the template references but that were never defined with `add_path`.
    pub fn missing(&self) -> Vec<String> {
        self.template
            .column_names()
            .iter()
            .filter(|name| !self.name_index.contains_key(name.as_str()))
            .cloned()
            .collect()
    }

    /// Errors with `MissingHeaderField` if any template column has no corresponding path.
    pub fn validate(&self) -> Result<()> {
        match self.missing().into_iter().next() {
            Some(name) => Err(Error::MissingHeaderField(name)),
            None => Ok(()),
        }
    }

    /// Compile one `name = tag.tag:property` (or root) line, per §4.5.
    pub fn add_path(&mut self, line: &str) -> Result<()> {
        let (name_part, rhs_part) = match line.find('=') {
            Some(pos) => (line[..pos].to_string(), line[pos + 1..].to_string()),
            None => (String::new(), line.to_string()),
        };
        let name = name_part.trim().to_lowercase();
        let rhs = rhs_part.trim();

        let (sep_path, sep_prop) =
            if rhs.contains('>') || rhs.contains('<') { ('>', '<') } else { ('.', ':') };

        if matches!(rhs, "" | ">" | "<" | "." | ":") {
            self.root.clear();
            return Ok(());
        }

        let cont = rhs.starts_with(sep_path);
        let raw: Vec<String> =
            rhs.split(sep_path).filter(|s| !s.is_empty()).map(str::to_string).collect();
        let mut parts = elide_star_runs(&raw);

        let mut property: Option<String> = None;
        if let Some(last) = parts.last().cloned() {
            if let Some(prop_pos) = last.find(sep_prop) {
                let head = last[..prop_pos].to_string();
                let tail = last[prop_pos + sep_prop.len_utf8()..].to_string();
                if head.is_empty() {
                    parts.pop();
                } else {
                    *parts.last_mut().expect("checked non-empty above") = head;
                }
                if !tail.is_empty() {
                    property = Some(tail);
                }
            }
        }

        if name.is_empty() {
            if property.is_some() {
                return Err(Error::InvalidPathSyntax(format!(
                    "properties are not allowed in root definitions: {line}"
                )));
            }
            if cont {
                self.root.extend(parts);
            } else {
                self.root = parts;
            }
            return Ok(());
        }

        let mut full = self.root.clone();
        full.extend(parts);
        if full.is_empty() {
            return Err(Error::InvalidPathSyntax(format!("empty path definition: {line}")));
        }
        if self.name_index.contains_key(&name) {
            return Err(Error::InvalidPathSyntax(format!("duplicate path name: {line}")));
        }
        if !is_identifier(&name) {
            return Err(Error::InvalidPathSyntax(format!("invalid path name: {line}")));
        }

        let column = self.template.register(&name)?;
        self.name_index.insert(name, self.paths.len());
        self.paths.push(CompiledPath { segments: full, property, column });
        Ok(())
    }

    /// Build the per-entity tree from every compiled path, merging shared prefixes.
    pub fn tree(&self) -> Vec<PathNode> {
        let mut children = Vec::new();
        for path in &self.paths {
            let steps = build_tag_steps(&path.segments);
            insert_path(&mut children, &steps, path.property.as_deref(), path.column);
        }
        children
    }
}

fn build_tag_steps(segments: &[String]) -> Vec<TagStep> {
    let mut steps = Vec::new();
    let mut pending_find = false;
    for (i, raw) in segments.iter().enumerate() {
        if raw == "*" && i + 1 < segments.len() {
            pending_find = true;
            continue;
        }
        steps.push(TagStep { pattern: raw.clone(), use_find: pending_find });
        pending_find = false;
    }
    steps
}

fn insert_path(children: &mut Vec<PathNode>, steps: &[TagStep], property: Option<&str>, column: usize) {
    match steps.split_first() {
        None => {
            if let Some(prop) = property {
                let existing = children.iter_mut().find(|c| {
                    matches!(c, PathNode::PropertyLeaf { property, .. } if property == prop)
                });
                match existing {
                    Some(PathNode::PropertyLeaf { columns, .. }) => columns.push(column),
                    _ => children.push(PathNode::PropertyLeaf {
                        property: prop.to_string(),
                        columns: vec![column],
                    }),
                }
            }
            // A path with zero tag steps and no property has nothing to attach to here;
            // `add_path` already rejects an empty combined path, so this never fires.
        }
        Some((head, rest)) => {
            let idx = children.iter().position(|c| {
                matches!(c, PathNode::Branch { pattern, from_star, .. }
                    if pattern == &head.pattern && *from_star == head.use_find)
            });
            let idx = idx.unwrap_or_else(|| {
                children.push(PathNode::Branch {
                    pattern: head.pattern.clone(),
                    from_star: head.use_find,
                    children: Vec::new(),
                    columns: Vec::new(),
                });
                children.len() - 1
            });
            if rest.is_empty() && property.is_none() {
                if let PathNode::Branch { columns, .. } = &mut children[idx] {
                    columns.push(column);
                }
            } else if let PathNode::Branch { children: grandchildren, .. } = &mut children[idx] {
                insert_path(grandchildren, rest, property, column);
            }
        }
    }
}

fn elide_star_runs(parts: &[String]) -> Vec<String> {
    if parts.is_empty() {
        return Vec::new();
    }
    let mut out = vec![parts[0].clone()];
    for i in 1..parts.len() {
        if parts[i] == "*" && parts[i - 1] == "*" {
            continue;
        }
        out.push(parts[i].clone());
    }
    out
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_line_prefixes_subsequent_paths() {
        let mut s = Schema::new("").unwrap();
        s.add_path("*.clientlist").unwrap();
        s.add_path("client_name = client|customer.name").unwrap();
        let tree = s.tree();
        assert_eq!(tree.len(), 1);
        match &tree[0] {
            PathNode::Branch { pattern, from_star, .. } => {
                assert_eq!(pattern, "*");
                assert!(!*from_star);
            }
            _ => panic!("expected branch"),
        }
    }

    #[test]
    fn star_run_is_elided_to_one() {
        let mut s = Schema::new("").unwrap();
        s.add_path("a = *.*.name").unwrap();
        let tree = s.tree();
        // "*.* .name" elides to "*.name": one wildcard-flagged branch for "name".
        assert_eq!(tree.len(), 1);
        match &tree[0] {
            PathNode::Branch { pattern, from_star, .. } => {
                assert_eq!(pattern, "name");
                assert!(*from_star);
            }
            _ => panic!("expected branch"),
        }
    }

    #[test]
    fn property_suffix_attaches_as_leaf() {
        let mut s = Schema::new("").unwrap();
        s.add_path("v = x:a|b").unwrap();
        let tree = s.tree();
        match &tree[0] {
            PathNode::Branch { children, .. } => match &children[0] {
                PathNode::PropertyLeaf { property, .. } => assert_eq!(property, "a|b"),
                _ => panic!("expected property leaf"),
            },
            _ => panic!("expected branch"),
        }
    }

    #[test]
    fn shared_prefix_merges_into_one_branch() {
        let mut s = Schema::new("").unwrap();
        s.add_path("n = *.p.n").unwrap();
        s.add_path("v = *.p.v").unwrap();
        let tree = s.tree();
        assert_eq!(tree.len(), 1);
        match &tree[0] {
            PathNode::Branch { children, .. } => assert_eq!(children.len(), 2),
            _ => panic!("expected branch"),
        }
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut s = Schema::new("").unwrap();
        s.add_path("a = x").unwrap();
        assert!(s.add_path("a = y").is_err());
    }

    #[test]
    fn empty_path_definition_is_rejected() {
        let mut s = Schema::new("").unwrap();
        assert!(s.add_path("a = :prop").is_err());
    }

    #[test]
    fn missing_reports_template_only_names() {
        let mut s = Schema::new("name, age").unwrap();
        s.add_path("name = *.name").unwrap();
        assert_eq!(s.missing(), vec!["age".to_string()]);
        assert!(s.validate().is_err());
    }
}
