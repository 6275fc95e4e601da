//! Output field template: `[name =] item (item)*` groups separated by commas, where an
//! item is either a quoted literal or a `[!]path_name[.row_offset]` reference.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// One reference to a named path's column within a field.
#[derive(Clone, Debug)]
pub(crate) struct ColumnItem {
    pub column: usize,
    pub offset: i64,
    pub is_key: bool,
}

#[derive(Clone, Debug)]
pub(crate) enum FieldItem {
    Literal(String),
    Column(ColumnItem),
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Field {
    pub items: Vec<FieldItem>,
}

/// The compiled table shape: fields in output order, the column each path name maps to,
/// the key set, and whether any positional reference switched the table into single-row
/// (one output line per key group) mode.
pub struct Template {
    fields: Vec<Field>,
    column_names: Vec<String>,
    column_index: HashMap<String, usize>,
    keys: Vec<usize>,
    single: bool,
    explicit: Vec<(String, Vec<usize>)>,
    implicit: Vec<(String, Vec<usize>)>,
}

impl Template {
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            column_names: Vec::new(),
            column_index: HashMap::new(),
            keys: Vec::new(),
            single: false,
            explicit: Vec::new(),
            implicit: Vec::new(),
        }
    }

    pub(crate) fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub(crate) fn keys(&self) -> &[usize] {
        &self.keys
    }

    pub(crate) fn is_single(&self) -> bool {
        self.single
    }

    pub(crate) fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Register a bare path name as a column, auto-appending an implicit one-item field
    /// the first time it's seen. Returns the column index either way.
    pub fn register(&mut self, name: &str) -> Result<usize> {
        let name = name.trim().to_lowercase();
        if let Some(&idx) = self.column_index.get(&name) {
            return Ok(idx);
        }
        self.append(&name)?;
        self.column_index
            .get(&name)
            .copied()
            .ok_or_else(|| Error::InvalidPathSyntax(format!("path name not usable as a column: {name}")))
    }

    pub fn output_header(&self) -> String {
        self.assemble_header().join("\t")
    }

    /// Parse and append field definitions, separated by commas, to the template.
    pub fn append(&mut self, template: &str) -> Result<()> {
        let mut fields: Vec<Vec<String>> = vec![Vec::new()];
        let mut quote = false;
        for chunk in quote_split(template)? {
            if chunk.starts_with('"') {
                fields.last_mut().expect("fields always has an entry").push(chunk);
                quote = true;
            } else {
                let mut items: Vec<String> =
                    chunk.split(',').map(|item| item.trim().to_lowercase()).collect();
                if quote {
                    fields.last_mut().expect("fields always has an entry").push(items.remove(0));
                }
                fields.extend(items.into_iter().map(|item| vec![item]));
                quote = false;
            }
        }

        for raw_field in fields {
            let field: Vec<String> = raw_field.into_iter().filter(|s| !s.is_empty()).collect();
            if field.is_empty() {
                continue;
            }
            self.append_field(field)?;
        }
        Ok(())
    }

    fn append_field(&mut self, mut tokens: Vec<String>) -> Result<()> {
        let mut name = String::new();
        let mut explicit = false;

        if let Some(eq) = tokens[0].find('=') {
            let before = tokens[0][..eq].trim().to_string();
            let item = tokens[0][eq + 1..].trim().to_string();
            if !is_identifier(&before) {
                return Err(Error::InvalidPathSyntax(format!(
                    "invalid name definition: {}",
                    tokens[0]
                )));
            }
            name = before;
            if item.is_empty() {
                if tokens.len() == 1 {
                    return Err(Error::InvalidPathSyntax(format!("invalid name definition: {name}")));
                }
                tokens.remove(0);
            } else {
                tokens[0] = item;
            }
            explicit = true;
        }

        let mut items = Vec::with_capacity(tokens.len());
        for token in &tokens {
            if let Some(literal) = token.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
                items.push(FieldItem::Literal(literal.to_string()));
                continue;
            }
            let (before, offset) = match token.split_once('.') {
                Some((before, after)) => {
                    if after.is_empty() || !after.chars().all(|c| c.is_ascii_digit()) {
                        return Err(Error::InvalidPathSyntax(format!(
                            "invalid field definition: {token}"
                        )));
                    }
                    let pos: i64 = after.parse().unwrap_or(0);
                    let offset = pos - 1;
                    self.single = offset >= 0;
                    (before.to_string(), offset)
                }
                None => (token.clone(), 0),
            };
            let is_key = before.starts_with('!');
            let before = if is_key { before[1..].to_string() } else { before };
            if !is_identifier(&before) {
                return Err(Error::InvalidPathSyntax(format!("invalid field definition: {token}")));
            }
            if name.is_empty() {
                name = before.clone();
            }
            let column = self.get_or_create_column(&before);
            if is_key {
                self.keys.push(column);
            }
            items.push(FieldItem::Column(ColumnItem { column, offset, is_key }));
        }

        self.fields.push(Field { items });
        let field_idx = self.fields.len() - 1;
        let header = if explicit { &mut self.explicit } else { &mut self.implicit };
        match header.iter_mut().find(|(n, _)| n == &name) {
            Some((_, positions)) => positions.push(field_idx),
            None => header.push((name, vec![field_idx])),
        }
        Ok(())
    }

    fn get_or_create_column(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.column_index.get(name) {
            return idx;
        }
        let idx = self.column_names.len();
        self.column_names.push(name.to_string());
        self.column_index.insert(name.to_string(), idx);
        idx
    }

    fn assemble_header(&self) -> Vec<String> {
        let mut header = vec![String::new(); self.fields.len()];
        let mut reserved: std::collections::HashSet<String> =
            self.explicit.iter().map(|(n, _)| n.clone()).collect();
        let mut conflict: std::collections::HashSet<String> = std::collections::HashSet::new();

        for (name, positions) in &self.explicit {
            let mut start = 0i64;
            for &pos in positions {
                let (resolved, next) = resolve_name(name, start, &mut conflict, &reserved);
                header[pos] = resolved;
                start = next;
            }
        }
        for (name, _) in &self.implicit {
            reserved.insert(name.clone());
        }
        for (name, positions) in &self.implicit {
            let mut start: i64 = if !name.is_empty() && positions.len() == 1 { 0 } else { 1 };
            for &pos in positions {
                let (resolved, next) = resolve_name(name, start, &mut conflict, &reserved);
                header[pos] = resolved;
                start = next;
            }
        }
        header
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_name(
    name: &str,
    start: i64,
    conflict: &mut std::collections::HashSet<String>,
    reserved: &std::collections::HashSet<String>,
) -> (String, i64) {
    let mut start = start;
    let mut candidate = if start <= 0 { name.to_string() } else { format!("{name}_{start}") };
    if conflict.contains(&candidate) {
        loop {
            start += 1;
            candidate = format!("{name}_{start}");
            if !conflict.contains(&candidate) && !reserved.contains(&candidate) {
                break;
            }
        }
    }
    conflict.insert(candidate.clone());
    (candidate, start + 1)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Split on alternating literal/quoted runs, re-wrapping quoted runs in `"..."`
/// regardless of whether the source used `'` or `"`.
fn quote_split(input: &str) -> Result<Vec<String>> {
    let mut splits = Vec::new();
    let mut rest: &str = input;
    loop {
        if rest.is_empty() {
            break;
        }
        let quote = match rest.find('\'') {
            Some(pos) if !rest[..pos].contains('"') => '\'',
            _ => '"',
        };
        let parts: Vec<&str> = rest.splitn(3, quote).collect();
        match parts.len() {
            1 => {
                if !parts[0].is_empty() {
                    splits.push(parts[0].to_string());
                }
                break;
            }
            2 => return Err(Error::InvalidTemplateSyntax(format!("unbalanced quotes in: {input}"))),
            _ => {
                if !parts[0].is_empty() {
                    splits.push(parts[0].to_string());
                }
                splits.push(format!("\"{}\"", parts[1]));
                rest = parts[2];
            }
        }
    }
    Ok(splits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_become_implicit_columns() {
        let mut t = Template::new();
        t.append("name, age").unwrap();
        assert_eq!(t.output_header(), "name\tage");
    }

    #[test]
    fn explicit_names_take_header_precedence() {
        let mut t = Template::new();
        t.append("fullname = name").unwrap();
        assert_eq!(t.output_header(), "fullname");
    }

    #[test]
    fn literal_and_positional_items_compose_a_field() {
        let mut t = Template::new();
        t.append(r#"birthdate = year "." month "." day"#).unwrap();
        assert_eq!(t.fields().len(), 1);
        assert!(t.fields()[0].items.len() >= 5);
    }

    #[test]
    fn positional_suffix_enables_single_row_mode() {
        let mut t = Template::new();
        assert!(!t.is_single());
        t.append("first = job.1, second = job.2").unwrap();
        assert!(t.is_single());
    }

    #[test]
    fn key_marker_registers_in_keys() {
        let mut t = Template::new();
        t.append("!id, name").unwrap();
        assert_eq!(t.keys().len(), 1);
    }

    #[test]
    fn unbalanced_quote_is_an_error() {
        let mut t = Template::new();
        assert!(t.append(r#"name = "unterminated"#).is_err());
    }

    #[test]
    fn register_reuses_existing_column() {
        let mut t = Template::new();
        t.append("name").unwrap();
        let a = t.register("name").unwrap();
        let b = t.register("name").unwrap();
        assert_eq!(a, b);
    }
}
