//! Turns one entity's [`ColumnBlock`] into output rows, per the compiled [`Template`].

use super::engine::ColumnBlock;
use super::template::{Field, FieldItem, Template};

/// Renders rows for one entity against a fixed template shape.
pub struct TableEmitter<'a> {
    template: &'a Template,
}

impl<'a> TableEmitter<'a> {
    pub fn new(template: &'a Template) -> Self {
        Self { template }
    }

    /// Produce every output row (tab-joined fields) for one entity's column block.
    ///
    /// In single-row mode, rows group at each index where any key column's raw value
    /// differs from the previous index; otherwise every index is its own row. A row is
    /// kept only if every key field produced a value and, when the template has any
    /// non-key item, at least one data field did too.
    pub fn output_data(&self, block: &ColumnBlock) -> Vec<String> {
        let total = row_count(block);
        if total == 0 {
            return Vec::new();
        }

        let groups: Vec<(usize, usize)> = if self.template.is_single() {
            group_by_key_change(block, self.template.keys(), total)
        } else {
            (0..total).map(|i| (i, i + 1)).collect()
        };

        let has_non_key_item = self
            .template
            .fields()
            .iter()
            .any(|field| field.items.iter().any(|item| matches!(item, FieldItem::Column(c) if !c.is_key)));

        let mut rows = Vec::with_capacity(groups.len());
        for (start, end) in groups {
            let mut keycnt = 0usize;
            let mut datacnt = 0usize;
            let mut cells = Vec::with_capacity(self.template.fields().len());

            for field in self.template.fields() {
                let value = render_field(field, block, start, end);
                if let Some((_, is_key)) = field_key_info(field) {
                    if !value.is_empty() {
                        if is_key {
                            keycnt += 1;
                        } else {
                            datacnt += 1;
                        }
                    }
                }
                cells.push(value);
            }

            let keys_total = self.template.fields().iter().filter(|f| field_is_key(f)).count();
            let required_data = if has_non_key_item { 1 } else { 0 };
            if keycnt == keys_total && datacnt >= required_data {
                rows.push(cells.join("\t"));
            }
        }
        rows
    }
}

fn field_is_key(field: &Field) -> bool {
    field.items.iter().any(|item| matches!(item, FieldItem::Column(c) if c.is_key))
}

fn field_key_info(field: &Field) -> Option<(usize, bool)> {
    field
        .items
        .iter()
        .find_map(|item| match item {
            FieldItem::Column(c) => Some((c.column, c.is_key)),
            FieldItem::Literal(_) => None,
        })
}

fn row_count(block: &ColumnBlock) -> usize {
    block.values().map(|data| data.values.len()).max().unwrap_or(0)
}

fn group_by_key_change(block: &ColumnBlock, keys: &[usize], total: usize) -> Vec<(usize, usize)> {
    let mut groups = Vec::new();
    let mut start = 0usize;
    for i in 1..total {
        let changed = keys.iter().any(|&col| {
            let values = block.get(&col).map(|d| d.values.as_slice()).unwrap_or(&[]);
            values.get(i) != values.get(i - 1)
        });
        if changed {
            groups.push((start, i));
            start = i;
        }
    }
    groups.push((start, total));
    groups
}

/// A literal is emitted verbatim unless the field also carries column items and every
/// one of them came up empty — then the whole field (literal included) goes empty, so a
/// template like `year "." month "." day` doesn't leave behind bare `..` separators.
fn render_field(field: &Field, block: &ColumnBlock, start: usize, end: usize) -> String {
    let mut out = String::new();
    let mut has_literal = false;
    let mut has_column = false;
    let mut has_data = false;

    for item in &field.items {
        match item {
            FieldItem::Literal(text) => {
                has_literal = true;
                out.push_str(text);
            }
            FieldItem::Column(c) => {
                has_column = true;
                let index = if c.offset > 0 { (start as i64 + c.offset) as usize } else { start };
                let value = block.get(&c.column).and_then(|data| {
                    if index >= end {
                        return None;
                    }
                    // Dedup only applies to offset-addressed items: a plain column (no
                    // `.N` suffix) always shows its own value, padded or not, since a
                    // whole row's worth of siblings were deliberately padded together.
                    if c.offset != 0 && data.padded.get(index).copied().unwrap_or(false) {
                        return None;
                    }
                    data.values.get(index)
                });
                if let Some(v) = value {
                    let escaped = escape(v);
                    if !escaped.is_empty() {
                        has_data = true;
                    }
                    out.push_str(&escaped);
                }
            }
        }
    }

    if has_literal && has_column && !has_data {
        return String::new();
    }
    out
}

/// Trimmed first, then `\t` escapes, then any of `\r\n`/`\r`/`\n` become `\n`-escaped,
/// then entity-decode `&amp;`/`&gt;`/`&lt;`.
fn escape(value: &str) -> String {
    let value = value.trim();
    let value = value.replace('\t', "\\t");
    let value = value.replace("\r\n", "\\n").replace('\r', "\\n").replace('\n', "\\n");
    value.replace("&amp;", "&").replace("&gt;", ">").replace("&lt;", "<")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::engine::ColumnData;

    fn block_of(pairs: Vec<(usize, Vec<&str>, Vec<bool>)>) -> ColumnBlock {
        pairs
            .into_iter()
            .map(|(col, values, padded)| {
                (col, ColumnData { values: values.into_iter().map(String::from).collect(), padded })
            })
            .collect()
    }

    #[test]
    fn plain_mode_emits_one_row_per_index() {
        let mut t = Template::new();
        t.append("name, age").unwrap();
        let block = block_of(vec![
            (0, vec!["a", "b"], vec![false, false]),
            (1, vec!["1", "2"], vec![false, false]),
        ]);
        let rows = TableEmitter::new(&t).output_data(&block);
        assert_eq!(rows, vec!["a\t1", "b\t2"]);
    }

    #[test]
    fn plain_column_shows_its_value_even_when_padded() {
        // Only offset-addressed items (the `.N` syntax) dedup against padding; a bare
        // column always renders its own value so sibling rows keep their shared key.
        let mut t = Template::new();
        t.append("name, item").unwrap();
        let block = block_of(vec![
            (0, vec!["a", "a"], vec![false, true]),
            (1, vec!["x", "y"], vec![false, false]),
        ]);
        let rows = TableEmitter::new(&t).output_data(&block);
        assert_eq!(rows, vec!["a\tx", "a\ty"]);
    }

    #[test]
    fn offset_item_dedups_against_padding() {
        let mut t = Template::new();
        t.append("!id.1, first = v.1, second = v.2").unwrap();
        let block = block_of(vec![
            (0, vec!["k", "k"], vec![false, false]),
            (1, vec!["only", "only"], vec![false, true]),
        ]);
        let rows = TableEmitter::new(&t).output_data(&block);
        assert_eq!(rows, vec!["k\tonly\t"]);
    }

    #[test]
    fn escapes_tabs_and_newlines_and_decodes_entities() {
        assert_eq!(escape("a\tb"), "a\\tb");
        assert_eq!(escape("a\r\nb"), "a\\nb");
        assert_eq!(escape("x &amp; y"), "x & y");
    }

    #[test]
    fn escape_trims_before_escaping_not_after() {
        assert_eq!(escape("\n  Ada\n"), "Ada");
    }

    #[test]
    fn literal_field_with_all_empty_columns_renders_empty() {
        let mut t = Template::new();
        t.append(r#"birthdate = year "." month "." day"#).unwrap();
        let block = block_of(vec![
            (0, vec![""], vec![false]),
            (1, vec![""], vec![false]),
            (2, vec![""], vec![false]),
        ]);
        let field = &t.fields()[0];
        let value = render_field(field, &block, 0, 1);
        assert_eq!(value, "");
    }

    #[test]
    fn literal_field_with_some_data_still_renders_its_separators() {
        let mut t = Template::new();
        t.append(r#"birthdate = year "." month "." day"#).unwrap();
        let block = block_of(vec![
            (0, vec!["2020"], vec![false]),
            (1, vec![""], vec![false]),
            (2, vec![""], vec![false]),
        ]);
        let rows = TableEmitter::new(&t).output_data(&block);
        assert_eq!(rows, vec!["2020..".to_string()]);
    }

    #[test]
    fn single_row_mode_groups_by_key_change() {
        let mut t = Template::new();
        t.append("!id.1, value.1").unwrap();
        assert!(t.is_single());
        let block = block_of(vec![
            (0, vec!["1", "1", "2"], vec![false, false, false]),
            (1, vec!["x", "y", "z"], vec![false, false, false]),
        ]);
        let rows = TableEmitter::new(&t).output_data(&block);
        assert_eq!(rows.len(), 2);
    }
}
