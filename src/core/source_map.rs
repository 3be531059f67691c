//! Key locations within a manifest document.
//!
//! Used to attach line numbers to errors that are only detected after
//! deserialization, and to name the field a deserialization error points at.

use std::ops::Range;

use toml_edit::{ImDocument, Item, Table, Value};

/// Dotted key paths (`parts.zed.plugin`) with their byte spans.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    line_starts: Vec<usize>,
    /// Sorted by span start.
    keys: Vec<(Range<usize>, String)>,
}

impl SourceMap {
    /// Index `content`. Returns the parser's message and span on a syntax
    /// error.
    pub fn parse(content: &str) -> Result<Self, (String, Option<Range<usize>>)> {
        let doc = ImDocument::parse(content)
            .map_err(|e| (e.message().trim().to_string(), e.span()))?;

        let mut keys = Vec::new();
        collect_table(doc.as_table(), "", &mut keys);
        keys.sort_by_key(|(span, _)| span.start);

        Ok(SourceMap {
            line_starts: line_starts(content),
            keys,
        })
    }

    /// Build a map with line information only.
    pub fn lines_only(content: &str) -> Self {
        SourceMap {
            line_starts: line_starts(content),
            keys: Vec::new(),
        }
    }

    /// 1-based line of a byte offset.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// Span of the key at `path`, or of its closest ancestor.
    pub fn span_of(&self, path: &str) -> Option<Range<usize>> {
        let mut current = path;
        loop {
            if let Some((span, _)) = self.keys.iter().find(|(_, p)| p == current) {
                return Some(span.clone());
            }
            current = parent_path(current)?;
        }
    }

    pub fn line_of_path(&self, path: &str) -> Option<usize> {
        self.span_of(path).map(|span| self.line_of(span.start))
    }

    /// The key closest before `offset`: the field an error at `offset`
    /// belongs to.
    pub fn path_at(&self, offset: usize) -> Option<&str> {
        self.keys
            .iter()
            .take_while(|(span, _)| span.start <= offset)
            .last()
            .map(|(_, path)| path.as_str())
    }

    /// The key named `leaf` at or below `scope`, preferring the shallowest.
    pub fn find_leaf(&self, scope: &str, leaf: &str) -> Option<(String, Range<usize>)> {
        let mut scope = scope;
        loop {
            let found = self
                .keys
                .iter()
                .filter(|(_, path)| {
                    (scope.is_empty() || path.starts_with(scope))
                        && path.rsplit('.').next() == Some(leaf)
                })
                .min_by_key(|(_, path)| path.len());
            if let Some((span, path)) = found {
                return Some((path.clone(), span.clone()));
            }
            if scope.is_empty() {
                return None;
            }
            scope = parent_path(scope).unwrap_or("");
        }
    }

    /// Top-level keys in document order.
    pub fn top_level_keys(&self) -> impl Iterator<Item = (&str, &Range<usize>)> {
        let mut seen = Vec::new();
        self.keys.iter().filter_map(move |(span, path)| {
            let head = path.split(['.', '[']).next().unwrap_or(path);
            if seen.contains(&head) {
                None
            } else {
                seen.push(head);
                Some((head, span))
            }
        })
    }
}

fn line_starts(content: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(content.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

fn parent_path(path: &str) -> Option<&str> {
    path.rfind(['.', '[']).map(|idx| &path[..idx])
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn collect_table(table: &Table, prefix: &str, out: &mut Vec<(Range<usize>, String)>) {
    for (name, _) in table.iter() {
        let Some((key, item)) = table.get_key_value(name) else {
            continue;
        };
        let path = join(prefix, name);
        let span = key
            .span()
            .or_else(|| item.as_table().and_then(Table::span));
        if let Some(span) = span {
            out.push((span, path.clone()));
        }
        collect_item(item, &path, out);
    }
}

fn collect_item(item: &Item, path: &str, out: &mut Vec<(Range<usize>, String)>) {
    match item {
        Item::Table(table) => collect_table(table, path, out),
        Item::ArrayOfTables(array) => {
            for (idx, table) in array.iter().enumerate() {
                let path = format!("{}[{}]", path, idx);
                if let Some(span) = table.span() {
                    out.push((span, path.clone()));
                }
                collect_table(table, &path, out);
            }
        }
        Item::Value(value) => collect_value(value, path, out),
        Item::None => {}
    }
}

fn collect_value(value: &Value, path: &str, out: &mut Vec<(Range<usize>, String)>) {
    match value {
        Value::InlineTable(table) => {
            for (name, _) in table.iter() {
                let Some((key, item)) = table.get_key_value(name) else {
                    continue;
                };
                let path = join(path, name);
                if let Some(span) = key.span() {
                    out.push((span, path.clone()));
                }
                if let Some(value) = item.as_value() {
                    collect_value(value, &path, out);
                }
            }
        }
        Value::Array(array) => {
            for (idx, value) in array.iter().enumerate() {
                let path = format!("{}[{}]", path, idx);
                if let Some(span) = value.span() {
                    out.push((span, path.clone()));
                }
                collect_value(value, &path, out);
            }
        }
        _ => {}
    }
}
