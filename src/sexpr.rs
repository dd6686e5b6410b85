//! Lossless S-expression trees.
//!
//! Every parsed node remembers the whitespace that preceded it and, for numbers and quoted
//! strings, the literal it was written with. Writing an untouched tree back out reproduces the
//! input byte for byte; nodes built in code carry no trivia and are laid out the way KiCad 8
//! lays out its files.

use std::fmt::Display;

use crate::error::ParseError;

mod lexer;
mod parser;
mod writer;

pub use writer::format_number;

/// Whitespace preceding a node, `None` when the node was built in code.
type Trivia = Option<Box<str>>;

/// A leaf value together with its source literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom<T> {
    value: T,
    raw: Option<Box<str>>,
    lead: Trivia,
}

impl<T> Atom<T> {
    fn new(value: T) -> Self {
        Atom {
            value,
            raw: None,
            lead: None,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// The literal as it appeared in the source, if this atom was parsed.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SExpr {
    Symbol(Atom<String>),
    String(Atom<String>),
    Number(Atom<f64>),
    List(List),
}

impl SExpr {
    pub fn symbol(value: impl Into<String>) -> Self {
        SExpr::Symbol(Atom::new(value.into()))
    }

    pub fn string(value: impl Into<String>) -> Self {
        SExpr::String(Atom::new(value.into()))
    }

    pub fn number(value: f64) -> Self {
        SExpr::Number(Atom::new(value))
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            SExpr::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut List> {
        match self {
            SExpr::List(list) => Some(list),
            _ => None,
        }
    }

    /// Text of a symbol or quoted string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SExpr::Symbol(atom) | SExpr::String(atom) => Some(atom.value.as_str()),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            SExpr::Symbol(atom) => Some(atom.value.as_str()),
            _ => None,
        }
    }

    /// Numeric value; bare symbols that read as a number (`1.`) are accepted too.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SExpr::Number(atom) => Some(atom.value),
            SExpr::Symbol(atom) => atom.value.parse().ok(),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, SExpr::List(_))
    }

    /// Short human readable description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            SExpr::Symbol(atom) => format!("symbol `{}`", atom.value),
            SExpr::String(atom) => format!("string {:?}", atom.value),
            SExpr::Number(atom) => format!("number {}", format_number(atom.value)),
            SExpr::List(list) => match list.tag() {
                Some(tag) => format!("list ({tag} ...)"),
                None => "list".to_owned(),
            },
        }
    }

    fn lead(&self) -> Option<&str> {
        match self {
            SExpr::Symbol(atom) | SExpr::String(atom) => atom.lead.as_deref(),
            SExpr::Number(atom) => atom.lead.as_deref(),
            SExpr::List(list) => list.lead.as_deref(),
        }
    }

    fn take_lead(&mut self) -> Trivia {
        match self {
            SExpr::Symbol(atom) | SExpr::String(atom) => atom.lead.take(),
            SExpr::Number(atom) => atom.lead.take(),
            SExpr::List(list) => list.lead.take(),
        }
    }

    fn set_lead(&mut self, lead: Trivia) {
        match self {
            SExpr::Symbol(atom) | SExpr::String(atom) => atom.lead = lead,
            SExpr::Number(atom) => atom.lead = lead,
            SExpr::List(list) => list.lead = lead,
        }
    }
}

impl From<List> for SExpr {
    fn from(list: List) -> Self {
        SExpr::List(list)
    }
}

impl Display for SExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        writer::write_expr(self, writer::DEFAULT_INDENT, &mut out);
        f.write_str(&out)
    }
}

/// A parenthesized list. By convention the first item is a symbol naming the list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct List {
    items: Vec<SExpr>,
    lead: Trivia,
    /// Whitespace before the closing parenthesis.
    tail: Trivia,
    /// Byte offset of the opening parenthesis in the source.
    offset: Option<usize>,
}

impl List {
    pub fn new(tag: &str) -> Self {
        List {
            items: vec![SExpr::symbol(tag)],
            ..List::default()
        }
    }

    /// Builder style push.
    pub fn with(mut self, item: impl Into<SExpr>) -> Self {
        self.push(item);
        self
    }

    pub fn tag(&self) -> Option<&str> {
        self.items.first().and_then(SExpr::as_symbol)
    }

    pub fn items(&self) -> &[SExpr] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SExpr> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut SExpr> {
        self.items.get_mut(index)
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    pub fn str_at(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(SExpr::as_str)
    }

    pub fn number_at(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(SExpr::as_number)
    }

    /// Iterate over the child lists named `label`.
    pub fn children<'a, 'b>(&'a self, label: &'b str) -> LabeledChildIterator<'a, 'b> {
        LabeledChildIterator {
            iter: self.items.iter(),
            label,
        }
    }

    pub fn child(&self, label: &str) -> Option<&List> {
        self.children(label).next()
    }

    pub fn child_mut(&mut self, label: &str) -> Option<&mut List> {
        self.lists_mut().find(|list| list.tag() == Some(label))
    }

    pub fn lists(&self) -> impl Iterator<Item = &List> {
        self.items.iter().filter_map(SExpr::as_list)
    }

    pub fn lists_mut(&mut self) -> impl Iterator<Item = &mut List> {
        self.items.iter_mut().filter_map(SExpr::as_list_mut)
    }

    /// The first atom of the child list named `label`, e.g. `"Device:R"` for `(lib_id "Device:R")`.
    pub fn value(&self, label: &str) -> Option<&str> {
        self.child(label).and_then(|child| child.str_at(1))
    }

    /// Index of the first child list named `label`.
    pub fn position(&self, label: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.as_list().and_then(List::tag) == Some(label))
    }

    /// Index of the last child list named `label`.
    pub fn rposition(&self, label: &str) -> Option<usize> {
        self.items
            .iter()
            .rposition(|item| item.as_list().and_then(List::tag) == Some(label))
    }

    fn has_list_child(&self) -> bool {
        self.items.iter().any(SExpr::is_list)
    }

    pub fn push(&mut self, item: impl Into<SExpr>) {
        let index = self.items.len();
        self.insert(index, item);
    }

    pub fn insert(&mut self, index: usize, item: impl Into<SExpr>) {
        let item = item.into();
        if item.is_list() && !self.has_list_child() {
            // the closing parenthesis moves to its own line
            self.tail = None;
        }
        self.items.insert(index, item);
    }

    pub fn remove(&mut self, index: usize) -> SExpr {
        let item = self.items.remove(index);
        if item.is_list() && !self.has_list_child() {
            self.tail = None;
        }
        item
    }

    /// Remove every child list named `label`, returning how many were removed.
    pub fn remove_children(&mut self, label: &str) -> usize {
        let before = self.items.len();
        let mut index = self.items.len();
        while index > 1 {
            index -= 1;
            if self.items[index].as_list().and_then(List::tag) == Some(label) {
                self.remove(index);
            }
        }
        before - self.items.len()
    }

    /// Replace the item at `index`, keeping the whitespace that preceded the old item.
    pub fn replace(&mut self, index: usize, item: impl Into<SExpr>) -> SExpr {
        let mut item = item.into();
        let old = &mut self.items[index];
        item.set_lead(old.take_lead());
        std::mem::replace(old, item)
    }

    /// Set a numeric atom, leaving the original literal untouched when the value is unchanged.
    /// Returns whether the tree changed.
    pub fn set_number(&mut self, index: usize, value: f64) -> bool {
        self.set_if(index, |old| old.as_number() == Some(value), || {
            SExpr::number(value)
        })
    }

    pub fn set_string(&mut self, index: usize, value: &str) -> bool {
        self.set_if(
            index,
            |old| matches!(old, SExpr::String(atom) if atom.value == value),
            || SExpr::string(value),
        )
    }

    pub fn set_symbol(&mut self, index: usize, value: &str) -> bool {
        self.set_if(index, |old| old.as_symbol() == Some(value), || {
            SExpr::symbol(value)
        })
    }

    fn set_if(
        &mut self,
        index: usize,
        unchanged: impl FnOnce(&SExpr) -> bool,
        make: impl FnOnce() -> SExpr,
    ) -> bool {
        match self.items.get(index) {
            Some(old) => {
                if unchanged(old) {
                    return false;
                }
                self.replace(index, make());
                true
            }
            None => {
                while self.items.len() < index {
                    self.items.push(SExpr::number(0.0));
                }
                self.push(make());
                true
            }
        }
    }

    /// Drop all retained whitespace and source offsets so the subtree is laid out afresh
    /// wherever it is inserted. Literals are kept.
    pub(crate) fn strip_trivia(&mut self) {
        let mut stack = vec![self];
        while let Some(list) = stack.pop() {
            list.lead = None;
            list.tail = None;
            list.offset = None;
            for item in list.items.iter_mut() {
                match item {
                    SExpr::List(child) => stack.push(child),
                    atom => atom.set_lead(None),
                }
            }
        }
    }

    /// Rebuild the item list in one pass: items for which `keep` is false are dropped, and
    /// `inserts` (sorted by position) are placed before the original item at that position.
    /// A position equal to the length appends.
    pub(crate) fn splice(
        &mut self,
        keep: impl Fn(usize) -> bool,
        inserts: Vec<(usize, SExpr)>,
    ) {
        let had_lists = self.has_list_child();
        let old = std::mem::take(&mut self.items);
        let len = old.len();
        let mut items = Vec::with_capacity(len + inserts.len());
        let mut pending = inserts.into_iter().peekable();
        for (index, item) in old.into_iter().enumerate() {
            while let Some((_, insert)) = pending.next_if(|(at, _)| *at <= index) {
                items.push(insert);
            }
            if keep(index) {
                items.push(item);
            }
        }
        items.extend(pending.map(|(_, insert)| insert));
        self.items = items;
        if had_lists != self.has_list_child() {
            self.tail = None;
        }
    }
}

impl Display for List {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        writer::write_list(self, 0, writer::DEFAULT_INDENT, &mut out);
        f.write_str(&out)
    }
}

#[derive(Debug)]
pub struct LabeledChildIterator<'a, 'b> {
    iter: std::slice::Iter<'a, SExpr>,
    label: &'b str,
}

impl<'a, 'b> Iterator for LabeledChildIterator<'a, 'b> {
    type Item = &'a List;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.iter.next()? {
                SExpr::List(list) if list.tag() == Some(self.label) => return Some(list),
                _ => continue,
            }
        }
    }
}

/// A parsed document: one root list plus whatever trails it.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    root: List,
    epilogue: Trivia,
    indent: Box<str>,
}

impl Tree {
    pub fn new(root: List) -> Self {
        Tree {
            root,
            epilogue: None,
            indent: writer::DEFAULT_INDENT.into(),
        }
    }

    pub fn root(&self) -> &List {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut List {
        &mut self.root
    }

    /// Indentation unit used for nodes built in code.
    pub fn indent(&self) -> &str {
        &self.indent
    }

    pub fn set_indent(&mut self, indent: &str) {
        self.indent = indent.into();
    }

    /// Pick up the indentation unit from the first indented child of the root.
    fn detect_indent(&mut self) {
        let detected = self.root.items.iter().skip(1).find_map(|item| {
            let lead = item.lead()?;
            let (_, unit) = lead.rsplit_once('\n')?;
            (!unit.is_empty()).then(|| unit.to_owned())
        });
        if let Some(unit) = detected {
            self.indent = unit.into();
        }
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        writer::write_tree(self, &mut out);
        f.write_str(&out)
    }
}

/// Parse a complete document.
pub fn parse(input: &str) -> Result<Tree, ParseError> {
    let mut tree = parser::Parser::new(input).parse()?;
    tree.detect_indent();
    Ok(tree)
}

impl TryFrom<&str> for Tree {
    type Error = ParseError;

    fn try_from(input: &str) -> Result<Self, Self::Error> {
        parse(input)
    }
}

impl<'a> TryFrom<&'a String> for Tree {
    type Error = ParseError;

    fn try_from(input: &'a String) -> Result<Self, Self::Error> {
        parse(input.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! test_data {
        ($fname:expr) => {
            std::fs::read_to_string(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/resources/test/",
                $fname
            ))
            .unwrap()
        };
    }

    #[test]
    fn sexpr_can_parse_full_file() {
        let i = &test_data!("amplifier.kicad_sch");
        let tree = Tree::try_from(i).unwrap();
        assert_eq!(tree.root().tag(), Some("kicad_sch"));
    }

    #[test]
    fn full_file_round_trips() {
        let i = &test_data!("amplifier.kicad_sch");
        assert_eq!(&Tree::try_from(i).unwrap().to_string(), i);

        let i = &test_data!("legacy_v6.kicad_sch");
        assert_eq!(&Tree::try_from(i).unwrap().to_string(), i);
    }

    #[test]
    fn detects_indent_unit() {
        let tabs = parse("(a\n\t(b 1)\n)").unwrap();
        assert_eq!(tabs.indent(), "\t");
        let spaces = parse("(a\n  (b 1)\n)").unwrap();
        assert_eq!(spaces.indent(), "  ");
        let flat = parse("(a (b 1))").unwrap();
        assert_eq!(flat.indent(), "\t");
    }

    #[test]
    fn sexpr_children_by_name_works() {
        let tree = parse(r#"(a (b "1") (c "2") (b "3"))"#).unwrap();
        let mut iter = tree.root().children("b");
        assert_eq!(iter.next().and_then(|b| b.str_at(1)), Some("1"));
        assert_eq!(iter.next().and_then(|b| b.str_at(1)), Some("3"));
        assert!(iter.next().is_none());
        assert_eq!(tree.root().value("c"), Some("2"));
    }

    #[test]
    fn unchanged_number_keeps_literal() {
        let mut tree = parse("(at 10.0 5)").unwrap();
        assert!(!tree.root_mut().set_number(1, 10.0));
        assert!(tree.root_mut().set_number(2, 7.5));
        assert_eq!(tree.to_string(), "(at 10.0 7.5)");
    }

    #[test]
    fn replace_keeps_leading_whitespace() {
        let mut tree = parse("(property   \"Value\"    \"10k\")").unwrap();
        tree.root_mut().set_string(2, "4k7");
        assert_eq!(tree.to_string(), "(property   \"Value\"    \"4k7\")");
    }

    #[test]
    fn first_list_child_moves_closing_paren() {
        let mut tree = parse("(a\n\t(lib_symbols)\n)\n").unwrap();
        let lib = tree.root_mut().child_mut("lib_symbols").unwrap();
        lib.push(List::new("symbol").with(SExpr::string("R")));
        assert_eq!(
            tree.to_string(),
            "(a\n\t(lib_symbols\n\t\t(symbol \"R\")\n\t)\n)\n"
        );

        let lib = tree.root_mut().child_mut("lib_symbols").unwrap();
        lib.remove(1);
        assert_eq!(tree.to_string(), "(a\n\t(lib_symbols)\n)\n");
    }

    #[test]
    fn remove_children_by_label() {
        let mut tree = parse("(a (b 1) (c 2) (b 3))").unwrap();
        assert_eq!(tree.root_mut().remove_children("b"), 2);
        assert_eq!(tree.root().len(), 2);
        assert_eq!(tree.root().position("c"), Some(1));
    }
}
