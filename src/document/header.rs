//! File header: version, generator, root uuid, paper and title block.

use uuid::Uuid;

use crate::sexpr::{List, SExpr, Tree};

use super::{sync, Dialect, Document};

/// Editable title block fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleField {
    Title,
    Date,
    Revision,
    Company,
    /// Numbered comment line, 1 to 9
    Comment(u8),
}

impl TitleField {
    fn tag(self) -> &'static str {
        match self {
            TitleField::Title => "title",
            TitleField::Date => "date",
            TitleField::Revision => "rev",
            TitleField::Company => "company",
            TitleField::Comment(_) => "comment",
        }
    }
}

const TITLE_ORDER: [&str; 5] = ["title", "date", "rev", "company", "comment"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleBlock {
    pub title: Option<String>,
    pub date: Option<String>,
    pub revision: Option<String>,
    pub company: Option<String>,
    pub comments: Vec<(u8, String)>,
}

impl TitleBlock {
    fn read(list: &List) -> Self {
        let field = |tag: &str| list.value(tag).map(str::to_owned);
        TitleBlock {
            title: field("title"),
            date: field("date"),
            revision: field("rev"),
            company: field("company"),
            comments: list
                .children("comment")
                .filter_map(|comment| {
                    let number = comment.number_at(1)? as u8;
                    Some((number, comment.str_at(2)?.to_owned()))
                })
                .collect(),
        }
    }

    pub fn get(&self, field: TitleField) -> Option<&str> {
        match field {
            TitleField::Title => self.title.as_deref(),
            TitleField::Date => self.date.as_deref(),
            TitleField::Revision => self.revision.as_deref(),
            TitleField::Company => self.company.as_deref(),
            TitleField::Comment(n) => self
                .comments
                .iter()
                .find(|(number, _)| *number == n)
                .map(|(_, text)| text.as_str()),
        }
    }
}

fn uuid_atom(id: Uuid, dialect: &Dialect) -> SExpr {
    if dialect.quote_uuids {
        SExpr::string(id.to_string())
    } else {
        SExpr::symbol(id.to_string())
    }
}

/// The tree of a schematic with nothing placed on it yet.
pub(super) fn empty_tree(uuid: Uuid, dialect: &Dialect) -> Tree {
    let kicad8 = dialect.version >= 20231120;
    let generator = if kicad8 {
        SExpr::string("eeschema")
    } else {
        SExpr::symbol("eeschema")
    };
    let mut root = List::new("kicad_sch")
        .with(List::new("version").with(SExpr::number(dialect.version as f64)))
        .with(List::new("generator").with(generator));
    if kicad8 {
        root.push(List::new("generator_version").with(SExpr::string("8.0")));
    }
    root.push(List::new("uuid").with(uuid_atom(uuid, dialect)));
    root.push(List::new("paper").with(SExpr::string("A4")));
    root.push(List::new("lib_symbols"));
    root.push(
        List::new("sheet_instances").with(
            List::new("path")
                .with(SExpr::string("/"))
                .with(List::new("page").with(SExpr::string("1"))),
        ),
    );
    let mut tree = Tree::new(root);
    tree.set_indent(&dialect.indent);
    tree
}

impl Document {
    /// The `(version ...)` stamp, a date like `20231120`.
    pub fn version(&self) -> Option<u32> {
        let version = self.tree.root().child("version")?.number_at(1)?;
        Some(version as u32)
    }

    pub fn generator(&self) -> Option<&str> {
        self.tree.root().value("generator")
    }

    pub fn generator_version(&self) -> Option<&str> {
        self.tree.root().value("generator_version")
    }

    /// Uuid of the root sheet.
    pub fn uuid(&self) -> Option<Uuid> {
        self.tree
            .root()
            .value("uuid")
            .and_then(|id| Uuid::parse_str(id).ok())
    }

    pub fn paper(&self) -> Option<&str> {
        self.tree.root().value("paper")
    }

    pub fn title_block(&self) -> TitleBlock {
        self.tree
            .root()
            .child("title_block")
            .map(TitleBlock::read)
            .unwrap_or_default()
    }

    /// Set a standard paper size such as `A4` or `A3`.
    pub fn set_paper(&mut self, paper: &str) {
        let root = self.tree.root_mut();
        match root.child_mut("paper") {
            Some(node) => {
                node.set_string(1, paper);
            }
            None => {
                let index = sync::insert_position(root, "paper");
                root.insert(index, List::new("paper").with(SExpr::string(paper)));
            }
        }
    }

    /// Set one title block field. An empty value removes the field.
    pub fn set_title_block_field(&mut self, field: TitleField, value: &str) {
        let root = self.tree.root_mut();
        let block = match root.position("title_block") {
            Some(index) => index,
            None if value.is_empty() => return,
            None => {
                let index = sync::insert_position(root, "title_block");
                root.insert(index, List::new("title_block"));
                index
            }
        };
        let Some(block) = root.get_mut(block).and_then(SExpr::as_list_mut) else {
            return;
        };

        let tag = field.tag();
        let existing = (1..block.len()).find(|&index| {
            block
                .get(index)
                .and_then(SExpr::as_list)
                .is_some_and(|node| match field {
                    TitleField::Comment(n) => {
                        node.tag() == Some(tag) && node.number_at(1) == Some(f64::from(n))
                    }
                    _ => node.tag() == Some(tag),
                })
        });
        match (existing, value.is_empty()) {
            (Some(index), true) => {
                block.remove(index);
            }
            (Some(index), false) => {
                let at = if matches!(field, TitleField::Comment(_)) { 2 } else { 1 };
                if let Some(node) = block.get_mut(index).and_then(SExpr::as_list_mut) {
                    node.set_string(at, value);
                }
            }
            (None, true) => {}
            (None, false) => {
                let node = match field {
                    TitleField::Comment(n) => List::new(tag)
                        .with(SExpr::number(f64::from(n)))
                        .with(SExpr::string(value)),
                    _ => List::new(tag).with(SExpr::string(value)),
                };
                let rank = TITLE_ORDER.iter().position(|t| *t == tag).unwrap_or(0);
                let index = (1..block.len())
                    .rev()
                    .find(|&index| {
                        let other = block
                            .get(index)
                            .and_then(SExpr::as_list)
                            .and_then(List::tag)
                            .and_then(|t| TITLE_ORDER.iter().position(|o| *o == t));
                        match (other, field) {
                            (Some(other), TitleField::Comment(n)) if other == rank => block
                                .get(index)
                                .and_then(SExpr::as_list)
                                .and_then(|c| c.number_at(1))
                                .is_some_and(|number| number < f64::from(n)),
                            (Some(other), _) => other <= rank,
                            (None, _) => false,
                        }
                    })
                    .map_or(1, |index| index + 1);
                block.insert(index, node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = "(kicad_sch (version 20231120) (generator \"eeschema\") (uuid \"0f1c8a4e-3f8b-4bd6-8a35-2d0b0c6d3e11\")\n  (paper \"A4\")\n  (title_block (title \"Amp\") (comment 2 \"second\"))\n  (lib_symbols)\n)\n";

    #[test]
    fn reads_header() {
        let doc = Document::parse(INPUT).unwrap();
        assert_eq!(doc.version(), Some(20231120));
        assert_eq!(doc.generator(), Some("eeschema"));
        assert_eq!(doc.generator_version(), None);
        assert_eq!(doc.paper(), Some("A4"));
        let block = doc.title_block();
        assert_eq!(block.title.as_deref(), Some("Amp"));
        assert_eq!(block.get(TitleField::Comment(2)), Some("second"));
        assert_eq!(block.get(TitleField::Date), None);
    }

    #[test]
    fn title_fields_keep_kicad_order() {
        let mut doc = Document::parse(INPUT).unwrap();
        doc.set_title_block_field(TitleField::Comment(1), "first");
        doc.set_title_block_field(TitleField::Revision, "B");
        doc.set_title_block_field(TitleField::Title, "Amplifier");
        let text = doc.to_text().unwrap();
        assert!(text.contains(
            "(title_block (title \"Amplifier\")\n    (rev \"B\")\n    (comment 1 \"first\") (comment 2 \"second\"))"
        ), "{text}");
    }

    #[test]
    fn empty_value_removes_field() {
        let mut doc = Document::parse(INPUT).unwrap();
        doc.set_title_block_field(TitleField::Comment(2), "");
        assert!(doc.title_block().comments.is_empty());
        doc.set_paper("A3");
        assert_eq!(doc.paper(), Some("A3"));
    }

    #[test]
    fn missing_title_block_is_created_after_paper() {
        let mut doc = Document::new();
        doc.set_title_block_field(TitleField::Company, "ACME");
        let root = doc.tree().root();
        assert_eq!(root.position("title_block"), root.position("paper").map(|i| i + 1));
        assert_eq!(doc.title_block().company.as_deref(), Some("ACME"));
    }
}
