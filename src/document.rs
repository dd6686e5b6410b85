//! The schematic document: a lossless tree plus the object model built from it.

use std::{collections::HashSet, fmt::Debug, path::Path};

use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::{
    collections::{
        ComponentKey, Components, ComponentsMut, Handle, JunctionsMut, LabelsMut, Store, WiresMut,
    },
    connectivity::ConnectivityIndex,
    error::DocumentError,
    library::{LibrarySymbol, LibrarySymbolTable, SymbolResolver},
    model::{Component, Junction, Label, Sheet, Source, Wire},
    reference::ReferenceAllocator,
    sexpr::{self, List, SExpr, Tree},
    Point,
};

mod batch;
mod header;
pub(crate) mod sync;

pub use batch::Batch;
pub use header::{TitleBlock, TitleField};

use sync::DirtySet;

/// File format version written by KiCad 8.
pub const CURRENT_VERSION: u32 = 20231120;

/// Version dependent details of the file format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    pub version: u32,
    /// Indentation unit for nodes built in code
    pub indent: String,
    /// `(uuid "...")` instead of `(uuid ...)`
    pub quote_uuids: bool,
    /// `(hide yes)` instead of a bare `hide` flag
    pub hide_as_child: bool,
    /// Symbols carry `(exclude_from_sim no)`
    pub exclude_from_sim: bool,
    /// Symbols carry their own `(instances ...)` instead of a root `symbol_instances` table
    pub embedded_instances: bool,
}

impl Dialect {
    pub fn for_version(version: u32) -> Self {
        Dialect {
            version,
            indent: "\t".to_owned(),
            quote_uuids: version >= 20231120,
            hide_as_child: version >= 20231120,
            exclude_from_sim: version >= 20230121,
            embedded_instances: version >= 20221206,
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::for_version(CURRENT_VERSION)
    }
}

/// Settings for a new, empty document.
#[derive(Debug, Clone, Default)]
pub struct DocumentOptions {
    /// Project name written into symbol `instances`
    pub project: String,
    /// Root sheet uuid, random when unset
    pub uuid: Option<Uuid>,
}

pub struct Document {
    pub(crate) tree: Tree,
    pub(crate) dialect: Dialect,
    pub(crate) project: String,
    pub(crate) library: LibrarySymbolTable,
    pub(crate) components: Components,
    pub(crate) wires: Store<Wire>,
    pub(crate) junctions: Store<Junction>,
    pub(crate) labels: Store<Label>,
    pub(crate) sheets: Vec<Sheet>,
    pub(crate) references: ReferenceAllocator,
    pub(crate) connectivity: ConnectivityIndex,
    pub(crate) dirty: DirtySet,
    pub(crate) batch_depth: usize,
    resolver: Option<Box<dyn SymbolResolver>>,
}

impl Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("dialect", &self.dialect)
            .field("project", &self.project)
            .field("library", &self.library.len())
            .field("components", &self.components.len())
            .field("wires", &self.wires.len())
            .field("junctions", &self.junctions.len())
            .field("labels", &self.labels.len())
            .field("dirty", &self.dirty.len())
            .field("batch_depth", &self.batch_depth)
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty KiCad 8 schematic.
    pub fn new() -> Self {
        Self::with_options(DocumentOptions::default())
    }

    pub fn with_options(options: DocumentOptions) -> Self {
        let dialect = Dialect::default();
        let uuid = options.uuid.unwrap_or_else(Uuid::new_v4);
        let tree = header::empty_tree(uuid, &dialect);
        Document {
            tree,
            dialect,
            project: options.project,
            library: LibrarySymbolTable::default(),
            components: Components::default(),
            wires: Store::default(),
            junctions: Store::default(),
            labels: Store::default(),
            sheets: Vec::new(),
            references: ReferenceAllocator::default(),
            connectivity: ConnectivityIndex::default(),
            dirty: DirtySet::default(),
            batch_depth: 0,
            resolver: None,
        }
    }

    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let tree = sexpr::parse(text)?;
        Self::read(tree, &Source::new(text))
    }

    /// Build the object model of an already parsed tree.
    pub fn from_tree(tree: Tree) -> Result<Self, DocumentError> {
        Self::read(tree, &Source::detached())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_owned(),
            source,
        })?;
        let mut doc = Self::parse(&text)?;
        if doc.project.is_empty() {
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                doc.project = stem.to_owned();
            }
        }
        debug!(path = %path.display(), "loaded schematic");
        Ok(doc)
    }

    /// Sync and write. Nothing is written when sync fails.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        let path = path.as_ref();
        let text = self.to_text()?;
        std::fs::write(path, &text).map_err(|source| DocumentError::Io {
            path: path.to_owned(),
            source,
        })?;
        info!(path = %path.display(), bytes = text.len(), "saved schematic");
        Ok(())
    }

    pub fn to_text(&mut self) -> Result<String, DocumentError> {
        self.sync()?;
        Ok(self.tree.to_string())
    }

    fn read(tree: Tree, src: &Source) -> Result<Self, DocumentError> {
        let root = tree.root();
        if root.tag() != Some("kicad_sch") {
            return Err(src.unexpected(root, 0, "(kicad_sch ...)").into());
        }
        let version = root
            .child("version")
            .and_then(|version| version.number_at(1))
            .map_or(CURRENT_VERSION, |version| version as u32);
        let mut dialect = Dialect::for_version(version);
        dialect.indent = tree.indent().to_owned();

        let mut library = LibrarySymbolTable::default();
        if let Some(lib_symbols) = root.child("lib_symbols") {
            for list in lib_symbols.children("symbol") {
                let symbol = LibrarySymbol::read(list, src)?;
                if !library.insert(symbol) {
                    warn!(lib_id = list.str_at(1), "duplicate library symbol ignored");
                }
            }
        }

        let mut components = Components::default();
        let mut wires = Store::default();
        let mut junctions = Store::default();
        let mut labels = Store::default();
        let mut sheets = Vec::new();
        let mut duplicates = 0;
        for list in root.lists() {
            let fresh = match list.tag() {
                Some("symbol") => components.insert(Component::read(list, src)?),
                Some("wire") => wires.insert(Wire::read(list, src)?),
                Some("junction") => junctions.insert(Junction::read(list, src)?),
                Some("label" | "global_label" | "hierarchical_label") => {
                    labels.insert(Label::read(list, src)?)
                }
                Some("sheet") => {
                    sheets.push(Sheet::read(list, src)?);
                    true
                }
                _ => true,
            };
            if !fresh {
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            warn!(duplicates, "elements with a duplicate uuid are left unmanaged");
        }

        let project = root
            .children("symbol")
            .find_map(instance_project)
            .unwrap_or_default()
            .to_owned();

        let mut references = ReferenceAllocator::default();
        let mut connectivity = ConnectivityIndex::default();
        for component in &components {
            references.insert(component.reference());
            connectivity.update(component, library.get(component.library_key()));
        }

        debug!(
            version,
            library = library.len(),
            components = components.len(),
            wires = wires.len(),
            junctions = junctions.len(),
            labels = labels.len(),
            "read schematic"
        );

        Ok(Document {
            tree,
            dialect,
            project,
            library,
            components,
            wires,
            junctions,
            labels,
            sheets,
            references,
            connectivity,
            dirty: DirtySet::default(),
            batch_depth: 0,
            resolver: None,
        })
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Override the detected dialect for everything written from now on.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.set_dialect(dialect);
        self
    }

    pub fn set_dialect(&mut self, dialect: Dialect) {
        self.tree.set_indent(&dialect.indent);
        self.dialect = dialect;
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn set_project(&mut self, project: impl Into<String>) {
        self.project = project.into();
    }

    pub fn set_resolver(&mut self, resolver: impl SymbolResolver + 'static) {
        self.resolver = Some(Box::new(resolver));
    }

    pub fn with_resolver(mut self, resolver: impl SymbolResolver + 'static) -> Self {
        self.set_resolver(resolver);
        self
    }

    pub fn library(&self) -> &LibrarySymbolTable {
        &self.library
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn components_mut(&mut self) -> ComponentsMut<'_> {
        ComponentsMut::new(self)
    }

    pub fn wires(&self) -> &Store<Wire> {
        &self.wires
    }

    pub fn wires_mut(&mut self) -> WiresMut<'_> {
        WiresMut::new(self)
    }

    pub fn junctions(&self) -> &Store<Junction> {
        &self.junctions
    }

    pub fn junctions_mut(&mut self) -> JunctionsMut<'_> {
        JunctionsMut::new(self)
    }

    pub fn labels(&self) -> &Store<Label> {
        &self.labels
    }

    pub fn labels_mut(&mut self) -> LabelsMut<'_> {
        LabelsMut::new(self)
    }

    /// Hierarchical sheets as they were loaded.
    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn connectivity(&self) -> &ConnectivityIndex {
        &self.connectivity
    }

    pub fn references(&self) -> &ReferenceAllocator {
        &self.references
    }

    /// Whether edits are waiting for [`Document::sync`].
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Absolute pin positions of a component, empty when it is unknown.
    pub fn pins_of(&self, key: impl Into<ComponentKey>) -> Vec<(String, Point)> {
        self.components
            .get(key)
            .map(|component| self.connectivity.pins_of(component.id()).to_vec())
            .unwrap_or_default()
    }

    pub fn pin_position(
        &self,
        key: impl Into<ComponentKey>,
        number: &str,
    ) -> Result<Point, DocumentError> {
        let key = key.into();
        let component = self
            .components
            .get(key.clone())
            .ok_or_else(|| DocumentError::ComponentNotFound(key.to_string()))?;
        self.connectivity
            .pin_position(component.id(), number)
            .ok_or_else(|| DocumentError::PinNotFound {
                reference: component.reference().to_owned(),
                pin: number.to_owned(),
            })
    }

    /// Draw a straight wire from pin `pin_a` of `a` to pin `pin_b` of `b`.
    pub fn wire_between(
        &mut self,
        a: impl Into<ComponentKey>,
        pin_a: &str,
        b: impl Into<ComponentKey>,
        pin_b: &str,
    ) -> Result<Handle<Wire>, DocumentError> {
        let start = self.pin_position(a, pin_a)?;
        let end = self.pin_position(b, pin_b)?;
        self.wires_mut().add(start, end)
    }

    /// Remove library definitions no component uses any more, returning their ids.
    pub fn prune_library_symbols(&mut self) -> Vec<String> {
        let unused: Vec<String> = {
            let used: HashSet<&str> = self
                .components
                .iter()
                .map(Component::library_key)
                .collect();
            self.library
                .iter()
                .map(LibrarySymbol::lib_id)
                .filter(|lib_id| !used.contains(lib_id))
                .map(str::to_owned)
                .collect()
        };
        if unused.is_empty() {
            return unused;
        }
        if let Some(lib_symbols) = self.tree.root_mut().child_mut("lib_symbols") {
            let mut index = lib_symbols.len();
            while index > 1 {
                index -= 1;
                let name = lib_symbols
                    .get(index)
                    .and_then(SExpr::as_list)
                    .filter(|list| list.tag() == Some("symbol"))
                    .and_then(|list| list.str_at(1));
                if name.is_some_and(|name| unused.iter().any(|id| id == name)) {
                    lib_symbols.remove(index);
                }
            }
        }
        for lib_id in &unused {
            self.library.remove(lib_id);
        }
        debug!(pruned = unused.len(), "pruned library symbols");
        unused
    }

    pub(crate) fn id_in_use(&self, id: Uuid) -> bool {
        self.components.contains(id)
            || self.wires.contains(id)
            || self.junctions.contains(id)
            || self.labels.contains(id)
    }

    /// A definition for `lib_id` that still has to be embedded, or `None` when it already is.
    pub(crate) fn resolve_symbol(
        &mut self,
        lib_id: &str,
    ) -> Result<Option<LibrarySymbol>, DocumentError> {
        if self.library.contains(lib_id) {
            return Ok(None);
        }
        let unresolved = || DocumentError::UnresolvedLibrarySymbol(lib_id.to_owned());
        let resolver = self.resolver.as_mut().ok_or_else(unresolved)?;
        trace!(lib_id, "resolving library symbol");
        let symbol = resolver.resolve(lib_id).ok_or_else(unresolved)?;
        Ok(Some(symbol.with_lib_id(lib_id)))
    }

    /// Embed a definition in the table and, right away, in the tree's `lib_symbols`,
    /// keeping the entries sorted by id.
    pub(crate) fn insert_library_symbol(&mut self, symbol: LibrarySymbol) {
        let mut node = symbol.sexpr().clone();
        node.strip_trivia();
        let root = self.tree.root_mut();
        let lib_symbols = match root.position("lib_symbols") {
            Some(index) => index,
            None => {
                let index = sync::insert_position(root, "lib_symbols");
                root.insert(index, List::new("lib_symbols"));
                index
            }
        };
        if let Some(lib_symbols) = root.get_mut(lib_symbols).and_then(SExpr::as_list_mut) {
            let index = (1..lib_symbols.len())
                .find(|&index| {
                    lib_symbols
                        .get(index)
                        .and_then(SExpr::as_list)
                        .and_then(|list| list.str_at(1))
                        .is_some_and(|name| name > symbol.lib_id())
                })
                .unwrap_or(lib_symbols.len());
            lib_symbols.insert(index, node);
        }
        debug!(lib_id = symbol.lib_id(), "embedded library symbol");
        self.library.insert(symbol);
    }

    /// Sync right away unless a batch is open.
    pub(crate) fn after_change(&mut self) -> Result<(), DocumentError> {
        if self.batch_depth == 0 {
            self.sync()
        } else {
            Ok(())
        }
    }

    pub(crate) fn root_path(&self) -> String {
        match self.uuid() {
            Some(uuid) => format!("/{uuid}"),
            None => "/".to_owned(),
        }
    }
}

fn instance_project(symbol: &List) -> Option<&str> {
    symbol.child("instances")?.child("project")?.str_at(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::NewComponent, DocumentError};

    fn resistor() -> LibrarySymbol {
        LibrarySymbol::builder("Device:R")
            .reference("R")
            .value("R")
            .pin("1", (0.0, 3.81))
            .pin("2", (0.0, -3.81))
            .build()
    }

    #[test]
    fn empty_document_layout() {
        let uuid = Uuid::parse_str("0f1c8a4e-3f8b-4bd6-8a35-2d0b0c6d3e11").unwrap();
        let mut doc = Document::with_options(DocumentOptions {
            project: "demo".into(),
            uuid: Some(uuid),
        });
        assert_eq!(
            doc.to_text().unwrap(),
            "(kicad_sch\n\t(version 20231120)\n\t(generator \"eeschema\")\n\t(generator_version \"8.0\")\n\t(uuid \"0f1c8a4e-3f8b-4bd6-8a35-2d0b0c6d3e11\")\n\t(paper \"A4\")\n\t(lib_symbols)\n\t(sheet_instances\n\t\t(path \"/\"\n\t\t\t(page \"1\")\n\t\t)\n\t)\n)\n"
        );
        assert_eq!(doc.version(), Some(20231120));
        assert_eq!(doc.uuid(), Some(uuid));
    }

    #[test]
    fn rejects_other_roots() {
        let err = Document::parse("(kicad_pcb (version 20221018))").unwrap_err();
        assert!(matches!(err, DocumentError::Parse(_)), "{err:?}");
    }

    #[test]
    fn unresolved_symbol_is_reported() {
        let mut doc = Document::new();
        let err = doc
            .components_mut()
            .add(NewComponent::new("Device:R", (100.0, 100.0)))
            .unwrap_err();
        assert!(matches!(err, DocumentError::UnresolvedLibrarySymbol(id) if id == "Device:R"));
        assert!(!doc.is_dirty());
    }

    #[test]
    fn library_symbols_are_embedded_sorted() {
        let mut doc = Document::new().with_resolver(|lib_id: &str| {
            Some(LibrarySymbol::builder(lib_id).pin("1", (0.0, 0.0)).build())
        });
        doc.components_mut()
            .add(NewComponent::new("Device:R", (0.0, 0.0)))
            .unwrap();
        doc.components_mut()
            .add(NewComponent::new("Device:C", (10.0, 0.0)))
            .unwrap();
        let lib_symbols = doc.tree().root().child("lib_symbols").unwrap();
        let names: Vec<_> = lib_symbols.children("symbol").filter_map(|s| s.str_at(1)).collect();
        assert_eq!(names, ["Device:C", "Device:R"]);
        assert_eq!(doc.library().len(), 2);
    }

    #[test]
    fn pin_lookup_errors() {
        let symbol = resistor();
        let mut doc = Document::new().with_resolver(move |_: &str| Some(symbol.clone()));
        doc.components_mut()
            .add(NewComponent::new("Device:R", (100.0, 100.0)))
            .unwrap();
        assert_eq!(doc.pin_position("R1", "1").unwrap(), Point::new(100.0, 96.19));
        assert!(matches!(
            doc.pin_position("R1", "3"),
            Err(DocumentError::PinNotFound { .. })
        ));
        assert!(matches!(
            doc.wire_between("R1", "1", "R9", "1"),
            Err(DocumentError::ComponentNotFound(r)) if r == "R9"
        ));
        assert!(doc.wires().is_empty());
    }

    #[test]
    fn pruning_removes_unused_definitions_only() {
        let symbol = resistor();
        let mut doc = Document::new().with_resolver(move |_: &str| Some(symbol.clone()));
        doc.components_mut()
            .add(NewComponent::new("Device:R", (100.0, 100.0)))
            .unwrap();
        assert!(doc.prune_library_symbols().is_empty());

        doc.components_mut().remove("R1").unwrap();
        // kept until pruned explicitly
        assert!(doc.library().contains("Device:R"));
        assert_eq!(doc.prune_library_symbols(), ["Device:R"]);
        assert!(doc.library().is_empty());
        assert!(doc.to_text().unwrap().contains("\t(lib_symbols)\n"));
    }
}
