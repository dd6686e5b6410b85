//! Library symbol definitions and the ways to find them.
//!
//! A schematic embeds a copy of every symbol it uses in `(lib_symbols ...)`. New symbol types
//! are looked up through a [`SymbolResolver`]: a closure, a parsed `.kicad_sym` file, a
//! memoising [`SymbolCache`] or a shared `Rc<RefCell<_>>` of any of those.

use std::{
    cell::RefCell,
    collections::HashMap,
    path::Path,
    rc::Rc,
};

use tracing::{trace, warn};

use crate::{
    error::{DocumentError, ParseError},
    model::{Source, DATASHEET, FOOTPRINT, REFERENCE, VALUE},
    sexpr::{self, List, SExpr},
    Point,
};

/// A pin of a library symbol, in library coordinates (Y pointing up).
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryPin {
    pub number: String,
    /// Pin names are not unique, `~` when unnamed
    pub name: String,
    pub position: Point,
    /// Direction the pin points in, degrees
    pub orientation: f64,
    pub length: f64,
    pub electrical_type: String,
    /// 0 when the pin is common to all units
    pub unit: u32,
    /// 0 when the pin is common to all body styles
    pub body_style: u32,
}

impl LibraryPin {
    pub fn new(number: impl Into<String>, position: impl Into<Point>) -> Self {
        LibraryPin {
            number: number.into(),
            name: "~".to_owned(),
            position: position.into(),
            orientation: 0.0,
            length: 2.54,
            electrical_type: "passive".to_owned(),
            unit: 0,
            body_style: 0,
        }
    }

    fn read(list: &List, unit: u32, body_style: u32, src: &Source) -> Result<Self, ParseError> {
        let at = src.child(list, "at")?;
        let number = src.child(list, "number")?;
        Ok(LibraryPin {
            number: src.string(number, 1, "pin number")?.to_owned(),
            name: list.value("name").unwrap_or("~").to_owned(),
            position: src.point(at)?,
            orientation: at.number_at(3).unwrap_or(0.0),
            length: list
                .child("length")
                .and_then(|length| length.number_at(1))
                .unwrap_or(0.0),
            electrical_type: src.string(list, 1, "electrical type")?.to_owned(),
            unit,
            body_style,
        })
    }

    fn to_sexpr(&self) -> List {
        let font = || {
            List::new("effects").with(
                List::new("font").with(
                    List::new("size")
                        .with(SExpr::number(1.27))
                        .with(SExpr::number(1.27)),
                ),
            )
        };
        List::new("pin")
            .with(SExpr::symbol(self.electrical_type.as_str()))
            .with(SExpr::symbol("line"))
            .with(
                List::new("at")
                    .with(SExpr::number(self.position.x))
                    .with(SExpr::number(self.position.y))
                    .with(SExpr::number(self.orientation)),
            )
            .with(List::new("length").with(SExpr::number(self.length)))
            .with(
                List::new("name")
                    .with(SExpr::string(self.name.as_str()))
                    .with(font()),
            )
            .with(
                List::new("number")
                    .with(SExpr::string(self.number.as_str()))
                    .with(font()),
            )
    }
}

/// A symbol definition as stored in `(lib_symbols ...)` or a `.kicad_sym` library.
#[derive(Debug, Clone, PartialEq)]
pub struct LibrarySymbol {
    lib_id: String,
    pins: Vec<LibraryPin>,
    unit_count: u32,
    properties: Vec<(String, String)>,
    power: bool,
    extends: Option<String>,
    sexpr: List,
}

impl LibrarySymbol {
    pub(crate) fn read(list: &List, src: &Source) -> Result<Self, ParseError> {
        let name = src.string(list, 1, "symbol name")?;

        let mut properties = Vec::new();
        for property in list.children("property") {
            let key = src.string(property, 1, "property name")?;
            let value = src.string(property, 2, "property value")?;
            properties.push((key.to_owned(), value.to_owned()));
        }

        let mut pins = Vec::new();
        for pin in list.children("pin") {
            pins.push(LibraryPin::read(pin, 0, 0, src)?);
        }
        let mut unit_count = 1;
        for unit in list.children("symbol") {
            let (number, style) = unit_suffix(src.string(unit, 1, "unit name")?);
            unit_count = unit_count.max(number);
            for pin in unit.children("pin") {
                pins.push(LibraryPin::read(pin, number, style, src)?);
            }
        }

        Ok(LibrarySymbol {
            lib_id: name.to_owned(),
            pins,
            unit_count,
            properties,
            power: list.child("power").is_some(),
            extends: list.value("extends").map(str::to_owned),
            sexpr: list.clone(),
        })
    }

    /// Parse a single `(symbol ...)` definition.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let tree = sexpr::parse(text)?;
        Self::read(tree.root(), &Source::new(text))
    }

    pub fn builder(lib_id: impl Into<String>) -> LibrarySymbolBuilder {
        LibrarySymbolBuilder::new(lib_id.into())
    }

    pub fn lib_id(&self) -> &str {
        &self.lib_id
    }

    pub fn pins(&self) -> &[LibraryPin] {
        &self.pins
    }

    /// Pins of `unit` in the default body style, including the pins shared by all units.
    pub fn pins_for_unit(&self, unit: u32) -> impl Iterator<Item = &LibraryPin> {
        self.pins.iter().filter(move |pin| {
            (pin.unit == 0 || pin.unit == unit) && (pin.body_style == 0 || pin.body_style == 1)
        })
    }

    pub fn pin(&self, unit: u32, number: &str) -> Option<&LibraryPin> {
        self.pins_for_unit(unit).find(|pin| pin.number == number)
    }

    pub fn unit_count(&self) -> u32 {
        self.unit_count
    }

    pub fn has_unit(&self, unit: u32) -> bool {
        (1..=self.unit_count).contains(&unit)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Default reference designator prefix, `U` when the definition has none.
    pub fn reference_prefix(&self) -> &str {
        match self.property(REFERENCE) {
            Some(prefix) if !prefix.is_empty() => prefix.trim_end_matches('?'),
            _ => "U",
        }
    }

    pub fn is_power(&self) -> bool {
        self.power
    }

    /// Parent symbol of a derived definition in a `.kicad_sym` library.
    pub fn extends(&self) -> Option<&str> {
        self.extends.as_deref()
    }

    pub fn sexpr(&self) -> &List {
        &self.sexpr
    }

    /// Re-key the definition, renaming the top-level symbol. Unit names keep the bare name.
    pub(crate) fn with_lib_id(mut self, lib_id: &str) -> Self {
        self.lib_id = lib_id.to_owned();
        self.sexpr.set_string(1, lib_id);
        self
    }
}

/// `Name_1_2` is unit 1 in body style 2. Graphics shared by all units use unit 0.
fn unit_suffix(name: &str) -> (u32, u32) {
    let mut parts = name.rsplitn(3, '_');
    let style = parts.next().and_then(|s| s.parse().ok());
    let unit = parts.next().and_then(|s| s.parse().ok());
    match (unit, style) {
        (Some(unit), Some(style)) => (unit, style),
        _ => (0, 0),
    }
}

/// Builds simple placeholder definitions, mostly for tests and generated designs.
#[derive(Debug, Clone)]
pub struct LibrarySymbolBuilder {
    lib_id: String,
    reference: String,
    value: Option<String>,
    footprint: String,
    datasheet: String,
    power: bool,
    units: u32,
    pins: Vec<LibraryPin>,
}

impl LibrarySymbolBuilder {
    fn new(lib_id: String) -> Self {
        LibrarySymbolBuilder {
            lib_id,
            reference: "U".to_owned(),
            value: None,
            footprint: String::new(),
            datasheet: "~".to_owned(),
            power: false,
            units: 1,
            pins: Vec::new(),
        }
    }

    pub fn reference(mut self, prefix: impl Into<String>) -> Self {
        self.reference = prefix.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn footprint(mut self, footprint: impl Into<String>) -> Self {
        self.footprint = footprint.into();
        self
    }

    pub fn datasheet(mut self, datasheet: impl Into<String>) -> Self {
        self.datasheet = datasheet.into();
        self
    }

    pub fn power(mut self) -> Self {
        self.power = true;
        self
    }

    pub fn units(mut self, units: u32) -> Self {
        self.units = units.max(1);
        self
    }

    /// A pin shared by all units.
    pub fn pin(self, number: impl Into<String>, position: impl Into<Point>) -> Self {
        self.add_pin(LibraryPin::new(number, position))
    }

    pub fn unit_pin(self, unit: u32, number: impl Into<String>, position: impl Into<Point>) -> Self {
        let mut pin = LibraryPin::new(number, position);
        pin.unit = unit;
        self.add_pin(pin)
    }

    pub fn add_pin(mut self, pin: LibraryPin) -> Self {
        self.units = self.units.max(pin.unit);
        self.pins.push(pin);
        self
    }

    pub fn build(self) -> LibrarySymbol {
        let name = self
            .lib_id
            .split_once(':')
            .map_or(self.lib_id.as_str(), |(_, name)| name)
            .to_owned();
        let value = self.value.unwrap_or_else(|| name.clone());
        let properties = vec![
            (REFERENCE.to_owned(), self.reference),
            (VALUE.to_owned(), value),
            (FOOTPRINT.to_owned(), self.footprint),
            (DATASHEET.to_owned(), self.datasheet),
        ];

        let mut sexpr = List::new("symbol").with(SExpr::string(self.lib_id.as_str()));
        if self.power {
            sexpr.push(List::new("power"));
        }
        sexpr.push(List::new("in_bom").with(SExpr::symbol("yes")));
        sexpr.push(List::new("on_board").with(SExpr::symbol("yes")));
        for (key, value) in &properties {
            let mut effects = List::new("effects").with(
                List::new("font").with(
                    List::new("size")
                        .with(SExpr::number(1.27))
                        .with(SExpr::number(1.27)),
                ),
            );
            if key != REFERENCE && key != VALUE {
                // understood by every KiCad version
                effects.push(SExpr::symbol("hide"));
            }
            sexpr.push(
                List::new("property")
                    .with(SExpr::string(key.as_str()))
                    .with(SExpr::string(value.as_str()))
                    .with(
                        List::new("at")
                            .with(SExpr::number(0.0))
                            .with(SExpr::number(0.0))
                            .with(SExpr::number(0.0)),
                    )
                    .with(effects),
            );
        }

        let mut units: Vec<u32> = self.pins.iter().map(|pin| pin.unit).collect();
        units.sort_unstable();
        units.dedup();
        for unit in units {
            let mut body = List::new("symbol").with(SExpr::string(format!("{name}_{unit}_1")));
            for pin in self.pins.iter().filter(|pin| pin.unit == unit) {
                body.push(pin.to_sexpr());
            }
            sexpr.push(body);
        }

        let pins = self
            .pins
            .into_iter()
            .map(|pin| LibraryPin {
                body_style: 1,
                ..pin
            })
            .collect();
        LibrarySymbol {
            lib_id: self.lib_id,
            pins,
            unit_count: self.units,
            properties,
            power: self.power,
            extends: None,
            sexpr,
        }
    }
}

/// The definitions embedded in a schematic, in file order.
#[derive(Debug, Clone, Default)]
pub struct LibrarySymbolTable {
    symbols: Vec<LibrarySymbol>,
    index: HashMap<String, usize>,
}

impl LibrarySymbolTable {
    pub fn get(&self, lib_id: &str) -> Option<&LibrarySymbol> {
        self.index.get(lib_id).map(|&i| &self.symbols[i])
    }

    pub fn contains(&self, lib_id: &str) -> bool {
        self.index.contains_key(lib_id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LibrarySymbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Returns false, leaving the table unchanged, when `lib_id` is already present.
    pub(crate) fn insert(&mut self, symbol: LibrarySymbol) -> bool {
        if self.index.contains_key(symbol.lib_id()) {
            return false;
        }
        self.index
            .insert(symbol.lib_id().to_owned(), self.symbols.len());
        self.symbols.push(symbol);
        true
    }

    pub(crate) fn remove(&mut self, lib_id: &str) -> Option<LibrarySymbol> {
        let index = self.index.remove(lib_id)?;
        let symbol = self.symbols.remove(index);
        for (offset, moved) in self.symbols[index..].iter().enumerate() {
            self.index.insert(moved.lib_id().to_owned(), index + offset);
        }
        Some(symbol)
    }
}

impl<'a> IntoIterator for &'a LibrarySymbolTable {
    type Item = &'a LibrarySymbol;
    type IntoIter = std::slice::Iter<'a, LibrarySymbol>;

    fn into_iter(self) -> Self::IntoIter {
        self.symbols.iter()
    }
}

/// Looks up symbol definitions that are not yet embedded in a document.
pub trait SymbolResolver {
    fn resolve(&mut self, lib_id: &str) -> Option<LibrarySymbol>;
}

impl<F> SymbolResolver for F
where
    F: FnMut(&str) -> Option<LibrarySymbol>,
{
    fn resolve(&mut self, lib_id: &str) -> Option<LibrarySymbol> {
        self(lib_id)
    }
}

/// Lets several documents share one resolver, typically a [`SymbolCache`].
impl<R: SymbolResolver + ?Sized> SymbolResolver for Rc<RefCell<R>> {
    fn resolve(&mut self, lib_id: &str) -> Option<LibrarySymbol> {
        self.borrow_mut().resolve(lib_id)
    }
}

/// A parsed `.kicad_sym` file, answering `nickname:Name` lookups.
#[derive(Debug, Clone)]
pub struct SymbolLibrary {
    nickname: String,
    symbols: HashMap<String, LibrarySymbol>,
}

impl SymbolLibrary {
    pub fn parse(nickname: impl Into<String>, text: &str) -> Result<Self, ParseError> {
        let tree = sexpr::parse(text)?;
        let src = Source::new(text);
        let root = tree.root();
        if root.tag() != Some("kicad_symbol_lib") {
            return Err(src.unexpected(root, 0, "(kicad_symbol_lib ...)"));
        }

        let mut symbols = HashMap::new();
        let mut derived = Vec::new();
        for list in root.children("symbol") {
            let symbol = LibrarySymbol::read(list, &src)?;
            match symbol.extends() {
                Some(_) => derived.push(symbol),
                None => {
                    symbols.insert(symbol.lib_id().to_owned(), symbol);
                }
            }
        }

        // derived symbols may extend other derived symbols
        while !derived.is_empty() {
            let before = derived.len();
            let mut pending = Vec::new();
            for symbol in derived {
                let parent = symbol.extends().and_then(|parent| symbols.get(parent));
                match parent {
                    Some(parent) => {
                        let flat = flatten(&symbol, parent, &src)?;
                        symbols.insert(flat.lib_id().to_owned(), flat);
                    }
                    None => pending.push(symbol),
                }
            }
            if pending.len() == before {
                for symbol in &pending {
                    warn!(
                        symbol = symbol.lib_id(),
                        parent = symbol.extends(),
                        "skipping derived symbol with unknown parent"
                    );
                }
                break;
            }
            derived = pending;
        }

        Ok(SymbolLibrary {
            nickname: nickname.into(),
            symbols,
        })
    }

    pub fn load(nickname: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self::parse(nickname, &text)?)
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Definition by its name inside the library, without the nickname.
    pub fn get(&self, name: &str) -> Option<&LibrarySymbol> {
        self.symbols.get(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolResolver for SymbolLibrary {
    fn resolve(&mut self, lib_id: &str) -> Option<LibrarySymbol> {
        let (nickname, name) = lib_id.split_once(':')?;
        if nickname != self.nickname {
            return None;
        }
        self.symbols
            .get(name)
            .map(|symbol| symbol.clone().with_lib_id(lib_id))
    }
}

/// A derived symbol takes its fields from `symbol` and its units from `parent`.
fn flatten(symbol: &LibrarySymbol, parent: &LibrarySymbol, src: &Source) -> Result<LibrarySymbol, ParseError> {
    let mut list = symbol.sexpr().clone();
    list.remove_children("extends");
    let name = symbol.lib_id();
    for unit in parent.sexpr().children("symbol") {
        let mut unit = unit.clone();
        if let Some(suffix) = unit
            .str_at(1)
            .and_then(|unit_name| unit_name.strip_prefix(parent.lib_id()))
            .map(str::to_owned)
        {
            unit.set_string(1, &format!("{name}{suffix}"));
        }
        list.push(unit);
    }
    if parent.is_power() && list.child("power").is_none() {
        list.insert(2, List::new("power"));
    }
    LibrarySymbol::read(&list, src)
}

/// Memoises lookups, misses included, in front of another resolver.
#[derive(Debug)]
pub struct SymbolCache<R> {
    source: R,
    entries: HashMap<String, Option<LibrarySymbol>>,
}

impl<R: SymbolResolver> SymbolCache<R> {
    pub fn new(source: R) -> Self {
        SymbolCache {
            source,
            entries: HashMap::new(),
        }
    }

    /// Wrap in an `Rc<RefCell<_>>` so the cache can serve several documents.
    pub fn shared(source: R) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new(source)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<R: SymbolResolver> SymbolResolver for SymbolCache<R> {
    fn resolve(&mut self, lib_id: &str) -> Option<LibrarySymbol> {
        if let Some(entry) = self.entries.get(lib_id) {
            trace!(lib_id, hit = entry.is_some(), "symbol cache");
            return entry.clone();
        }
        let resolved = self.source.resolve(lib_id);
        trace!(lib_id, found = resolved.is_some(), "symbol cache miss");
        self.entries.insert(lib_id.to_owned(), resolved.clone());
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

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

    const OPAMP: &str = r#"(symbol "Amplifier_Operational:LM358"
		(pin_names (offset 0.127))
		(in_bom yes)
		(on_board yes)
		(property "Reference" "U" (at 0 5.08 0) (effects (font (size 1.27 1.27)) (justify left)))
		(property "Value" "LM358" (at 0 -5.08 0) (effects (font (size 1.27 1.27)) (justify left)))
		(symbol "LM358_1_1"
			(pin output line (at 7.62 0 180) (length 2.54) (name "~" (effects (font (size 1.27 1.27)))) (number "1" (effects (font (size 1.27 1.27)))))
			(pin input line (at -7.62 -2.54 0) (length 2.54) (name "-" (effects (font (size 1.27 1.27)))) (number "2" (effects (font (size 1.27 1.27)))))
			(pin input line (at -7.62 2.54 0) (length 2.54) (name "+" (effects (font (size 1.27 1.27)))) (number "3" (effects (font (size 1.27 1.27)))))
		)
		(symbol "LM358_2_1"
			(pin input line (at -7.62 2.54 0) (length 2.54) (name "+" (effects (font (size 1.27 1.27)))) (number "5" (effects (font (size 1.27 1.27)))))
			(pin input line (at -7.62 -2.54 0) (length 2.54) (name "-" (effects (font (size 1.27 1.27)))) (number "6" (effects (font (size 1.27 1.27)))))
			(pin output line (at 7.62 0 180) (length 2.54) (name "~" (effects (font (size 1.27 1.27)))) (number "7" (effects (font (size 1.27 1.27)))))
		)
		(symbol "LM358_3_1"
			(pin power_in line (at -2.54 -7.62 90) (length 3.81) (name "V-" (effects (font (size 1.27 1.27)))) (number "4" (effects (font (size 1.27 1.27)))))
			(pin power_in line (at -2.54 7.62 270) (length 3.81) (name "V+" (effects (font (size 1.27 1.27)))) (number "8" (effects (font (size 1.27 1.27)))))
		)
	)"#;

    #[rstest]
    #[case("R_0_1", (0, 1))]
    #[case("R_1_1", (1, 1))]
    #[case("LM358_3_2", (3, 2))]
    #[case("Some_Name_2_1", (2, 1))]
    #[case("R", (0, 0))]
    fn parses_unit_suffix(#[case] name: &str, #[case] expected: (u32, u32)) {
        assert_eq!(unit_suffix(name), expected);
    }

    #[test]
    fn reads_multi_unit_symbol() {
        let symbol = LibrarySymbol::parse(OPAMP).unwrap();
        assert_eq!(symbol.lib_id(), "Amplifier_Operational:LM358");
        assert_eq!(symbol.unit_count(), 3);
        assert_eq!(symbol.reference_prefix(), "U");
        let unit2: Vec<_> = symbol.pins_for_unit(2).map(|p| p.number.as_str()).collect();
        assert_eq!(unit2, ["5", "6", "7"]);
        assert!(symbol.pin(1, "5").is_none());
        let pin = symbol.pin(3, "8").unwrap();
        assert_eq!(pin.name, "V+");
        assert_eq!(pin.position, Point::new(-2.54, 7.62));
        assert!(symbol.has_unit(3));
        assert!(!symbol.has_unit(4));
    }

    #[test]
    fn builder_output_reads_back() {
        let built = LibrarySymbol::builder("Device:R")
            .reference("R")
            .pin("1", (0.0, 3.81))
            .pin("2", (0.0, -3.81))
            .build();
        let text = built.sexpr().to_string();
        let read = LibrarySymbol::parse(&text).unwrap();
        assert_eq!(read.lib_id(), "Device:R");
        assert_eq!(read.property("Value"), Some("R"));
        assert_eq!(read.pins(), built.pins());
        assert_eq!(read.unit_count(), 1);
        assert!(text.contains("(symbol \"R_0_1\""));
    }

    #[test]
    fn table_keeps_insertion_order() {
        let mut table = LibrarySymbolTable::default();
        assert!(table.insert(LibrarySymbol::builder("Device:R").build()));
        assert!(table.insert(LibrarySymbol::builder("Device:C").build()));
        assert!(!table.insert(LibrarySymbol::builder("Device:R").build()));
        assert!(table.remove("Device:R").is_some());
        assert_eq!(table.get("Device:C").map(LibrarySymbol::lib_id), Some("Device:C"));
        let ids: Vec<_> = table.iter().map(LibrarySymbol::lib_id).collect();
        assert_eq!(ids, ["Device:C"]);
    }

    #[test]
    fn library_resolves_nickname_and_flattens_derived() {
        let mut lib = SymbolLibrary::parse("Device", &test_data!("device.kicad_sym")).unwrap();
        assert_eq!(lib.nickname(), "Device");
        let r = lib.resolve("Device:R").unwrap();
        assert_eq!(r.lib_id(), "Device:R");
        assert_eq!(r.sexpr().str_at(1), Some("Device:R"));
        assert!(lib.resolve("Other:R").is_none());
        assert!(lib.resolve("R").is_none());

        let small = lib.resolve("Device:R_Small").unwrap();
        assert_eq!(small.extends(), None);
        assert_eq!(small.property("Value"), Some("R_Small"));
        assert_eq!(small.pins().len(), 2);
        assert!(small.sexpr().children("symbol").any(|u| u.str_at(1) == Some("R_Small_0_1")));
    }

    #[test]
    fn cache_memoises_hits_and_misses() {
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        let source = move |lib_id: &str| {
            *counter.borrow_mut() += 1;
            (lib_id == "Device:R").then(|| LibrarySymbol::builder(lib_id).build())
        };
        let cache = SymbolCache::shared(source);
        let mut first = cache.clone();
        let mut second = cache.clone();
        assert!(first.resolve("Device:R").is_some());
        assert!(second.resolve("Device:R").is_some());
        assert!(first.resolve("Device:X").is_none());
        assert!(second.resolve("Device:X").is_none());
        assert_eq!(*calls.borrow(), 2);
        assert_eq!(cache.borrow().len(), 2);
    }
}
