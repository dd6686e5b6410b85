//! Typed views of the schematic elements the document manages.
//!
//! Each element is read from its root-level subtree on load and written back by
//! [`crate::Document::sync`]. Elements not modelled here (buses, text, images, ...) stay in the
//! tree untouched.

use uuid::Uuid;

use crate::{collections::Handle, Mirror, Point, Rotation};

mod read;
mod write;

pub(crate) use read::Source;
pub(crate) use write::WriteContext;

pub const REFERENCE: &str = "Reference";
pub const VALUE: &str = "Value";
pub const FOOTPRINT: &str = "Footprint";
pub const DATASHEET: &str = "Datasheet";

/// Properties every placed symbol carries. They can be edited but not removed.
const MANDATORY: [&str; 4] = [REFERENCE, VALUE, FOOTPRINT, DATASHEET];

/// The kinds of root-level elements the document keeps in sync with its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Component,
    Wire,
    Junction,
    Label,
}

impl ElementKind {
    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Component => "symbol",
            ElementKind::Wire => "wire",
            ElementKind::Junction => "junction",
            ElementKind::Label => "label",
        }
    }
}

/// Something with a stable uuid that lives at the root of the schematic.
pub trait Element: Clone + PartialEq {
    const KIND: ElementKind;

    fn id(&self) -> Uuid;
}

/// A placed symbol instance, `(symbol (lib_id ...) ...)` at the root level.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub(crate) id: Uuid,
    pub(crate) lib_id: String,
    pub(crate) lib_name: Option<String>,
    pub(crate) position: Point,
    pub(crate) rotation: Rotation,
    pub(crate) mirror: Option<Mirror>,
    pub(crate) unit: u32,
    pub(crate) in_bom: bool,
    pub(crate) on_board: bool,
    pub(crate) dnp: bool,
    pub(crate) properties: Vec<(String, String)>,
    pub(crate) pins: Vec<Pin>,
    /// `(field, annotation)` when the file's Reference field differs from its instance
    /// annotation; the field text is written back until the reference changes
    pub(crate) field_reference: Option<(String, String)>,
}

impl Element for Component {
    const KIND: ElementKind = ElementKind::Component;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Component {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handle(&self) -> Handle<Component> {
        Handle::new(self.id)
    }

    pub fn lib_id(&self) -> &str {
        &self.lib_id
    }

    pub fn lib_name(&self) -> Option<&str> {
        self.lib_name.as_deref()
    }

    /// Key of the definition in the document's `lib_symbols`.
    pub fn library_key(&self) -> &str {
        self.lib_name.as_deref().unwrap_or(&self.lib_id)
    }

    pub fn reference(&self) -> &str {
        self.property(REFERENCE).unwrap_or_default()
    }

    pub fn value(&self) -> &str {
        self.property(VALUE).unwrap_or_default()
    }

    pub fn footprint(&self) -> &str {
        self.property(FOOTPRINT).unwrap_or_default()
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn mirror(&self) -> Option<Mirror> {
        self.mirror
    }

    pub fn unit(&self) -> u32 {
        self.unit
    }

    pub fn in_bom(&self) -> bool {
        self.in_bom
    }

    pub fn on_board(&self) -> bool {
        self.on_board
    }

    pub fn dnp(&self) -> bool {
        self.dnp
    }

    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    /// References ending in `?` have not been annotated yet.
    pub fn is_annotated(&self) -> bool {
        let reference = self.reference();
        !reference.is_empty() && !reference.ends_with('?')
    }

    pub fn set_reference(&mut self, reference: impl Into<String>) {
        self.set_property(REFERENCE, reference);
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.set_property(VALUE, value);
    }

    pub fn set_footprint(&mut self, footprint: impl Into<String>) {
        self.set_property(FOOTPRINT, footprint);
    }

    /// Set a property, appending it when the component does not have it yet.
    pub fn set_property(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.properties.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.properties.push((key.to_owned(), value)),
        }
    }

    /// Remove a user property. The mandatory fields cannot be removed.
    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        if MANDATORY.contains(&key) {
            return None;
        }
        let index = self.properties.iter().position(|(k, _)| k == key)?;
        Some(self.properties.remove(index).1)
    }

    pub fn set_position(&mut self, position: impl Into<Point>) {
        self.position = position.into().round_iu();
    }

    pub fn move_by(&mut self, delta: impl Into<Point>) {
        self.set_position(self.position + delta.into());
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    pub fn set_mirror(&mut self, mirror: Option<Mirror>) {
        self.mirror = mirror;
    }

    pub fn set_unit(&mut self, unit: u32) {
        self.unit = unit;
    }

    pub fn set_in_bom(&mut self, in_bom: bool) {
        self.in_bom = in_bom;
    }

    pub fn set_on_board(&mut self, on_board: bool) {
        self.on_board = on_board;
    }

    pub fn set_dnp(&mut self, dnp: bool) {
        self.dnp = dnp;
    }

    /// True when the change between `self` and `other` moves pins on the canvas.
    pub(crate) fn placement_differs(&self, other: &Component) -> bool {
        self.position != other.position
            || self.rotation != other.rotation
            || self.mirror != other.mirror
            || self.unit != other.unit
            || self.lib_id != other.lib_id
            || self.lib_name != other.lib_name
    }
}

/// Pin entry of a placed symbol, `(pin "1" (uuid ...))`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    pub number: String,
    pub id: Uuid,
}

impl Pin {
    pub fn new(number: impl Into<String>) -> Self {
        Pin {
            number: number.into(),
            id: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Wire {
    pub(crate) id: Uuid,
    pub(crate) start: Point,
    pub(crate) end: Point,
}

impl Element for Wire {
    const KIND: ElementKind = ElementKind::Wire;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Wire {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handle(&self) -> Handle<Wire> {
        Handle::new(self.id)
    }

    pub fn start(&self) -> Point {
        self.start
    }

    pub fn end(&self) -> Point {
        self.end
    }

    pub fn len(&self) -> f64 {
        let d = self.end - self.start;
        d.x.hypot(d.y)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn has_endpoint(&self, point: Point) -> bool {
        self.start == point || self.end == point
    }

    pub fn set_start(&mut self, start: impl Into<Point>) {
        self.start = start.into().round_iu();
    }

    pub fn set_end(&mut self, end: impl Into<Point>) {
        self.end = end.into().round_iu();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Junction {
    pub(crate) id: Uuid,
    pub(crate) position: Point,
}

impl Element for Junction {
    const KIND: ElementKind = ElementKind::Junction;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Junction {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handle(&self) -> Handle<Junction> {
        Handle::new(self.id)
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn set_position(&mut self, position: impl Into<Point>) {
        self.position = position.into().round_iu();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    Local,
    Global,
    Hierarchical,
}

impl LabelKind {
    pub fn tag(self) -> &'static str {
        match self {
            LabelKind::Local => "label",
            LabelKind::Global => "global_label",
            LabelKind::Hierarchical => "hierarchical_label",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "label" => Some(LabelKind::Local),
            "global_label" => Some(LabelKind::Global),
            "hierarchical_label" => Some(LabelKind::Hierarchical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub(crate) id: Uuid,
    pub(crate) kind: LabelKind,
    pub(crate) text: String,
    pub(crate) position: Point,
    pub(crate) rotation: Rotation,
    /// `input`, `output`, `bidirectional`, `tri_state` or `passive`
    pub(crate) shape: Option<String>,
}

impl Element for Label {
    const KIND: ElementKind = ElementKind::Label;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Label {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handle(&self) -> Handle<Label> {
        Handle::new(self.id)
    }

    pub fn kind(&self) -> LabelKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn shape(&self) -> Option<&str> {
        self.shape.as_deref()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn set_position(&mut self, position: impl Into<Point>) {
        self.position = position.into().round_iu();
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    /// Only global and hierarchical labels have a shape; it is ignored on local labels.
    pub fn set_shape(&mut self, shape: impl Into<String>) {
        if self.kind != LabelKind::Local {
            self.shape = Some(shape.into());
        }
    }
}

/// A hierarchical sheet. Sheets are read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub id: Uuid,
    pub name: String,
    pub file: String,
    pub position: Point,
    pub size: Point,
}

/// Everything needed to place a new component.
#[derive(Debug, Clone, PartialEq)]
pub struct NewComponent {
    pub(crate) lib_id: String,
    pub(crate) reference: Option<String>,
    pub(crate) auto_reference: bool,
    pub(crate) value: Option<String>,
    pub(crate) footprint: Option<String>,
    pub(crate) position: Point,
    pub(crate) rotation: Rotation,
    pub(crate) mirror: Option<Mirror>,
    pub(crate) unit: u32,
    pub(crate) properties: Vec<(String, String)>,
    pub(crate) id: Option<Uuid>,
}

impl NewComponent {
    pub fn new(lib_id: impl Into<String>, position: impl Into<Point>) -> Self {
        NewComponent {
            lib_id: lib_id.into(),
            reference: None,
            auto_reference: false,
            value: None,
            footprint: None,
            position: position.into().round_iu(),
            rotation: Rotation::Deg0,
            mirror: None,
            unit: 1,
            properties: Vec::new(),
            id: None,
        }
    }

    /// Explicit reference. A reference ending in `?` (`"R?"`) only picks the prefix.
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Allocate a fresh reference instead of failing when the explicit one is taken.
    pub fn auto_reference(mut self) -> Self {
        self.auto_reference = true;
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn footprint(mut self, footprint: impl Into<String>) -> Self {
        self.footprint = Some(footprint.into());
        self
    }

    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn mirror(mut self, mirror: Mirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn unit(mut self, unit: u32) -> Self {
        self.unit = unit;
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    /// Use a fixed uuid instead of a random one.
    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }
}

/// Everything needed to place a new label.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLabel {
    pub(crate) kind: LabelKind,
    pub(crate) text: String,
    pub(crate) position: Point,
    pub(crate) rotation: Rotation,
    pub(crate) shape: Option<String>,
    pub(crate) id: Option<Uuid>,
}

impl NewLabel {
    pub fn new(kind: LabelKind, text: impl Into<String>, position: impl Into<Point>) -> Self {
        let shape = match kind {
            LabelKind::Local => None,
            _ => Some("input".to_owned()),
        };
        NewLabel {
            kind,
            text: text.into(),
            position: position.into().round_iu(),
            rotation: Rotation::Deg0,
            shape,
            id: None,
        }
    }

    pub fn local(text: impl Into<String>, position: impl Into<Point>) -> Self {
        Self::new(LabelKind::Local, text, position)
    }

    pub fn global(text: impl Into<String>, position: impl Into<Point>) -> Self {
        Self::new(LabelKind::Global, text, position)
    }

    pub fn hierarchical(text: impl Into<String>, position: impl Into<Point>) -> Self {
        Self::new(LabelKind::Hierarchical, text, position)
    }

    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn shape(mut self, shape: impl Into<String>) -> Self {
        if self.kind != LabelKind::Local {
            self.shape = Some(shape.into());
        }
        self
    }

    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub(crate) fn build(self) -> Label {
        Label {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            kind: self.kind,
            text: self.text,
            position: self.position,
            rotation: self.rotation,
            shape: self.shape,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resistor() -> Component {
        Component {
            id: Uuid::nil(),
            lib_id: "Device:R".into(),
            lib_name: None,
            position: Point::new(100.0, 100.0),
            rotation: Rotation::Deg0,
            mirror: None,
            unit: 1,
            in_bom: true,
            on_board: true,
            dnp: false,
            properties: vec![
                (REFERENCE.into(), "R1".into()),
                (VALUE.into(), "10k".into()),
                (FOOTPRINT.into(), "".into()),
                (DATASHEET.into(), "~".into()),
            ],
            pins: vec![],
            field_reference: None,
        }
    }

    #[test]
    fn mandatory_properties_cannot_be_removed() {
        let mut r = resistor();
        assert_eq!(r.remove_property(VALUE), None);
        r.set_property("MPN", "RC0603");
        assert_eq!(r.remove_property("MPN").as_deref(), Some("RC0603"));
        assert_eq!(r.properties().count(), 4);
    }

    #[test]
    fn setters_update_properties() {
        let mut r = resistor();
        r.set_value("4k7");
        r.set_reference("R7");
        assert_eq!(r.value(), "4k7");
        assert_eq!(r.reference(), "R7");
        assert!(r.is_annotated());
        r.set_reference("R?");
        assert!(!r.is_annotated());
    }

    #[test]
    fn positions_snap_to_internal_units() {
        let mut r = resistor();
        r.move_by((0.1 + 0.2, 0.0));
        assert_eq!(r.position(), Point::new(100.3, 100.0));
    }

    #[test]
    fn labels_without_shape_stay_without_shape() {
        let mut label = NewLabel::local("SDA", (10.0, 10.0)).shape("input").build();
        assert_eq!(label.shape(), None);
        label.set_shape("output");
        assert_eq!(label.shape(), None);
        let global = NewLabel::global("SDA", (10.0, 10.0)).shape("output").build();
        assert_eq!(global.shape(), Some("output"));
    }
}
