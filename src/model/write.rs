//! Building new element subtrees and patching existing ones in place.
//!
//! Patching only touches atoms whose value changed, so untouched fields keep their literal and
//! surrounding whitespace.

use std::collections::HashSet;

use uuid::Uuid;

use crate::{
    document::Dialect,
    round_iu,
    sexpr::{List, SExpr},
    Point,
};

use super::{Component, Junction, Label, LabelKind, Pin, Wire, REFERENCE, VALUE};

const FONT_SIZE: f64 = 1.27;

/// What a writer needs to know about the document it writes into.
pub(crate) struct WriteContext<'a> {
    pub(crate) dialect: &'a Dialect,
    pub(crate) project: &'a str,
    /// Instance path of the root sheet, `/` followed by the root uuid
    pub(crate) root_path: String,
}

impl WriteContext<'_> {
    fn uuid(&self, id: Uuid) -> List {
        let text = id.to_string();
        let atom = if self.dialect.quote_uuids {
            SExpr::string(text)
        } else {
            SExpr::symbol(text)
        };
        List::new("uuid").with(atom)
    }

    fn effects(&self, hide: bool) -> List {
        let mut effects = List::new("effects").with(
            List::new("font").with(
                List::new("size")
                    .with(SExpr::number(FONT_SIZE))
                    .with(SExpr::number(FONT_SIZE)),
            ),
        );
        if hide {
            if self.dialect.hide_as_child {
                effects.push(List::new("hide").with(yes_no(true)));
            } else {
                effects.push(SExpr::symbol("hide"));
            }
        }
        effects
    }
}

fn yes_no(flag: bool) -> SExpr {
    SExpr::symbol(if flag { "yes" } else { "no" })
}

fn flag(label: &str, value: bool) -> List {
    List::new(label).with(yes_no(value))
}

fn at(position: Point, angle: Option<f64>) -> List {
    let mut at = List::new("at")
        .with(SExpr::number(position.x))
        .with(SExpr::number(position.y));
    if let Some(angle) = angle {
        at.push(SExpr::number(angle));
    }
    at
}

fn xy(point: Point) -> List {
    List::new("xy")
        .with(SExpr::number(point.x))
        .with(SExpr::number(point.y))
}

/// Index of the child list `label`, inserting `make()` after the last of `after` when missing.
fn ensure_child(list: &mut List, label: &str, after: &[&str], make: impl FnOnce() -> List) -> usize {
    if let Some(index) = list.position(label) {
        return index;
    }
    let index = after
        .iter()
        .filter_map(|label| list.rposition(label))
        .max()
        .map_or(1, |index| index + 1);
    list.insert(index, make());
    index
}

fn list_at(list: &mut List, index: usize) -> Option<&mut List> {
    list.get_mut(index).and_then(SExpr::as_list_mut)
}

fn set_point(list: &mut List, point: Point) {
    list.set_number(1, point.x);
    list.set_number(2, point.y);
}

/// Write a yes/no flag. A missing flag is only added when it differs from KiCad's default.
fn set_flag(list: &mut List, label: &str, value: bool, default: bool, after: &[&str]) {
    match list.position(label) {
        Some(index) => {
            if let Some(node) = list_at(list, index) {
                node.set_symbol(1, if value { "yes" } else { "no" });
            }
        }
        None if value != default => {
            ensure_child(list, label, after, || flag(label, value));
        }
        None => {}
    }
}

impl Component {
    fn property_sexpr(&self, key: &str, value: &str, ctx: &WriteContext) -> List {
        let (offset, visible) = match key {
            REFERENCE => (Point::new(2.54, -1.27), true),
            VALUE => (Point::new(2.54, 1.27), true),
            _ => (Point::new(0.0, 0.0), false),
        };
        List::new("property")
            .with(SExpr::string(key))
            .with(SExpr::string(value))
            .with(at((self.position + offset).round_iu(), Some(0.0)))
            .with(ctx.effects(!visible))
    }

    fn pin_sexpr(pin: &Pin, ctx: &WriteContext) -> List {
        List::new("pin")
            .with(SExpr::string(pin.number.as_str()))
            .with(ctx.uuid(pin.id))
    }

    fn instances_sexpr(&self, ctx: &WriteContext) -> List {
        List::new("instances").with(
            List::new("project").with(SExpr::string(ctx.project)).with(
                List::new("path")
                    .with(SExpr::string(ctx.root_path.as_str()))
                    .with(List::new("reference").with(SExpr::string(self.reference())))
                    .with(List::new("unit").with(SExpr::number(self.unit as f64))),
            ),
        )
    }

    /// A complete `(symbol ...)` subtree for a newly placed component.
    pub(crate) fn to_sexpr(&self, ctx: &WriteContext) -> List {
        let mut list = List::new("symbol");
        if let Some(lib_name) = &self.lib_name {
            list.push(List::new("lib_name").with(SExpr::string(lib_name.as_str())));
        }
        list.push(List::new("lib_id").with(SExpr::string(self.lib_id.as_str())));
        list.push(at(self.position, Some(self.rotation.degrees())));
        if let Some(mirror) = self.mirror {
            list.push(List::new("mirror").with(SExpr::symbol(mirror.as_str())));
        }
        list.push(List::new("unit").with(SExpr::number(self.unit as f64)));
        if ctx.dialect.exclude_from_sim {
            list.push(flag("exclude_from_sim", false));
        }
        list.push(flag("in_bom", self.in_bom));
        list.push(flag("on_board", self.on_board));
        if ctx.dialect.embedded_instances {
            list.push(flag("dnp", self.dnp));
        }
        list.push(ctx.uuid(self.id));
        for (key, value) in &self.properties {
            list.push(self.property_sexpr(key, value, ctx));
        }
        for pin in &self.pins {
            list.push(Self::pin_sexpr(pin, ctx));
        }
        if ctx.dialect.embedded_instances {
            list.push(self.instances_sexpr(ctx));
        }
        list
    }

    /// Bring an existing `(symbol ...)` subtree in line with `self`.
    pub(crate) fn write_into(&self, list: &mut List, ctx: &WriteContext) {
        let old_position = list
            .child("at")
            .and_then(|at| Some(Point::new(at.number_at(1)?, at.number_at(2)?)));

        if let Some(lib_name) = &self.lib_name {
            let index = ensure_child(list, "lib_name", &[], || List::new("lib_name"));
            if let Some(node) = list_at(list, index) {
                node.set_string(1, lib_name);
            }
        }
        let index = ensure_child(list, "lib_id", &["lib_name"], || List::new("lib_id"));
        if let Some(node) = list_at(list, index) {
            node.set_string(1, &self.lib_id);
        }

        let index = ensure_child(list, "at", &["lib_id"], || List::new("at"));
        if let Some(node) = list_at(list, index) {
            set_point(node, self.position);
            node.set_number(3, self.rotation.degrees());
        }

        match (self.mirror, list.position("mirror")) {
            (Some(mirror), Some(index)) => {
                if let Some(node) = list_at(list, index) {
                    node.set_symbol(1, mirror.as_str());
                }
            }
            (Some(mirror), None) => {
                ensure_child(list, "mirror", &["at"], || {
                    List::new("mirror").with(SExpr::symbol(mirror.as_str()))
                });
            }
            (None, Some(index)) => {
                list.remove(index);
            }
            (None, None) => {}
        }

        let index = ensure_child(list, "unit", &["at", "mirror"], || List::new("unit"));
        if let Some(node) = list_at(list, index) {
            node.set_number(1, self.unit as f64);
        }

        let flags_after = ["unit", "exclude_from_sim", "in_bom", "on_board"];
        set_flag(list, "in_bom", self.in_bom, true, &flags_after);
        set_flag(list, "on_board", self.on_board, true, &flags_after);
        set_flag(list, "dnp", self.dnp, false, &flags_after);

        let delta = old_position
            .map(|old| self.position - old)
            .filter(|delta| *delta != Point::default());
        self.write_properties(list, delta, ctx);
        self.write_pins(list, ctx);
        self.write_instance(list);
    }

    fn write_properties(&self, list: &mut List, delta: Option<Point>, ctx: &WriteContext) {
        let mut present = HashSet::new();
        let mut stale = Vec::new();
        for index in 1..list.len() {
            let Some(node) = list_at(list, index) else {
                continue;
            };
            if node.tag() != Some("property") {
                continue;
            }
            let Some(key) = node.str_at(1).map(str::to_owned) else {
                continue;
            };
            match self.property(&key) {
                Some(value) => {
                    let value = match &self.field_reference {
                        Some((field, annotation))
                            if key == REFERENCE && annotation.as_str() == value =>
                        {
                            field.as_str()
                        }
                        _ => value,
                    };
                    node.set_string(2, value);
                    if let (Some(delta), Some(at)) = (delta, node.child_mut("at")) {
                        // fields travel with the symbol
                        if let (Some(x), Some(y)) = (at.number_at(1), at.number_at(2)) {
                            at.set_number(1, round_iu(x + delta.x));
                            at.set_number(2, round_iu(y + delta.y));
                        }
                    }
                    present.insert(key);
                }
                None => stale.push(index),
            }
        }
        for index in stale.into_iter().rev() {
            list.remove(index);
        }

        let mut insert_at = list
            .rposition("property")
            .or_else(|| list.rposition("uuid"))
            .map_or(list.len(), |index| index + 1);
        for (key, value) in &self.properties {
            if present.contains(key) {
                continue;
            }
            list.insert(insert_at, self.property_sexpr(key, value, ctx));
            insert_at += 1;
        }
    }

    fn write_pins(&self, list: &mut List, ctx: &WriteContext) {
        let wanted: HashSet<&str> = self.pins.iter().map(|pin| pin.number.as_str()).collect();
        let mut present = HashSet::new();
        let mut index = list.len();
        while index > 1 {
            index -= 1;
            let Some(node) = list.get(index).and_then(SExpr::as_list) else {
                continue;
            };
            if node.tag() != Some("pin") {
                continue;
            }
            let number = node.str_at(1).unwrap_or_default().to_owned();
            if wanted.contains(number.as_str()) {
                present.insert(number);
            } else {
                list.remove(index);
            }
        }

        let mut insert_at = list
            .rposition("pin")
            .or_else(|| list.rposition("property"))
            .map_or(list.len(), |index| index + 1);
        for pin in &self.pins {
            if present.contains(&pin.number) {
                continue;
            }
            list.insert(insert_at, Self::pin_sexpr(pin, ctx));
            insert_at += 1;
        }
    }

    /// Keep the annotated reference and unit of the first sheet instance in step.
    fn write_instance(&self, list: &mut List) {
        let Some(path) = list
            .child_mut("instances")
            .and_then(|instances| instances.child_mut("project"))
            .and_then(|project| project.child_mut("path"))
        else {
            return;
        };
        let index = ensure_child(path, "reference", &[], || List::new("reference"));
        if let Some(node) = list_at(path, index) {
            node.set_string(1, self.reference());
        }
        let index = ensure_child(path, "unit", &["reference"], || List::new("unit"));
        if let Some(node) = list_at(path, index) {
            node.set_number(1, self.unit as f64);
        }
    }

    /// Entry for the root `(symbol_instances ...)` table of KiCad 6 files.
    pub(crate) fn symbol_instance_sexpr(&self) -> List {
        List::new("path")
            .with(SExpr::string(format!("/{}", self.id)))
            .with(List::new("reference").with(SExpr::string(self.reference())))
            .with(List::new("unit").with(SExpr::number(self.unit as f64)))
            .with(List::new("value").with(SExpr::string(self.value())))
            .with(List::new("footprint").with(SExpr::string(self.footprint())))
    }

    pub(crate) fn write_symbol_instance(&self, path: &mut List) {
        for (label, value) in [
            ("reference", self.reference()),
            ("value", self.value()),
            ("footprint", self.footprint()),
        ] {
            if let Some(node) = path.child_mut(label) {
                node.set_string(1, value);
            }
        }
        if let Some(node) = path.child_mut("unit") {
            node.set_number(1, self.unit as f64);
        }
    }
}

impl Wire {
    pub(crate) fn to_sexpr(&self, ctx: &WriteContext) -> List {
        List::new("wire")
            .with(List::new("pts").with(xy(self.start)).with(xy(self.end)))
            .with(
                List::new("stroke")
                    .with(List::new("width").with(SExpr::number(0.0)))
                    .with(List::new("type").with(SExpr::symbol("default"))),
            )
            .with(ctx.uuid(self.id))
    }

    pub(crate) fn write_into(&self, list: &mut List) {
        let Some(pts) = list.child_mut("pts") else {
            return;
        };
        let mut points = [self.start, self.end].into_iter();
        for node in pts.lists_mut().filter(|node| node.tag() == Some("xy")) {
            match points.next() {
                Some(point) => set_point(node, point),
                None => break,
            }
        }
    }
}

impl Junction {
    pub(crate) fn to_sexpr(&self, ctx: &WriteContext) -> List {
        List::new("junction")
            .with(at(self.position, None))
            .with(List::new("diameter").with(SExpr::number(0.0)))
            .with(
                List::new("color")
                    .with(SExpr::number(0.0))
                    .with(SExpr::number(0.0))
                    .with(SExpr::number(0.0))
                    .with(SExpr::number(0.0)),
            )
            .with(ctx.uuid(self.id))
    }

    pub(crate) fn write_into(&self, list: &mut List) {
        if let Some(node) = list.child_mut("at") {
            set_point(node, self.position);
        }
    }
}

impl Label {
    pub(crate) fn to_sexpr(&self, ctx: &WriteContext) -> List {
        let mut list = List::new(self.kind.tag()).with(SExpr::string(self.text.as_str()));
        if let Some(shape) = &self.shape {
            list.push(List::new("shape").with(SExpr::symbol(shape.as_str())));
        }
        list.push(at(self.position, Some(self.rotation.degrees())));
        let justify = match self.kind {
            LabelKind::Local => List::new("justify")
                .with(SExpr::symbol("left"))
                .with(SExpr::symbol("bottom")),
            _ => List::new("justify").with(SExpr::symbol("left")),
        };
        let mut effects = ctx.effects(false);
        effects.push(justify);
        list.push(effects);
        list.push(ctx.uuid(self.id));
        list
    }

    pub(crate) fn write_into(&self, list: &mut List) {
        list.set_string(1, &self.text);
        match (&self.shape, list.position("shape")) {
            (Some(shape), Some(index)) => {
                if let Some(node) = list_at(list, index) {
                    node.set_symbol(1, shape);
                }
            }
            (Some(shape), None) => {
                list.insert(2, List::new("shape").with(SExpr::symbol(shape.as_str())));
            }
            (None, Some(index)) => {
                list.remove(index);
            }
            (None, None) => {}
        }
        if let Some(node) = list.child_mut("at") {
            set_point(node, self.position);
            node.set_number(3, self.rotation.degrees());
        }
    }
}
