use uuid::Uuid;

use crate::{
    error::{Location, ParseError},
    sexpr::{List, SExpr},
    Mirror, Point, Rotation,
};

use super::{Component, Junction, Label, LabelKind, Pin, Sheet, Wire, REFERENCE};

/// The text a tree was parsed from, used to turn byte offsets into locations in grammar
/// errors. Trees that were not parsed from text report synthesized locations.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Source<'s> {
    text: Option<&'s str>,
}

impl<'s> Source<'s> {
    pub(crate) fn new(text: &'s str) -> Self {
        Source { text: Some(text) }
    }

    pub(crate) fn detached() -> Self {
        Source { text: None }
    }

    pub(crate) fn at(&self, list: &List) -> Location {
        match (self.text, list.offset()) {
            (Some(text), Some(offset)) => Location::from_offset(text, offset),
            _ => Location::synthesized(),
        }
    }

    pub(crate) fn missing(&self, parent: &List, child: &str) -> ParseError {
        ParseError::MissingChild {
            child: child.to_owned(),
            parent: parent.tag().unwrap_or_default().to_owned(),
            at: self.at(parent),
        }
    }

    pub(crate) fn unexpected(&self, list: &List, index: usize, expected: &str) -> ParseError {
        ParseError::UnexpectedNode {
            expected: expected.to_owned(),
            found: list
                .get(index)
                .map_or_else(|| "end of list".to_owned(), SExpr::describe),
            at: self.at(list),
        }
    }

    pub(crate) fn child<'l>(&self, parent: &'l List, label: &str) -> Result<&'l List, ParseError> {
        parent
            .child(label)
            .ok_or_else(|| self.missing(parent, label))
    }

    pub(crate) fn string<'l>(
        &self,
        list: &'l List,
        index: usize,
        expected: &str,
    ) -> Result<&'l str, ParseError> {
        list.str_at(index)
            .ok_or_else(|| self.unexpected(list, index, expected))
    }

    pub(crate) fn number(&self, list: &List, index: usize, expected: &str) -> Result<f64, ParseError> {
        list.number_at(index)
            .ok_or_else(|| self.unexpected(list, index, expected))
    }

    /// `(uuid ...)` child of `parent`; KiCad 6 writes it bare, KiCad 8 quoted.
    pub(crate) fn uuid(&self, parent: &List) -> Result<Uuid, ParseError> {
        let node = self.child(parent, "uuid")?;
        let text = self.string(node, 1, "uuid")?;
        Uuid::parse_str(text).map_err(|_| self.unexpected(node, 1, "uuid"))
    }

    pub(crate) fn point(&self, list: &List) -> Result<Point, ParseError> {
        Ok(Point::new(
            self.number(list, 1, "x coordinate")?,
            self.number(list, 2, "y coordinate")?,
        ))
    }

    /// `(at x y [angle])`, the angle restricted to quarter turns.
    pub(crate) fn placement(&self, parent: &List) -> Result<(Point, Rotation), ParseError> {
        let at = self.child(parent, "at")?;
        let position = self.point(at)?;
        let rotation = match at.number_at(3) {
            None => Rotation::Deg0,
            Some(angle) => Rotation::from_degrees(angle)
                .ok_or_else(|| self.unexpected(at, 3, "quarter-turn rotation"))?,
        };
        Ok((position, rotation))
    }

    /// `(label yes)`/`(label no)`; absent flags take `default`.
    pub(crate) fn flag(&self, parent: &List, label: &str, default: bool) -> Result<bool, ParseError> {
        match parent.child(label) {
            None => Ok(default),
            Some(node) => match node.str_at(1) {
                Some("yes") => Ok(true),
                Some("no") => Ok(false),
                // a flag without argument means yes
                None => Ok(true),
                Some(_) => Err(self.unexpected(node, 1, "yes or no")),
            },
        }
    }
}

impl Component {
    pub(crate) fn read(list: &List, src: &Source) -> Result<Self, ParseError> {
        let lib_id = src.string(src.child(list, "lib_id")?, 1, "library id")?;
        let (position, rotation) = src.placement(list)?;
        let mirror = match list.child("mirror") {
            None => None,
            Some(node) => Some(
                node.str_at(1)
                    .and_then(Mirror::parse)
                    .ok_or_else(|| src.unexpected(node, 1, "mirror axis x or y"))?,
            ),
        };
        let unit = match list.child("unit") {
            None => 1,
            Some(node) => src.number(node, 1, "unit number")? as u32,
        };

        let mut properties = Vec::new();
        for property in list.children("property") {
            let key = src.string(property, 1, "property name")?;
            let value = src.string(property, 2, "property value")?;
            properties.push((key.to_owned(), value.to_owned()));
        }

        let mut pins = Vec::new();
        for pin in list.children("pin") {
            let number = src.string(pin, 1, "pin number")?;
            let id = match pin.child("uuid") {
                Some(_) => src.uuid(pin)?,
                None => Uuid::new_v4(),
            };
            pins.push(Pin {
                number: number.to_owned(),
                id,
            });
        }

        let mut component = Component {
            id: src.uuid(list)?,
            lib_id: lib_id.to_owned(),
            lib_name: list.value("lib_name").map(str::to_owned),
            position,
            rotation,
            mirror,
            unit,
            in_bom: src.flag(list, "in_bom", true)?,
            on_board: src.flag(list, "on_board", true)?,
            dnp: src.flag(list, "dnp", false)?,
            properties,
            pins,
            field_reference: None,
        };

        // the annotated reference of this sheet instance wins over the field
        if let Some(reference) = instance_reference(list) {
            let field = component.reference().to_owned();
            if field != reference {
                component.field_reference = Some((field, reference.to_owned()));
            }
            component.set_property(REFERENCE, reference);
        }
        Ok(component)
    }
}

fn instance_reference(list: &List) -> Option<&str> {
    list.child("instances")?
        .child("project")?
        .child("path")?
        .value("reference")
}

impl Wire {
    pub(crate) fn read(list: &List, src: &Source) -> Result<Self, ParseError> {
        let pts = src.child(list, "pts")?;
        let points = pts
            .children("xy")
            .map(|xy| src.point(xy))
            .collect::<Result<Vec<_>, _>>()?;
        let [start, end] = points.as_slice() else {
            return Err(ParseError::UnexpectedNode {
                expected: "two points".to_owned(),
                found: format!("{} points", points.len()),
                at: src.at(pts),
            });
        };
        Ok(Wire {
            id: src.uuid(list)?,
            start: *start,
            end: *end,
        })
    }
}

impl Junction {
    pub(crate) fn read(list: &List, src: &Source) -> Result<Self, ParseError> {
        Ok(Junction {
            id: src.uuid(list)?,
            position: src.point(src.child(list, "at")?)?,
        })
    }
}

impl Label {
    pub(crate) fn read(list: &List, src: &Source) -> Result<Self, ParseError> {
        let kind = list
            .tag()
            .and_then(LabelKind::from_tag)
            .ok_or_else(|| src.unexpected(list, 0, "label"))?;
        let text = src.string(list, 1, "label text")?;
        let (position, rotation) = src.placement(list)?;
        Ok(Label {
            id: src.uuid(list)?,
            kind,
            text: text.to_owned(),
            position,
            rotation,
            shape: list.value("shape").map(str::to_owned),
        })
    }
}

impl Sheet {
    pub(crate) fn read(list: &List, src: &Source) -> Result<Self, ParseError> {
        // KiCad 6 spells the fields "Sheet name"/"Sheet file", later versions without the space
        let field = |names: [&str; 2]| {
            list.children("property")
                .find(|p| p.str_at(1).is_some_and(|key| names.contains(&key)))
                .and_then(|p| p.str_at(2))
                .unwrap_or_default()
                .to_owned()
        };
        Ok(Sheet {
            id: src.uuid(list)?,
            name: field(["Sheetname", "Sheet name"]),
            file: field(["Sheetfile", "Sheet file"]),
            position: src.point(src.child(list, "at")?)?,
            size: src.point(src.child(list, "size")?)?,
        })
    }
}
