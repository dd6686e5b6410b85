//! Read, edit and write KiCad schematic (`.kicad_sch`) documents.
//!
//! Parsing keeps every byte of the input, so a document that is loaded and saved without edits
//! comes back identical, and an edited document only differs where it was edited.
//!
//! ```no_run
//! use kicad_schematic::{Document, NewComponent, Point};
//!
//! let mut doc = Document::load("amplifier.kicad_sch")?;
//! doc.components_mut().update("R1", |r| r.set_value("4k7"))?;
//! doc.save("amplifier.kicad_sch")?;
//! # Ok::<(), kicad_schematic::DocumentError>(())
//! ```

use std::ops::{Add, Sub};

pub mod collections;
pub mod connectivity;
pub mod document;
pub mod error;
pub mod library;
pub mod model;
pub mod reference;
pub mod sexpr;
pub mod validate;

pub use collections::{
    ComponentFilter, ComponentKey, Components, ComponentsMut, Handle, JunctionKey, JunctionsMut,
    LabelsMut, Store, WiresMut,
};
pub use connectivity::ConnectivityIndex;
pub use document::{Batch, Dialect, Document, DocumentOptions, TitleBlock, TitleField};
pub use error::{DocumentError, Location, ParseError};
pub use library::{
    LibraryPin, LibrarySymbol, LibrarySymbolTable, SymbolCache, SymbolLibrary, SymbolResolver,
};
pub use model::{
    Component, Junction, Label, LabelKind, NewComponent, NewLabel, Pin, Sheet, Wire,
};
pub use reference::ReferenceAllocator;
pub use validate::{Issue, IssueKind, Severity};

/// A position on the schematic canvas in millimetres, Y pointing down.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    /// Snap to the schematic's internal unit (100 nm).
    pub fn round_iu(self) -> Self {
        Point {
            x: round_iu(self.x),
            y: round_iu(self.y),
        }
    }
}

pub(crate) fn round_iu(value: f64) -> f64 {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Quarter-turn orientation. Angles are counter-clockwise as seen on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: f64) -> Option<Self> {
        let normalized = degrees.rem_euclid(360.0);
        match normalized {
            d if d == 0.0 => Some(Rotation::Deg0),
            d if d == 90.0 => Some(Rotation::Deg90),
            d if d == 180.0 => Some(Rotation::Deg180),
            d if d == 270.0 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> f64 {
        match self {
            Rotation::Deg0 => 0.0,
            Rotation::Deg90 => 90.0,
            Rotation::Deg180 => 180.0,
            Rotation::Deg270 => 270.0,
        }
    }

    /// Rotate a screen-space (Y down) vector.
    pub fn apply(self, p: Point) -> Point {
        match self {
            Rotation::Deg0 => p,
            Rotation::Deg90 => Point::new(p.y, -p.x),
            Rotation::Deg180 => Point::new(-p.x, -p.y),
            Rotation::Deg270 => Point::new(-p.y, p.x),
        }
    }
}

/// Mirror axis as written in `(mirror x)` / `(mirror y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mirror {
    /// Mirrored about the X axis, Y is negated
    X,
    /// Mirrored about the Y axis, X is negated
    Y,
}

impl Mirror {
    pub fn apply(self, p: Point) -> Point {
        match self {
            Mirror::X => Point::new(p.x, -p.y),
            Mirror::Y => Point::new(-p.x, p.y),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mirror::X => "x",
            Mirror::Y => "y",
        }
    }

    pub fn parse(axis: &str) -> Option<Self> {
        match axis {
            "x" => Some(Mirror::X),
            "y" => Some(Mirror::Y),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case(0.0, Some(Rotation::Deg0))]
    #[case(90.0, Some(Rotation::Deg90))]
    #[case(-90.0, Some(Rotation::Deg270))]
    #[case(450.0, Some(Rotation::Deg90))]
    #[case(45.0, None)]
    fn rotation_from_degrees(#[case] degrees: f64, #[case] expected: Option<Rotation>) {
        assert_eq!(Rotation::from_degrees(degrees), expected);
    }

    #[test]
    fn quarter_turns_compose() {
        let p = Point::new(1.0, 2.0);
        let twice = Rotation::Deg90.apply(Rotation::Deg90.apply(p));
        assert_eq!(twice, Rotation::Deg180.apply(p));
    }

    #[test]
    fn rounding_snaps_to_internal_units() {
        assert_eq!(Point::new(100.0 - 3.81, 0.00004).round_iu(), Point::new(96.19, 0.0));
    }
}
