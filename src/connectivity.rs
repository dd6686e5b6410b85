//! Absolute pin positions of placed components.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{library::LibrarySymbol, model::Component, Mirror, Point, Rotation};

/// Place a library-space point (Y up) on the canvas (Y down) the way KiCad's symbol
/// `TRANSFORM` does: flip Y, rotate, then mirror, then offset by the symbol origin.
pub fn transform(origin: Point, rotation: Rotation, mirror: Option<Mirror>, local: Point) -> Point {
    let screen = Point::new(local.x, -local.y);
    let rotated = rotation.apply(screen);
    let placed = match mirror {
        Some(mirror) => mirror.apply(rotated),
        None => rotated,
    };
    (origin + placed).round_iu()
}

/// Pin positions of every placed component, keyed by component uuid.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityIndex {
    pins: HashMap<Uuid, Vec<(String, Point)>>,
}

impl ConnectivityIndex {
    /// Recompute the pins of `component`. Without a definition the component has no pins.
    pub(crate) fn update(&mut self, component: &Component, symbol: Option<&LibrarySymbol>) {
        let Some(symbol) = symbol else {
            self.pins.remove(&component.id());
            return;
        };
        let mut pins: Vec<(String, Point)> = Vec::new();
        for pin in symbol.pins_for_unit(component.unit()) {
            // stacked pins share a number; the first one wins
            if pins.iter().any(|(number, _)| *number == pin.number) {
                continue;
            }
            let position = transform(
                component.position(),
                component.rotation(),
                component.mirror(),
                pin.position,
            );
            pins.push((pin.number.clone(), position));
        }
        self.pins.insert(component.id(), pins);
    }

    pub(crate) fn remove(&mut self, id: Uuid) {
        self.pins.remove(&id);
    }

    pub fn pins_of(&self, id: Uuid) -> &[(String, Point)] {
        self.pins.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn pin_position(&self, id: Uuid, number: &str) -> Option<Point> {
        self.pins_of(id)
            .iter()
            .find(|(n, _)| n == number)
            .map(|(_, position)| *position)
    }

    /// Every pin located exactly at `point`.
    pub fn pins_at(&self, point: Point) -> Vec<(Uuid, &str)> {
        let point = point.round_iu();
        let mut found: Vec<(Uuid, &str)> = self
            .pins
            .iter()
            .flat_map(|(id, pins)| {
                pins.iter()
                    .filter(move |(_, position)| *position == point)
                    .map(move |(number, _)| (*id, number.as_str()))
            })
            .collect();
        found.sort_unstable();
        found
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}
