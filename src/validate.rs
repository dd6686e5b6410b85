//! Consistency checks over the object model.

use std::{collections::HashSet, fmt::Display};

use tracing::debug;
use uuid::Uuid;

use crate::{document::Document, library::LibrarySymbol, model::Component};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    ReferenceCollision,
    UnannotatedReference,
    UnknownPin,
    MissingLibrarySymbol,
    InvalidUnit,
    ZeroLengthWire,
    DanglingJunction,
    UnusedLibrarySymbol,
}

impl IssueKind {
    pub fn severity(self) -> Severity {
        match self {
            IssueKind::ReferenceCollision
            | IssueKind::MissingLibrarySymbol
            | IssueKind::InvalidUnit => Severity::Error,
            IssueKind::UnannotatedReference
            | IssueKind::UnknownPin
            | IssueKind::ZeroLengthWire
            | IssueKind::DanglingJunction => Severity::Warning,
            IssueKind::UnusedLibrarySymbol => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    /// The element at fault, when there is one
    pub element: Option<Uuid>,
}

impl Issue {
    fn new(kind: IssueKind, message: String, element: Option<Uuid>) -> Self {
        Issue {
            kind,
            severity: kind.severity(),
            message,
            element,
        }
    }
}

impl Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.severity, self.message)
    }
}

fn check_component(
    component: &Component,
    symbol: Option<&LibrarySymbol>,
    issues: &mut Vec<Issue>,
) {
    let id = Some(component.id());
    let reference = component.reference();
    if !component.is_annotated() {
        issues.push(Issue::new(
            IssueKind::UnannotatedReference,
            format!("{reference} ({}) is not annotated", component.lib_id()),
            id,
        ));
    }
    let Some(symbol) = symbol else {
        issues.push(Issue::new(
            IssueKind::MissingLibrarySymbol,
            format!("{reference}: no library symbol {}", component.library_key()),
            id,
        ));
        return;
    };
    if !symbol.has_unit(component.unit()) {
        issues.push(Issue::new(
            IssueKind::InvalidUnit,
            format!(
                "{reference}: unit {} does not exist on {}, which has {}",
                component.unit(),
                symbol.lib_id(),
                symbol.unit_count()
            ),
            id,
        ));
        return;
    }
    for pin in component.pins() {
        if symbol
            .pins_for_unit(component.unit())
            .all(|library_pin| library_pin.number != pin.number)
        {
            issues.push(Issue::new(
                IssueKind::UnknownPin,
                format!("{reference}: pin {} is not on {}", pin.number, symbol.lib_id()),
                id,
            ));
        }
    }
}

impl Document {
    /// Report problems without changing anything. Issues come in document order, errors
    /// and warnings before the library summary.
    pub fn validate(&self) -> Vec<Issue> {
        let mut issues = Vec::new();

        for component in &self.components {
            if component.is_annotated()
                && self.components.collides(
                    component.reference(),
                    component.lib_id(),
                    component.unit(),
                    Some(component.id()),
                )
            {
                issues.push(Issue::new(
                    IssueKind::ReferenceCollision,
                    format!("{} is used by more than one component", component.reference()),
                    Some(component.id()),
                ));
            }
            check_component(
                component,
                self.library.get(component.library_key()),
                &mut issues,
            );
        }

        for wire in &self.wires {
            if wire.is_empty() {
                issues.push(Issue::new(
                    IssueKind::ZeroLengthWire,
                    format!(
                        "wire at ({}, {}) has zero length",
                        wire.start().x,
                        wire.start().y
                    ),
                    Some(wire.id()),
                ));
            }
        }

        for junction in &self.junctions {
            let at = junction.position();
            if self.wires.touching(at).is_empty() && self.connectivity.pins_at(at).is_empty() {
                issues.push(Issue::new(
                    IssueKind::DanglingJunction,
                    format!("junction at ({}, {}) connects nothing", at.x, at.y),
                    Some(junction.id()),
                ));
            }
        }

        let used: HashSet<&str> = self
            .components
            .iter()
            .map(Component::library_key)
            .collect();
        for symbol in &self.library {
            if !used.contains(symbol.lib_id()) {
                issues.push(Issue::new(
                    IssueKind::UnusedLibrarySymbol,
                    format!("library symbol {} is not used", symbol.lib_id()),
                    None,
                ));
            }
        }

        debug!(issues = issues.len(), "validated schematic");
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DocumentError, NewComponent};

    fn document() -> Document {
        let mut doc = Document::new().with_resolver(|lib_id: &str| {
            let symbol = LibrarySymbol::builder(lib_id)
                .reference("R")
                .pin("1", (0.0, 3.81))
                .pin("2", (0.0, -3.81))
                .build();
            Some(symbol)
        });
        doc.components_mut()
            .add(NewComponent::new("Device:R", (100.0, 100.0)))
            .unwrap();
        doc
    }

    fn kinds(doc: &Document) -> Vec<IssueKind> {
        doc.validate().into_iter().map(|issue| issue.kind).collect()
    }

    #[test]
    fn clean_document_has_no_issues() {
        assert!(document().validate().is_empty());
    }

    #[test]
    fn reports_wiring_problems() {
        let mut doc = document();
        doc.batch(|doc| {
            doc.wires_mut().add((50.0, 50.0), (50.0, 50.0))?;
            doc.junctions_mut().add((70.0, 70.0))?;
            // on a pin, so connected
            doc.junctions_mut().add((100.0, 96.19))?;
            Ok::<_, DocumentError>(())
        })
        .unwrap();
        assert_eq!(
            kinds(&doc),
            [IssueKind::ZeroLengthWire, IssueKind::DanglingJunction]
        );
    }

    #[test]
    fn reports_component_problems() {
        let mut doc = document();
        doc.components_mut()
            .add(NewComponent::new("Device:R", (120.0, 100.0)))
            .unwrap();
        doc.components_mut()
            .update("R2", |r| r.set_reference("R?"))
            .unwrap();
        doc.components_mut()
            .update("R1", |r| r.pins.push(crate::Pin::new("3")))
            .unwrap();
        let issues = doc.validate();
        assert_eq!(
            issues.iter().map(|issue| issue.kind).collect::<Vec<_>>(),
            [IssueKind::UnknownPin, IssueKind::UnannotatedReference]
        );
        assert_eq!(issues[0].severity, Severity::Warning);
    }

    #[test]
    fn reports_collisions_on_both_components() {
        let mut doc = document();
        let second = doc
            .components_mut()
            .add(NewComponent::new("Device:R", (120.0, 100.0)))
            .unwrap()
            .id();
        // as loaded from a file annotated by hand
        doc.components.get_mut(second).unwrap().set_reference("R1");
        doc.components.reindex(second, "R2", "R1");
        assert_eq!(
            kinds(&doc),
            [IssueKind::ReferenceCollision, IssueKind::ReferenceCollision]
        );
    }

    #[test]
    fn unused_definitions_are_informational() {
        let mut doc = document();
        doc.components_mut().remove("R1").unwrap();
        let issues = doc.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::UnusedLibrarySymbol);
        assert_eq!(issues[0].severity, Severity::Info);
        assert_eq!(issues[0].element, None);
    }
}
