//! Writing pending edits back into the tree.
//!
//! Edits are recorded per element in a [`DirtySet`]. [`Document::sync`] first checks every
//! pending change against the tree's anchors and only then touches the tree, so a failed sync
//! leaves both the tree and the pending changes as they were.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};
use uuid::Uuid;

use crate::{
    collections::Components,
    error::DocumentError,
    model::{ElementKind, WriteContext},
    sexpr::{List, SExpr},
};

use super::Document;

/// Order of root-level items in a schematic written by KiCad.
const ORDER: [&str; 25] = [
    "version",
    "generator",
    "generator_version",
    "uuid",
    "paper",
    "title_block",
    "lib_symbols",
    "junction",
    "no_connect",
    "bus_entry",
    "wire",
    "bus",
    "image",
    "polyline",
    "text",
    "text_box",
    "label",
    "global_label",
    "hierarchical_label",
    "netclass_flag",
    "symbol",
    "sheet",
    "sheet_instances",
    "symbol_instances",
    "embedded_fonts",
];

const RANKS: usize = ORDER.len();

fn rank(tag: &str) -> Option<usize> {
    ORDER.iter().position(|known| *known == tag)
}

fn rank_of(item: &SExpr) -> Option<usize> {
    item.as_list().and_then(List::tag).and_then(rank)
}

/// Where a new root item tagged `tag` goes: right after the last item of the same or an
/// earlier rank, or first when there is none. Unknown tags are appended.
pub(crate) fn insert_position(root: &List, tag: &str) -> usize {
    let Some(rank) = rank(tag) else {
        return root.len();
    };
    root.items()
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, item)| rank_of(item).is_some_and(|other| other <= rank))
        .map(|(index, _)| index + 1)
        .last()
        .unwrap_or(1)
}

/// Insert position per rank once `removed` items are gone, computed in one pass.
fn insertion_slots(root: &List, removed: &HashSet<usize>) -> [usize; RANKS] {
    let mut last = [None; RANKS];
    for (index, item) in root.items().iter().enumerate().skip(1) {
        if removed.contains(&index) {
            continue;
        }
        if let Some(rank) = rank_of(item) {
            last[rank] = Some(index);
        }
    }
    let mut slots = [1; RANKS];
    let mut best: Option<usize> = None;
    for (rank, slot) in slots.iter_mut().enumerate() {
        best = best.max(last[rank]);
        *slot = best.map_or(1, |index| index + 1);
    }
    slots
}

fn anchor_kind(tag: &str) -> Option<ElementKind> {
    match tag {
        "symbol" => Some(ElementKind::Component),
        "wire" => Some(ElementKind::Wire),
        "junction" => Some(ElementKind::Junction),
        "label" | "global_label" | "hierarchical_label" => Some(ElementKind::Label),
        _ => None,
    }
}

/// Root index of every managed element's subtree. The first subtree wins on duplicate uuids.
fn anchors(root: &List) -> HashMap<(ElementKind, Uuid), usize> {
    let mut anchors = HashMap::new();
    for (index, item) in root.items().iter().enumerate().skip(1) {
        let Some(list) = item.as_list() else {
            continue;
        };
        let Some(kind) = list.tag().and_then(anchor_kind) else {
            continue;
        };
        if let Some(id) = list.value("uuid").and_then(|id| Uuid::parse_str(id).ok()) {
            anchors.entry((kind, id)).or_insert(index);
        }
    }
    anchors
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Change {
    Added,
    Modified,
    Removed,
}

/// Pending changes, one per element, in the order they were first made.
#[derive(Debug, Clone, Default)]
pub(crate) struct DirtySet {
    order: Vec<(ElementKind, Uuid)>,
    changes: HashMap<(ElementKind, Uuid), Change>,
}

impl DirtySet {
    /// Record a change, folding it into what is already pending for the element.
    pub(crate) fn mark(&mut self, kind: ElementKind, id: Uuid, change: Change) {
        let key = (kind, id);
        match (self.changes.get(&key).copied(), change) {
            (None, change) => {
                self.order.push(key);
                self.changes.insert(key, change);
            }
            (Some(Change::Added), Change::Modified) => {}
            // never reached the tree
            (Some(Change::Added), Change::Removed) => {
                self.changes.remove(&key);
                self.order.retain(|pending| *pending != key);
            }
            (Some(Change::Removed), Change::Added) => {
                self.changes.insert(key, Change::Modified);
            }
            (Some(_), change) => {
                self.changes.insert(key, change);
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.changes.len()
    }

    fn entries(&self) -> Vec<(ElementKind, Uuid, Change)> {
        self.order
            .iter()
            .filter_map(|&(kind, id)| {
                let change = self.changes.get(&(kind, id))?;
                Some((kind, id, *change))
            })
            .collect()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.changes.clear();
    }
}

#[derive(Debug, Default)]
struct Plan {
    patches: Vec<(usize, ElementKind, Uuid)>,
    removals: HashSet<usize>,
    additions: Vec<(ElementKind, Uuid)>,
    /// Component changes mirrored into a root `symbol_instances` table
    instances: Vec<(Uuid, Change)>,
}

impl Document {
    /// Write every pending edit into the tree.
    ///
    /// Modified elements are patched in place, removed ones dropped and new ones inserted at
    /// their canonical position. Nothing is written unless every change can be applied; on
    /// error the changes stay pending.
    pub fn sync(&mut self) -> Result<(), DocumentError> {
        if self.dirty.is_empty() {
            self.dirty.clear();
            return Ok(());
        }
        let plan = self.plan(&self.dirty.entries())?;
        let (patched, added, removed) =
            (plan.patches.len(), plan.additions.len(), plan.removals.len());
        self.apply(plan);
        self.dirty.clear();
        debug!(patched, added, removed, "synced tree");
        Ok(())
    }

    fn holds(&self, kind: ElementKind, id: Uuid) -> bool {
        match kind {
            ElementKind::Component => self.components.contains(id),
            ElementKind::Wire => self.wires.contains(id),
            ElementKind::Junction => self.junctions.contains(id),
            ElementKind::Label => self.labels.contains(id),
        }
    }

    fn plan(&self, entries: &[(ElementKind, Uuid, Change)]) -> Result<Plan, DocumentError> {
        let anchors = anchors(self.tree.root());
        let mut plan = Plan::default();
        for &(kind, id, change) in entries {
            let inconsistent = || DocumentError::SyncConsistency {
                kind: kind.name(),
                id,
            };
            let anchor = anchors.get(&(kind, id)).copied();
            match change {
                Change::Added => {
                    if anchor.is_some() || !self.holds(kind, id) {
                        return Err(inconsistent());
                    }
                    plan.additions.push((kind, id));
                }
                Change::Modified => {
                    let index = anchor
                        .filter(|_| self.holds(kind, id))
                        .ok_or_else(inconsistent)?;
                    plan.patches.push((index, kind, id));
                }
                Change::Removed => {
                    let index = anchor.ok_or_else(inconsistent)?;
                    plan.removals.insert(index);
                }
            }
            if kind == ElementKind::Component {
                plan.instances.push((id, change));
            }
        }
        Ok(plan)
    }

    /// Carry out a checked plan. Cannot fail.
    fn apply(&mut self, plan: Plan) {
        let root_path = self.root_path();
        let ctx = WriteContext {
            dialect: &self.dialect,
            project: &self.project,
            root_path,
        };
        let root = self.tree.root_mut();

        for &(index, kind, id) in &plan.patches {
            let Some(node) = root.get_mut(index).and_then(SExpr::as_list_mut) else {
                continue;
            };
            match kind {
                ElementKind::Component => {
                    if let Some(component) = self.components.get(id) {
                        component.write_into(node, &ctx);
                    }
                }
                ElementKind::Wire => {
                    if let Some(wire) = self.wires.get(id) {
                        wire.write_into(node);
                    }
                }
                ElementKind::Junction => {
                    if let Some(junction) = self.junctions.get(id) {
                        junction.write_into(node);
                    }
                }
                ElementKind::Label => {
                    if let Some(label) = self.labels.get(id) {
                        label.write_into(node);
                    }
                }
            }
            trace!(kind = kind.name(), %id, "patched");
        }

        if let Some(table) = root.child_mut("symbol_instances") {
            sync_symbol_instances(table, &self.components, &plan.instances);
        }

        let slots = insertion_slots(root, &plan.removals);
        let mut inserts: Vec<(usize, usize, SExpr)> = Vec::new();
        for &(kind, id) in &plan.additions {
            let node = match kind {
                ElementKind::Component => self.components.get(id).map(|c| c.to_sexpr(&ctx)),
                ElementKind::Wire => self.wires.get(id).map(|w| w.to_sexpr(&ctx)),
                ElementKind::Junction => self.junctions.get(id).map(|j| j.to_sexpr(&ctx)),
                ElementKind::Label => self.labels.get(id).map(|l| l.to_sexpr(&ctx)),
            };
            let Some(node) = node else {
                continue;
            };
            let rank = node.tag().and_then(rank).unwrap_or(RANKS - 1);
            inserts.push((slots[rank], rank, node.into()));
        }
        // stable, so equal slots keep the order the elements were added in
        inserts.sort_by_key(|&(at, rank, _)| (at, rank));

        let removals = plan.removals;
        root.splice(
            |index| !removals.contains(&index),
            inserts.into_iter().map(|(at, _, node)| (at, node)).collect(),
        );
    }
}

/// Mirror component changes into the root `(symbol_instances (path "/<uuid>" ...))` table of
/// files written before instances moved into the symbols.
fn sync_symbol_instances(table: &mut List, components: &Components, changes: &[(Uuid, Change)]) {
    for &(id, change) in changes {
        let path = format!("/{id}");
        let index = (1..table.len()).find(|&index| {
            table
                .get(index)
                .and_then(SExpr::as_list)
                .is_some_and(|entry| {
                    entry.tag() == Some("path") && entry.str_at(1) == Some(path.as_str())
                })
        });
        match (change, index) {
            (Change::Removed, Some(index)) => {
                table.remove(index);
            }
            (Change::Removed, None) => {}
            (_, Some(index)) => {
                let entry = table.get_mut(index).and_then(SExpr::as_list_mut);
                if let (Some(component), Some(entry)) = (components.get(id), entry) {
                    component.write_symbol_instance(entry);
                }
            }
            (_, None) => {
                if let Some(component) = components.get(id) {
                    table.push(component.symbol_instance_sexpr());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DocumentError, NewLabel, Point};

    const INPUT: &str = r#"(kicad_sch (version 20231120) (generator "eeschema")
	(lib_symbols)
	(junction (at 10 10) (diameter 0) (color 0 0 0 0) (uuid "3b0f4f1e-0000-4000-8000-000000000001"))
	(wire (pts (xy 10 10) (xy 20 10)) (stroke (width 0) (type default)) (uuid "3b0f4f1e-0000-4000-8000-000000000002"))
	(label "SDA" (at 20 10 0) (effects (font (size 1.27 1.27)) (justify left bottom)) (uuid "3b0f4f1e-0000-4000-8000-000000000003"))
	(sheet_instances (path "/" (page "1")))
)
"#;

    fn id(n: u32) -> Uuid {
        Uuid::parse_str(&format!("3b0f4f1e-0000-4000-8000-{n:012}")).unwrap()
    }

    fn tags(doc: &Document) -> Vec<&str> {
        doc.tree().root().lists().filter_map(List::tag).collect()
    }

    #[test]
    fn dirty_set_folds_changes() {
        let mut dirty = DirtySet::default();
        dirty.mark(ElementKind::Wire, id(1), Change::Added);
        dirty.mark(ElementKind::Wire, id(1), Change::Modified);
        dirty.mark(ElementKind::Wire, id(2), Change::Modified);
        dirty.mark(ElementKind::Wire, id(2), Change::Removed);
        dirty.mark(ElementKind::Wire, id(3), Change::Removed);
        dirty.mark(ElementKind::Wire, id(3), Change::Added);
        assert_eq!(
            dirty.entries(),
            [
                (ElementKind::Wire, id(1), Change::Added),
                (ElementKind::Wire, id(2), Change::Removed),
                (ElementKind::Wire, id(3), Change::Modified),
            ]
        );
        dirty.mark(ElementKind::Wire, id(1), Change::Removed);
        assert_eq!(dirty.len(), 2);
    }

    #[test]
    fn cancelled_additions_leave_nothing_pending() {
        let mut dirty = DirtySet::default();
        for _ in 0..3 {
            dirty.mark(ElementKind::Junction, id(7), Change::Added);
            dirty.mark(ElementKind::Junction, id(7), Change::Removed);
        }
        assert!(dirty.is_empty());
        assert!(dirty.order.is_empty());

        dirty.mark(ElementKind::Junction, id(7), Change::Added);
        assert_eq!(
            dirty.entries(),
            [(ElementKind::Junction, id(7), Change::Added)]
        );
    }

    #[test]
    fn insert_position_follows_kicad_order() {
        let tree = crate::sexpr::parse(INPUT).unwrap();
        let root = tree.root();
        assert_eq!(insert_position(root, "paper"), 3);
        assert_eq!(insert_position(root, "junction"), 5);
        assert_eq!(insert_position(root, "symbol"), 7);
        assert_eq!(insert_position(root, "sheet_instances"), 8);
        assert_eq!(insert_position(root, "something_new"), root.len());
    }

    #[test]
    fn new_elements_land_in_canonical_slots() {
        let mut doc = Document::parse(INPUT).unwrap();
        doc.batch(|doc| {
            doc.labels_mut().add(NewLabel::global("CLK", (30.0, 10.0)))?;
            doc.wires_mut().add((20.0, 10.0), (30.0, 10.0))?;
            doc.junctions_mut().add((20.0, 10.0))?;
            Ok::<_, DocumentError>(())
        })
        .unwrap();
        assert_eq!(
            tags(&doc),
            [
                "version",
                "generator",
                "lib_symbols",
                "junction",
                "junction",
                "wire",
                "wire",
                "label",
                "global_label",
                "sheet_instances"
            ]
        );
    }

    #[test]
    fn patch_keeps_untouched_text() {
        let mut doc = Document::parse(INPUT).unwrap();
        doc.wires_mut()
            .update(id(2), |wire| wire.set_end((25.0, 10.0)))
            .unwrap();
        let text = doc.to_text().unwrap();
        assert_eq!(
            text,
            INPUT.replace("(xy 10 10) (xy 20 10)", "(xy 10 10) (xy 25 10)")
        );
    }

    #[test]
    fn failed_sync_changes_nothing() {
        let mut doc = Document::parse(INPUT).unwrap();
        // drop the wire's subtree behind the document's back
        let index = doc.tree.root().position("wire").unwrap();
        doc.tree.root_mut().remove(index);
        let before = doc.tree().to_string();

        let result = doc.batch(|doc| {
            doc.junctions_mut().add(Point::new(20.0, 10.0))?;
            doc.wires_mut().update(id(2), |wire| wire.set_end((30.0, 10.0)))?;
            Ok::<_, DocumentError>(())
        });
        assert!(
            matches!(result, Err(DocumentError::SyncConsistency { kind: "wire", id: failed }) if failed == id(2)),
            "{result:?}"
        );
        assert_eq!(doc.tree().to_string(), before);
        assert!(doc.is_dirty());
    }

    #[test]
    fn sync_is_idempotent() {
        let mut doc = Document::parse(INPUT).unwrap();
        doc.junctions_mut().add((20.0, 10.0)).unwrap();
        let once = doc.to_text().unwrap();
        doc.sync().unwrap();
        assert_eq!(doc.to_text().unwrap(), once);
        assert!(!doc.is_dirty());
    }
}
