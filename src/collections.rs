//! Element collections and their mutable views.
//!
//! Read access goes through [`Components`] and [`Store`]. Edits go through the `*Mut` views
//! returned by [`Document::components_mut`] and friends, which keep the reference allocator,
//! the connectivity index and the dirty set in step with every change.

use std::{
    collections::HashMap,
    fmt::Display,
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::Deref,
};

use tracing::debug;
use uuid::Uuid;

use crate::{
    document::{sync::Change, Document},
    error::DocumentError,
    model::{
        Component, Element, ElementKind, Junction, Label, NewComponent, NewLabel, Pin, Wire,
        DATASHEET, FOOTPRINT, REFERENCE, VALUE,
    },
    reference::{split_reference, ReferenceAllocator},
    Point,
};

/// Typed id of an element in a document.
pub struct Handle<T> {
    id: Uuid,
    marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub(crate) fn new(id: Uuid) -> Self {
        Handle {
            id,
            marker: PhantomData,
        }
    }

    pub fn id(self) -> Uuid {
        self.id
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({})", self.id)
    }
}

impl<T> From<Handle<T>> for Uuid {
    fn from(handle: Handle<T>) -> Self {
        handle.id
    }
}

/// How a component is looked up: by uuid or by reference designator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentKey {
    Id(Uuid),
    Reference(String),
}

impl From<Uuid> for ComponentKey {
    fn from(id: Uuid) -> Self {
        ComponentKey::Id(id)
    }
}

impl From<Handle<Component>> for ComponentKey {
    fn from(handle: Handle<Component>) -> Self {
        ComponentKey::Id(handle.id)
    }
}

impl From<&Component> for ComponentKey {
    fn from(component: &Component) -> Self {
        ComponentKey::Id(component.id())
    }
}

impl From<&str> for ComponentKey {
    fn from(reference: &str) -> Self {
        ComponentKey::Reference(reference.to_owned())
    }
}

impl From<String> for ComponentKey {
    fn from(reference: String) -> Self {
        ComponentKey::Reference(reference)
    }
}

impl From<&String> for ComponentKey {
    fn from(reference: &String) -> Self {
        ComponentKey::Reference(reference.clone())
    }
}

impl Display for ComponentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentKey::Id(id) => write!(f, "{id}"),
            ComponentKey::Reference(reference) => f.write_str(reference),
        }
    }
}

/// Junctions can also be addressed by where they sit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JunctionKey {
    Id(Uuid),
    At(Point),
}

impl From<Uuid> for JunctionKey {
    fn from(id: Uuid) -> Self {
        JunctionKey::Id(id)
    }
}

impl From<Handle<Junction>> for JunctionKey {
    fn from(handle: Handle<Junction>) -> Self {
        JunctionKey::Id(handle.id)
    }
}

impl From<Point> for JunctionKey {
    fn from(point: Point) -> Self {
        JunctionKey::At(point)
    }
}

/// Elements in document order with a uuid index.
#[derive(Debug, Clone)]
pub struct Store<T> {
    items: Vec<T>,
    index: HashMap<Uuid, usize>,
}

impl<T> Default for Store<T> {
    fn default() -> Self {
        Store {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Element> Store<T> {
    pub fn get(&self, id: impl Into<Uuid>) -> Option<&T> {
        self.index.get(&id.into()).map(|&i| &self.items[i])
    }

    pub fn contains(&self, id: impl Into<Uuid>) -> bool {
        self.index.contains_key(&id.into())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn filter(&self, predicate: impl Fn(&T) -> bool) -> Vec<&T> {
        self.items.iter().filter(|item| predicate(item)).collect()
    }

    /// Returns false, leaving the store unchanged, when the uuid is already present.
    pub(crate) fn insert(&mut self, item: T) -> bool {
        let id = item.id();
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id, self.items.len());
        self.items.push(item);
        true
    }

    pub(crate) fn get_mut(&mut self, id: Uuid) -> Option<&mut T> {
        let index = *self.index.get(&id)?;
        self.items.get_mut(index)
    }

    pub(crate) fn remove(&mut self, id: Uuid) -> Option<T> {
        let index = self.index.remove(&id)?;
        let item = self.items.remove(index);
        for (offset, moved) in self.items[index..].iter().enumerate() {
            self.index.insert(moved.id(), index + offset);
        }
        Some(item)
    }
}

impl<'a, T> IntoIterator for &'a Store<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Store<Junction> {
    pub fn at(&self, point: Point) -> Option<&Junction> {
        let point = point.round_iu();
        self.items.iter().find(|junction| junction.position() == point)
    }
}

impl Store<Label> {
    pub fn named(&self, text: &str) -> Vec<&Label> {
        self.filter(|label| label.text() == text)
    }
}

impl Store<Wire> {
    /// Wires with an endpoint at `point`.
    pub fn touching(&self, point: Point) -> Vec<&Wire> {
        let point = point.round_iu();
        self.filter(|wire| wire.has_endpoint(point))
    }
}

/// Criteria for [`Components::filter`]. Unset criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct ComponentFilter {
    lib_id: Option<String>,
    prefix: Option<String>,
    value: Option<String>,
    property: Option<(String, String)>,
    unit: Option<u32>,
}

impl ComponentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lib_id(mut self, lib_id: impl Into<String>) -> Self {
        self.lib_id = Some(lib_id.into());
        self
    }

    /// Reference prefix, `R` matches `R1` and `R?` but not `RV1`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into().to_uppercase());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.property = Some((key.into(), value.into()));
        self
    }

    pub fn unit(mut self, unit: u32) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn matches(&self, component: &Component) -> bool {
        self.lib_id.as_deref().map_or(true, |id| component.lib_id() == id)
            && self.prefix.as_deref().map_or(true, |prefix| {
                split_reference(&component.reference().to_uppercase()).0 == prefix
            })
            && self.value.as_deref().map_or(true, |v| component.value() == v)
            && self
                .property
                .as_ref()
                .map_or(true, |(k, v)| component.property(k) == Some(v.as_str()))
            && self.unit.map_or(true, |unit| component.unit() == unit)
    }
}

fn reference_key(reference: &str) -> String {
    reference.trim().to_uppercase()
}

/// Placed components with a uuid index and a reference index.
#[derive(Debug, Clone, Default)]
pub struct Components {
    store: Store<Component>,
    by_reference: HashMap<String, Vec<Uuid>>,
}

impl Components {
    /// By uuid, or by reference; a reference shared by several units yields the lowest unit.
    pub fn get(&self, key: impl Into<ComponentKey>) -> Option<&Component> {
        match key.into() {
            ComponentKey::Id(id) => self.store.get(id),
            ComponentKey::Reference(reference) => self
                .by_reference(&reference)
                .into_iter()
                .min_by_key(|component| component.unit()),
        }
    }

    pub fn get_unit(&self, reference: &str, unit: u32) -> Option<&Component> {
        self.by_reference(reference)
            .into_iter()
            .find(|component| component.unit() == unit)
    }

    /// All units carrying `reference`, in document order.
    pub fn by_reference(&self, reference: &str) -> Vec<&Component> {
        self.by_reference
            .get(&reference_key(reference))
            .map(|ids| ids.iter().filter_map(|&id| self.store.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: impl Into<ComponentKey>) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Component> {
        self.store.iter()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn filter(&self, filter: &ComponentFilter) -> Vec<&Component> {
        self.store.filter(|component| filter.matches(component))
    }

    pub(crate) fn resolve(&self, key: &ComponentKey) -> Vec<Uuid> {
        match key {
            ComponentKey::Id(id) if self.store.contains(*id) => vec![*id],
            ComponentKey::Id(_) => Vec::new(),
            ComponentKey::Reference(reference) => self
                .by_reference
                .get(&reference_key(reference))
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Whether `reference` on `unit` of `lib_id` would clash with a component other than
    /// `except`. Units of the same part may share a reference; unannotated ones never clash.
    pub(crate) fn collides(
        &self,
        reference: &str,
        lib_id: &str,
        unit: u32,
        except: Option<Uuid>,
    ) -> bool {
        if reference.ends_with('?') {
            return false;
        }
        self.by_reference(reference).into_iter().any(|other| {
            Some(other.id()) != except && (other.unit() == unit || other.lib_id() != lib_id)
        })
    }

    pub(crate) fn insert(&mut self, component: Component) -> bool {
        let id = component.id();
        let key = reference_key(component.reference());
        if !self.store.insert(component) {
            return false;
        }
        self.by_reference.entry(key).or_default().push(id);
        true
    }

    pub(crate) fn get_mut(&mut self, id: Uuid) -> Option<&mut Component> {
        self.store.get_mut(id)
    }

    pub(crate) fn remove(&mut self, id: Uuid) -> Option<Component> {
        let component = self.store.remove(id)?;
        self.unindex(id, component.reference());
        Some(component)
    }

    pub(crate) fn reindex(&mut self, id: Uuid, old: &str, new: &str) {
        self.unindex(id, old);
        self.by_reference
            .entry(reference_key(new))
            .or_default()
            .push(id);
    }

    fn unindex(&mut self, id: Uuid, reference: &str) {
        let key = reference_key(reference);
        if let Some(ids) = self.by_reference.get_mut(&key) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_reference.remove(&key);
            }
        }
    }
}

impl<'a> IntoIterator for &'a Components {
    type Item = &'a Component;
    type IntoIter = std::slice::Iter<'a, Component>;

    fn into_iter(self) -> Self::IntoIter {
        self.store.iter()
    }
}

/// Pick the reference for a new component.
fn choose_reference(
    components: &Components,
    allocator: &ReferenceAllocator,
    spec: &NewComponent,
    default_prefix: &str,
) -> Result<String, DocumentError> {
    let prefix_of = |reference: &str| -> String {
        match split_reference(reference).0 {
            "" => default_prefix.to_owned(),
            prefix => prefix.to_owned(),
        }
    };
    match spec.reference.as_deref().map(str::trim) {
        None => Ok(allocator.next(default_prefix)),
        Some("") => Err(DocumentError::MissingField("reference")),
        Some(reference) if reference.ends_with('?') => Ok(allocator.next(&prefix_of(reference))),
        Some(reference) if components.collides(reference, &spec.lib_id, spec.unit, None) => {
            if spec.auto_reference {
                Ok(allocator.next(&prefix_of(reference)))
            } else {
                Err(DocumentError::ReferenceCollision(reference.to_owned()))
            }
        }
        Some(reference) => Ok(reference.to_owned()),
    }
}

/// Mutable view of the document's components.
pub struct ComponentsMut<'a> {
    doc: &'a mut Document,
}

impl<'a> ComponentsMut<'a> {
    pub(crate) fn new(doc: &'a mut Document) -> Self {
        ComponentsMut { doc }
    }

    /// Place a new component. The library definition is looked up (and embedded) first, then
    /// the reference is checked or allocated.
    pub fn add(&mut self, spec: NewComponent) -> Result<Handle<Component>, DocumentError> {
        let doc = &mut *self.doc;
        if spec.lib_id.trim().is_empty() {
            return Err(DocumentError::MissingField("lib_id"));
        }
        let id = spec.id.unwrap_or_else(Uuid::new_v4);
        if doc.id_in_use(id) {
            return Err(DocumentError::DuplicateId(id));
        }

        let resolved = doc.resolve_symbol(&spec.lib_id)?;
        let symbol = match &resolved {
            Some(symbol) => symbol,
            None => doc
                .library
                .get(&spec.lib_id)
                .ok_or_else(|| DocumentError::UnresolvedLibrarySymbol(spec.lib_id.clone()))?,
        };
        if !symbol.has_unit(spec.unit) {
            return Err(DocumentError::InvalidUnit {
                lib_id: spec.lib_id.clone(),
                unit: spec.unit,
            });
        }

        let reference = choose_reference(
            &doc.components,
            &doc.references,
            &spec,
            symbol.reference_prefix(),
        )?;
        let name = spec
            .lib_id
            .split_once(':')
            .map_or(spec.lib_id.as_str(), |(_, name)| name);
        let mut properties = vec![
            (REFERENCE.to_owned(), reference.clone()),
            (
                VALUE.to_owned(),
                spec.value
                    .clone()
                    .or_else(|| symbol.property(VALUE).map(str::to_owned))
                    .unwrap_or_else(|| name.to_owned()),
            ),
            (
                FOOTPRINT.to_owned(),
                spec.footprint
                    .clone()
                    .or_else(|| symbol.property(FOOTPRINT).map(str::to_owned))
                    .unwrap_or_default(),
            ),
            (
                DATASHEET.to_owned(),
                symbol.property(DATASHEET).unwrap_or("~").to_owned(),
            ),
        ];
        if let Some(description) = symbol.property("Description") {
            properties.push(("Description".to_owned(), description.to_owned()));
        }

        let mut pins: Vec<Pin> = Vec::new();
        for pin in symbol.pins_for_unit(spec.unit) {
            if !pins.iter().any(|existing| existing.number == pin.number) {
                pins.push(Pin::new(pin.number.as_str()));
            }
        }

        let mut component = Component {
            id,
            lib_id: spec.lib_id.clone(),
            lib_name: None,
            position: spec.position,
            rotation: spec.rotation,
            mirror: spec.mirror,
            unit: spec.unit,
            in_bom: !symbol.is_power(),
            on_board: true,
            dnp: false,
            properties,
            pins,
            field_reference: None,
        };
        for (key, value) in spec.properties {
            component.set_property(&key, value);
        }

        if let Some(symbol) = resolved {
            doc.insert_library_symbol(symbol);
        }
        doc.references.insert(&reference);
        doc.connectivity
            .update(&component, doc.library.get(component.library_key()));
        debug!(reference = reference.as_str(), lib_id = component.lib_id(), %id, "component added");
        doc.components.insert(component);
        doc.dirty.mark(ElementKind::Component, id, Change::Added);
        doc.after_change()?;
        Ok(Handle::new(id))
    }

    /// Edit one component. A reference shared by several units edits the lowest unit.
    ///
    /// Returns `Ok(false)` when nothing matches `key`. A rejected edit is rolled back.
    pub fn update<F>(&mut self, key: impl Into<ComponentKey>, edit: F) -> Result<bool, DocumentError>
    where
        F: FnOnce(&mut Component),
    {
        let doc = &mut *self.doc;
        let Some(id) = doc.components.get(key).map(Component::id) else {
            return Ok(false);
        };
        let Some(component) = doc.components.get_mut(id) else {
            return Ok(false);
        };
        let before = component.clone();
        edit(component);
        component.id = before.id;
        if *component == before {
            return Ok(true);
        }

        let after = component.clone();
        let after = match doc.check_component_edit(&before, after) {
            Ok(after) => after,
            Err(err) => {
                if let Some(component) = doc.components.get_mut(id) {
                    *component = before;
                }
                return Err(err);
            }
        };

        if before.reference() != after.reference() {
            doc.references.release(before.reference());
            doc.references.insert(after.reference());
            doc.components
                .reindex(id, before.reference(), after.reference());
        }
        if after.placement_differs(&before) {
            doc.connectivity
                .update(&after, doc.library.get(after.library_key()));
        }
        if let Some(component) = doc.components.get_mut(id) {
            *component = after;
        }
        doc.dirty.mark(ElementKind::Component, id, Change::Modified);
        doc.after_change()?;
        Ok(true)
    }

    /// Remove by uuid or handle, or every unit of a reference. Wires and labels stay.
    pub fn remove(&mut self, key: impl Into<ComponentKey>) -> Result<bool, DocumentError> {
        let doc = &mut *self.doc;
        let ids = doc.components.resolve(&key.into());
        if ids.is_empty() {
            return Ok(false);
        }
        for id in ids {
            if let Some(component) = doc.components.remove(id) {
                doc.references.release(component.reference());
                doc.connectivity.remove(id);
                doc.dirty.mark(ElementKind::Component, id, Change::Removed);
                debug!(reference = component.reference(), %id, "component removed");
            }
        }
        doc.after_change()?;
        Ok(true)
    }
}

impl Deref for ComponentsMut<'_> {
    type Target = Components;

    fn deref(&self) -> &Components {
        &self.doc.components
    }
}

/// Mutable view of the document's wires.
pub struct WiresMut<'a> {
    doc: &'a mut Document,
}

impl<'a> WiresMut<'a> {
    pub(crate) fn new(doc: &'a mut Document) -> Self {
        WiresMut { doc }
    }

    pub fn add(
        &mut self,
        start: impl Into<Point>,
        end: impl Into<Point>,
    ) -> Result<Handle<Wire>, DocumentError> {
        self.add_with_id(Uuid::new_v4(), start, end)
    }

    pub fn add_with_id(
        &mut self,
        id: Uuid,
        start: impl Into<Point>,
        end: impl Into<Point>,
    ) -> Result<Handle<Wire>, DocumentError> {
        let wire = Wire {
            id,
            start: start.into().round_iu(),
            end: end.into().round_iu(),
        };
        self.doc.add_element(wire, |doc| &mut doc.wires)
    }

    pub fn update<F>(&mut self, id: impl Into<Uuid>, edit: F) -> Result<bool, DocumentError>
    where
        F: FnOnce(&mut Wire),
    {
        self.doc
            .update_element(id.into(), |doc| &mut doc.wires, |wire| {
                let id = wire.id;
                edit(wire);
                wire.id = id;
            })
    }

    pub fn remove(&mut self, id: impl Into<Uuid>) -> Result<bool, DocumentError> {
        self.doc.remove_element(id.into(), |doc| &mut doc.wires)
    }
}

impl Deref for WiresMut<'_> {
    type Target = Store<Wire>;

    fn deref(&self) -> &Store<Wire> {
        &self.doc.wires
    }
}

/// Mutable view of the document's junctions.
pub struct JunctionsMut<'a> {
    doc: &'a mut Document,
}

impl<'a> JunctionsMut<'a> {
    pub(crate) fn new(doc: &'a mut Document) -> Self {
        JunctionsMut { doc }
    }

    pub fn add(&mut self, position: impl Into<Point>) -> Result<Handle<Junction>, DocumentError> {
        self.add_with_id(Uuid::new_v4(), position)
    }

    pub fn add_with_id(
        &mut self,
        id: Uuid,
        position: impl Into<Point>,
    ) -> Result<Handle<Junction>, DocumentError> {
        let junction = Junction {
            id,
            position: position.into().round_iu(),
        };
        self.doc.add_element(junction, |doc| &mut doc.junctions)
    }

    pub fn update<F>(&mut self, key: impl Into<JunctionKey>, edit: F) -> Result<bool, DocumentError>
    where
        F: FnOnce(&mut Junction),
    {
        let Some(id) = self.find(key.into()) else {
            return Ok(false);
        };
        self.doc
            .update_element(id, |doc| &mut doc.junctions, |junction| {
                edit(junction);
                junction.id = id;
            })
    }

    /// Remove by uuid, handle or position; a position removes every junction there.
    pub fn remove(&mut self, key: impl Into<JunctionKey>) -> Result<bool, DocumentError> {
        let ids: Vec<Uuid> = match key.into() {
            JunctionKey::Id(id) => vec![id],
            JunctionKey::At(point) => {
                let point = point.round_iu();
                self.doc
                    .junctions
                    .filter(|junction| junction.position() == point)
                    .into_iter()
                    .map(Junction::id)
                    .collect()
            }
        };
        let mut removed = false;
        self.doc.batch(|doc| {
            for id in ids {
                removed |= doc.remove_element(id, |doc| &mut doc.junctions)?;
            }
            Ok::<_, DocumentError>(())
        })?;
        Ok(removed)
    }

    fn find(&self, key: JunctionKey) -> Option<Uuid> {
        match key {
            JunctionKey::Id(id) => self.doc.junctions.contains(id).then_some(id),
            JunctionKey::At(point) => self.doc.junctions.at(point).map(Junction::id),
        }
    }
}

impl Deref for JunctionsMut<'_> {
    type Target = Store<Junction>;

    fn deref(&self) -> &Store<Junction> {
        &self.doc.junctions
    }
}

/// Mutable view of the document's labels.
pub struct LabelsMut<'a> {
    doc: &'a mut Document,
}

impl<'a> LabelsMut<'a> {
    pub(crate) fn new(doc: &'a mut Document) -> Self {
        LabelsMut { doc }
    }

    pub fn add(&mut self, label: NewLabel) -> Result<Handle<Label>, DocumentError> {
        if label.text.is_empty() {
            return Err(DocumentError::MissingField("text"));
        }
        self.doc.add_element(label.build(), |doc| &mut doc.labels)
    }

    pub fn update<F>(&mut self, id: impl Into<Uuid>, edit: F) -> Result<bool, DocumentError>
    where
        F: FnOnce(&mut Label),
    {
        self.doc
            .update_element(id.into(), |doc| &mut doc.labels, |label| {
                let (id, kind) = (label.id, label.kind);
                edit(label);
                label.id = id;
                label.kind = kind;
            })
    }

    pub fn remove(&mut self, id: impl Into<Uuid>) -> Result<bool, DocumentError> {
        self.doc.remove_element(id.into(), |doc| &mut doc.labels)
    }
}

impl Deref for LabelsMut<'_> {
    type Target = Store<Label>;

    fn deref(&self) -> &Store<Label> {
        &self.doc.labels
    }
}

impl Document {
    fn add_element<T: Element>(
        &mut self,
        element: T,
        store: fn(&mut Document) -> &mut Store<T>,
    ) -> Result<Handle<T>, DocumentError> {
        let id = element.id();
        if self.id_in_use(id) {
            return Err(DocumentError::DuplicateId(id));
        }
        store(self).insert(element);
        self.dirty.mark(T::KIND, id, Change::Added);
        debug!(kind = T::KIND.name(), %id, "element added");
        self.after_change()?;
        Ok(Handle::new(id))
    }

    fn update_element<T: Element>(
        &mut self,
        id: Uuid,
        store: fn(&mut Document) -> &mut Store<T>,
        edit: impl FnOnce(&mut T),
    ) -> Result<bool, DocumentError> {
        let Some(element) = store(self).get_mut(id) else {
            return Ok(false);
        };
        let before = element.clone();
        edit(element);
        if *element != before {
            self.dirty.mark(T::KIND, id, Change::Modified);
            self.after_change()?;
        }
        Ok(true)
    }

    fn remove_element<T: Element>(
        &mut self,
        id: Uuid,
        store: fn(&mut Document) -> &mut Store<T>,
    ) -> Result<bool, DocumentError> {
        if store(self).remove(id).is_none() {
            return Ok(false);
        }
        self.dirty.mark(T::KIND, id, Change::Removed);
        debug!(kind = T::KIND.name(), %id, "element removed");
        self.after_change()?;
        Ok(true)
    }

    /// Validate an edited component against its definition, rebuilding pins on a unit change.
    fn check_component_edit(
        &self,
        before: &Component,
        mut after: Component,
    ) -> Result<Component, DocumentError> {
        let reference = after.reference().trim();
        if reference.is_empty() {
            return Err(DocumentError::MissingField("reference"));
        }
        let moved_slot = before.reference() != after.reference() || before.unit() != after.unit();
        if moved_slot
            && self
                .components
                .collides(reference, after.lib_id(), after.unit(), Some(after.id()))
        {
            return Err(DocumentError::ReferenceCollision(reference.to_owned()));
        }

        if before.unit() != after.unit() {
            let symbol = self
                .library
                .get(after.library_key())
                .ok_or_else(|| DocumentError::UnresolvedLibrarySymbol(after.library_key().to_owned()))?;
            if !symbol.has_unit(after.unit()) {
                return Err(DocumentError::InvalidUnit {
                    lib_id: after.lib_id().to_owned(),
                    unit: after.unit(),
                });
            }
            let mut pins: Vec<Pin> = Vec::new();
            for pin in symbol.pins_for_unit(after.unit()) {
                if pins.iter().any(|existing| existing.number == pin.number) {
                    continue;
                }
                // keep the uuid of pins that exist on both units
                let kept = after.pins.iter().find(|old| old.number == pin.number);
                pins.push(match kept {
                    Some(old) => old.clone(),
                    None => Pin::new(pin.number.as_str()),
                });
            }
            after.pins = pins;
        }
        Ok(after)
    }
}
