use kicad_schematic::{
    Document, DocumentError, DocumentOptions, IssueKind, Mirror, NewComponent, NewLabel, Point,
    Rotation, SymbolCache, SymbolLibrary, TitleField,
};
use rstest::*;
use uuid::Uuid;

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

fn device_library() -> SymbolLibrary {
    SymbolLibrary::parse("Device", &test_data!("device.kicad_sym")).unwrap()
}

fn id(n: u32) -> Uuid {
    Uuid::parse_str(&format!("d00df00d-0000-4000-8000-{n:012}")).unwrap()
}

#[test]
fn unchanged_documents_round_trip() {
    for input in [test_data!("amplifier.kicad_sch"), test_data!("legacy_v6.kicad_sch")] {
        let mut doc = Document::parse(&input).unwrap();
        assert_eq!(doc.to_text().unwrap(), input);
    }
}

#[test]
fn reads_the_object_model() {
    let doc = Document::parse(&test_data!("amplifier.kicad_sch")).unwrap();
    assert_eq!(doc.components().len(), 3);
    assert_eq!(doc.wires().len(), 4);
    assert_eq!(doc.junctions().len(), 1);
    assert_eq!(doc.labels().len(), 2);
    assert_eq!(doc.library().len(), 2);
    assert_eq!(doc.project(), "amplifier");
    assert_eq!(doc.generator_version(), Some("8.0"));
    assert_eq!(doc.title_block().title.as_deref(), Some("Amplifier"));
    assert_eq!(doc.sheets().len(), 1);
    assert_eq!(doc.sheets()[0].file, "power.kicad_sch");

    let r1 = doc.components().get("R1").unwrap();
    assert_eq!(r1.value(), "10k");
    assert_eq!(r1.footprint(), "Resistor_SMD:R_0603_1608Metric");
    // R1 pin 2 meets the first wire
    let pin = doc.pin_position("R1", "2").unwrap();
    assert_eq!(pin, Point::new(100.33, 83.82));
    assert_eq!(doc.wires().touching(pin).len(), 1);
    assert!(doc.validate().is_empty());
}

#[test]
fn build_from_scratch_and_reparse() {
    let mut doc = Document::with_options(DocumentOptions {
        project: "demo".into(),
        uuid: Some(id(99)),
    })
    .with_resolver(device_library());

    let r1 = doc
        .components_mut()
        .add(NewComponent::new("Device:R", (100.33, 80.01)).value("10k"))
        .unwrap();
    doc.components_mut()
        .add(NewComponent::new("Device:R", (100.33, 95.25)))
        .unwrap();
    let wire = doc.wire_between("R1", "2", "R2", "1").unwrap();

    assert_eq!(doc.components().get(r1).unwrap().reference(), "R1");
    assert_eq!(doc.wires().get(wire).unwrap().end(), Point::new(100.33, 91.44));
    assert_eq!(doc.library().len(), 1);

    let text = doc.to_text().unwrap();
    let mut reparsed = Document::parse(&text).unwrap();
    assert_eq!(reparsed.to_text().unwrap(), text);
    assert_eq!(reparsed.project(), "demo");
    assert_eq!(reparsed.uuid(), Some(id(99)));
    assert_eq!(reparsed.components().len(), 2);
    assert_eq!(reparsed.components().get("R2").unwrap().value(), "R");
    assert_eq!(
        reparsed.pin_position("R1", "2").unwrap(),
        Point::new(100.33, 83.82)
    );
    assert!(text.contains("(path \"/d00df00d-0000-4000-8000-000000000099\""));
    assert_eq!(text.matches("(symbol \"Device:R\"").count(), 1);
    assert!(reparsed.validate().is_empty());
}

#[test]
fn value_edit_touches_only_the_value() {
    let input = test_data!("amplifier.kicad_sch");
    let mut doc = Document::parse(&input).unwrap();
    assert!(doc
        .components_mut()
        .update("R1", |r| r.set_value("4k7"))
        .unwrap());
    assert_eq!(doc.to_text().unwrap(), input.replace("\"10k\"", "\"4k7\""));
}

#[test]
fn legacy_value_edit_updates_symbol_instances() {
    let input = test_data!("legacy_v6.kicad_sch");
    let mut doc = Document::parse(&input).unwrap();
    doc.components_mut()
        .update("R1", |r| r.set_value("2k2"))
        .unwrap();
    assert_eq!(doc.to_text().unwrap(), input.replace("\"1k\"", "\"2k2\""));
}

#[test]
fn legacy_additions_use_the_file_dialect() {
    let input = test_data!("legacy_v6.kicad_sch");
    let mut doc = Document::parse(&input).unwrap();
    assert_eq!(doc.dialect().indent, "  ");
    let r2 = doc
        .components_mut()
        .add(NewComponent::new("Device:R", (63.5, 50.8)))
        .unwrap()
        .id();
    let text = doc.to_text().unwrap();
    assert!(text.contains(&format!("(uuid {r2})")));
    assert!(text.contains(&format!("(path \"/{r2}\"")));
    assert!(!text.contains("(instances"));
    assert!(!text.contains("exclude_from_sim"));

    let reparsed = Document::parse(&text).unwrap();
    assert_eq!(reparsed.components().get(r2).unwrap().reference(), "R2");
}

#[test]
fn add_then_remove_restores_the_bytes() {
    let input = test_data!("amplifier.kicad_sch");
    let mut doc = Document::parse(&input).unwrap();

    let r3 = doc
        .components_mut()
        .add(NewComponent::new("Device:R", (150.0, 100.0)))
        .unwrap();
    let wire = doc.wires_mut().add((150.0, 96.19), (150.0, 90.0)).unwrap();
    let label = doc
        .labels_mut()
        .add(NewLabel::hierarchical("FB", (150.0, 90.0)))
        .unwrap();
    assert_ne!(doc.to_text().unwrap(), input);
    assert_eq!(doc.components().get(r3).unwrap().reference(), "R3");

    doc.labels_mut().remove(label).unwrap();
    doc.wires_mut().remove(wire).unwrap();
    doc.components_mut().remove(r3).unwrap();
    assert_eq!(doc.to_text().unwrap(), input);
}

#[test]
fn sync_is_idempotent() {
    let mut doc = Document::parse(&test_data!("amplifier.kicad_sch")).unwrap();
    doc.junctions_mut().add((120.65, 87.63)).unwrap();
    let first = doc.to_text().unwrap();
    doc.sync().unwrap();
    doc.sync().unwrap();
    assert_eq!(doc.to_text().unwrap(), first);
}

fn edits(doc: &mut Document) -> Result<(), DocumentError> {
    doc.wires_mut()
        .add_with_id(id(1), (100.33, 76.2), (100.33, 68.58))?;
    doc.junctions_mut().add_with_id(id(2), (100.33, 76.2))?;
    doc.labels_mut()
        .add(NewLabel::local("VREF", (100.33, 68.58)).id(id(3)))?;
    doc.wires_mut()
        .update(id(1), |wire| wire.set_end((100.33, 66.04)))?;
    doc.labels_mut()
        .update(id(3), |label| label.set_position((100.33, 66.04)))?;
    doc.components_mut()
        .update("C1", |c| c.set_value("220n"))?;
    doc.junctions_mut().remove(Point::new(100.33, 87.63))?;
    Ok(())
}

#[test]
fn batched_edits_match_immediate_edits() {
    let input = test_data!("amplifier.kicad_sch");

    let mut immediate = Document::parse(&input).unwrap();
    edits(&mut immediate).unwrap();

    let mut batched = Document::parse(&input).unwrap();
    batched.batch(edits).unwrap();

    assert_eq!(immediate.to_text().unwrap(), batched.to_text().unwrap());
    assert!(!batched.is_dirty());
}

#[rstest]
#[case(Rotation::Deg0, None, (100.0, 96.19))]
#[case(Rotation::Deg90, None, (96.19, 100.0))]
#[case(Rotation::Deg180, None, (100.0, 103.81))]
#[case(Rotation::Deg270, None, (103.81, 100.0))]
#[case(Rotation::Deg0, Some(Mirror::X), (100.0, 103.81))]
#[case(Rotation::Deg0, Some(Mirror::Y), (100.0, 96.19))]
#[case(Rotation::Deg90, Some(Mirror::X), (96.19, 100.0))]
#[case(Rotation::Deg90, Some(Mirror::Y), (103.81, 100.0))]
#[case(Rotation::Deg180, Some(Mirror::X), (100.0, 96.19))]
#[case(Rotation::Deg180, Some(Mirror::Y), (100.0, 103.81))]
#[case(Rotation::Deg270, Some(Mirror::X), (103.81, 100.0))]
#[case(Rotation::Deg270, Some(Mirror::Y), (96.19, 100.0))]
fn placed_pins_follow_rotation_and_mirror(
    #[case] rotation: Rotation,
    #[case] mirror: Option<Mirror>,
    #[case] expected: (f64, f64),
) {
    let mut doc = Document::new().with_resolver(device_library());
    let mut spec = NewComponent::new("Device:R", (100.0, 100.0)).rotation(rotation);
    if let Some(mirror) = mirror {
        spec = spec.mirror(mirror);
    }
    doc.components_mut().add(spec).unwrap();
    assert_eq!(doc.pin_position("R1", "1").unwrap(), Point::from(expected));

    // the same placement survives a write and a read
    let reparsed = Document::parse(&doc.to_text().unwrap()).unwrap();
    assert_eq!(
        reparsed.pin_position("R1", "1").unwrap(),
        Point::from(expected)
    );
}

#[test]
fn moving_a_component_moves_its_pins() {
    let mut doc = Document::parse(&test_data!("amplifier.kicad_sch")).unwrap();
    doc.components_mut()
        .update("R2", |r| {
            r.move_by((2.54, 0.0));
            r.set_rotation(Rotation::Deg90);
        })
        .unwrap();
    assert_eq!(
        doc.pin_position("R2", "1").unwrap(),
        Point::new(99.06, 95.25)
    );
    let text = doc.to_text().unwrap();
    assert!(text.contains("(at 102.87 95.25 90)"));
    // fields travel with the symbol
    assert!(text.contains("(at 105.41 93.9799 0)"));
}

#[test]
fn save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.kicad_sch");

    let mut doc = Document::new().with_resolver(device_library());
    doc.components_mut()
        .add(NewComponent::new("Device:C", (50.8, 50.8)).value("100n"))
        .unwrap();
    doc.set_title_block_field(TitleField::Title, "Filter");
    doc.save(&path).unwrap();

    let loaded = Document::load(&path).unwrap();
    assert_eq!(loaded.project(), "filter");
    assert_eq!(loaded.components().get("C1").unwrap().value(), "100n");
    assert_eq!(loaded.title_block().title.as_deref(), Some("Filter"));

    let missing = Document::load(dir.path().join("missing.kicad_sch")).unwrap_err();
    assert!(matches!(missing, DocumentError::Io { .. }));
}

#[test]
fn pruning_drops_unused_definitions() {
    let mut doc = Document::parse(&test_data!("amplifier.kicad_sch")).unwrap();
    doc.components_mut().remove("C1").unwrap();
    assert!(doc.library().contains("Device:C"));
    assert_eq!(
        doc.validate().iter().map(|issue| issue.kind).collect::<Vec<_>>(),
        [IssueKind::UnusedLibrarySymbol]
    );

    assert_eq!(doc.prune_library_symbols(), ["Device:C"]);
    let text = doc.to_text().unwrap();
    assert!(!text.contains("Device:C"));
    assert!(text.contains("(symbol \"Device:R\""));
}

#[test]
fn reference_rules() {
    let mut doc = Document::parse(&test_data!("amplifier.kicad_sch")).unwrap();
    let taken = doc
        .components_mut()
        .add(NewComponent::new("Device:R", (150.0, 100.0)).reference("R1"))
        .unwrap_err();
    assert!(matches!(taken, DocumentError::ReferenceCollision(r) if r == "R1"));

    let r = doc
        .components_mut()
        .add(
            NewComponent::new("Device:R", (150.0, 100.0))
                .reference("R1")
                .auto_reference(),
        )
        .unwrap();
    assert_eq!(doc.components().get(r).unwrap().reference(), "R3");

    let rename = doc.components_mut().update("R3", |r| r.set_reference("C1"));
    assert!(matches!(rename, Err(DocumentError::ReferenceCollision(_))));
    assert_eq!(doc.components().get(r).unwrap().reference(), "R3");

    doc.components_mut().remove("R2").unwrap();
    assert_eq!(doc.references().next("R"), "R2");
}

#[test]
fn shared_cache_serves_several_documents() {
    let cache = SymbolCache::shared(device_library());
    let mut first = Document::new().with_resolver(cache.clone());
    let mut second = Document::new().with_resolver(cache.clone());
    first
        .components_mut()
        .add(NewComponent::new("Device:R", (0.0, 0.0)))
        .unwrap();
    second
        .components_mut()
        .add(NewComponent::new("Device:R_Small", (0.0, 0.0)))
        .unwrap();
    assert_eq!(cache.borrow().len(), 2);
    assert_eq!(second.components().get("R1").unwrap().value(), "R_Small");
}
