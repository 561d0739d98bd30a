use std::{fs, path::PathBuf};

use aispec_engine::{Assistant, DocumentFormat, EngineError, Entity, ModelConfig, Skill, Step, parse_document_str};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

fn movie_builder() -> Assistant {
    Assistant::load(fixture("movie-builder-assistant.xml")).expect("load movie builder")
}

#[test]
fn loads_name_description_and_model() {
    let assistant = movie_builder();
    assert_eq!(assistant.id(), Some("movie-builder"));
    assert_eq!(assistant.name(), Some("Movie Builder"));
    assert_eq!(assistant.description(), Some("Helps writers develop a movie from premise to cast."));
    assert_eq!(assistant.model().map(ModelConfig::name_or_default), Some("gpt-4o"));
}

#[test]
fn registers_top_level_and_skill_workflows() {
    let assistant = movie_builder();
    let ids: Vec<&str> = assistant.workflows().map(|workflow| workflow.id()).collect();
    assert_eq!(ids, vec!["pitch", "plot-outline", "character-building", "cast-building"]);
    assert_eq!(assistant.top_level_workflows().len(), 1);
    assert_eq!(assistant.skills().len(), 2);
}

#[test]
fn resolves_nested_references_relative_to_their_files() {
    let assistant = movie_builder();
    let found = assistant.find_workflow("character-building").expect("workflow");
    assert_eq!(found.skill.and_then(Skill::id), Some("character-design"));

    let steps = found.workflow.steps();
    let ids: Vec<&str> = steps.iter().map(Step::id).collect();
    assert_eq!(ids, vec!["surnames", "select-surname", "generate-character"]);

    let generate = &steps[2];
    assert_eq!(generate.model().map(ModelConfig::name_or_default), Some("o1-mini"));
    let output = generate.output().expect("output");
    assert_eq!(output.name(), Some("character"));
    assert_eq!(output.schema().expect("schema")["required"][0], "character");
    assert!(!assistant.node().to_string().contains("@ref"));
}

#[test]
fn skill_dependencies_are_hydrated() {
    let assistant = movie_builder();
    let plot = &assistant.skills()[0];
    assert_eq!(plot.id(), Some("plot-design"));
    assert_eq!(plot.dependencies().len(), 1);
    assert_eq!(plot.dependencies()[0].id(), Some("character-design"));
}

#[test]
fn unknown_workflow_is_not_found() {
    let assistant = movie_builder();
    let error = assistant.find_workflow("villain-building").expect_err("missing workflow");
    assert!(matches!(error, EngineError::WorkflowNotFound { ref id } if id == "villain-building"));
}

#[test]
fn yaml_documents_can_reference_xml_files() {
    let temp_dir = tempfile::tempdir().unwrap();
    let character_skill = fixture("skills/character-skill.xml");
    let document = format!(
        "name: Casting Agent\ndescription: Casts movies\nskills:\n  skill:\n    - \"@ref\": \"{}\"\n",
        character_skill.display()
    );
    let path = temp_dir.path().join("agent.yaml");
    fs::write(&path, document).unwrap();

    let assistant = Assistant::load(&path).expect("load yaml assistant");
    assert_eq!(assistant.name(), Some("Casting Agent"));
    assert_eq!(assistant.find_workflow("cast-building").expect("workflow").workflow.steps().len(), 1);
}

#[test]
fn serialized_assistant_parses_back_to_the_same_workflows() {
    let assistant = movie_builder();
    let xml = assistant.to_document_string().expect("serialize");
    assert!(!xml.contains("<model"));

    let node = parse_document_str(&xml, DocumentFormat::Xml, "serialized").expect("parse serialized");
    let reparsed = Assistant::from_resolved(&node).expect("hydrate serialized");
    let original: Vec<&str> = assistant.workflows().map(|workflow| workflow.id()).collect();
    let roundtrip: Vec<&str> = reparsed.workflows().map(|workflow| workflow.id()).collect();
    assert_eq!(original, roundtrip);
    assert!(reparsed.model().is_none());
}

#[test]
fn missing_document_is_an_io_error() {
    let error = Assistant::load(fixture("does-not-exist.xml")).expect_err("missing file");
    assert!(matches!(error, EngineError::Io { .. }));
}

#[test]
fn reference_root_and_inline_xml_load_the_same_graph() {
    let by_reference = Assistant::from_reference(fixture("movie-builder-assistant.xml")).expect("reference root");
    assert_eq!(by_reference.name(), Some("Movie Builder"));
    assert_eq!(by_reference.workflows().count(), 4);

    let xml = r#"<assistant id="inline"><skills><skill ref="skills/plot-skill.xml"/></skills></assistant>"#;
    let inline = Assistant::from_xml_str(xml, fixture("")).expect("inline xml");
    assert_eq!(inline.skills()[0].id(), Some("plot-design"));
    assert!(inline.find_workflow("plot-outline").is_ok());
}
