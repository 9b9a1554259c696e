use mdsub_dictionary::{
    Dictionary, DictionaryError, DictionaryProvider, SchemaValidator, TemplateFormat,
};
use mdsub_model::{CanonicalDocument, IssueCode, LinkRef};
use mdsub_test_utils::{sample_dictionary, sample_registry, SAMPLE_DICTIONARY};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::Arc;

#[test]
fn loads_from_yaml_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(SAMPLE_DICTIONARY.as_bytes()).unwrap();

    let dict = Dictionary::from_path(file.path()).unwrap();
    assert_eq!(dict.version(), "1.0.0");
    assert_eq!(dict.boundary_entity(), "subject");
    assert!(dict.is_root("program"));
    assert_eq!(
        dict.first_parent_edge("read_group").map(|e| e.name.as_str()),
        Some("aliquots")
    );
}

#[test]
fn unknown_extension_is_rejected() {
    let file = tempfile::Builder::new().suffix(".xml").tempfile().unwrap();
    assert!(matches!(
        Dictionary::from_path(file.path()),
        Err(DictionaryError::UnsupportedFormat(_))
    ));
}

#[test]
fn read_group_template_lists_both_parent_edges() {
    let tsv = sample_dictionary()
        .template("read_group", TemplateFormat::Tsv)
        .unwrap();
    let mut lines = tsv.lines();
    assert_eq!(
        lines.next(),
        Some("*type\t*submitter_id\taliquots.submitter_id\tsamples.submitter_id\tlibrary_name\tread_length\tis_paired_end")
    );
    assert_eq!(lines.next(), Some("read_group\t\t\t\t\t\t"));
}

#[test]
fn template_for_unknown_type_fails() {
    assert!(matches!(
        sample_dictionary().template("nope", TemplateFormat::Csv),
        Err(DictionaryError::EntityNotFound(_))
    ));
}

#[test]
fn swapped_dictionary_only_affects_new_snapshots() {
    let registry = sample_registry();
    let before = registry.current();

    let next = SAMPLE_DICTIONARY
        .replace("version: \"1.0.0\"", "version: \"2.0.0\"")
        .replace("      is_ffpe: { type: boolean }\n", "");
    let previous = registry.install(Dictionary::from_yaml_str(&next).unwrap());
    assert_eq!(previous, "1.0.0");

    let doc = CanonicalDocument::new("sample")
        .with_submitter_id("S1")
        .with_field("sample_type", "Blood")
        .with_field("is_ffpe", true)
        .with_link("subjects", LinkRef::by_submitter_id("SUBJ-1"));

    let old = SchemaValidator::new(Arc::clone(&before)).validate(0, &doc);
    assert!(old.issues.is_empty());

    let new = SchemaValidator::new(registry.current()).validate(0, &doc);
    assert!(new.is_valid());
    assert!(new.has_code(IssueCode::UnknownField));

    let pinned = SchemaValidator::for_version(registry.as_ref(), "1.0.0").unwrap();
    assert!(pinned.validate(0, &doc).issues.is_empty());
}

#[test]
fn batch_validation_reports_each_document() {
    let validator = SchemaValidator::new(Arc::new(sample_dictionary()));
    let docs = vec![
        CanonicalDocument::new("subject")
            .with_submitter_id("SUBJ-1")
            .with_field("species", "Homo sapiens")
            .with_field("age_at_enrollment", 42)
            .with_link("projects", LinkRef::by_submitter_id("BLGSP")),
        CanonicalDocument::new("subject")
            .with_submitter_id("SUBJ-2")
            .with_field("age_at_enrollment", -1)
            .with_link("projects", LinkRef::by_submitter_id("BLGSP")),
        CanonicalDocument::new("aliquot")
            .with_submitter_id("A1")
            .with_field("concentration", "high"),
    ];

    let results = validator.validate_batch(&docs);
    assert_eq!(results.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(results[0].is_valid());
    assert!(results[1].has_code(IssueCode::MissingRequiredField));
    assert!(results[1].has_code(IssueCode::TypeMismatch));
    assert!(results[2].has_code(IssueCode::TypeMismatch));
    assert!(results[2].has_code(IssueCode::MissingRequiredLink));
}
