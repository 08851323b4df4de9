//! End-to-end expansion of FHIR ValueSet documents.

use std::sync::Arc;

use fhirterm_closure::{ClosureBuilder, IsAEdge, MemoryStore, SqliteStore};
use fhirterm_expand::{
    CacheConfig, CodeSystemRegistry, ExpandError, ExpansionConfig, ExpansionEvaluator,
    ExpansionIssue, FilterCompiler, InMemoryValueSets, PropertyRow, PropertyTableCodeSystem,
    SnomedCodeSystem, ValueSet, SNOMED_URL,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

const LOINC: &str = "http://loinc.org";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// ```text
/// 138875005 SNOMED CT Concept
///  |-- 404684003 Clinical finding
///  |    |-- 73211009 Diabetes mellitus
///  |    |    |-- 46635009 Type 1 diabetes
///  |    |    |-- 44054006 Type 2 diabetes
///  |    |-- 386661006 Fever
///  |-- 123037004 Body structure
/// 46635009 also is-a 386661006
/// ```
fn snomed_edges() -> Vec<IsAEdge> {
    vec![
        IsAEdge::new(404684003, 138875005),
        IsAEdge::new(73211009, 404684003),
        IsAEdge::new(46635009, 73211009),
        IsAEdge::new(44054006, 73211009),
        IsAEdge::new(386661006, 404684003),
        IsAEdge::new(123037004, 138875005),
        IsAEdge::new(46635009, 386661006),
    ]
}

fn loinc() -> PropertyTableCodeSystem {
    PropertyTableCodeSystem::new(
        LOINC,
        vec![
            PropertyRow::new("2345-7")
                .with_display("Glucose [Mass/volume] in Serum or Plasma")
                .with_property("CLASS", "CHEM")
                .with_property("STATUS", "ACTIVE"),
            PropertyRow::new("4548-4")
                .with_display("Hemoglobin A1c/Hemoglobin.total in Blood")
                .with_property("CLASS", "CHEM")
                .with_property("STATUS", "ACTIVE"),
            PropertyRow::new("718-7")
                .with_display("Hemoglobin [Mass/volume] in Blood")
                .with_property("CLASS", "HEM/BC")
                .with_property("STATUS", "ACTIVE"),
            PropertyRow::new("1558-6")
                .with_display("Fasting glucose [Mass/volume] in Serum or Plasma")
                .with_property("CLASS", "CHEM")
                .with_property("STATUS", "DEPRECATED"),
        ],
    )
}

fn registry_with(store: MemoryStore) -> CodeSystemRegistry {
    ClosureBuilder::new().rebuild(&store).unwrap();
    let mut registry = CodeSystemRegistry::new();
    registry.register(SnomedCodeSystem::new(store)).register(loinc());
    registry
}

fn parse(json: &str) -> ValueSet {
    serde_json::from_str(json).unwrap()
}

fn codes_of(result: &fhirterm_expand::ExpansionResult, system: &str) -> Vec<String> {
    result
        .codes
        .iter()
        .filter(|c| c.system == system)
        .map(|c| c.code.clone())
        .collect()
}

const DIABETES_MONITORING: &str = r#"{
    "resourceType": "ValueSet",
    "id": "diabetes-monitoring",
    "url": "http://example.org/fhir/ValueSet/diabetes-monitoring",
    "status": "active",
    "compose": {
        "include": [
            {
                "system": "http://snomed.info/sct",
                "filter": [{"property": "concept", "op": "is-a", "value": "73211009"}]
            },
            {
                "system": "http://loinc.org",
                "filter": [
                    {"property": "CLASS", "op": "=", "value": "CHEM"},
                    {"property": "STATUS", "op": "=", "value": "ACTIVE"}
                ]
            }
        ],
        "exclude": [
            {
                "system": "http://snomed.info/sct/",
                "concept": [{"code": "44054006", "display": "Type 2 diabetes"}]
            }
        ]
    }
}"#;

#[test]
fn test_mixed_system_expansion() {
    init_tracing();
    let registry = registry_with(MemoryStore::with_edges(snomed_edges()));
    let vs = parse(DIABETES_MONITORING);

    let compiled = FilterCompiler::compile(&vs);
    assert_eq!(
        compiled.keys().collect::<Vec<_>>(),
        vec![LOINC, SNOMED_URL]
    );
    assert_eq!(compiled[SNOMED_URL].exclude.len(), 1);

    let result = ExpansionEvaluator::new(&registry).expand(&vs).unwrap();
    assert!(result.is_complete());
    assert_eq!(codes_of(&result, SNOMED_URL), vec!["46635009", "73211009"]);
    assert_eq!(codes_of(&result, LOINC), vec!["2345-7", "4548-4"]);
    assert_eq!(result.len(), 4);
    assert_eq!(result.stats.systems_evaluated, 2);
}

#[test]
fn test_expand_by_id() {
    let registry = registry_with(MemoryStore::with_edges(snomed_edges()));
    let mut value_sets = InMemoryValueSets::new();
    assert!(value_sets.load_json(DIABETES_MONITORING).unwrap());

    let evaluator = ExpansionEvaluator::new(&registry);
    let result = evaluator
        .expand_by_id(&value_sets, "diabetes-monitoring")
        .unwrap();
    assert_eq!(result.len(), 4);

    let err = evaluator.expand_by_id(&value_sets, "missing").unwrap_err();
    assert!(matches!(err, ExpandError::ValueSetNotFound(ref id) if id == "missing"));
}

#[test]
fn test_partial_failure_keeps_other_groups() {
    let registry = registry_with(MemoryStore::with_edges(snomed_edges()));
    let vs = parse(
        r#"{
            "compose": {
                "include": [
                    {
                        "system": "http://snomed.info/sct",
                        "filter": [{"property": "concept", "op": "is-a", "value": "386661006"}]
                    },
                    {
                        "system": "http://snomed.info/sct",
                        "filter": [{"property": "parent", "op": "=", "value": "404684003"}]
                    },
                    {
                        "system": "http://loinc.org",
                        "filter": [{"property": "COMPONENT", "op": "regex", "value": "(unclosed"}]
                    },
                    {
                        "system": "http://www.nlm.nih.gov/research/umls/rxnorm",
                        "concept": [{"code": "860975"}]
                    }
                ]
            }
        }"#,
    );

    let result = ExpansionEvaluator::new(&registry).expand(&vs).unwrap();
    assert_eq!(codes_of(&result, SNOMED_URL), vec!["386661006", "46635009"]);
    assert!(result.system(LOINC).unwrap().is_empty());
    assert_eq!(result.stats.groups_failed, 2);
    assert_eq!(result.issues.len(), 3);
    assert!(result.issues.iter().any(|issue| matches!(
        issue,
        ExpansionIssue::UnsupportedPredicate { property, .. } if property == "parent"
    )));
    assert!(result
        .issues
        .iter()
        .any(|issue| matches!(issue, ExpansionIssue::InvalidFilter { system, .. } if system == LOINC)));
    assert!(result
        .issues
        .iter()
        .any(|issue| matches!(issue, ExpansionIssue::UnknownCodeSystem { .. })));

    let strict = ExpansionConfig::builder().with_strict(true).build();
    let err = ExpansionEvaluator::with_config(&registry, strict)
        .expand(&vs)
        .unwrap_err();
    assert!(matches!(err, ExpandError::UnknownCodeSystem(_)));
}

#[test]
fn test_sqlite_backed_expansion() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("terminology.db")).unwrap();
    store.insert_edges(&snomed_edges()).unwrap();
    ClosureBuilder::new().rebuild(&store).unwrap();

    let mut registry = CodeSystemRegistry::new();
    registry.register(SnomedCodeSystem::new(store).with_cache(CacheConfig::default()));

    let vs = parse(
        r#"{
            "compose": {
                "include": [{
                    "system": "http://snomed.info/sct",
                    "filter": [{"property": "concept", "op": "generalizes", "value": "46635009"}]
                }],
                "exclude": [{
                    "system": "http://snomed.info/sct",
                    "filter": [{"property": "concept", "op": "=", "value": "138875005"}]
                }]
            }
        }"#,
    );

    let result = ExpansionEvaluator::new(&registry).expand(&vs).unwrap();
    assert_eq!(
        result.system(SNOMED_URL).unwrap().to_sorted_vec(),
        vec![46635009, 73211009, 386661006, 404684003]
    );
}

#[test]
fn test_rebuild_visible_to_next_expansion() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("terminology.db")).unwrap();
    store.insert_edges(&snomed_edges()).unwrap();
    ClosureBuilder::new().rebuild(&store).unwrap();

    let snomed = Arc::new(SnomedCodeSystem::new(store).with_cache(CacheConfig::default()));
    let mut registry = CodeSystemRegistry::new();
    registry.register_arc(snomed.clone());

    let config = ExpansionConfig::builder()
        .with_cache(CacheConfig::default())
        .build();
    let evaluator = ExpansionEvaluator::with_config(&registry, config);
    let vs = parse(
        r#"{
            "compose": {
                "include": [{
                    "system": "http://snomed.info/sct",
                    "filter": [{"property": "concept", "op": "descendent-of", "value": "73211009"}]
                }]
            }
        }"#,
    );

    let before = evaluator.expand(&vs).unwrap();
    assert_eq!(codes_of(&before, SNOMED_URL), vec!["44054006", "46635009"]);

    // Gestational diabetes
    snomed
        .index()
        .insert_edges(&[IsAEdge::new(11687002, 73211009)])
        .unwrap();
    ClosureBuilder::new().rebuild(snomed.index()).unwrap();

    let after = evaluator.expand(&vs).unwrap();
    assert_eq!(after.stats.cache_hits, 0);
    assert_eq!(
        codes_of(&after, SNOMED_URL),
        vec!["11687002", "44054006", "46635009"]
    );
}

#[test]
fn test_expansions_during_rebuild_see_one_snapshot() {
    let snomed = Arc::new(SnomedCodeSystem::new(MemoryStore::with_edges(snomed_edges())));
    ClosureBuilder::new().rebuild(snomed.index()).unwrap();

    let mut registry = CodeSystemRegistry::new();
    registry.register_arc(snomed.clone());

    let vs = parse(
        r#"{
            "compose": {
                "include": [{
                    "system": "http://snomed.info/sct",
                    "filter": [{"property": "concept", "op": "is-a", "value": "73211009"}]
                }]
            }
        }"#,
    );
    let old = vec![44054006, 46635009, 73211009];
    let new = vec![11687002, 44054006, 46635009, 73211009];

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let evaluator = ExpansionEvaluator::new(&registry);
                for _ in 0..50 {
                    let result = evaluator.expand(&vs).unwrap();
                    let concepts = result.system(SNOMED_URL).unwrap().to_sorted_vec();
                    assert!(concepts == old || concepts == new, "torn read: {:?}", concepts);
                }
            });
        }

        snomed
            .index()
            .insert_edges([IsAEdge::new(11687002, 73211009)]);
        ClosureBuilder::new().rebuild(snomed.index()).unwrap();
    });

    let result = ExpansionEvaluator::new(&registry).expand(&vs).unwrap();
    assert_eq!(result.system(SNOMED_URL).unwrap().to_sorted_vec(), new);
}

#[test]
fn test_result_limit_spans_systems() {
    let registry = registry_with(MemoryStore::with_edges(snomed_edges()));
    let vs = parse(DIABETES_MONITORING);

    let config = ExpansionConfig::builder().with_max_results(3).build();
    let err = ExpansionEvaluator::with_config(&registry, config)
        .expand(&vs)
        .unwrap_err();
    assert!(matches!(err, ExpandError::ResultTooLarge { count: 4, limit: 3 }));

    let config = ExpansionConfig::builder().with_max_results(4).build();
    assert!(ExpansionEvaluator::with_config(&registry, config)
        .expand(&vs)
        .is_ok());
}
