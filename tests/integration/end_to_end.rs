//! End-to-end runs through the orchestrator with real generators and a scripted provider

use super::test_utils::{write_spec, CountingUploader, RoutingProvider};
use std::sync::Arc;
use testsmith::agent::{AgentKind, AgentRegistry, ArtifactPayload, CollectionAgent, TabularAgent};
use testsmith::cache::ContentCache;
use testsmith::config::{FileLimits, GenerationConfig};
use testsmith::provider::ModelProviderClient;
use testsmith::report::RunStatus;
use testsmith::run::{Orchestrator, RunOptions};
use testsmith::scheduler::ExecutionMode;
use testsmith::section::{Section, StaticSectionPlanner};
use tempfile::TempDir;

fn sections() -> Vec<Section> {
    vec![
        Section::new("users", "A").with_description("Account endpoints").with_endpoint("GET", "/users"),
        Section::new("orders", "B").with_description("Order endpoints").with_endpoint("GET", "/orders"),
        Section::new("billing", "C").with_description("Billing endpoints").with_endpoint("GET", "/invoices"),
    ]
}

fn build(temp_dir: &TempDir, provider: Arc<RoutingProvider>, uploader: Arc<CountingUploader>) -> Orchestrator {
    let client: Arc<dyn ModelProviderClient> = provider;
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(TabularAgent::new(client.clone())));
    registry.register(Arc::new(CollectionAgent::new(client)));
    let cache = ContentCache::open(
        temp_dir.path().join("cache").join("file_registry.json"),
        FileLimits::default(),
        uploader,
    )
    .unwrap();
    Orchestrator::new(
        Arc::new(cache),
        Arc::new(StaticSectionPlanner::new(sections())),
        Arc::new(registry),
        GenerationConfig::default(),
        temp_dir.path().join("outputs"),
    )
}

#[tokio::test]
async fn test_three_section_sequential_run_with_tabular_and_collection() {
    let temp_dir = TempDir::new().unwrap();
    let spec = write_spec(temp_dir.path(), "users.yaml");
    let provider = Arc::new(RoutingProvider::new());
    let orchestrator = build(&temp_dir, provider.clone(), Arc::new(CountingUploader::new()));

    let options = RunOptions::new(vec![spec])
        .with_kinds(vec![AgentKind::Tabular, AgentKind::Collection])
        .with_mode(ExecutionMode::Sequential);
    let report = orchestrator.run(&options).await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.sections_planned, 3);
    assert_eq!(report.sections_processed, 3);
    assert_eq!(report.tabular.len(), 3);
    assert_eq!(report.collection.len(), 3);
    assert!(report.scenario.is_empty());

    // Sequential mode runs section by section, tabular before collection.
    assert_eq!(
        provider.calls(),
        vec!["tabular", "collection", "tabular", "collection", "tabular", "collection"]
    );

    // Six calls at 100 in / 40 out each.
    assert_eq!(report.token_usage.input_tokens, 600);
    assert_eq!(report.token_usage.output_tokens, 240);
    assert_eq!(report.token_usage.total_tokens, 840);

    let bundle = match &report.collection[0].payload {
        ArtifactPayload::Collection(p) => p.collection_file.clone().unwrap(),
        other => panic!("unexpected payload {:?}", other),
    };
    for output in &report.collection {
        match &output.payload {
            ArtifactPayload::Collection(p) => {
                assert_eq!(p.collection_file.as_ref(), Some(&bundle));
                assert_eq!(p.request_count, 2);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&bundle).unwrap()).unwrap();
    let folders: Vec<&str> = written["item"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(folders, vec!["A", "B", "C"]);
    assert_eq!(written["info"]["name"], "As API Collection");
    assert_eq!(written["variable"][0]["value"], "https://a.example");

    let collection_dir = temp_dir.path().join("outputs").join("collection");
    let bundle_files = std::fs::read_dir(&collection_dir).unwrap().count();
    assert_eq!(bundle_files, 3);

    let tabular_dir = temp_dir.path().join("outputs").join("tabular");
    assert_eq!(std::fs::read_dir(&tabular_dir).unwrap().count(), 3);

    assert!(report.summary.starts_with("Successfully processed 3 sections"));
    assert!(report.summary.contains("Generated 6 tabular test cases."));
    assert!(report.summary.contains("Generated 6 collection requests."));
    assert!(!report.summary.contains("scenarios"));
}

#[tokio::test]
async fn test_one_failed_tabular_section_fails_the_run_but_keeps_the_rest() {
    let temp_dir = TempDir::new().unwrap();
    let spec = write_spec(temp_dir.path(), "users.yaml");
    let provider = Arc::new(RoutingProvider::failing_on("tabular", "B"));
    let orchestrator = build(&temp_dir, provider.clone(), Arc::new(CountingUploader::new()));

    let options = RunOptions::new(vec![spec])
        .with_kinds(vec![AgentKind::Tabular, AgentKind::Collection])
        .with_mode(ExecutionMode::Sequential);
    let report = orchestrator.run(&options).await;

    assert!(!report.success);
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.errors, vec!["Provider request failed: scripted outage".to_string()]);
    assert_eq!(report.summary, "Execution failed - see errors for details");
    assert_eq!(provider.calls().len(), 6);

    assert_eq!(report.tabular.len(), 3);
    let failed: Vec<&str> = report
        .tabular
        .iter()
        .filter(|o| !o.success)
        .map(|o| o.section_id.as_str())
        .collect();
    assert_eq!(failed, vec!["orders"]);
    let tabular_dir = temp_dir.path().join("outputs").join("tabular");
    assert_eq!(std::fs::read_dir(&tabular_dir).unwrap().count(), 2);

    // The collection lane is unaffected and still exports every folder.
    assert_eq!(report.collection.len(), 3);
    assert!(report.collection.iter().all(|o| o.success));
    let bundle = match &report.collection[0].payload {
        ArtifactPayload::Collection(p) => p.collection_file.clone().unwrap(),
        other => panic!("unexpected payload {:?}", other),
    };
    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&bundle).unwrap()).unwrap();
    let folders: Vec<&str> = written["item"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(folders, vec!["A", "B", "C"]);
    assert_eq!(report.collection[0].metadata["validation_passed"], true);
}

#[tokio::test]
async fn test_repeated_runs_reuse_cached_upload() {
    let temp_dir = TempDir::new().unwrap();
    let spec = write_spec(temp_dir.path(), "users.yaml");
    let uploader = Arc::new(CountingUploader::new());
    let orchestrator = build(&temp_dir, Arc::new(RoutingProvider::new()), uploader.clone());

    let options = RunOptions::new(vec![spec]).with_kinds(vec![AgentKind::Tabular]);
    let first = orchestrator.run(&options).await;
    let second = orchestrator.run(&options).await;

    assert!(first.success && second.success);
    assert_eq!(uploader.upload_count(), 1);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_unregistered_kind_falls_back_to_null_agent() {
    let temp_dir = TempDir::new().unwrap();
    let spec = write_spec(temp_dir.path(), "users.yaml");
    let orchestrator = build(&temp_dir, Arc::new(RoutingProvider::new()), Arc::new(CountingUploader::new()));

    let options = RunOptions::new(vec![spec])
        .with_kinds(vec![AgentKind::Tabular, AgentKind::Scenario])
        .with_mode(ExecutionMode::Parallel);
    let report = orchestrator.run(&options).await;

    // Null outputs are not bucketed, but their warnings reach the report.
    assert!(report.success, "errors: {:?}", report.errors);
    assert!(report.scenario.is_empty());
    assert_eq!(report.tabular.len(), 3);
    assert_eq!(
        report.warnings,
        vec!["No scenario generator is available; nothing was produced".to_string()]
    );
}

#[tokio::test]
async fn test_unsupported_input_aborts_before_scheduling() {
    let temp_dir = TempDir::new().unwrap();
    let spec = temp_dir.path().join("notes.txt");
    std::fs::write(&spec, "not a spec").unwrap();
    let provider = Arc::new(RoutingProvider::new());
    let orchestrator = build(&temp_dir, provider.clone(), Arc::new(CountingUploader::new()));

    let report = orchestrator.run(&RunOptions::new(vec![spec])).await;

    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.summary, "Execution failed - see errors for details");
    assert!(provider.calls().is_empty());
}
