//! Scheduler isolation and ordering through the public API

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use testsmith::agent::{
    AgentKind, AgentRegistry, ArtifactOutput, ArtifactPayload, CollectionPayload,
    GenerationContext, GeneratorAgent, TabularPayload,
};
use testsmith::consolidator::{CollectionConsolidator, CollectionContribution, ConsolidatorState};
use testsmith::error::ApiError;
use testsmith::scheduler::{ExecutionMode, ExecutionScheduler, SchedulerOptions};
use testsmith::section::Section;
use tempfile::TempDir;

struct FlakyTabular {
    failing: &'static str,
}

#[async_trait]
impl GeneratorAgent for FlakyTabular {
    fn kind(&self) -> AgentKind {
        AgentKind::Tabular
    }

    async fn generate(
        &self,
        _ctx: &GenerationContext,
        section: &Section,
    ) -> Result<ArtifactOutput, ApiError> {
        if section.id == self.failing {
            return Err(ApiError::Generation(format!("no cases for {}", section.id)));
        }
        Ok(ArtifactOutput::succeeded(
            AgentKind::Tabular,
            section.id.clone(),
            ArtifactPayload::Tabular(TabularPayload {
                row_count: 1,
                ..Default::default()
            }),
        ))
    }
}

/// Later sections answer faster, so any reordering would show up in the bundle.
struct SlowFirstCollection {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl GeneratorAgent for SlowFirstCollection {
    fn kind(&self) -> AgentKind {
        AgentKind::Collection
    }

    async fn generate(
        &self,
        _ctx: &GenerationContext,
        section: &Section,
    ) -> Result<ArtifactOutput, ApiError> {
        let delay = match section.id.as_str() {
            "a" => 60,
            "b" => 30,
            _ => 0,
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.seen.lock().push(section.id.clone());
        Ok(ArtifactOutput::succeeded(
            AgentKind::Collection,
            section.id.clone(),
            ArtifactPayload::Collection(CollectionPayload {
                request_count: 1,
                folder_name: section.name.clone(),
                contribution: Some(CollectionContribution {
                    collection_name: "Shop API Collection".to_string(),
                    version: None,
                    auth: None,
                    items: vec![json!({"name": section.id, "request": {"method": "GET"}})],
                    variables: vec![],
                    environment_name: None,
                }),
                ..Default::default()
            }),
        ))
    }
}

fn context(dir: &TempDir) -> GenerationContext {
    GenerationContext {
        run_id: "run".to_string(),
        file_ids: vec!["file-1".to_string()],
        focus: None,
        output_dir: dir.path().to_path_buf(),
        generate_documentation: false,
        timestamp: "20260101_000000".to_string(),
    }
}

#[tokio::test]
async fn test_one_failing_task_leaves_siblings_intact() {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(FlakyTabular { failing: "s3" }));
    let scheduler = ExecutionScheduler::new(Arc::new(registry), SchedulerOptions::new(4, 5));
    let sections: Vec<Section> = (0..6)
        .map(|i| Section::new(format!("s{}", i), format!("S{}", i)))
        .collect();
    let mut consolidator = CollectionConsolidator::new(temp_dir.path(), false);

    let result = scheduler
        .run(
            &context(&temp_dir),
            &sections,
            &[AgentKind::Tabular],
            ExecutionMode::Parallel,
            &mut consolidator,
            "unused",
        )
        .await;

    assert_eq!(result.outputs.len(), 6);
    let failed: Vec<&ArtifactOutput> = result.outputs.iter().filter(|o| !o.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].section_id, "s3");
    assert_eq!(failed[0].errors, vec!["Generation failed: no cases for s3".to_string()]);
    assert_eq!(consolidator.state(), ConsolidatorState::Uninitialized);
}

#[tokio::test]
async fn test_collection_contributions_follow_section_order_in_parallel_mode() {
    let temp_dir = TempDir::new().unwrap();
    let agent = Arc::new(SlowFirstCollection {
        seen: Mutex::new(Vec::new()),
    });
    let mut registry = AgentRegistry::new();
    registry.register(agent.clone());
    registry.register(Arc::new(FlakyTabular { failing: "none" }));
    let scheduler = ExecutionScheduler::new(Arc::new(registry), SchedulerOptions::new(3, 5));
    let sections = vec![
        Section::new("a", "Alpha"),
        Section::new("b", "Beta"),
        Section::new("c", "Gamma"),
    ];
    let mut consolidator = CollectionConsolidator::new(temp_dir.path(), false);

    let result = scheduler
        .run(
            &context(&temp_dir),
            &sections,
            &AgentKind::ALL,
            ExecutionMode::Parallel,
            &mut consolidator,
            "shop",
        )
        .await;

    assert_eq!(*agent.seen.lock(), vec!["a", "b", "c"]);
    assert_eq!(consolidator.folder_names(), vec!["Alpha", "Beta", "Gamma"]);
    assert_eq!(consolidator.state(), ConsolidatorState::Finalized);

    let exported = result.exported.unwrap();
    assert_eq!(exported.total_requests, 3);
    assert_eq!(exported.folder_count, 3);
    assert!(exported.documentation_file.is_none());
    assert!(temp_dir.path().join("collection").join("shop.json").exists());

    // Stateless outputs first (section-major), then the collection lane.
    let order: Vec<(AgentKind, &str)> = result
        .outputs
        .iter()
        .map(|o| (o.agent_kind, o.section_id.as_str()))
        .collect();
    assert_eq!(order[0], (AgentKind::Tabular, "a"));
    assert_eq!(order[1], (AgentKind::Scenario, "a"));
    assert_eq!(&order[6..], &[
        (AgentKind::Collection, "a"),
        (AgentKind::Collection, "b"),
        (AgentKind::Collection, "c"),
    ]);
}
