//! Collection generator: one request-collection contribution per section.
//!
//! Writes nothing itself; the scheduler feeds the returned contribution into the run's
//! consolidator, which exports a single bundle after the last section.

use super::{
    request_section_json, AgentKind, ArtifactOutput, ArtifactPayload, CollectionPayload,
    GenerationContext, GeneratorAgent,
};
use crate::consolidator::{count_requests, CollectionContribution, SharedVariable};
use crate::error::ApiError;
use crate::provider::ModelProviderClient;
use crate::section::Section;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "You build Postman collection v2.1 content for API testing. For the \
section below produce a JSON object with collection, environments and metadata. collection has \
name, version, auth, item (requests with name, request, event test scripts; related requests may \
be grouped in nested item folders) and variable (objects with key and value). environments is a \
list with one object holding name and values (objects with key and value). Use {{base_url}} and \
{{auth_token}} variables instead of literal hosts and secrets.";

pub struct CollectionAgent {
    client: Arc<dyn ModelProviderClient>,
}

impl CollectionAgent {
    pub fn new(client: Arc<dyn ModelProviderClient>) -> Self {
        Self { client }
    }
}

fn parse_variables(value: Option<&Value>) -> Vec<SharedVariable> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<SharedVariable>(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Turn the service's reply into a contribution for `section`.
fn contribution_from(value: &Value, section: &Section) -> CollectionContribution {
    let collection = value.get("collection").cloned().unwrap_or(Value::Null);
    let environment = value
        .get("environments")
        .and_then(Value::as_array)
        .and_then(|envs| envs.first());

    let mut variables = parse_variables(collection.get("variable"));
    variables.extend(parse_variables(environment.and_then(|env| env.get("values"))));

    CollectionContribution {
        collection_name: collection
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} API Collection", section.name)),
        version: collection
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_string),
        auth: collection.get("auth").filter(|a| !a.is_null()).cloned(),
        items: collection
            .get("item")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        variables,
        environment_name: environment
            .and_then(|env| env.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

#[async_trait]
impl GeneratorAgent for CollectionAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Collection
    }

    async fn generate(
        &self,
        ctx: &GenerationContext,
        section: &Section,
    ) -> Result<ArtifactOutput, ApiError> {
        let (value, usage) =
            request_section_json(self.client.as_ref(), SYSTEM_PROMPT, ctx, section).await?;
        let contribution = contribution_from(&value, section);
        let request_count = count_requests(&contribution.items);

        let mut output = ArtifactOutput::succeeded(
            AgentKind::Collection,
            section.id.clone(),
            ArtifactPayload::Collection(CollectionPayload {
                request_count,
                folder_name: section.name.clone(),
                variables_count: contribution.variables.len(),
                contribution: Some(contribution),
                ..CollectionPayload::default()
            }),
        )
        .with_usage(usage)
        .with_metadata("section_name", section.name.clone())
        .with_metadata("endpoints_processed", section.endpoints.len())
        .with_metadata("consolidated", true);

        if request_count == 0 {
            warn!(section_id = %section.id, "Collection contribution has no requests");
            output
                .warnings
                .push(format!("Section {} contributed no requests", section.id));
        }

        info!(section_id = %section.id, request_count, "Collection contribution prepared");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_contribution_defaults_name_from_section() {
        let contribution = contribution_from(&json!({}), &Section::new("u", "Users"));
        assert_eq!(contribution.collection_name, "Users API Collection");
        assert!(contribution.items.is_empty());
        assert!(contribution.auth.is_none());
    }

    #[tokio::test]
    async fn test_generate_returns_contribution() {
        let body = json!({
            "collection": {
                "name": "Users API Collection",
                "item": [
                    {"name": "List", "request": {"method": "GET"}},
                    {"name": "Group", "item": [{"name": "Get", "request": {"method": "GET"}}]}
                ],
                "variable": [{"key": "base_url", "value": "https://api"}]
            },
            "environments": [{"name": "Dev", "values": [{"key": "auth_token", "value": ""}]}]
        });
        let agent = CollectionAgent::new(Arc::new(MockProvider::new(
            "mock".to_string(),
            vec![body.to_string()],
        )));
        let ctx = GenerationContext {
            run_id: "r".to_string(),
            file_ids: vec![],
            focus: None,
            output_dir: PathBuf::from("unused"),
            generate_documentation: false,
            timestamp: "t".to_string(),
        };
        let output = agent.generate(&ctx, &Section::new("users", "Users")).await.unwrap();

        assert!(output.artifact_paths.is_empty());
        match output.payload {
            ArtifactPayload::Collection(payload) => {
                assert_eq!(payload.request_count, 2);
                assert_eq!(payload.variables_count, 2);
                assert_eq!(payload.folder_name, "Users");
                let contribution = payload.contribution.unwrap();
                assert_eq!(contribution.environment_name.as_deref(), Some("Dev"));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
