//! Plan builder — expands a run into a step graph.
//!
//! Every mode produces the same shape: one dependency-free router node,
//! mode-specific content nodes, and a final merge node that fans in whatever
//! ran. One executor handles all three modes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use switchyard_core::catalog::MAX_SELECTED_MODELS;
use switchyard_core::{
    Cpir, Error, ModelCatalog, ModelCatalogEntry, ProviderKey, Result, Run, RunMode,
    RouterPreferences, StepType,
};

pub const ROUTER_NODE_ID: &str = "router";
pub const AUTO_NODE_ID: &str = "auto_model";
pub const JUDGE_NODE_ID: &str = "judge";
pub const MERGE_NODE_ID: &str = "merge";

pub const ROUTER_MODEL_ID: &str = "router-heuristic";
pub const JUDGE_MODEL_ID: &str = "judge-normalizer";
pub const MERGE_MODEL_ID: &str = "merge-synthesizer";
/// Recorded on a step whose model is not known until the router runs.
pub const PENDING_ROUTER_CHOICE: &str = "router-choice";

const CHAIN_STAGES: [(&str, StepType); 4] = [
    ("draft", StepType::Draft),
    ("refine", StepType::Refine),
    ("critique", StepType::Critique),
    ("compress", StepType::Compress),
];

/// Which model a node runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelRef {
    Fixed {
        provider: ProviderKey,
        model_id: String,
    },
    /// Resolved at dispatch time from another node's router decision.
    FromNode { node_id: String },
}

impl ModelRef {
    fn fixed(provider: ProviderKey, model_id: &str) -> Self {
        Self::Fixed {
            provider,
            model_id: model_id.to_string(),
        }
    }

    fn internal(model_id: &str) -> Self {
        Self::fixed(ProviderKey::Mock, model_id)
    }

    fn entry(entry: &ModelCatalogEntry) -> Self {
        Self::fixed(entry.provider, &entry.model_id)
    }

    /// Provider and model to record before the node runs.
    pub fn provisional(&self) -> (ProviderKey, &str) {
        match self {
            Self::Fixed { provider, model_id } => (*provider, model_id),
            Self::FromNode { .. } => (ProviderKey::Mock, PENDING_ROUTER_CHOICE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepPlanNode {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub model: ModelRef,
    pub depends_on: Vec<String>,
}

impl StepPlanNode {
    fn new(id: &str, step_type: StepType, model: ModelRef, depends_on: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            step_type,
            model,
            depends_on,
        }
    }

    fn router() -> Self {
        Self::new(
            ROUTER_NODE_ID,
            StepType::Router,
            ModelRef::internal(ROUTER_MODEL_ID),
            Vec::new(),
        )
    }

    fn merge(depends_on: Vec<String>) -> Self {
        Self::new(
            MERGE_NODE_ID,
            StepType::Merge,
            ModelRef::internal(MERGE_MODEL_ID),
            depends_on,
        )
    }
}

/// A run's inputs, with selected model ids resolved against the catalog.
#[derive(Debug, Clone)]
pub struct BuiltRun {
    pub cpir: Cpir,
    pub mode: RunMode,
    pub selected_models: Vec<ModelCatalogEntry>,
    pub preferences: RouterPreferences,
}

pub struct Planner {
    catalog: Arc<ModelCatalog>,
}

impl Planner {
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self { catalog }
    }

    pub fn build_run(&self, run: &Run) -> Result<BuiltRun> {
        run.preferences.validate()?;
        run.cpir.validate()?;
        Ok(BuiltRun {
            cpir: run.cpir.clone(),
            mode: run.mode,
            selected_models: self
                .catalog
                .resolve_selected(&run.selected_model_ids)
                .into_iter()
                .cloned()
                .collect(),
            preferences: run.preferences.clone(),
        })
    }

    /// Expand a run into its step graph, router first.
    pub fn plan_steps(&self, run: &BuiltRun) -> Result<Vec<StepPlanNode>> {
        let plan = match run.mode {
            RunMode::Auto => vec![
                StepPlanNode::router(),
                StepPlanNode::new(
                    AUTO_NODE_ID,
                    StepType::ModelCall,
                    ModelRef::FromNode {
                        node_id: ROUTER_NODE_ID.to_string(),
                    },
                    vec![ROUTER_NODE_ID.to_string()],
                ),
                StepPlanNode::merge(vec![AUTO_NODE_ID.to_string()]),
            ],
            RunMode::Compare => self.compare_plan(run),
            RunMode::Chain => self.chain_plan(run),
        };
        validate_plan(&plan)?;
        Ok(plan)
    }

    fn compare_plan(&self, run: &BuiltRun) -> Vec<StepPlanNode> {
        let selected: Vec<ModelRef> = if run.selected_models.is_empty() {
            self.catalog
                .default_compare_models()
                .into_iter()
                .map(ModelRef::entry)
                .collect()
        } else {
            run.selected_models.iter().map(ModelRef::entry).collect()
        };

        let compare_nodes: Vec<StepPlanNode> = selected
            .into_iter()
            .take(MAX_SELECTED_MODELS)
            .enumerate()
            .map(|(i, model)| {
                StepPlanNode::new(
                    &format!("compare_model_{}", i + 1),
                    StepType::ModelCall,
                    model,
                    vec![ROUTER_NODE_ID.to_string()],
                )
            })
            .collect();
        let compare_ids: Vec<String> = compare_nodes.iter().map(|n| n.id.clone()).collect();

        let mut merge_deps = vec![JUDGE_NODE_ID.to_string()];
        merge_deps.extend(compare_ids.iter().cloned());

        let mut plan = vec![StepPlanNode::router()];
        plan.extend(compare_nodes);
        plan.push(StepPlanNode::new(
            JUDGE_NODE_ID,
            StepType::Judge,
            ModelRef::internal(JUDGE_MODEL_ID),
            compare_ids,
        ));
        plan.push(StepPlanNode::merge(merge_deps));
        plan
    }

    /// Four distinct models: selected first, then the compare defaults, then
    /// the auto default, padded with the placeholder model.
    fn chain_models(&self, run: &BuiltRun) -> Vec<ModelCatalogEntry> {
        let candidates = run
            .selected_models
            .iter()
            .chain(self.catalog.default_compare_models())
            .chain(std::iter::once(self.catalog.default_auto_model()));

        let mut models: Vec<ModelCatalogEntry> = Vec::with_capacity(CHAIN_STAGES.len());
        for entry in candidates {
            if models.len() == CHAIN_STAGES.len() {
                break;
            }
            if !models.iter().any(|m| m.model_id == entry.model_id) {
                models.push(entry.clone());
            }
        }
        models.resize_with(CHAIN_STAGES.len(), ModelCatalogEntry::placeholder);
        models
    }

    fn chain_plan(&self, run: &BuiltRun) -> Vec<StepPlanNode> {
        let models = self.chain_models(run);
        let mut plan = vec![StepPlanNode::router()];
        let mut previous = ROUTER_NODE_ID;

        for (&(id, step_type), model) in CHAIN_STAGES.iter().zip(&models) {
            plan.push(StepPlanNode::new(
                id,
                step_type,
                ModelRef::entry(model),
                vec![previous.to_string()],
            ));
            previous = id;
        }

        plan.push(StepPlanNode::merge(
            CHAIN_STAGES.iter().map(|(id, _)| id.to_string()).collect(),
        ));
        plan
    }
}

/// Check that a plan is a well-formed DAG with a single root router.
pub fn validate_plan(plan: &[StepPlanNode]) -> Result<()> {
    if plan.is_empty() {
        return Err(Error::Plan("plan has no nodes".into()));
    }

    let routers: Vec<&StepPlanNode> = plan
        .iter()
        .filter(|node| node.step_type == StepType::Router)
        .collect();
    match routers.as_slice() {
        [router] if router.depends_on.is_empty() => {}
        [router] => {
            return Err(Error::Plan(format!(
                "router node '{}' must not have dependencies",
                router.id
            )));
        }
        _ => {
            return Err(Error::Plan(format!(
                "plan must have exactly one router node, found {}",
                routers.len()
            )));
        }
    }

    let mut by_id: HashMap<&str, &StepPlanNode> = HashMap::new();
    for node in plan {
        if by_id.insert(node.id.as_str(), node).is_some() {
            return Err(Error::Plan(format!("duplicate node id '{}'", node.id)));
        }
    }
    let ids: HashSet<&str> = by_id.keys().copied().collect();

    for node in plan
        .iter()
        .filter(|node| matches!(node.step_type, StepType::Merge | StepType::Judge))
    {
        let fed_by_model = node.depends_on.iter().any(|dep| {
            by_id
                .get(dep.as_str())
                .is_some_and(|input| input.step_type.is_model_producing())
        });
        if !fed_by_model {
            return Err(Error::Plan(format!(
                "{} node '{}' must depend on a model-producing node",
                node.step_type.as_str(),
                node.id
            )));
        }
    }

    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in plan {
        for dep in &node.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(Error::Plan(format!(
                    "node '{}' depends on unknown node '{dep}'",
                    node.id
                )));
            }
            dependents.entry(dep.as_str()).or_default().push(node.id.as_str());
        }
        indegree.insert(node.id.as_str(), node.depends_on.len());
    }

    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(degree) = indegree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*dependent);
                }
            }
        }
    }

    if visited != plan.len() {
        return Err(Error::Plan("plan contains a dependency cycle".into()));
    }
    Ok(())
}
