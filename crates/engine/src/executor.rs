//! DAG executor — runs a planned step graph in dependency waves.
//!
//! Every plan node is materialized as a `PENDING` step, then the executor
//! repeatedly picks the nodes whose dependencies have all completed and runs
//! that wave concurrently. Node outputs live in a map owned by one
//! `execute_run` call; later waves read entries written by earlier ones.
//!
//! Run lifecycle: `PENDING → RUNNING → {DONE | ERROR}`. On failure the run and
//! every step still `RUNNING` move to `ERROR`; steps from earlier waves keep
//! their results.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::try_join_all;
use serde::Serialize;
use switchyard_core::catalog::round6;
use switchyard_core::{
    Artifact, CallOrigin, Error, MemoryItem, MemoryItemType, MemoryValue, Message,
    ModelCallOptions, ModelCatalog, ModelCatalogEntry, ModelChoice, ProviderKey, Result,
    RouterDecision, Run, RunCompletion, RunDetails, RunPatch, RunStatus, RunStore, RunTotals, Step,
    StepPatch, StepStatus, StepType,
};
use switchyard_providers::ProviderRegistry;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::context::ContextCompiler;
use crate::normalize::{Disagreement, NormalizedOutput, detect_disagreements, normalize_output};
use crate::plan::{
    BuiltRun, JUDGE_MODEL_ID, MERGE_MODEL_ID, MERGE_NODE_ID, ModelRef, Planner, ROUTER_MODEL_ID,
    StepPlanNode,
};
use crate::router::decide_route;
use crate::token::approx_tokens;

/// Final answer when no step produced any text.
pub const NO_OUTPUT: &str = "No output generated.";
/// Characters of the final answer kept in the run summary memory item.
const SUMMARY_MEMORY_CHARS: usize = 260;
const SUMMARY_MEMORY_CONFIDENCE: f64 = 0.5;

/// Output of a completed node, kept for the rest of one execution pass.
#[derive(Debug, Clone)]
struct NodeOutput {
    step_type: StepType,
    model_id: String,
    output_raw: String,
    output_parsed_json: serde_json::Value,
}

/// What a step handler hands back for persistence.
struct StepOutcome {
    provider: ProviderKey,
    model_id: String,
    rendered_prompt: String,
    output_raw: String,
    output_parsed_json: serde_json::Value,
    input_tokens: u64,
    output_tokens: u64,
    cost_usd: f64,
    origin: Option<CallOrigin>,
    decision: Option<RouterDecision>,
}

impl StepOutcome {
    /// An outcome for a step that runs in-process with no model call.
    fn internal(model_id: &str, output_raw: String, output_parsed_json: serde_json::Value) -> Self {
        Self {
            provider: ProviderKey::Mock,
            model_id: model_id.to_string(),
            rendered_prompt: String::new(),
            output_raw,
            output_parsed_json,
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
            origin: None,
            decision: None,
        }
    }
}

#[derive(Serialize)]
struct JudgeReport {
    normalized: Vec<NormalizedOutput>,
    disagreements: Vec<Disagreement>,
}

#[derive(Serialize)]
struct MergeReport<'a> {
    final_answer: &'a str,
    source_step_count: usize,
}

/// Per-call state shared by every handler of one run.
struct RunContext<'a> {
    run: &'a Run,
    built: &'a BuiltRun,
    plan: &'a [StepPlanNode],
    user_text: &'a str,
    trace_id: &'a str,
    step_ids: &'a HashMap<String, String>,
}

/// Executes runs against a store and a provider registry.
pub struct RunExecutor {
    store: Arc<dyn RunStore>,
    registry: Arc<ProviderRegistry>,
    catalog: Arc<ModelCatalog>,
    compiler: ContextCompiler,
    planner: Planner,
}

impl RunExecutor {
    pub fn new(
        store: Arc<dyn RunStore>,
        registry: Arc<ProviderRegistry>,
        catalog: Arc<ModelCatalog>,
    ) -> Self {
        Self {
            compiler: ContextCompiler::new(store.clone()),
            planner: Planner::new(catalog.clone()),
            store,
            registry,
            catalog,
        }
    }

    /// Execute a run to completion and return it with its steps and artifacts.
    ///
    /// A run that is already `DONE` with persisted steps is returned as is.
    pub async fn execute_run(&self, run_id: &str) -> Result<RunDetails> {
        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or_else(|| Error::not_found("Run", run_id))?;

        if run.status == RunStatus::Done && !self.store.steps_for_run(run_id).await?.is_empty() {
            debug!(run_id, "Run already complete, skipping execution");
            return self.details(run_id).await;
        }

        let message_id = run.user_message_id.clone().ok_or_else(|| {
            Error::Precondition(format!("run {run_id} has no user message to execute"))
        })?;
        let message = self.store.get_message(&message_id).await?.ok_or_else(|| {
            Error::Precondition(format!("user message {message_id} for run {run_id} not found"))
        })?;

        let trace_id = Uuid::new_v4().to_string();
        let span = info_span!("run", run_id = %run.id, trace_id = %trace_id);

        async {
            match self.drive(&run, &message, &trace_id).await {
                Ok(()) => self.details(&run.id).await,
                Err(e) => {
                    self.mark_failed(&run.id, &e).await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn details(&self, run_id: &str) -> Result<RunDetails> {
        self.store
            .run_details(run_id)
            .await?
            .ok_or_else(|| Error::not_found("Run", run_id))
    }

    async fn drive(&self, run: &Run, message: &Message, trace_id: &str) -> Result<()> {
        let built = self.planner.build_run(run)?;
        let plan = self.planner.plan_steps(&built)?;

        let mut step_ids = HashMap::with_capacity(plan.len());
        for node in &plan {
            let (provider, model_id) = node.model.provisional();
            let step = Step::pending(&run.id, &node.id, node.step_type, provider, model_id);
            let step = self.store.create_step(step).await?;
            step_ids.insert(node.id.clone(), step.id);
        }

        self.store
            .update_run(&run.id, &RunPatch::status(RunStatus::Running))
            .await?;
        info!(mode = %run.mode, steps = plan.len(), "Run started");

        let ctx = RunContext {
            run,
            built: &built,
            plan: &plan,
            user_text: &message.content,
            trace_id,
            step_ids: &step_ids,
        };

        let mut outputs: HashMap<String, NodeOutput> = HashMap::with_capacity(plan.len());
        let mut started: HashSet<&str> = HashSet::with_capacity(plan.len());

        while outputs.len() < plan.len() {
            let ready: Vec<&StepPlanNode> = plan
                .iter()
                .filter(|node| {
                    !started.contains(node.id.as_str())
                        && node.depends_on.iter().all(|dep| outputs.contains_key(dep))
                })
                .collect();

            if ready.is_empty() {
                return Err(Error::Plan(
                    "no executable nodes remain; the plan may contain a cycle".into(),
                ));
            }
            started.extend(ready.iter().map(|node| node.id.as_str()));
            debug!(wave = ?ready.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), "Running wave");

            let wave = ready.iter().map(|node| self.run_node(&ctx, node, &outputs));
            let results = try_join_all(wave).await?;
            for (node, output) in ready.into_iter().zip(results) {
                outputs.insert(node.id.clone(), output);
            }
        }

        self.complete(run, &plan, &outputs).await
    }

    async fn run_node(
        &self,
        ctx: &RunContext<'_>,
        node: &StepPlanNode,
        outputs: &HashMap<String, NodeOutput>,
    ) -> Result<NodeOutput> {
        let step_id = ctx
            .step_ids
            .get(&node.id)
            .ok_or_else(|| Error::Plan(format!("no step record for node '{}'", node.id)))?;
        self.store
            .update_step(step_id, &StepPatch::running(Utc::now()))
            .await?;

        let timer = Instant::now();
        let outcome = match node.step_type {
            StepType::Router => self.router_step(ctx)?,
            StepType::ModelCall
            | StepType::Draft
            | StepType::Refine
            | StepType::Critique
            | StepType::Compress => self.model_step(ctx, node, outputs).await?,
            StepType::Judge => judge_step(ctx.plan, outputs)?,
            StepType::Merge => merge_step(node, outputs)?,
        };
        let latency_ms = u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX);

        let patch = StepPatch {
            status: Some(StepStatus::Done),
            provider: Some(outcome.provider),
            model_id: Some(outcome.model_id.clone()),
            rendered_prompt: Some(outcome.rendered_prompt),
            output_raw: Some(outcome.output_raw.clone()),
            output_parsed_json: Some(outcome.output_parsed_json.clone()),
            input_tokens: Some(outcome.input_tokens),
            output_tokens: Some(outcome.output_tokens),
            cost_usd: Some(outcome.cost_usd),
            latency_ms: Some(latency_ms),
            origin: outcome.origin,
            finished_at: Some(Utc::now()),
            ..Default::default()
        };
        self.store.update_step(step_id, &patch).await?;

        if let Some(decision) = outcome.decision {
            self.store
                .update_run(&ctx.run.id, &RunPatch::router_decision(decision))
                .await?;
        }

        Ok(NodeOutput {
            step_type: node.step_type,
            model_id: outcome.model_id,
            output_raw: outcome.output_raw,
            output_parsed_json: outcome.output_parsed_json,
        })
    }

    fn router_step(&self, ctx: &RunContext<'_>) -> Result<StepOutcome> {
        let decision = decide_route(&ctx.built.cpir, Some(&ctx.built.preferences), &self.catalog)?;
        info!(
            token_estimate = decision.token_estimate,
            candidates = decision.candidates.len(),
            chosen = %decision.chosen.model_id,
            "router step complete"
        );

        let mut outcome = StepOutcome::internal(
            ROUTER_MODEL_ID,
            serde_json::to_string_pretty(&decision)?,
            serde_json::to_value(&decision)?,
        );
        outcome.input_tokens = decision.token_estimate;
        outcome.output_tokens = approx_tokens(&decision.reasoning);
        outcome.decision = Some(decision);
        Ok(outcome)
    }

    /// The model the router picked, or the auto default when the router
    /// output is missing or unreadable.
    fn routed_model(&self, router: Option<&NodeOutput>) -> ModelCatalogEntry {
        let choice = router
            .and_then(|output| output.output_parsed_json.get("chosen"))
            .and_then(|chosen| serde_json::from_value::<ModelChoice>(chosen.clone()).ok());
        match choice.and_then(|c| self.catalog.get(&c.model_id)) {
            Some(entry) => entry.clone(),
            None => self.catalog.default_auto_model().clone(),
        }
    }

    async fn model_step(
        &self,
        ctx: &RunContext<'_>,
        node: &StepPlanNode,
        outputs: &HashMap<String, NodeOutput>,
    ) -> Result<StepOutcome> {
        let model = match &node.model {
            ModelRef::Fixed { model_id, .. } => self
                .catalog
                .get(model_id)
                .cloned()
                .unwrap_or_else(|| self.catalog.default_auto_model().clone()),
            ModelRef::FromNode { node_id } => self.routed_model(outputs.get(node_id)),
        };
        let adapter = self.registry.resolve(model.provider);

        let pack = self
            .compiler
            .compile_context_pack(&ctx.run.session_id, ctx.user_text)
            .await?;
        let cpir = ctx.built.cpir.with_context_pack(pack);

        let previous = node
            .depends_on
            .first()
            .and_then(|dep| outputs.get(dep))
            .map(|output| output.output_raw.as_str())
            .unwrap_or_default();
        let cpir = match node.step_type {
            StepType::Refine => {
                cpir.with_user_text(format!("{}\n\nDraft to refine:\n{previous}", cpir.user_text()))
            }
            StepType::Critique => cpir.with_user_text(format!(
                "{}\n\nOutput to critique:\n{previous}",
                cpir.user_text()
            )),
            StepType::Compress => cpir.with_user_text(format!(
                "{}\n\nCritique findings:\n{previous}\n\nCompress into key points + actions.",
                cpir.user_text()
            )),
            _ => cpir,
        };

        let prompt = adapter.render_prompt(&cpir, &model);
        let options = ModelCallOptions::new(model.provider, model.model_id.clone())
            .with_json_mode(cpir.output_contract.is_json())
            .with_trace_id(ctx.trace_id);
        let result = adapter.call_model(&prompt, &options).await?;
        let normalized = normalize_output(&result.text);

        info!(
            step = %node.id,
            provider = %model.provider,
            model_id = %model.model_id,
            origin = %result.origin,
            input_tokens = result.input_tokens,
            output_tokens = result.output_tokens,
            cost_usd = result.cost_usd,
            latency_ms = result.latency_ms,
            "model step complete"
        );

        Ok(StepOutcome {
            provider: model.provider,
            model_id: model.model_id,
            rendered_prompt: prompt,
            output_parsed_json: serde_json::to_value(&normalized)?,
            output_raw: result.text,
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
            cost_usd: result.cost_usd,
            origin: Some(result.origin),
            decision: None,
        })
    }

    /// Aggregate totals and write the completion records in one unit.
    async fn complete(
        &self,
        run: &Run,
        plan: &[StepPlanNode],
        outputs: &HashMap<String, NodeOutput>,
    ) -> Result<()> {
        let steps = self.store.steps_for_run(&run.id).await?;
        let totals = RunTotals {
            input_tokens: steps.iter().map(|s| s.input_tokens).sum(),
            output_tokens: steps.iter().map(|s| s.output_tokens).sum(),
            cost_usd: round6(steps.iter().map(|s| s.cost_usd).sum()),
            latency_ms: steps.iter().map(|s| s.latency_ms).sum(),
        };

        let answer = final_answer(plan, outputs);
        let mut summary = MemoryValue::new();
        summary.insert(
            "summary".into(),
            answer.chars().take(SUMMARY_MEMORY_CHARS).collect::<String>().into(),
        );
        let memory = MemoryItem::new(
            &run.session_id,
            MemoryItemType::Fact,
            format!("run-{}-summary", run.id),
            summary,
        )
        .with_confidence(SUMMARY_MEMORY_CONFIDENCE)
        .with_source_run(&run.id);

        self.store
            .complete_run(RunCompletion {
                run_id: run.id.clone(),
                artifact: Artifact::final_answer(&run.session_id, &run.id, answer),
                message: Message::assistant(&run.session_id, answer),
                memory,
                totals,
            })
            .await?;

        info!(
            input_tokens = totals.input_tokens,
            output_tokens = totals.output_tokens,
            cost_usd = totals.cost_usd,
            latency_ms = totals.latency_ms,
            "Run complete"
        );
        Ok(())
    }

    async fn mark_failed(&self, run_id: &str, err: &Error) {
        let message = err.to_string();
        error!(error = %message, "Run failed");

        if let Err(e) = self
            .store
            .update_run(run_id, &RunPatch::status(RunStatus::Error))
            .await
        {
            warn!(error = %e, "Could not mark run as failed");
        }

        let steps = match self.store.steps_for_run(run_id).await {
            Ok(steps) => steps,
            Err(e) => {
                warn!(error = %e, "Could not load steps of failed run");
                return;
            }
        };
        for step in steps.iter().filter(|s| s.status == StepStatus::Running) {
            if let Err(e) = self
                .store
                .update_step(&step.id, &StepPatch::failed(&message))
                .await
            {
                warn!(step_id = %step.id, error = %e, "Could not mark step as failed");
            }
        }
    }
}

fn judge_step(
    plan: &[StepPlanNode],
    outputs: &HashMap<String, NodeOutput>,
) -> Result<StepOutcome> {
    let model_outputs: Vec<&NodeOutput> = plan
        .iter()
        .filter_map(|node| outputs.get(&node.id))
        .filter(|output| output.step_type == StepType::ModelCall)
        .collect();

    let normalized: Vec<NormalizedOutput> = model_outputs
        .iter()
        .map(|output| normalize_output(&output.output_raw))
        .collect();
    let disagreements = detect_disagreements(&normalized);
    debug!(
        outputs = normalized.len(),
        disagreements = disagreements.len(),
        "judge step complete"
    );

    let report = serde_json::to_value(JudgeReport {
        normalized,
        disagreements,
    })?;
    let mut outcome = StepOutcome::internal(
        JUDGE_MODEL_ID,
        serde_json::to_string_pretty(&report)?,
        report,
    );
    outcome.input_tokens = model_outputs
        .iter()
        .map(|output| approx_tokens(&output.output_raw))
        .sum();
    outcome.output_tokens = approx_tokens(&outcome.output_parsed_json.to_string());
    Ok(outcome)
}

fn merge_step(node: &StepPlanNode, outputs: &HashMap<String, NodeOutput>) -> Result<StepOutcome> {
    let deps = node
        .depends_on
        .iter()
        .map(|dep| {
            outputs
                .get(dep)
                .ok_or_else(|| Error::Plan(format!("merge input '{dep}' has no output")))
        })
        .collect::<Result<Vec<_>>>()?;

    let final_text = match deps.as_slice() {
        [only] => only.output_raw.clone(),
        _ => {
            let options = deps
                .iter()
                .enumerate()
                .map(|(i, output)| {
                    format!("Option {} ({}):\n{}", i + 1, output.model_id, output.output_raw)
                })
                .collect::<Vec<_>>()
                .join("\n\n---\n\n");
            [
                "Merged final answer based on prior steps:",
                "",
                options.as_str(),
                "",
                "Final synthesis:",
                "Use the strongest claims that are consistent across options and retain concrete actions.",
            ]
            .join("\n")
        }
    };
    debug!(sources = deps.len(), "merge step complete");

    let parsed = serde_json::to_value(MergeReport {
        final_answer: &final_text,
        source_step_count: deps.len(),
    })?;
    let mut outcome = StepOutcome::internal(MERGE_MODEL_ID, final_text, parsed);
    outcome.input_tokens = deps.iter().map(|d| approx_tokens(&d.output_raw)).sum();
    outcome.output_tokens = approx_tokens(&outcome.output_raw);
    Ok(outcome)
}

/// The merge output, else the last model-producing output in plan order.
fn final_answer<'a>(plan: &[StepPlanNode], outputs: &'a HashMap<String, NodeOutput>) -> &'a str {
    if let Some(merge) = outputs.get(MERGE_NODE_ID)
        && !merge.output_raw.is_empty()
    {
        return &merge.output_raw;
    }
    plan.iter()
        .rev()
        .filter_map(|node| outputs.get(&node.id))
        .find(|output| output.step_type.is_model_producing())
        .map(|output| output.output_raw.as_str())
        .unwrap_or(NO_OUTPUT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(step_type: StepType, model_id: &str, raw: &str) -> NodeOutput {
        NodeOutput {
            step_type,
            model_id: model_id.into(),
            output_raw: raw.into(),
            output_parsed_json: serde_json::Value::Null,
        }
    }

    fn merge_node(deps: &[&str]) -> StepPlanNode {
        StepPlanNode {
            id: MERGE_NODE_ID.into(),
            step_type: StepType::Merge,
            model: ModelRef::Fixed {
                provider: ProviderKey::Mock,
                model_id: MERGE_MODEL_ID.into(),
            },
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn merge_passes_single_dependency_through() {
        let mut outputs = HashMap::new();
        outputs.insert("auto_model".to_string(), output(StepType::ModelCall, "m", "just this"));
        let outcome = merge_step(&merge_node(&["auto_model"]), &outputs).unwrap();
        assert_eq!(outcome.output_raw, "just this");
        assert_eq!(outcome.output_parsed_json["source_step_count"], 1);
    }

    #[test]
    fn merge_lists_options_in_dependency_order() {
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), output(StepType::ModelCall, "m1", "first"));
        outputs.insert("b".to_string(), output(StepType::ModelCall, "m2", "second"));
        let outcome = merge_step(&merge_node(&["a", "b"]), &outputs).unwrap();

        assert!(outcome.output_raw.starts_with("Merged final answer based on prior steps:\n\nOption 1 (m1):\nfirst"));
        assert!(outcome.output_raw.contains("\n\n---\n\nOption 2 (m2):\nsecond"));
        assert!(outcome.output_raw.ends_with("retain concrete actions."));
        assert_eq!(outcome.input_tokens, 4);
    }

    #[test]
    fn merge_with_missing_input_is_a_plan_error() {
        let outputs = HashMap::new();
        assert!(matches!(
            merge_step(&merge_node(&["ghost", "other"]), &outputs),
            Err(Error::Plan(_))
        ));
    }

    #[test]
    fn judge_reads_only_model_call_outputs() {
        let node = |id: &str, step_type| StepPlanNode {
            id: id.into(),
            step_type,
            model: ModelRef::FromNode {
                node_id: "router".into(),
            },
            depends_on: vec![],
        };
        let plan = vec![node("draft", StepType::Draft), node("compare_model_1", StepType::ModelCall)];
        let mut outputs = HashMap::new();
        outputs.insert(
            "draft".to_string(),
            output(StepType::Draft, "m0", "Claims:\n- drafts never reach the judge"),
        );
        outputs.insert(
            "compare_model_1".to_string(),
            output(StepType::ModelCall, "m1", "Claims:\n- alpha beta\n- gamma delta"),
        );

        let outcome = judge_step(&plan, &outputs).unwrap();
        let report = &outcome.output_parsed_json;
        let normalized = report["normalized"].as_array().unwrap();
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0]["claims"], serde_json::json!(["alpha beta", "gamma delta"]));

        let disagreements = report["disagreements"].as_array().unwrap();
        assert_eq!(disagreements.len(), 2);
        assert!(!report.to_string().contains("drafts never reach the judge"));
        assert_eq!(outcome.model_id, JUDGE_MODEL_ID);
    }

    #[test]
    fn final_answer_prefers_merge_then_last_model_output() {
        let plan = vec![
            StepPlanNode {
                id: "draft".into(),
                step_type: StepType::Draft,
                model: ModelRef::FromNode {
                    node_id: "router".into(),
                },
                depends_on: vec![],
            },
            StepPlanNode {
                id: "refine".into(),
                step_type: StepType::Refine,
                model: ModelRef::FromNode {
                    node_id: "router".into(),
                },
                depends_on: vec![],
            },
        ];
        let mut outputs = HashMap::new();
        assert_eq!(final_answer(&plan, &outputs), NO_OUTPUT);

        outputs.insert("draft".to_string(), output(StepType::Draft, "m", "draft text"));
        outputs.insert("refine".to_string(), output(StepType::Refine, "m", "refined text"));
        assert_eq!(final_answer(&plan, &outputs), "refined text");

        outputs.insert(MERGE_NODE_ID.to_string(), output(StepType::Merge, "m", "merged"));
        assert_eq!(final_answer(&plan, &outputs), "merged");
    }
}
