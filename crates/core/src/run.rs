//! Run, Step and Artifact records.
//!
//! A Run is one orchestrated execution of a plan over one user turn. Its
//! lifecycle is `PENDING → RUNNING → {DONE | ERROR}`. Every plan node is
//! materialized as a persisted Step so the full trace can be inspected later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::ProviderKey;
use crate::cpir::Cpir;
use crate::provider::CallOrigin;
use crate::routing::{RouterDecision, RouterPreferences};

/// How a run expands into steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    /// Single routed model
    #[default]
    Auto,
    /// Parallel models + judge
    Compare,
    /// Fixed sequential pipeline
    Chain,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Auto => "AUTO",
            RunMode::Compare => "COMPARE",
            RunMode::Chain => "CHAIN",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AUTO" => Ok(RunMode::Auto),
            "COMPARE" => Ok(RunMode::Compare),
            "CHAIN" => Ok(RunMode::Chain),
            other => Err(format!("unknown run mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Done => "DONE",
            RunStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RunStatus::Pending),
            "RUNNING" => Ok(RunStatus::Running),
            "DONE" => Ok(RunStatus::Done),
            "ERROR" => Ok(RunStatus::Error),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// Node type of a plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    Router,
    ModelCall,
    Draft,
    Refine,
    Critique,
    Compress,
    Judge,
    Merge,
}

impl StepType {
    pub const ALL: [StepType; 8] = [
        StepType::Router,
        StepType::ModelCall,
        StepType::Draft,
        StepType::Refine,
        StepType::Critique,
        StepType::Compress,
        StepType::Judge,
        StepType::Merge,
    ];

    /// Whether this step calls a model provider.
    pub fn is_model_producing(&self) -> bool {
        matches!(
            self,
            StepType::ModelCall
                | StepType::Draft
                | StepType::Refine
                | StepType::Critique
                | StepType::Compress
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Router => "ROUTER",
            StepType::ModelCall => "MODEL_CALL",
            StepType::Draft => "DRAFT",
            StepType::Refine => "REFINE",
            StepType::Critique => "CRITIQUE",
            StepType::Compress => "COMPRESS",
            StepType::Judge => "JUDGE",
            StepType::Merge => "MERGE",
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown step type '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Running => "RUNNING",
            StepStatus::Done => "DONE",
            StepStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(StepStatus::Pending),
            "RUNNING" => Ok(StepStatus::Running),
            "DONE" => Ok(StepStatus::Done),
            "ERROR" => Ok(StepStatus::Error),
            other => Err(format!("unknown step status '{other}'")),
        }
    }
}

/// Aggregated usage across every step of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub session_id: String,
    pub mode: RunMode,
    pub status: RunStatus,

    /// The user turn this run answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message_id: Option<String>,

    pub selected_model_ids: Vec<String>,
    pub preferences: RouterPreferences,
    pub cpir: Cpir,

    /// Set once the router step completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_decision: Option<RouterDecision>,

    #[serde(default)]
    pub totals: RunTotals,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// A new `PENDING` run.
    pub fn new(
        session_id: impl Into<String>,
        mode: RunMode,
        user_message_id: Option<String>,
        selected_model_ids: Vec<String>,
        preferences: RouterPreferences,
        cpir: Cpir,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            mode,
            status: RunStatus::Pending,
            user_message_id,
            selected_model_ids,
            preferences,
            cpir,
            router_decision: None,
            totals: RunTotals::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a run. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunPatch {
    pub status: Option<RunStatus>,
    pub router_decision: Option<RouterDecision>,
    pub totals: Option<RunTotals>,
}

impl RunPatch {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn router_decision(decision: RouterDecision) -> Self {
        Self {
            router_decision: Some(decision),
            ..Default::default()
        }
    }

    pub fn apply(&self, run: &mut Run) {
        if let Some(status) = self.status {
            run.status = status;
        }
        if let Some(decision) = &self.router_decision {
            run.router_decision = Some(decision.clone());
        }
        if let Some(totals) = self.totals {
            run.totals = totals;
        }
        run.updated_at = Utc::now();
    }
}

/// One executed node of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub run_id: String,

    /// Plan node id (e.g. `router`, `compare_model_2`)
    pub node_id: String,

    #[serde(rename = "type")]
    pub step_type: StepType,

    pub provider: ProviderKey,
    pub model_id: String,
    pub status: StepStatus,

    #[serde(default)]
    pub rendered_prompt: String,

    #[serde(default)]
    pub output_raw: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_parsed_json: Option<serde_json::Value>,

    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub latency_ms: u64,

    /// How the model answered; `None` for internal steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<CallOrigin>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Step {
    /// A `PENDING` step for a plan node.
    pub fn pending(
        run_id: impl Into<String>,
        node_id: impl Into<String>,
        step_type: StepType,
        provider: ProviderKey,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            node_id: node_id.into(),
            step_type,
            provider,
            model_id: model_id.into(),
            status: StepStatus::Pending,
            rendered_prompt: String::new(),
            output_raw: String::new(),
            output_parsed_json: None,
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
            latency_ms: 0,
            origin: None,
            error_message: None,
            started_at: None,
            finished_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Partial update of a step. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepPatch {
    pub status: Option<StepStatus>,
    pub provider: Option<ProviderKey>,
    pub model_id: Option<String>,
    pub rendered_prompt: Option<String>,
    pub output_raw: Option<String>,
    pub output_parsed_json: Option<serde_json::Value>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
    pub latency_ms: Option<u64>,
    pub origin: Option<CallOrigin>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepPatch {
    pub fn running(started_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(StepStatus::Running),
            started_at: Some(started_at),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(StepStatus::Error),
            error_message: Some(message.into()),
            finished_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn apply(&self, step: &mut Step) {
        if let Some(status) = self.status {
            step.status = status;
        }
        if let Some(provider) = self.provider {
            step.provider = provider;
        }
        if let Some(model_id) = &self.model_id {
            step.model_id = model_id.clone();
        }
        if let Some(prompt) = &self.rendered_prompt {
            step.rendered_prompt = prompt.clone();
        }
        if let Some(raw) = &self.output_raw {
            step.output_raw = raw.clone();
        }
        if let Some(parsed) = &self.output_parsed_json {
            step.output_parsed_json = Some(parsed.clone());
        }
        if let Some(tokens) = self.input_tokens {
            step.input_tokens = tokens;
        }
        if let Some(tokens) = self.output_tokens {
            step.output_tokens = tokens;
        }
        if let Some(cost) = self.cost_usd {
            step.cost_usd = cost;
        }
        if let Some(latency) = self.latency_ms {
            step.latency_ms = latency;
        }
        if let Some(origin) = self.origin {
            step.origin = Some(origin);
        }
        if let Some(message) = &self.error_message {
            step.error_message = Some(message.clone());
        }
        if let Some(at) = self.started_at {
            step.started_at = Some(at);
        }
        if let Some(at) = self.finished_at {
            step.finished_at = Some(at);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactKind {
    FinalAnswer,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::FinalAnswer => "FINAL_ANSWER",
        }
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FINAL_ANSWER" => Ok(ArtifactKind::FinalAnswer),
            other => Err(format!("unknown artifact kind '{other}'")),
        }
    }
}

/// A durable output of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub session_id: String,
    pub run_id: String,
    pub kind: ArtifactKind,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn final_answer(
        session_id: impl Into<String>,
        run_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let run_id = run_id.into();
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            title: format!("Run {run_id} final answer"),
            run_id,
            kind: ArtifactKind::FinalAnswer,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}
