//! Multi-step execution orchestration.
//!
//! Drives named processes and compounds: resolves skip guards and
//! switch injection, runs prerequisites, the main command, and
//! post-validations, evaluates markers into a verdict, and streams each
//! step's response to the progress subscriber. Stop-on-fail halts a
//! compound after a failing or erroring step; skipped steps never
//! trigger the halt.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::{
    CompletionConfig, CompoundDef, Config, LimitsConfig, Plan, Prerequisite, ProcessDef, StepKind,
};
use crate::domain::{resolve_actions, trim_tail, FlowData, SwitchKind};
use crate::error::{FlowError, Result};
use crate::exec::response::ProcessExecutionResponse;
use crate::ports::{CommandExecutor, ProgressSink, ProgressUpdate, QueryExecutor};
use crate::ssh::Command;

pub struct Orchestrator {
    executor: Arc<dyn CommandExecutor>,
    query: Option<Arc<dyn QueryExecutor>>,
    progress: Arc<dyn ProgressSink>,
    limits: LimitsConfig,
    completion: CompletionConfig,
    work_dir: PathBuf,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        progress: Arc<dyn ProgressSink>,
        config: &Config,
    ) -> Self {
        Self {
            executor,
            query: None,
            progress,
            limits: config.limits.clone(),
            completion: config.completion.clone(),
            work_dir: config.work_dir.clone(),
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: Arc<dyn QueryExecutor>) -> Self {
        self.query = Some(query);
        self
    }

    /// Runs a single process; the one emission is the last of its batch.
    pub async fn run_process(
        &self,
        def: &ProcessDef,
        flow: &mut FlowData,
        correlation_id: &str,
    ) -> ProcessExecutionResponse {
        let response = self.execute_step(def, flow, correlation_id, 0).await;
        self.progress
            .publish(ProgressUpdate {
                response: response.clone(),
                correlation_id: correlation_id.to_string(),
                step_index: 0,
                is_last: true,
            })
            .await;
        response
    }

    /// Runs a compound's steps strictly in order. Every attempted step
    /// yields a response; with stop-on-fail, steps after a failing or
    /// erroring one are absent from the list, and the halting step's
    /// emission is marked last.
    pub async fn run_compound(
        &self,
        compound: &CompoundDef,
        plan: &Plan,
        flow: &mut FlowData,
        correlation_id: &str,
    ) -> Result<Vec<ProcessExecutionResponse>> {
        info!(
            compound = %compound.name,
            steps = compound.steps.len(),
            stop_on_fail = compound.stop_on_fail,
            "compound started"
        );

        let total = compound.steps.len();
        let mut responses = Vec::with_capacity(total);

        for (index, step_name) in compound.steps.iter().enumerate() {
            let def = plan.process(step_name).ok_or_else(|| {
                FlowError::Config(format!(
                    "compound '{}' references unknown process '{step_name}'",
                    compound.name
                ))
            })?;

            let response = self.execute_step(def, flow, correlation_id, index).await;
            let halt = compound.stop_on_fail && response.failed();
            let is_last = halt || index + 1 == total;

            self.progress
                .publish(ProgressUpdate {
                    response: response.clone(),
                    correlation_id: correlation_id.to_string(),
                    step_index: index,
                    is_last,
                })
                .await;
            responses.push(response);

            if halt {
                warn!(
                    compound = %compound.name,
                    step = %step_name,
                    index,
                    "stop on fail, halting remaining steps"
                );
                break;
            }
        }

        info!(compound = %compound.name, executed = responses.len(), "compound finished");
        Ok(responses)
    }

    /// Runs one step. Never fails outward: every error lands in the
    /// step's own error list.
    async fn execute_step(
        &self,
        def: &ProcessDef,
        flow: &mut FlowData,
        correlation_id: &str,
        index: usize,
    ) -> ProcessExecutionResponse {
        let started = std::time::Instant::now();

        if let Some(guard) = &def.input_ref {
            if !flow.is_truthy(guard) {
                debug!(step = %def.name, guard = %guard, "input reference unset, skipping step");
                flow.set(&format!("{}.status", def.name), "SKIPPED");
                return ProcessExecutionResponse::skipped(&def.name);
            }
        }

        let command_actions = resolve_actions(&def.switches, flow, SwitchKind::Command);
        let query_actions = resolve_actions(&def.switches, flow, SwitchKind::Query);

        let mut command_text = String::new();
        for action in &command_actions {
            command_text.push_str(action);
            command_text.push('\n');
        }
        command_text.push_str(&def.command);

        let mut response = ProcessExecutionResponse::started(&def.name, &command_text);

        if let Err(e) = self
            .drive_step(def, &command_text, &query_actions, correlation_id, index, &mut response)
            .await
        {
            response.errors.push(e.to_string());
        }

        response.duration_ms =
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        flow.set(&format!("{}.status", def.name), &response.status.to_string());
        response
    }

    /// Step body; an `Err` aborts the remainder of this step only.
    async fn drive_step(
        &self,
        def: &ProcessDef,
        command_text: &str,
        query_actions: &[String],
        correlation_id: &str,
        index: usize,
        response: &mut ProcessExecutionResponse,
    ) -> Result<()> {
        let marker = def.marker.compile()?;

        for prereq in &def.prerequisites {
            self.run_prerequisite(def, prereq, query_actions)
                .await
                .map_err(|e| FlowError::Step {
                    reason: format!("prerequisite '{}' failed: {e}", prereq.text),
                })?;
        }

        let output = self
            .executor
            .run(&self.shell_command(def, command_text.to_string()))
            .await?;

        match self.write_log(correlation_id, index, def, &output.lines).await {
            Ok(path) => response.log_path = Some(path),
            Err(e) => response.errors.push(format!("log write failed: {e}")),
        }

        let eval = marker.evaluate(&output.lines);
        response.status = response.status.merge(eval.status);
        response.errors.extend(eval.errors);
        if !eval.matched {
            response.display_output = trim_tail(
                &output.lines,
                self.limits.display_tail_lines,
                self.limits.display_tail_bytes,
            );
        }

        if let Some(pattern) = &def.extract_files {
            let regex = Regex::new(pattern).map_err(|e| FlowError::InvalidMarker {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            for line in &output.lines {
                if let Some(captures) = regex.captures(line) {
                    let matched = captures
                        .get(1)
                        .or_else(|| captures.get(0))
                        .map(|m| m.as_str().to_string());
                    if let Some(path) = matched {
                        response.extracted_files.push(path);
                    }
                }
            }
        }

        for validation in &def.validations {
            let lines = self
                .run_checked(def, &validation.kind, &validation.text, query_actions)
                .await
                .map_err(|e| FlowError::Step {
                    reason: format!("validation '{}' failed: {e}", validation.text),
                })?;
            let eval = validation.marker.compile()?.evaluate(&lines);
            response.status = response.status.merge(eval.status);
            response.errors.extend(eval.errors);
        }

        Ok(())
    }

    async fn run_prerequisite(
        &self,
        def: &ProcessDef,
        prereq: &Prerequisite,
        query_actions: &[String],
    ) -> Result<Vec<String>> {
        self.run_checked(def, &prereq.kind, &prereq.text, query_actions)
            .await
    }

    async fn run_checked(
        &self,
        def: &ProcessDef,
        kind: &StepKind,
        text: &str,
        query_actions: &[String],
    ) -> Result<Vec<String>> {
        match kind {
            StepKind::Shell => {
                let output = self
                    .executor
                    .run(&self.shell_command(def, text.to_string()))
                    .await?;
                Ok(output.lines)
            }
            StepKind::Query => {
                let query = self.query.as_ref().ok_or_else(|| {
                    FlowError::QueryUnsupported {
                        system: def.system.clone(),
                    }
                })?;
                let mut statement = String::new();
                for action in query_actions {
                    statement.push_str(action);
                    statement.push('\n');
                }
                statement.push_str(text);
                query.query(&def.system, &statement).await
            }
        }
    }

    fn shell_command(&self, def: &ProcessDef, text: String) -> Command {
        let timeout = Duration::from_secs(
            def.timeout_seconds
                .unwrap_or(self.limits.command_timeout_seconds),
        );
        let mut command = Command::new(text, def.system.clone(), timeout);
        command.reject_template = self.completion.reject_template.clone();
        command
    }

    async fn write_log(
        &self,
        correlation_id: &str,
        index: usize,
        def: &ProcessDef,
        lines: &[String],
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let safe_name: String = def
            .name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = self
            .work_dir
            .join(format!("{correlation_id}-{index:02}-{safe_name}.log"));
        let mut content = lines.join("\n");
        content.push('\n');
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }
}
