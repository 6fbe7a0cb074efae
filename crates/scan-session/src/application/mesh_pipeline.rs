//! MeshPipeline: an ordered list of cleanup steps applied to the active mesh.
//!
//! Steps are destructive and cumulative.  When step *k* fails, steps before
//! it stay applied and the pipeline stops; the caller can resume with
//! [`MeshPipeline::run_from`] at the failed index instead of starting over.

use scan_core::{Command, PipelineOperation, ScanError};
use tracing::{info, warn};

use crate::application::session_machine::ScanSession;

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    /// Index the run started at.
    pub first_step: usize,
    /// Operations applied by this run, in order.
    pub completed: Vec<PipelineOperation>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshPipeline {
    operations: Vec<PipelineOperation>,
}

impl MeshPipeline {
    pub fn new(operations: Vec<PipelineOperation>) -> Self {
        Self { operations }
    }

    /// Appends a step.
    pub fn then(mut self, op: PipelineOperation) -> Self {
        self.operations.push(op);
        self
    }

    pub fn operations(&self) -> &[PipelineOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Applies every step in order.
    pub async fn run(&self, session: &mut ScanSession) -> Result<PipelineReport, ScanError> {
        self.run_from(session, 0).await
    }

    /// Applies the steps starting at index `start`.
    ///
    /// # Errors
    ///
    /// - `InvalidStateTransition` if the session is not viewing a mesh;
    ///   nothing is applied.
    /// - `InvalidParameter` if `start` is past the end.
    /// - `PipelineStepFailed` naming the failed index and operation.
    pub async fn run_from(
        &self,
        session: &mut ScanSession,
        start: usize,
    ) -> Result<PipelineReport, ScanError> {
        session.check(Command::ApplyMeshOperation)?;
        if start > self.operations.len() {
            return Err(ScanError::InvalidParameter(format!(
                "pipeline has {} steps, cannot start at {start}",
                self.operations.len()
            )));
        }

        let mut completed = Vec::with_capacity(self.operations.len() - start);
        for (step, op) in self.operations.iter().copied().enumerate().skip(start) {
            if let Err(source) = session.apply_mesh_operation(op).await {
                warn!(
                    "pipeline stopped at step {step} ({op}); {} step(s) applied",
                    completed.len()
                );
                return Err(ScanError::PipelineStepFailed {
                    step,
                    operation: op,
                    source: Box::new(source),
                });
            }
            info!("pipeline step {step}: {op}");
            completed.push(op);
        }

        Ok(PipelineReport {
            first_step: start,
            completed,
        })
    }
}

impl From<Vec<PipelineOperation>> for MeshPipeline {
    fn from(operations: Vec<PipelineOperation>) -> Self {
        Self::new(operations)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
