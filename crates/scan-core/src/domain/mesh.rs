//! The active mesh artifact and the cleanup operations applied to it.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One destructive cleanup step on the active mesh.
///
/// Each variant carries the single numeric parameter the engine expects.
/// In TOML a pipeline step is written as, e.g.:
///
/// ```toml
/// [[pipeline]]
/// op = "decimate"
/// ratio = 0.9
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PipelineOperation {
    /// Keep `ratio` (0, 1] of the triangles.
    Decimate { ratio: f64 },
    /// Laplacian smoothing passes.
    Smooth { iterations: u32 },
    /// Close holes whose boundary is at most `max_size`.
    FillHoles { max_size: f64 },
    /// Drop disconnected surfaces smaller than `min_percent` of the largest.
    ExtractLargestSurface { min_percent: f64 },
    /// Rebuild a closed surface at the given octree depth.
    MakeWatertight { depth: u32 },
    /// Decimate until the mesh fits in `max_size`.
    OptimizeSize { max_size: f64 },
}

impl PipelineOperation {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineOperation::Decimate { .. } => "decimate",
            PipelineOperation::Smooth { .. } => "smooth",
            PipelineOperation::FillHoles { .. } => "fill_holes",
            PipelineOperation::ExtractLargestSurface { .. } => "extract_largest_surface",
            PipelineOperation::MakeWatertight { .. } => "make_watertight",
            PipelineOperation::OptimizeSize { .. } => "optimize_size",
        }
    }

    /// Checks the parameter before it is sent to the engine.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            PipelineOperation::Decimate { ratio } => {
                if !(ratio > 0.0 && ratio <= 1.0) {
                    return Err(format!("decimate ratio must be in (0, 1], got {ratio}"));
                }
            }
            PipelineOperation::Smooth { iterations } => {
                if iterations == 0 {
                    return Err("smooth needs at least one iteration".to_string());
                }
            }
            PipelineOperation::FillHoles { max_size: value }
            | PipelineOperation::OptimizeSize { max_size: value } => {
                if !value.is_finite() || value <= 0.0 {
                    return Err(format!("{} size must be positive, got {value}", self.name()));
                }
            }
            PipelineOperation::ExtractLargestSurface { min_percent } => {
                if !(0.0..=100.0).contains(&min_percent) {
                    return Err(format!(
                        "extract_largest_surface percent must be in [0, 100], got {min_percent}"
                    ));
                }
            }
            PipelineOperation::MakeWatertight { depth } => {
                if depth == 0 {
                    return Err("make_watertight depth must be at least 1".to_string());
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for PipelineOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineOperation::Decimate { ratio } => write!(f, "decimate({ratio})"),
            PipelineOperation::Smooth { iterations } => write!(f, "smooth({iterations})"),
            PipelineOperation::FillHoles { max_size } => write!(f, "fill_holes({max_size})"),
            PipelineOperation::ExtractLargestSurface { min_percent } => {
                write!(f, "extract_largest_surface({min_percent})")
            }
            PipelineOperation::MakeWatertight { depth } => write!(f, "make_watertight({depth})"),
            PipelineOperation::OptimizeSize { max_size } => write!(f, "optimize_size({max_size})"),
        }
    }
}

/// Where the active artifact came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    /// Produced by live meshing in this session.
    Generated,
    /// Loaded back from a stored mesh file.
    Loaded(PathBuf),
}

/// Handle to the engine's in-memory mesh.
///
/// The mesh data itself stays inside the engine; this records what the
/// session knows about it: where it came from, where it was last saved,
/// and which cleanup operations have already been applied (in order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshArtifact {
    id: Uuid,
    origin: ArtifactOrigin,
    path: Option<PathBuf>,
    applied: Vec<PipelineOperation>,
}

impl MeshArtifact {
    pub fn generated() -> Self {
        Self {
            id: Uuid::new_v4(),
            origin: ArtifactOrigin::Generated,
            path: None,
            applied: Vec::new(),
        }
    }

    /// An artifact loaded from `path`; saving again defaults to the same file.
    pub fn loaded(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: Uuid::new_v4(),
            origin: ArtifactOrigin::Loaded(path.clone()),
            path: Some(path),
            applied: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn origin(&self) -> &ArtifactOrigin {
        &self.origin
    }

    /// Path of the last successful save (or the load source).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Cleanup operations applied so far, oldest first.
    pub fn applied(&self) -> &[PipelineOperation] {
        &self.applied
    }

    pub fn record_operation(&mut self, op: PipelineOperation) {
        self.applied.push(op);
    }

    pub fn mark_saved(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }
}
