//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! The main error type [`StrataError`] covers the failure modes a caller can
//! act on:
//! - Scene graph misuse (unknown handles, cycles, operations on the root)
//! - Shader generation and compilation failures
//! - Renderer configuration errors
//!
//! Recoverable per-frame conditions (a mesh with no geometry, a texture that is
//! still loading, a lost GPU context) are *not* errors: the renderer logs them
//! and reports them through [`FrameOutcome`](crate::renderer::FrameOutcome)
//! and [`RenderStats`](crate::renderer::RenderStats).
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, StrataError>`.
//!
//! ```rust,ignore
//! use strata::errors::Result;
//!
//! fn build(scene: &mut Scene) -> Result<()> {
//!     let group = scene.create_node("group");
//!     let child = scene.create_node("child");
//!     scene.attach(child, group)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::scene::NodeHandle;

/// The main error type for the Strata engine.
#[derive(Error, Debug)]
pub enum StrataError {
    // ========================================================================
    // Scene Graph Errors
    // ========================================================================
    /// The handle does not refer to a live node of this scene.
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeHandle),

    /// Attaching `child` under `parent` would make a node its own ancestor.
    #[error("Attaching {child:?} under {parent:?} would create a cycle")]
    CycleDetected {
        /// The node being attached
        child: NodeHandle,
        /// The requested new parent
        parent: NodeHandle,
    },

    /// The requested operation is not permitted on the scene root.
    #[error("The scene root cannot be {0}")]
    RootNode(&'static str),

    /// The node passed to `render` carries no camera component.
    #[error("Node {0:?} has no camera component")]
    CameraNotFound(NodeHandle),

    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// The driver rejected a generated program.
    #[error("Shader compilation failed for '{label}': {log}")]
    ShaderCompilation {
        /// Program label (shader name and option hash)
        label: String,
        /// Driver info log
        log: String,
    },

    /// A shader template could not be located in the embedded sources.
    #[error("Shader template not found: {0}")]
    TemplateNotFound(String),

    /// Template rendering failed.
    #[error("Shader template error: {0}")]
    Template(#[from] minijinja::Error),

    // ========================================================================
    // Device & Configuration Errors
    // ========================================================================
    /// The GPU context is lost; resources cannot be created until restore.
    #[error("GPU context lost")]
    ContextLost,

    /// Renderer settings could not be parsed.
    #[error("Invalid renderer settings: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Alias for `Result<T, StrataError>`.
pub type Result<T> = std::result::Result<T, StrataError>;
