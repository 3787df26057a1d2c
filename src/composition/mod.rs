//! # Composition Module
//!
//! Decides *what* goes into the output video (which clips, which effects)
//! and drives the pipeline that renders it.

pub mod effects;
pub mod engine;
pub mod planner;

pub use effects::{base_crop, CropRect, EffectPlan, EffectPlanner, ZoomWindow};
pub use engine::CompositionEngine;
pub use planner::{ClipDescriptor, ClipPlan, ClipPlanner};
