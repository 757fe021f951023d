//! Engine error types.
//!
//! All variants are fatal configuration errors: the inputs describe a world
//! the drainage simulation cannot run on, so the whole generation aborts
//! rather than producing a partial forest.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The land mask classified every mesh vertex as water.
    #[error("land mask produced no land vertices")]
    EmptyLand,

    /// There is land but none of it touches water, so the drainage forest
    /// has nowhere to root.
    #[error("land mass has no coastline; no drainage outlets exist")]
    NoOutlets,

    /// The forest bootstrap exhausted its frontier while land vertices were
    /// still unclaimed. The mesh contains land unreachable from any outlet.
    #[error("{count} land vertices are unreachable from any drainage outlet")]
    DisconnectedLand { count: usize },

    /// The greedy pass merge completed a full scan without resolving or
    /// discarding a single pass. Cannot happen on a connected land mass.
    #[error("lake resolution stalled with {remaining} unresolved passes")]
    LakeResolutionStall { remaining: usize },

    /// A biome's erosion level carries no settings to run iterations with.
    #[error("biome {biome} has an empty erosion schedule")]
    EmptySchedule { biome: usize },
}
