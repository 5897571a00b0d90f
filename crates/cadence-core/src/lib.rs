//! Phased, fixed-step simulation scheduling for Cadence.
//!
//! This crate drives an external physics engine one fixed step at a time
//! while moving through named phases, firing one-shot timed events and
//! running periodic tasks, all off a single simulation clock. It implements
//! no dynamics of its own.
//!
//! # Modules
//!
//! - [`clock`] -- Fixed-step clock and time-threshold comparison.
//! - [`periodic`] -- Periodic tasks with step cadences derived from a
//!   target frequency.
//! - [`events`] -- One-shot events keyed by absolute simulation time.
//! - [`phase`] -- Named phases with enter/exit hooks and transition
//!   listeners.
//! - [`action`] -- Action type and failure isolation.
//! - [`collaborator`] -- [`PhysicsStepper`] and [`Renderer`] traits plus
//!   stub implementations.
//! - [`pacing`] -- Real-time pacing decorator for steppers.
//! - [`operator`] -- Termination conditions and stop handles.
//! - [`runner`] -- The [`SimulationLoop`] itself.
//! - [`config`] -- Configuration loading from `cadence-config.yaml`.
//! - [`error`] -- Configuration-time [`SchedulerError`].
//!
//! [`PhysicsStepper`]: collaborator::PhysicsStepper
//! [`Renderer`]: collaborator::Renderer
//! [`SimulationLoop`]: runner::SimulationLoop
//! [`SchedulerError`]: error::SchedulerError

pub mod action;
pub mod clock;
pub mod collaborator;
pub mod config;
pub mod error;
pub mod events;
pub mod operator;
pub mod pacing;
pub mod periodic;
pub mod phase;
pub mod runner;
