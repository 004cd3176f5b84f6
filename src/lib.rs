//! Tile World: simulation core for a 2D tile-based platformer.
//!
//! `domain` holds the pure rules (grid, autotiling, bodies, mover).
//! `sim` wires them into a frame-stepped world controller with an
//! entity registry, behaviours, persistence and audio mixing inputs.

pub mod config;
pub mod domain;
pub mod error;
pub mod sim;

pub use error::WorldError;
