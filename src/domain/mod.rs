pub mod autotile;
pub mod entity;
pub mod geom;
pub mod grid;
pub mod physics;
pub mod tile;
