pub mod audio;
pub mod behavior;
pub mod camera;
pub mod catalog;
pub mod clock;
pub mod event;
pub mod level;
pub mod records;
pub mod registry;
pub mod save;
pub mod step;
pub mod world;
