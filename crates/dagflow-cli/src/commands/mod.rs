//! Command implementations

pub mod db;
pub mod events;
pub mod plan;
pub mod resume;
pub mod run;
pub mod show;
pub mod stop;
