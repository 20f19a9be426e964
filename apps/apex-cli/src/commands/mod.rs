pub mod actions;
pub mod budget;
pub mod events;
pub mod immune;
pub mod state;
