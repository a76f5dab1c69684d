pub mod actions;
pub mod auth;
pub mod campaigns;
pub mod health;
pub mod resources;
pub mod roles;
pub mod users;
