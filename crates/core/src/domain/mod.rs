pub mod action;
pub mod history;
pub mod settings;
