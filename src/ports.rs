pub mod directory;
pub mod presenter;
pub mod push;
pub mod registry;
pub mod shell;
