pub mod messaging;
pub mod push;
