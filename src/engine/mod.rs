// Book state and the plain types it is built from
pub mod book;
pub mod types;
