pub mod bonds;
pub mod governance;
pub mod prices;
pub mod status;
pub mod transparency;
