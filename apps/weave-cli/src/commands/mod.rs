pub mod apply;
pub mod index;
pub mod modify;
pub mod quality;
pub mod restore;
pub mod select;
