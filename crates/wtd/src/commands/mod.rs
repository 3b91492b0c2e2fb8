pub mod doctor;
pub mod ext_list;
pub mod list;
pub mod prune;
pub mod up;
