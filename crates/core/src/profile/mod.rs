mod profile_model;
mod profile_traits;

pub use profile_model::*;
pub use profile_traits::ProfileRepositoryTrait;
