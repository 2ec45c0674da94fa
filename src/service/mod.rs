//! CrudService: generic CRUD over the safe SQL builder, plus row shaping
//! and insert validation.

mod crud;
mod shape;
mod validation;

pub use crud::{classify_key, CrudService, KeyLookup, QueryResult};
pub use shape::shape_row;
pub use validation::check_required;
