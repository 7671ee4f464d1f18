pub mod approval;
pub mod commands;
pub mod errors;
pub mod events;
pub mod loan_request;
pub mod resource;
pub mod value_objects;

pub use errors::*;
pub use events::*;
pub use resource::*;
pub use value_objects::*;
