pub mod catalog;
pub mod event_store;
pub mod expiry_policy;
pub mod read_model;
pub mod reservation_store;

pub use catalog::ResourceCatalog;
pub use event_store::{EventStore, StoreError};
pub use expiry_policy::ExpiryPolicy;
pub use read_model::{LoanRequestReadModel, LoanRequestView, RequestFilter};
pub use reservation_store::{
    Allocation, AllocationChange, AllocationError, HoldState, ReservationStore,
};
