pub mod read_model;
pub mod reservation_store;

pub use read_model::LoanRequestReadModel as InMemoryLoanRequestReadModel;
pub use reservation_store::ReservationStore as InMemoryReservationStore;
