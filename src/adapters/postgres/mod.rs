pub mod catalog;
pub mod event_store;
pub mod read_model;
pub mod reservation_store;

// パブリックに型を再エクスポート
pub use catalog::ResourceCatalog as PostgresResourceCatalog;
pub use event_store::EventStore as PostgresEventStore;
pub use read_model::LoanRequestReadModel as PostgresLoanRequestReadModel;
pub use reservation_store::ReservationStore as PostgresReservationStore;
