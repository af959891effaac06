//! Core data model for the seat reservation and booking consistency engine:
//! seat leases, bookings, the coin ledger, change-feed events, the error
//! taxonomy and the storage traits every backend implements.

pub mod booking;
pub mod coins;
pub mod error;
pub mod events;
pub mod lease;
pub mod repository;

pub use booking::{Booking, BookingStatus, NewBooking};
pub use coins::{CoinEntry, CoinKind};
pub use error::{EngineError, StorageError};
pub use events::{BookingSummary, ChangeEvent, ChangeOp, ChangePayload};
pub use lease::{SeatLease, SeatStatus};
pub use repository::{
    BookingStore, CancelStep, ClaimOutcome, CoinLedger, ConfirmStep, DebitOutcome, LeaseStore,
    PendingOutcome, RefundStep,
};
