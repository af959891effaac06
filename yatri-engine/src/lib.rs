//! Application services for the seat reservation core: the seat lock
//! manager, the booking state machine, the coin service, the expiry reaper
//! and the change feed. All cross-request invariants live in the storage
//! layer; these services validate input, retry transient storage conflicts
//! and publish mutations to the feed.

pub mod booking;
pub mod coins;
pub mod feed;
pub mod reaper;
pub mod seat_lock;

mod retry;

pub use booking::BookingService;
pub use coins::CoinService;
pub use feed::ChangeFeed;
pub use reaper::ExpiryReaper;
pub use seat_lock::SeatLockManager;
