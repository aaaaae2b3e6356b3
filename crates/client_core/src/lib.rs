pub mod api;
pub mod error;
pub mod game_socket;
pub mod pin_entry;
pub mod pin_selection;
pub mod room_sync;
pub mod round_timer;
pub mod types;

pub use api::{HttpRoomApi, RoomApi};
pub use error::{PinEntryError, PinSelectionError, RequestError};
pub use game_socket::{GameSocket, GuessSink};
pub use pin_entry::{EntryOutcome, PinEntryController};
pub use pin_selection::PinSelection;
pub use room_sync::{RoomSyncEngine, RoomTracker, StaleUpdate, SyncEvent, SyncOptions};
pub use round_timer::RoundTimer;
pub use types::{Outcome, RoomView};
