//! replay-core: the stateful subsystems of the record/replay harness —
//! recorder, player, lazy loader, chunked hash indexer, interceptor
//! registry, pending-forward correlator, pending-request table, ID
//! translation map, session registry, and the per-frame handler dispatcher.

pub mod handler;
pub mod indexer;
pub mod intercept;
pub mod loader;
pub mod pending_forwards;
pub mod pending_requests;
pub mod player;
pub mod recorder;
pub mod session;
pub mod translation;

pub use handler::{handle_command, handle_event, HandleError, HandleResult};
pub use indexer::{build_hash_index, HashIndex, LazyHashIndex};
pub use intercept::{InterceptMatch, InterceptRegistry, InterceptStats};
pub use loader::{load_recording, load_recording_lazy, save_recording, RecordingIoError};
pub use pending_forwards::PendingForwards;
pub use pending_requests::{PendingRequestError, PendingRequestTable};
pub use player::{Player, PlaybackError};
pub use recorder::Recorder;
pub use session::{Session, SessionRegistry, SessionRegistryError};
pub use translation::TranslationMap;
