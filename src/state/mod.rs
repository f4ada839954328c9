/// Collection state: the cursor model and its durable store
///
/// A cursor records which time range of a source has been collected and the
/// last `(timestamp, insert_id)` accepted, so the next run neither skips nor
/// repeats records. Snapshots are kept in an embedded Fjall keyspace along
/// with the artifacts already collected from object storage.
///
/// ## Usage
///
/// ```rust,ignore
/// use logbox::state::{CollectionState, Direction, StateStore};
///
/// let store = StateStore::open("data/state")?;
/// let mut state = CollectionState::begin(Direction::Forward, lookback, store.load("audit")?, Utc::now());
/// // ... emit records, calling state.accept(ts, id) after each
/// store.save("audit", &state.end(Utc::now()))?;
/// ```

pub mod cursor;
pub mod error;
pub mod keys;
pub mod store;

pub use cursor::{CollectionSnapshot, CollectionState, Direction, FetchWindow, SeenKey};
pub use error::{Result, StateError};
pub use store::{ArtifactRecord, StateStore};
