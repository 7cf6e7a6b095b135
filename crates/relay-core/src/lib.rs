//! Feed-agnostic state machinery shared by the relay: the deep-merge rule,
//! the `.z` payload codec, lap/pit derivation, and the `Store` that ties
//! them together.

pub mod clock;
pub mod codec;
pub mod derive;
pub mod merge;
pub mod models;
pub mod store;

pub use clock::{format_lap_time, parse_lap_time};
pub use codec::{decode, strip_compressed_suffix, Payload};
pub use models::{LapCount, LapRecord, PitEntry, PitRecord};
pub use store::{MergeFeed, ReplaceFeed, Store, StoreError, TimingOutcome};
