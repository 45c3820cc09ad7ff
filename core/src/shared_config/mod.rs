pub mod dumps;
pub mod engine;
pub mod reconciler;
/// Shared config: variant state, dumps, reconciliation and the push loop
pub mod store;
pub mod sync;
pub mod variant;

pub use dumps::{ConfigDump, DumpStore};
pub use engine::{EngineFactory, IncomingConfigMessage, MergeEngine, PushData};
pub use reconciler::{ConfigReconciler, OutgoingConfResult};
pub use store::{ConfigVariantStore, InitReport};
pub use sync::{ConfigSyncService, SyncReport};
pub use variant::{ConfigVariant, GroupVariant, SharedConfigKind, SharedConfigMessage, UserVariant};
